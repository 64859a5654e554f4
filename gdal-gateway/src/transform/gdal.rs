//! GDAL command-line engine: one transform per tool invocation.
//!
//! | Kind | Command |
//! |------|---------|
//! | raster-info | `gdalinfo <in>` |
//! | vector-info | `ogrinfo -ro -so -al <in>` |
//! | convert | `gdal_translate -of <FORMAT> <in> <out>` |
//! | reproject | `gdalwarp -t_srs <SRS> <in> <out.tif>` |
//! | vectorize | `gdal_polygonize.py <in> -f <FORMAT> <out>` |
//! | assign-georeference | `gdal_translate -of GTiff -a_srs <SRS> -a_ullr <ulx> <uly> <lrx> <lry> <in> <out.tif>` |

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{CapturedOutput, RunError, run_captured, tokio_command};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::failure::{FailureReason, TransformFailure};
use super::params::{BoundingBox, OutputFormat, SpatialRef};
use super::request::{TransformKind, TransformOutput, TransformRequest};
use super::traits::{Transform, TransformContext, unexpected_request};
use crate::store::{ArtifactRef, ArtifactStore};

/// Locations of the GDAL tools and the per-invocation time budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdalTools {
    #[serde(default = "default_gdalinfo")]
    pub gdalinfo: String,
    #[serde(default = "default_ogrinfo")]
    pub ogrinfo: String,
    #[serde(default = "default_gdal_translate")]
    pub gdal_translate: String,
    #[serde(default = "default_gdalwarp")]
    pub gdalwarp: String,
    #[serde(default = "default_gdal_polygonize")]
    pub gdal_polygonize: String,
    /// Seconds before a running tool is killed. 0 disables the limit.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_gdalinfo() -> String {
    "gdalinfo".to_string()
}

fn default_ogrinfo() -> String {
    "ogrinfo".to_string()
}

fn default_gdal_translate() -> String {
    "gdal_translate".to_string()
}

fn default_gdalwarp() -> String {
    "gdalwarp".to_string()
}

fn default_gdal_polygonize() -> String {
    "gdal_polygonize.py".to_string()
}

fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for GdalTools {
    fn default() -> Self {
        Self {
            gdalinfo: default_gdalinfo(),
            ogrinfo: default_ogrinfo(),
            gdal_translate: default_gdal_translate(),
            gdalwarp: default_gdalwarp(),
            gdal_polygonize: default_gdal_polygonize(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl GdalTools {
    /// Tool paths from `GDALINFO_PATH`, `OGRINFO_PATH`, `GDAL_TRANSLATE_PATH`,
    /// `GDALWARP_PATH` and `GDAL_POLYGONIZE_PATH`, defaulting to names on `PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: fn() -> String| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default)
        };

        Self {
            gdalinfo: var("GDALINFO_PATH", default_gdalinfo),
            ogrinfo: var("OGRINFO_PATH", default_ogrinfo),
            gdal_translate: var("GDAL_TRANSLATE_PATH", default_gdal_translate),
            gdalwarp: var("GDALWARP_PATH", default_gdalwarp),
            gdal_polygonize: var("GDAL_POLYGONIZE_PATH", default_gdal_polygonize),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Run `program` with `args`, mapping every way it can go wrong to a failure.
    async fn run(
        &self,
        kind: TransformKind,
        program: &str,
        args: Vec<OsString>,
    ) -> Result<CapturedOutput, TransformFailure> {
        debug!(kind = %kind, program, ?args, "Running GDAL tool");

        let mut cmd = tokio_command(program);
        cmd.args(&args).env("LC_ALL", "C");

        let output = run_captured(&mut cmd, self.timeout())
            .await
            .map_err(|e| match e {
                RunError::Spawn(err) => TransformFailure::new(
                    kind,
                    FailureReason::EngineUnavailable,
                    format!("could not start {program}: {err}"),
                ),
                RunError::Wait(err) => TransformFailure::new(
                    kind,
                    FailureReason::EngineUnavailable,
                    format!("lost track of {program}: {err}"),
                ),
                RunError::TimedOut(limit) => TransformFailure::new(
                    kind,
                    FailureReason::Timeout,
                    format!("{program} timed out after {}s", limit.as_secs()),
                ),
            })?;

        if !output.success() {
            warn!(kind = %kind, program, code = output.code(), "GDAL tool failed");
            return Err(TransformFailure::engine_failed(
                kind,
                output.code(),
                &output.stderr_lossy(),
            ));
        }

        debug!(
            kind = %kind,
            program,
            elapsed_secs = output.elapsed.as_secs_f64(),
            "GDAL tool finished"
        );
        Ok(output)
    }

    /// Run a tool that writes `output`, cleaning up after failures.
    async fn produce(
        &self,
        kind: TransformKind,
        program: &str,
        args: Vec<OsString>,
        store: &ArtifactStore,
        output: ArtifactRef,
    ) -> Result<TransformOutput, TransformFailure> {
        if let Err(failure) = self.run(kind, program, args).await {
            // The tool may have left a partial file behind.
            if let Err(e) = store.delete(&output).await {
                warn!(artifact = %output, error = %e, "Failed to remove partial output");
            }
            return Err(failure);
        }

        if !store.exists(&output).await {
            return Err(TransformFailure::new(
                kind,
                FailureReason::EngineFailed(0),
                format!("{program} reported success but wrote no output"),
            ));
        }

        info!(kind = %kind, artifact = %output, "Produced artifact");
        Ok(TransformOutput::Artifact(output))
    }
}

fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}

pub(crate) fn raster_info_args(input: &Path) -> Vec<OsString> {
    os_args([input.as_os_str()])
}

pub(crate) fn vector_info_args(input: &Path) -> Vec<OsString> {
    let mut args = os_args(["-ro", "-so", "-al"]);
    args.push(input.into());
    args
}

pub(crate) fn convert_args(format: &OutputFormat, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = os_args(["-of", format.driver()]);
    args.push(input.into());
    args.push(output.into());
    args
}

pub(crate) fn reproject_args(target_srs: &SpatialRef, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = os_args(["-t_srs", target_srs.as_str()]);
    args.push(input.into());
    args.push(output.into());
    args
}

pub(crate) fn vectorize_args(format: &OutputFormat, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = vec![OsString::from(input)];
    args.extend(os_args(["-f", format.driver()]));
    args.push(output.into());
    args
}

/// Corner mapping: upper-left is `(xmin, ymax)`, lower-right is `(xmax, ymin)`.
pub(crate) fn georeference_args(
    bbox: &BoundingBox,
    srs: &SpatialRef,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args = os_args([
        "-of".to_string(),
        "GTiff".to_string(),
        "-a_srs".to_string(),
        srs.to_string(),
        "-a_ullr".to_string(),
        bbox.xmin.to_string(),
        bbox.ymax.to_string(),
        bbox.xmax.to_string(),
        bbox.ymin.to_string(),
    ]);
    args.push(input.into());
    args.push(output.into());
    args
}

macro_rules! gdal_transform {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            tools: Arc<GdalTools>,
        }

        impl $name {
            pub fn new(tools: Arc<GdalTools>) -> Self {
                Self { tools }
            }
        }
    };
}

gdal_transform!(
    /// Raster metadata report via `gdalinfo`.
    RasterInfoTransform
);
gdal_transform!(
    /// Vector layer summary via `ogrinfo`.
    VectorInfoTransform
);
gdal_transform!(
    /// Raster format conversion via `gdal_translate`.
    ConvertTransform
);
gdal_transform!(
    /// Raster reprojection via `gdalwarp`.
    ReprojectTransform
);
gdal_transform!(
    /// Raster to polygons via `gdal_polygonize.py`.
    VectorizeTransform
);
gdal_transform!(
    /// Attach a bounding box and spatial reference to a bare image via `gdal_translate`.
    AssignGeoreferenceTransform
);

#[async_trait]
impl Transform for RasterInfoTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::RasterInfo
    }

    fn name(&self) -> &'static str {
        "RasterInfoTransform"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let TransformRequest::RasterInfo { input } = request else {
            return Err(unexpected_request(self.kind(), request));
        };
        let output = self
            .tools
            .run(
                self.kind(),
                &self.tools.gdalinfo,
                raster_info_args(&ctx.store.path_of(input)),
            )
            .await?;
        Ok(TransformOutput::Report(output.stdout_lossy()))
    }
}

#[async_trait]
impl Transform for VectorInfoTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::VectorInfo
    }

    fn name(&self) -> &'static str {
        "VectorInfoTransform"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let TransformRequest::VectorInfo { input } = request else {
            return Err(unexpected_request(self.kind(), request));
        };
        let output = self
            .tools
            .run(
                self.kind(),
                &self.tools.ogrinfo,
                vector_info_args(&ctx.store.path_of(input)),
            )
            .await?;
        Ok(TransformOutput::Report(output.stdout_lossy()))
    }
}

#[async_trait]
impl Transform for ConvertTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Convert
    }

    fn name(&self) -> &'static str {
        "ConvertTransform"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let TransformRequest::Convert { input, format } = request else {
            return Err(unexpected_request(self.kind(), request));
        };
        let output = ctx.store.allocate(Some(&format.extension()));
        let args = convert_args(
            format,
            &ctx.store.path_of(input),
            &ctx.store.path_of(&output),
        );
        self.tools
            .produce(self.kind(), &self.tools.gdal_translate, args, &ctx.store, output)
            .await
    }
}

#[async_trait]
impl Transform for ReprojectTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Reproject
    }

    fn name(&self) -> &'static str {
        "ReprojectTransform"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let TransformRequest::Reproject { input, target_srs } = request else {
            return Err(unexpected_request(self.kind(), request));
        };
        let output = ctx.store.allocate(Some("tif"));
        let args = reproject_args(
            target_srs,
            &ctx.store.path_of(input),
            &ctx.store.path_of(&output),
        );
        self.tools
            .produce(self.kind(), &self.tools.gdalwarp, args, &ctx.store, output)
            .await
    }
}

#[async_trait]
impl Transform for VectorizeTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Vectorize
    }

    fn name(&self) -> &'static str {
        "VectorizeTransform"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let TransformRequest::Vectorize { input, format } = request else {
            return Err(unexpected_request(self.kind(), request));
        };
        let output = ctx.store.allocate(Some(&format.extension()));
        let args = vectorize_args(
            format,
            &ctx.store.path_of(input),
            &ctx.store.path_of(&output),
        );
        self.tools
            .produce(self.kind(), &self.tools.gdal_polygonize, args, &ctx.store, output)
            .await
    }
}

#[async_trait]
impl Transform for AssignGeoreferenceTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::AssignGeoreference
    }

    fn name(&self) -> &'static str {
        "AssignGeoreferenceTransform"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let TransformRequest::AssignGeoreference { input, bbox, srs } = request else {
            return Err(unexpected_request(self.kind(), request));
        };
        let output = ctx.store.allocate(Some("tif"));
        let args = georeference_args(
            bbox,
            srs,
            &ctx.store.path_of(input),
            &ctx.store.path_of(&output),
        );
        self.tools
            .produce(self.kind(), &self.tools.gdal_translate, args, &ctx.store, output)
            .await
    }
}
