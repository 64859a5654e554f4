//! Job requests and the step chains they expand to.

use serde::{Deserialize, Serialize};

use super::job::JobKind;
use crate::store::ArtifactRef;
use crate::transform::{
    BoundingBox, OutputFormat, RemoteAuth, RemoteImageRequest, SpatialRef, TransformFailure,
    TransformKind, TransformRequest,
};

pub const DEFAULT_CONVERT_FORMAT: &str = "GTiff";
pub const DEFAULT_REPROJECT_SRS: &str = "4326";
pub const DEFAULT_VECTORIZE_FORMAT: &str = "GeoJSON";
pub const DEFAULT_WMS_VERSION: &str = "1.1.1";
pub const DEFAULT_WMS_FORMAT: &str = "image/png";

/// Largest image edge accepted for a remote fetch.
const MAX_IMAGE_EDGE: u32 = 16_384;

/// Caller parameters for a remote-image job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteImageParams {
    /// Base service URL.
    pub url: String,
    pub layer: String,
    /// `xmin,ymin,xmax,ymax`.
    pub bbox: String,
    pub width: u32,
    pub height: u32,
    /// Reference system of `bbox`, also used for the request.
    #[serde(default = "default_wms_srs")]
    pub srs: String,
    /// Reference system of the final GeoTIFF. Defaults to `srs`.
    #[serde(default)]
    pub target_srs: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    /// Bearer token; takes precedence over basic credentials.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_wms_srs() -> String {
    "EPSG:4326".to_string()
}

/// A submitted operation, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    RasterInfo,
    VectorInfo,
    Convert { output_format: String },
    Reproject { epsg: String },
    Vectorize { output_format: String },
    RemoteImage(RemoteImageParams),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::RasterInfo => JobKind::RasterInfo,
            Self::VectorInfo => JobKind::VectorInfo,
            Self::Convert { .. } => JobKind::Convert,
            Self::Reproject { .. } => JobKind::Reproject,
            Self::Vectorize { .. } => JobKind::Vectorize,
            Self::RemoteImage(_) => JobKind::RemoteImage,
        }
    }

    /// Whether the chain starts from an uploaded file.
    pub fn takes_upload(&self) -> bool {
        !matches!(self, Self::RemoteImage(_))
    }

    /// Validate parameters and expand into the ordered step chain.
    ///
    /// Runs before any engine is invoked; a malformed parameter fails the
    /// job without external side effects.
    pub fn plan(&self) -> Result<Vec<PlannedStep>, TransformFailure> {
        let steps = match self {
            Self::RasterInfo => vec![PlannedStep::RasterInfo],
            Self::VectorInfo => vec![PlannedStep::VectorInfo],
            Self::Convert { output_format } => vec![PlannedStep::Convert(parse_format(
                TransformKind::Convert,
                output_format,
            )?)],
            Self::Reproject { epsg } => vec![PlannedStep::Reproject(parse_srs(
                TransformKind::Reproject,
                epsg,
            )?)],
            Self::Vectorize { output_format } => vec![PlannedStep::Vectorize(parse_format(
                TransformKind::Vectorize,
                output_format,
            )?)],
            Self::RemoteImage(params) => plan_remote(params)?,
        };
        Ok(steps)
    }
}

fn parse_format(kind: TransformKind, raw: &str) -> Result<OutputFormat, TransformFailure> {
    OutputFormat::parse(raw).map_err(|e| TransformFailure::invalid_input(kind, e))
}

fn parse_srs(kind: TransformKind, raw: &str) -> Result<SpatialRef, TransformFailure> {
    SpatialRef::parse(raw).map_err(|e| TransformFailure::invalid_input(kind, e))
}

/// fetch -> assign-georeference -> reproject.
fn plan_remote(params: &RemoteImageParams) -> Result<Vec<PlannedStep>, TransformFailure> {
    const KIND: TransformKind = TransformKind::FetchRemoteImage;

    let bbox = BoundingBox::parse(&params.bbox).map_err(|e| TransformFailure::invalid_input(KIND, e))?;
    let srs = parse_srs(KIND, &params.srs)?;
    let target_srs = match &params.target_srs {
        Some(raw) => parse_srs(TransformKind::Reproject, raw)?,
        None => srs.clone(),
    };

    for (name, value) in [("width", params.width), ("height", params.height)] {
        if value == 0 || value > MAX_IMAGE_EDGE {
            return Err(TransformFailure::invalid_input(
                KIND,
                format!("{name} must be between 1 and {MAX_IMAGE_EDGE}, got {value}"),
            ));
        }
    }

    if params.layer.trim().is_empty() {
        return Err(TransformFailure::invalid_input(KIND, "layer must not be empty"));
    }

    let auth = match (&params.token, &params.username) {
        (Some(token), _) if !token.is_empty() => Some(RemoteAuth::Bearer(token.clone())),
        (_, Some(username)) if !username.is_empty() => Some(RemoteAuth::Basic {
            username: username.clone(),
            password: params.password.clone(),
        }),
        _ => None,
    };

    let fetch = RemoteImageRequest {
        service_url: params.url.trim().to_string(),
        layer: params.layer.clone(),
        bbox,
        width: params.width,
        height: params.height,
        srs: srs.clone(),
        version: params
            .version
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_WMS_VERSION.to_string()),
        format: params
            .format
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_WMS_FORMAT.to_string()),
        auth,
    };

    Ok(vec![
        PlannedStep::FetchRemoteImage(fetch),
        PlannedStep::AssignGeoreference { bbox, srs },
        PlannedStep::Reproject(target_srs),
    ])
}

/// One validated step, waiting for its input artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedStep {
    RasterInfo,
    VectorInfo,
    Convert(OutputFormat),
    Reproject(SpatialRef),
    Vectorize(OutputFormat),
    AssignGeoreference { bbox: BoundingBox, srs: SpatialRef },
    FetchRemoteImage(RemoteImageRequest),
}

impl PlannedStep {
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::RasterInfo => TransformKind::RasterInfo,
            Self::VectorInfo => TransformKind::VectorInfo,
            Self::Convert(_) => TransformKind::Convert,
            Self::Reproject(_) => TransformKind::Reproject,
            Self::Vectorize(_) => TransformKind::Vectorize,
            Self::AssignGeoreference { .. } => TransformKind::AssignGeoreference,
            Self::FetchRemoteImage(_) => TransformKind::FetchRemoteImage,
        }
    }

    /// Attach the artifact produced by the previous step (or the upload).
    pub fn bind(self, input: Option<ArtifactRef>) -> Result<TransformRequest, TransformFailure> {
        let kind = self.kind();
        let request = match (self, input) {
            (Self::FetchRemoteImage(request), _) => TransformRequest::FetchRemoteImage(request),
            (_, None) => {
                return Err(TransformFailure::invalid_input(kind, "step has no input artifact"));
            }
            (Self::RasterInfo, Some(input)) => TransformRequest::RasterInfo { input },
            (Self::VectorInfo, Some(input)) => TransformRequest::VectorInfo { input },
            (Self::Convert(format), Some(input)) => TransformRequest::Convert { input, format },
            (Self::Reproject(target_srs), Some(input)) => {
                TransformRequest::Reproject { input, target_srs }
            }
            (Self::Vectorize(format), Some(input)) => TransformRequest::Vectorize { input, format },
            (Self::AssignGeoreference { bbox, srs }, Some(input)) => {
                TransformRequest::AssignGeoreference { input, bbox, srs }
            }
        };
        Ok(request)
    }
}
