//! One step's worth of work for a transform capability.

use serde::{Deserialize, Serialize};

use super::params::{BoundingBox, OutputFormat, SpatialRef};
use crate::store::ArtifactRef;

/// Kind of transform capability.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TransformKind {
    RasterInfo,
    VectorInfo,
    Convert,
    Reproject,
    Vectorize,
    AssignGeoreference,
    FetchRemoteImage,
}

/// Credentials forwarded to a remote image service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAuth {
    Bearer(String),
    Basic {
        username: String,
        password: Option<String>,
    },
}

/// A fully validated WMS `GetMap` request.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteImageRequest {
    pub service_url: String,
    pub layer: String,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub srs: SpatialRef,
    pub version: String,
    pub format: String,
    pub auth: Option<RemoteAuth>,
}

/// Ephemeral description of one transform step.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformRequest {
    RasterInfo {
        input: ArtifactRef,
    },
    VectorInfo {
        input: ArtifactRef,
    },
    Convert {
        input: ArtifactRef,
        format: OutputFormat,
    },
    Reproject {
        input: ArtifactRef,
        target_srs: SpatialRef,
    },
    Vectorize {
        input: ArtifactRef,
        format: OutputFormat,
    },
    AssignGeoreference {
        input: ArtifactRef,
        bbox: BoundingBox,
        srs: SpatialRef,
    },
    FetchRemoteImage(RemoteImageRequest),
}

impl TransformRequest {
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::RasterInfo { .. } => TransformKind::RasterInfo,
            Self::VectorInfo { .. } => TransformKind::VectorInfo,
            Self::Convert { .. } => TransformKind::Convert,
            Self::Reproject { .. } => TransformKind::Reproject,
            Self::Vectorize { .. } => TransformKind::Vectorize,
            Self::AssignGeoreference { .. } => TransformKind::AssignGeoreference,
            Self::FetchRemoteImage(_) => TransformKind::FetchRemoteImage,
        }
    }

    /// The artifact this step reads, if any.
    pub fn input(&self) -> Option<&ArtifactRef> {
        match self {
            Self::RasterInfo { input }
            | Self::VectorInfo { input }
            | Self::Convert { input, .. }
            | Self::Reproject { input, .. }
            | Self::Vectorize { input, .. }
            | Self::AssignGeoreference { input, .. } => Some(input),
            Self::FetchRemoteImage(_) => None,
        }
    }
}

/// What a transform produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// A new artifact in the store.
    Artifact(ArtifactRef),
    /// A text report (inspection capabilities).
    Report(String),
}
