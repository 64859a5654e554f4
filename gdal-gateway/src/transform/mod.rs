//! Transform capabilities.
//!
//! Each capability turns one [`TransformRequest`] into a [`TransformOutput`]
//! or a typed [`TransformFailure`]. The GDAL command-line tools back the
//! local capabilities; remote imagery comes from a WMS `GetMap` request.

pub mod failure;
pub mod gdal;
pub mod params;
pub mod request;
pub mod set;
pub mod traits;
pub mod wms;

pub use failure::{FailureReason, TransformFailure};
pub use gdal::GdalTools;
pub use params::{BoundingBox, OutputFormat, SpatialRef};
pub use request::{RemoteAuth, RemoteImageRequest, TransformKind, TransformOutput, TransformRequest};
pub use set::TransformSet;
pub use traits::{Transform, TransformContext};
pub use wms::{RemoteFetchConfig, RemoteImageFetcher};
