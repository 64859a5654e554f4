//! gdal-gateway library crate.
//!
//! HTTP gateway that runs uploaded or remotely fetched geodata through
//! chains of GDAL transforms and serves the results.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod transform;

pub use error::{Error, Result};
