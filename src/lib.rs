pub mod config;
pub mod domain;
pub mod error;
pub mod intake;
pub mod logging;
pub mod observability;
pub mod pipeline;

pub use domain::{Category, DataModel, FileFormat, Indicator, RawUpload, UploadStatus, Visibility};
pub use error::{EtlError, Result};
pub use intake::{IntakeResponse, IntakeService, UploadRequest};
