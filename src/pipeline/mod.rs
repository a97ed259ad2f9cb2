// ETL stages: reading, cleaning, validation, column mapping, indicator
// creation, reporting, and the tracker that sequences them.

pub mod cleaner;
pub mod lifecycle;
pub mod mapper;
pub mod materializer;
pub mod reader;
pub mod report;
pub mod storage;
pub mod table;
pub mod validator;

pub use lifecycle::{ProcessingOutcome, UploadProcessor};
pub use storage::CatalogStore;
