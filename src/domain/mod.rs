pub mod error;
pub mod model;

pub use error::{AppError, DownloadItemError};
pub use model::{
    CloudcastKey, CloudcastRecord, DownloadRun, DownloadRunReport, RunState, Selection,
    UserRecord,
};
