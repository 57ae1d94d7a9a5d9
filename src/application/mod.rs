pub mod download_orchestrator;
pub mod engine;
pub mod operations;
pub mod task_runner;

pub use download_orchestrator::{DownloadEvent, DownloadOrchestrator};
pub use engine::{AudioFormat, YtDlpFetcher};
pub use operations::Operation;
pub use task_runner::{Notification, OperationKind, TaskRunner, WorkerEvent};
