use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::engine::{FetchRequest, MediaFetcher};
use crate::domain::{
    AppError, CloudcastKey, DownloadItemError, DownloadRun, DownloadRunReport, RunState,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    RunStarted {
        total: usize,
    },
    ItemStarted {
        index: usize,
        key: CloudcastKey,
        title: String,
    },
    ItemProgress {
        index: usize,
        fraction: f32,
    },
    ItemSucceeded {
        index: usize,
        key: CloudcastKey,
        path: PathBuf,
    },
    ItemFailed {
        index: usize,
        key: CloudcastKey,
        error: DownloadItemError,
    },
    RunCompleted(DownloadRunReport),
}

/// Receives run events in the order they happen.
pub trait RunObserver: Send + Sync {
    fn notify(&self, event: DownloadEvent);
}

/// Shared cooperative cancellation flag, checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Downloads the jobs of a run one after another.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    fetcher: Arc<dyn MediaFetcher>,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self { fetcher }
    }

    /// The destination must already exist and be a directory.
    pub fn check_destination(destination: &Path) -> Result<(), AppError> {
        match std::fs::metadata(destination) {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok(()),
            _ => Err(AppError::InvalidDestination(destination.to_path_buf())),
        }
    }

    /// Processes every pending job of `run`.
    ///
    /// A failing item is recorded and the run moves on. Jobs already terminal are not
    /// touched again. `cancel` is checked before each item; an item already started is
    /// allowed to finish.
    pub async fn run(
        &self,
        run: &mut DownloadRun,
        cancel: &CancellationFlag,
        observer: &dyn RunObserver,
    ) -> DownloadRunReport {
        let pending = run
            .jobs()
            .iter()
            .filter(|job| !job.status().is_terminal())
            .count();

        tracing::info!(
            jobs = run.jobs().len(),
            pending,
            destination = %run.destination().display(),
            "download run started"
        );
        run.set_state(RunState::Running);
        observer.notify(DownloadEvent::RunStarted {
            total: run.jobs().len(),
        });

        let mut cancelled = false;
        for index in 0..run.jobs().len() {
            if run.jobs()[index].status().is_terminal() {
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let job = &mut run.jobs_mut()[index];
            job.start();
            observer.notify(DownloadEvent::ItemStarted {
                index,
                key: job.record.key.clone(),
                title: job.record.title.clone(),
            });

            let request = FetchRequest {
                source_url: job.record.source_url.clone(),
                directory: job.destination.clone(),
                file_stem: job.record.file_stem(),
            };
            let progress = |fraction: f32| {
                observer.notify(DownloadEvent::ItemProgress { index, fraction });
            };

            match self.fetcher.fetch(&request, &progress).await {
                Ok(path) => {
                    tracing::info!(key = %job.record.key, path = %path.display(), "cloudcast downloaded");
                    job.succeed(path.clone());
                    observer.notify(DownloadEvent::ItemSucceeded {
                        index,
                        key: job.record.key.clone(),
                        path,
                    });
                }
                Err(error) => {
                    tracing::warn!(key = %job.record.key, %error, "cloudcast download failed");
                    job.fail(error.clone());
                    observer.notify(DownloadEvent::ItemFailed {
                        index,
                        key: job.record.key.clone(),
                        error,
                    });
                }
            }
        }

        run.set_state(if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        });

        let report = run.report();
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            not_started = report.not_started,
            cancelled,
            "download run finished"
        );
        observer.notify(DownloadEvent::RunCompleted(report.clone()));
        report
    }
}
