use std::collections::HashMap;
use std::future::Future;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::download_orchestrator::{CancellationFlag, DownloadEvent, RunObserver};
use crate::domain::{AppError, CloudcastRecord, UserRecord};

/// At most one worker per kind is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Search,
    Listing,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId {
    pub kind: OperationKind,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    SearchCompleted(Vec<UserRecord>),
    ListingPage(Vec<CloudcastRecord>),
    ListingCompleted { total: usize },
    Download(DownloadEvent),
    Failed(AppError),
    /// Always the last event of a cancelled operation.
    Cancelled,
}

impl WorkerEvent {
    /// Whether this event ends its operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerEvent::SearchCompleted(_)
                | WorkerEvent::ListingCompleted { .. }
                | WorkerEvent::Download(DownloadEvent::RunCompleted(_))
                | WorkerEvent::Failed(_)
                | WorkerEvent::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub operation: OperationId,
    pub event: WorkerEvent,
}

/// A worker's side of the notification channel.
#[derive(Clone)]
pub struct Reporter {
    operation: OperationId,
    sender: mpsc::UnboundedSender<Notification>,
    cancel: CancellationFlag,
}

impl Reporter {
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn emit(&self, event: WorkerEvent) {
        let notification = Notification {
            operation: self.operation,
            event,
        };
        if self.sender.send(notification).is_err() {
            tracing::debug!(operation = ?self.operation, "notification dropped, receiver gone");
        }
    }
}

impl RunObserver for Reporter {
    fn notify(&self, event: DownloadEvent) {
        self.emit(WorkerEvent::Download(event));
    }
}

/// Starts background workers and hands back their ordered notification streams.
///
/// Lives on the UI side. Starting an operation cancels the previous one of the same kind;
/// its late notifications can be recognised with [`TaskRunner::is_current`].
#[derive(Debug, Default)]
pub struct TaskRunner {
    next_generation: u64,
    active: HashMap<OperationKind, (u64, CancellationFlag)>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `work` once the returned stream is first polled.
    ///
    /// An `Err` or a panic inside `work` becomes a `Failed` notification. A cancelled
    /// operation ends with `Cancelled`. The stream ends when the worker is done.
    pub fn start<F, Fut>(
        &mut self,
        kind: OperationKind,
        work: F,
    ) -> (OperationId, BoxStream<'static, Notification>)
    where
        F: FnOnce(Reporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.cancel(kind);

        self.next_generation += 1;
        let operation = OperationId {
            kind,
            generation: self.next_generation,
        };
        let cancel = CancellationFlag::new();
        self.active.insert(kind, (operation.generation, cancel.clone()));

        let (sender, mut receiver) = mpsc::unbounded_channel();
        let reporter = Reporter {
            operation,
            sender,
            cancel,
        };

        let launch = futures::stream::once(async move {
            tokio::spawn(supervise(reporter, work));
        })
        .filter_map(|()| async { None::<Notification> });

        let notifications = futures::stream::poll_fn(move |cx| receiver.poll_recv(cx));

        tracing::debug!(?operation, "operation started");
        (operation, launch.chain(notifications).boxed())
    }

    /// Requests cancellation of the live operation of `kind`, if any.
    ///
    /// The operation stays current so its remaining notifications, ending with
    /// `Cancelled`, are still delivered. Returns `false` if nothing was left to cancel.
    pub fn cancel(&mut self, kind: OperationKind) -> bool {
        match self.active.get(&kind) {
            Some((generation, flag)) if !flag.is_cancelled() => {
                tracing::info!(?kind, generation, "cancelling operation");
                flag.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_current(&self, operation: OperationId) -> bool {
        self.active
            .get(&operation.kind)
            .is_some_and(|(generation, _)| *generation == operation.generation)
    }

    #[cfg(test)]
    pub(crate) fn cancellation(&self, kind: OperationKind) -> Option<CancellationFlag> {
        self.active.get(&kind).map(|(_, flag)| flag.clone())
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.active.contains_key(&kind)
    }

    /// Forgets `operation` once its terminal notification has been handled.
    pub fn finish(&mut self, operation: OperationId) {
        if self.is_current(operation) {
            self.active.remove(&operation.kind);
        }
    }
}

async fn supervise<F, Fut>(reporter: Reporter, work: F)
where
    F: FnOnce(Reporter) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    let operation = reporter.operation();

    match tokio::spawn(work(reporter.clone())).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            tracing::error!(?operation, %error, "operation failed");
            reporter.emit(WorkerEvent::Failed(error));
        }
        Err(join_error) => {
            tracing::error!(?operation, error = %join_error, "worker aborted");
            let reason = if join_error.is_panic() {
                "worker panicked".to_string()
            } else {
                join_error.to_string()
            };
            reporter.emit(WorkerEvent::Failed(AppError::Worker(reason)));
        }
    }

    if reporter.is_cancelled() {
        tracing::info!(?operation, "operation cancelled");
        reporter.emit(WorkerEvent::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn user(name: &str) -> UserRecord {
        UserRecord {
            username: name.to_string(),
            display_name: name.to_string(),
            profile_url: format!("https://www.mixcloud.com/{name}/"),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_notifications_arrive_in_order() {
        let mut runner = TaskRunner::new();
        let (operation, stream) = runner.start(OperationKind::Listing, |reporter| async move {
            reporter.emit(WorkerEvent::ListingPage(vec![]));
            reporter.emit(WorkerEvent::ListingPage(vec![]));
            reporter.emit(WorkerEvent::ListingCompleted { total: 0 });
            Ok(())
        });

        let notifications: Vec<Notification> = stream.collect().await;

        assert!(notifications.iter().all(|n| n.operation == operation));
        let events: Vec<_> = notifications.into_iter().map(|n| n.event).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], WorkerEvent::ListingPage(_)));
        assert!(matches!(events[1], WorkerEvent::ListingPage(_)));
        assert!(matches!(events[2], WorkerEvent::ListingCompleted { total: 0 }));
        assert!(runner.is_current(operation));

        runner.finish(operation);
        assert!(!runner.is_running(OperationKind::Listing));
    }

    #[tokio::test]
    async fn test_worker_error_becomes_failed_notification() {
        let mut runner = TaskRunner::new();
        let (_, stream) = runner.start(OperationKind::Search, |_| async {
            Err(AppError::Network("connection reset".to_string()))
        });

        let events: Vec<_> = stream.map(|n| n.event).collect().await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkerEvent::Failed(error) => {
                assert_eq!(error, &AppError::Network("connection reset".to_string()))
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events[0].is_terminal());
    }

    #[tokio::test]
    async fn test_worker_panic_is_caught() {
        let mut runner = TaskRunner::new();
        let (_, stream) = runner.start(OperationKind::Search, |reporter| async move {
            reporter.emit(WorkerEvent::SearchCompleted(vec![user("a")]));
            if !reporter.is_cancelled() {
                panic!("boom");
            }
            Ok::<(), AppError>(())
        });

        let events: Vec<_> = stream.map(|n| n.event).collect().await;

        assert!(matches!(events[0], WorkerEvent::SearchCompleted(_)));
        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Failed(AppError::Worker(_)))
        ));
    }

    #[tokio::test]
    async fn test_new_operation_cancels_previous_of_same_kind() {
        let mut runner = TaskRunner::new();
        let (first, mut first_stream) =
            runner.start(OperationKind::Listing, |reporter| async move {
                while !reporter.is_cancelled() {
                    reporter.emit(WorkerEvent::ListingPage(vec![]));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok(())
            });

        let opening = first_stream.next().await.unwrap();
        assert!(matches!(opening.event, WorkerEvent::ListingPage(_)));

        let (second, second_stream) = runner.start(OperationKind::Listing, |reporter| async move {
            reporter.emit(WorkerEvent::ListingCompleted { total: 0 });
            Ok(())
        });

        assert!(!runner.is_current(first));
        assert!(runner.is_current(second));

        let rest: Vec<_> = first_stream.map(|n| n.event).collect().await;
        assert!(matches!(rest.last(), Some(WorkerEvent::Cancelled)));
        assert_eq!(
            rest.iter()
                .filter(|e| matches!(e, WorkerEvent::Cancelled))
                .count(),
            1
        );

        let events: Vec<_> = second_stream.map(|n| n.event).collect().await;
        assert!(matches!(events[..], [WorkerEvent::ListingCompleted { total: 0 }]));
    }

    #[tokio::test]
    async fn test_kinds_do_not_cancel_each_other() {
        let mut runner = TaskRunner::new();
        let (search, _search_stream) = runner.start(OperationKind::Search, |_| async { Ok(()) });
        let (listing, _listing_stream) =
            runner.start(OperationKind::Listing, |_| async { Ok(()) });

        assert!(runner.is_current(search));
        assert!(runner.is_current(listing));
        assert!(runner.cancel(OperationKind::Search));
        assert!(!runner.cancel(OperationKind::Search));
        assert!(runner.is_current(search));
        assert!(runner.is_current(listing));
        assert!(!runner.cancel(OperationKind::Download));
    }

    #[tokio::test]
    async fn test_explicit_cancel_still_delivers_acknowledgement() {
        let mut runner = TaskRunner::new();
        let (operation, mut stream) = runner.start(OperationKind::Download, |reporter| async move {
            reporter.emit(WorkerEvent::ListingPage(vec![]));
            while !reporter.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            reporter.emit(WorkerEvent::ListingCompleted { total: 0 });
            Ok(())
        });

        stream.next().await.unwrap();
        assert!(runner.cancel(OperationKind::Download));
        assert!(runner.is_current(operation));

        let rest: Vec<_> = stream.map(|n| n.event).collect().await;
        assert!(matches!(
            rest[..],
            [WorkerEvent::ListingCompleted { total: 0 }, WorkerEvent::Cancelled]
        ));
    }
}
