use std::path::PathBuf;

use futures::stream::BoxStream;
use futures::StreamExt;

use super::download_orchestrator::DownloadOrchestrator;
use super::task_runner::{Notification, OperationId, OperationKind, TaskRunner, WorkerEvent};
use crate::api::ApiClient;
use crate::domain::{CloudcastRecord, DownloadRun};

pub type Operation = (OperationId, BoxStream<'static, Notification>);

/// Searches users matching `phrase`; one `SearchCompleted` on success.
pub fn search_users(runner: &mut TaskRunner, client: ApiClient, phrase: String) -> Operation {
    runner.start(OperationKind::Search, move |reporter| async move {
        tracing::info!(%phrase, "searching users");
        let users = client.search_users(&phrase).await?;
        if !reporter.is_cancelled() {
            reporter.emit(WorkerEvent::SearchCompleted(users));
        }
        Ok(())
    })
}

/// Lists every cloudcast of `username`, one `ListingPage` per fetched page.
pub fn list_cloudcasts(runner: &mut TaskRunner, client: ApiClient, username: String) -> Operation {
    runner.start(OperationKind::Listing, move |reporter| async move {
        tracing::info!(%username, "listing cloudcasts");
        let mut pages = std::pin::pin!(client.cloudcast_pages(&username));
        let mut total = 0;

        loop {
            if reporter.is_cancelled() {
                return Ok(());
            }
            match pages.next().await {
                Some(page) => {
                    let page = page?;
                    total += page.records.len();
                    reporter.emit(WorkerEvent::ListingPage(page.records));
                }
                None => break,
            }
        }

        tracing::info!(%username, total, "listing finished");
        reporter.emit(WorkerEvent::ListingCompleted { total });
        Ok(())
    })
}

/// Downloads `records` into `destination`, ending with a `RunCompleted` report.
pub fn download(
    runner: &mut TaskRunner,
    orchestrator: DownloadOrchestrator,
    records: Vec<CloudcastRecord>,
    destination: PathBuf,
) -> Operation {
    runner.start(OperationKind::Download, move |reporter| async move {
        DownloadOrchestrator::check_destination(&destination)?;

        let mut run = DownloadRun::new(records, destination);
        orchestrator
            .run(&mut run, reporter.cancellation(), &reporter)
            .await;
        Ok(())
    })
}
