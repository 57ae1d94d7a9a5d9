mod screens;

use std::path::PathBuf;

use crate::application::{DownloadEvent, OperationKind};
use crate::domain::{
    AppError, CloudcastKey, CloudcastRecord, DownloadRunReport, Selection, UserRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Search,
    Listing,
    Downloading,
    Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowStatus {
    Pending,
    InProgress(f32),
    Done(PathBuf),
    Failed(String),
}

/// One line of the download progress screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub key: CloudcastKey,
    pub title: String,
    pub status: RowStatus,
}

/// Main view state
pub struct MainView {
    pub screen: Screen,
    pub query: String,
    pub users: Vec<UserRecord>,
    pub searching: bool,
    pub chosen_user: Option<UserRecord>,
    pub cloudcasts: Vec<CloudcastRecord>,
    pub listing: bool,
    pub selection: Selection,
    pub destination: Option<PathBuf>,
    pub rows: Vec<ItemRow>,
    pub downloading: bool,
    pub cancel_requested: bool,
    pub report: Option<DownloadRunReport>,
    pub status_message: String,
}

impl Default for MainView {
    fn default() -> Self {
        Self {
            screen: Screen::Search,
            query: String::new(),
            users: Vec::new(),
            searching: false,
            chosen_user: None,
            cloudcasts: Vec::new(),
            listing: false,
            selection: Selection::default(),
            destination: None,
            rows: Vec::new(),
            downloading: false,
            cancel_requested: false,
            report: None,
            status_message: "Search Mixcloud for an artist or user".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiMessage {
    QueryChanged(String),
    SearchPressed,
    UserChosen(usize),
    CloudcastToggled(usize),
    SelectAll,
    SelectNone,
    PickDestination,
    DownloadPressed,
    CancelPressed,
    BackToSearch,
    BackToListing,
}

impl MainView {
    /// Applies the parts of `message` that only touch view state.
    ///
    /// Messages that start or stop background work are handled by the app.
    pub fn update(&mut self, message: UiMessage) {
        match message {
            UiMessage::QueryChanged(query) => {
                self.query = query;
            }
            UiMessage::CloudcastToggled(index) => {
                if let Some(record) = self.cloudcasts.get(index) {
                    self.selection.toggle(record.key.clone());
                }
            }
            UiMessage::SelectAll => {
                for record in &self.cloudcasts {
                    self.selection.insert(record.key.clone());
                }
            }
            UiMessage::SelectNone => {
                self.selection.clear();
            }
            UiMessage::BackToSearch => {
                self.screen = Screen::Search;
            }
            UiMessage::BackToListing => {
                self.screen = Screen::Listing;
                self.report = None;
                self.rows.clear();
            }
            UiMessage::SearchPressed
            | UiMessage::UserChosen(_)
            | UiMessage::PickDestination
            | UiMessage::DownloadPressed
            | UiMessage::CancelPressed => {}
        }
    }

    pub fn begin_search(&mut self) {
        self.searching = true;
        self.users.clear();
        self.status_message = format!("Searching for \"{}\"...", self.query.trim());
    }

    pub fn show_users(&mut self, users: Vec<UserRecord>) {
        self.searching = false;
        self.status_message = match users.len() {
            0 => "No users found".to_string(),
            1 => "Found 1 user".to_string(),
            n => format!("Found {} users", n),
        };
        self.users = users;
    }

    /// Switches to the listing screen for `user`, dropping the previous listing.
    pub fn begin_listing(&mut self, user: UserRecord) {
        self.status_message = format!("Loading cloudcasts of {}...", user.display_name);
        self.chosen_user = Some(user);
        self.cloudcasts.clear();
        self.selection.clear();
        self.listing = true;
        self.screen = Screen::Listing;
    }

    pub fn append_cloudcasts(&mut self, records: Vec<CloudcastRecord>) {
        self.cloudcasts.extend(records);
        self.status_message = format!("Loaded {} cloudcasts...", self.cloudcasts.len());
    }

    pub fn finish_listing(&mut self, total: usize) {
        self.listing = false;
        self.status_message = format!("{} cloudcasts", total);
    }

    /// Selected records in selection order.
    pub fn selected_records(&self) -> Vec<CloudcastRecord> {
        self.selection.resolve(&self.cloudcasts)
    }

    /// Switches to the progress screen and clears the selection.
    pub fn begin_run(&mut self, records: &[CloudcastRecord]) {
        self.rows = records
            .iter()
            .map(|record| ItemRow {
                key: record.key.clone(),
                title: record.title.clone(),
                status: RowStatus::Pending,
            })
            .collect();
        self.selection.clear();
        self.report = None;
        self.downloading = true;
        self.cancel_requested = false;
        self.screen = Screen::Downloading;
        self.status_message = format!("Downloading {} cloudcasts...", records.len());
    }

    pub fn apply_download_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::RunStarted { total } => {
                tracing::debug!(total, "run started");
            }
            DownloadEvent::ItemStarted { index, title, .. } => {
                self.set_row(index, RowStatus::InProgress(0.0));
                self.status_message = format!("Downloading: {}", title);
            }
            DownloadEvent::ItemProgress { index, fraction } => {
                self.set_row(index, RowStatus::InProgress(fraction.clamp(0.0, 1.0)));
            }
            DownloadEvent::ItemSucceeded { index, path, .. } => {
                self.set_row(index, RowStatus::Done(path));
            }
            DownloadEvent::ItemFailed { index, error, .. } => {
                self.set_row(index, RowStatus::Failed(error.to_string()));
            }
            DownloadEvent::RunCompleted(report) => {
                self.downloading = false;
                self.status_message = if report.cancelled {
                    format!(
                        "Cancelled: {} downloaded, {} failed, {} not started",
                        report.succeeded(),
                        report.failed(),
                        report.not_started
                    )
                } else {
                    format!(
                        "Finished: {} downloaded, {} failed",
                        report.succeeded(),
                        report.failed()
                    )
                };
                self.report = Some(report);
                self.screen = Screen::Summary;
            }
        }
    }

    /// Fraction of rows that reached a terminal state.
    pub fn overall_progress(&self) -> f32 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let done = self
            .rows
            .iter()
            .filter(|row| matches!(row.status, RowStatus::Done(_) | RowStatus::Failed(_)))
            .count();
        done as f32 / self.rows.len() as f32
    }

    pub fn operation_failed(&mut self, kind: OperationKind, error: &AppError) {
        let message = match kind {
            OperationKind::Search => {
                self.searching = false;
                format!("Search failed: {}", error)
            }
            OperationKind::Listing => {
                self.listing = false;
                format!("Could not load cloudcasts: {}", error)
            }
            OperationKind::Download => {
                self.downloading = false;
                self.rows.clear();
                self.screen = Screen::Listing;
                format!("Download failed: {}", error)
            }
        };
        self.status_message = if error.is_retryable() {
            format!("{}. Check your connection and try again", message)
        } else {
            message
        };
    }

    pub fn operation_cancelled(&mut self, kind: OperationKind) {
        match kind {
            OperationKind::Search => self.searching = false,
            OperationKind::Listing => self.listing = false,
            OperationKind::Download => self.downloading = false,
        }
    }

    fn set_row(&mut self, index: usize, status: RowStatus) {
        match self.rows.get_mut(index) {
            Some(row) => row.status = status,
            None => tracing::warn!(index, "progress for unknown row"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::sample_record;
    use crate::domain::model::DownloadJob;
    use crate::domain::{DownloadItemError, DownloadRunReport};

    fn listed_view() -> MainView {
        let mut view = MainView::default();
        view.begin_listing(UserRecord {
            username: "dj".to_string(),
            display_name: "DJ".to_string(),
            profile_url: "https://www.mixcloud.com/dj/".to_string(),
            avatar_url: None,
        });
        view.append_cloudcasts(vec![
            sample_record("dj", "mix-1"),
            sample_record("dj", "mix-2"),
            sample_record("dj", "mix-3"),
        ]);
        view.finish_listing(3);
        view
    }

    #[test]
    fn test_toggling_rows_keeps_selection_order() {
        let mut view = listed_view();
        view.update(UiMessage::CloudcastToggled(2));
        view.update(UiMessage::CloudcastToggled(0));
        view.update(UiMessage::CloudcastToggled(7));

        let slugs: Vec<_> = view.selected_records().into_iter().map(|r| r.slug).collect();
        assert_eq!(slugs, vec!["mix-3", "mix-1"]);

        view.update(UiMessage::CloudcastToggled(2));
        assert_eq!(view.selection.len(), 1);
    }

    #[test]
    fn test_select_all_and_none() {
        let mut view = listed_view();
        view.update(UiMessage::CloudcastToggled(1));
        view.update(UiMessage::SelectAll);
        assert_eq!(view.selection.len(), 3);

        view.update(UiMessage::SelectNone);
        assert!(view.selection.is_empty());
    }

    #[test]
    fn test_new_listing_clears_selection() {
        let mut view = listed_view();
        view.update(UiMessage::SelectAll);
        view.begin_listing(view.chosen_user.clone().unwrap());

        assert!(view.selection.is_empty());
        assert!(view.cloudcasts.is_empty());
        assert!(view.listing);
    }

    #[test]
    fn test_download_events_drive_rows_and_summary() {
        let mut view = listed_view();
        view.update(UiMessage::SelectAll);
        let records = view.selected_records();
        view.begin_run(&records);

        assert!(view.selection.is_empty());
        assert_eq!(view.screen, Screen::Downloading);

        view.apply_download_event(DownloadEvent::ItemStarted {
            index: 0,
            key: records[0].key.clone(),
            title: records[0].title.clone(),
        });
        view.apply_download_event(DownloadEvent::ItemProgress {
            index: 0,
            fraction: 0.5,
        });
        assert_eq!(view.rows[0].status, RowStatus::InProgress(0.5));

        view.apply_download_event(DownloadEvent::ItemSucceeded {
            index: 0,
            key: records[0].key.clone(),
            path: PathBuf::from("/music/dj - mix 1.mp3"),
        });
        view.apply_download_event(DownloadEvent::ItemFailed {
            index: 1,
            key: records[1].key.clone(),
            error: DownloadItemError::Io("disk full".to_string()),
        });
        assert!((view.overall_progress() - 2.0 / 3.0).abs() < f32::EPSILON);

        let mut jobs: Vec<_> = records
            .iter()
            .cloned()
            .map(|record| DownloadJob::new(record, "/music"))
            .collect();
        jobs[0].start();
        jobs[0].succeed(PathBuf::from("/music/dj - mix 1.mp3"));
        view.apply_download_event(DownloadEvent::RunCompleted(DownloadRunReport::from_jobs(
            &jobs, true,
        )));

        assert_eq!(view.screen, Screen::Summary);
        assert!(!view.downloading);
        assert!(view.status_message.starts_with("Cancelled"));

        view.update(UiMessage::BackToListing);
        assert_eq!(view.screen, Screen::Listing);
        assert!(view.report.is_none());
    }

    #[test]
    fn test_refused_run_returns_to_listing() {
        let mut view = listed_view();
        view.update(UiMessage::SelectAll);
        let records = view.selected_records();
        view.begin_run(&records);

        view.operation_failed(
            OperationKind::Download,
            &AppError::InvalidDestination(PathBuf::from("/nope")),
        );

        assert_eq!(view.screen, Screen::Listing);
        assert!(!view.downloading);
        assert!(view.status_message.contains("/nope"));
    }

    #[test]
    fn test_network_failure_suggests_retry() {
        let mut view = MainView::default();
        view.query = "monstercat".to_string();
        view.begin_search();

        view.operation_failed(
            OperationKind::Search,
            &AppError::Network("connection reset".to_string()),
        );
        assert!(!view.searching);
        assert!(view.status_message.starts_with("Search failed: Network error"));
        assert!(view.status_message.ends_with("try again"));

        view.operation_failed(
            OperationKind::Listing,
            &AppError::Service("Catalog service returned HTTP 404".to_string()),
        );
        assert!(!view.status_message.contains("try again"));
    }
}
