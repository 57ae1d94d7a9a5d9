use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use iced::Task;

use crate::api::ApiClient;
use crate::application::{
    operations, DownloadOrchestrator, Notification, Operation, OperationKind, TaskRunner,
    WorkerEvent, YtDlpFetcher,
};
use crate::config::settings::{LAST_DOWNLOAD_DIR, LAST_SEARCH};
use crate::config::{AppConfig, JsonSettingsStore, MemorySettingsStore, SettingsStore};
use crate::ui::{MainView, UiMessage};

pub struct DownloadApp {
    view: MainView,
    api_client: Option<ApiClient>,
    orchestrator: DownloadOrchestrator,
    runner: TaskRunner,
    settings: Arc<dyn SettingsStore>,
}

impl DownloadApp {
    pub fn new(config: AppConfig) -> Self {
        let settings: Arc<dyn SettingsStore> = match AppConfig::config_path() {
            Ok(path) => Arc::new(JsonSettingsStore::open(AppConfig::settings_path(&path))),
            Err(e) => {
                tracing::warn!("Settings will not be persisted: {}", e);
                Arc::new(MemorySettingsStore::default())
            }
        };
        Self::with_settings(config, settings)
    }

    pub fn with_settings(config: AppConfig, settings: Arc<dyn SettingsStore>) -> Self {
        let mut view = MainView::default();

        let api_client = match ApiClient::new(config.api.to_api_config()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Catalog client unavailable: {}", e);
                view.status_message = format!("Catalog client unavailable: {}", e);
                None
            }
        };

        let fetcher = YtDlpFetcher::new(
            config.download.ytdlp_path.clone(),
            config.download.audio_format,
        )
        .with_ffmpeg_location(config.download.ffmpeg_location.clone());

        if let Some(query) = settings.get(LAST_SEARCH) {
            view.query = query;
        }
        view.destination = settings
            .get(LAST_DOWNLOAD_DIR)
            .map(PathBuf::from)
            .or_else(|| config.download.directory.clone());

        Self {
            view,
            api_client,
            orchestrator: DownloadOrchestrator::new(Arc::new(fetcher)),
            runner: TaskRunner::new(),
            settings,
        }
    }

    fn remember(&self, key: &str, value: &str) {
        if let Err(e) = self.settings.set(key, value) {
            tracing::warn!(key, "Failed to store setting: {}", e);
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(UiMessage),
    /// Folder chosen in the picker, `None` if the dialog was dismissed
    DestinationPicked(Option<PathBuf>),
    /// Notification from a background operation
    Worker(Notification),
}

fn track(operation: Operation) -> Task<Message> {
    let (_, notifications) = operation;
    Task::stream(notifications.map(Message::Worker))
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                UiMessage::SearchPressed => {
                    let phrase = app.view.query.trim().to_string();
                    if phrase.is_empty() {
                        app.view.status_message = "Enter a name to search for".to_string();
                        return Task::none();
                    }
                    let Some(client) = app.api_client.clone() else {
                        return Task::none();
                    };

                    app.remember(LAST_SEARCH, &phrase);
                    app.view.begin_search();
                    return track(operations::search_users(&mut app.runner, client, phrase));
                }
                UiMessage::UserChosen(index) => {
                    let (Some(user), Some(client)) =
                        (app.view.users.get(index).cloned(), app.api_client.clone())
                    else {
                        return Task::none();
                    };

                    let username = user.username.clone();
                    app.view.begin_listing(user);
                    return track(operations::list_cloudcasts(
                        &mut app.runner,
                        client,
                        username,
                    ));
                }
                UiMessage::BackToSearch => {
                    app.runner.cancel(OperationKind::Listing);
                }
                UiMessage::PickDestination => {
                    let start = app.view.destination.clone();
                    return Task::perform(
                        async move {
                            let mut dialog = rfd::AsyncFileDialog::new();
                            if let Some(dir) = start {
                                dialog = dialog.set_directory(dir);
                            }
                            dialog
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::DestinationPicked,
                    );
                }
                UiMessage::DownloadPressed => {
                    if app.runner.is_running(OperationKind::Download) {
                        return Task::none();
                    }
                    let Some(destination) = app.view.destination.clone() else {
                        app.view.status_message = "Choose a destination folder first".to_string();
                        return Task::none();
                    };
                    let records = app.view.selected_records();
                    if records.is_empty() {
                        app.view.status_message = "Select at least one cloudcast".to_string();
                        return Task::none();
                    }

                    app.view.begin_run(&records);
                    return track(operations::download(
                        &mut app.runner,
                        app.orchestrator.clone(),
                        records,
                        destination,
                    ));
                }
                UiMessage::CancelPressed => {
                    if app.runner.cancel(OperationKind::Download) {
                        app.view.cancel_requested = true;
                        app.view.status_message =
                            "Cancelling after the current download...".to_string();
                    }
                }
                _ => {}
            }
        }
        Message::DestinationPicked(picked) => {
            if let Some(path) = picked {
                app.remember(LAST_DOWNLOAD_DIR, &path.to_string_lossy());
                app.view.status_message = format!("Saving to: {}", path.display());
                app.view.destination = Some(path);
            }
        }
        Message::Worker(Notification { operation, event }) => {
            if !app.runner.is_current(operation) {
                tracing::debug!(?operation, "dropping stale notification");
                return Task::none();
            }
            // The report ends a run; a trailing `Cancelled` is then dropped as stale.
            if event.is_terminal() {
                app.runner.finish(operation);
            }

            match event {
                WorkerEvent::SearchCompleted(users) => app.view.show_users(users),
                WorkerEvent::ListingPage(records) => app.view.append_cloudcasts(records),
                WorkerEvent::ListingCompleted { total } => app.view.finish_listing(total),
                WorkerEvent::Download(event) => app.view.apply_download_event(event),
                WorkerEvent::Failed(error) => app.view.operation_failed(operation.kind, &error),
                WorkerEvent::Cancelled => app.view.operation_cancelled(operation.kind),
            }
        }
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}
