mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use iced::window;

fn main() -> iced::Result {
    let (config, config_error) = match config::AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (config::AppConfig::default(), Some(e)),
    };

    utils::init_tracing(&config.log_level);
    if let Some(e) = config_error {
        tracing::warn!("Using default configuration: {}", e);
    }
    tracing::info!(
        base_url = %config.api.base_url,
        audio_format = %config.download.audio_format,
        "starting Mixcloud Bulk Downloader"
    );

    iced::application(
        move || app::DownloadApp::new(config.clone()),
        app::update,
        app::view,
    )
    .title("Mixcloud Bulk Downloader")
    .window(window::Settings {
        size: iced::Size::new(720.0, 640.0),
        ..Default::default()
    })
    .run()
}
