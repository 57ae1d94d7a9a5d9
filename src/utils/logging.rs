use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mixcloud_bulk_downloader={default_level},reqwest=warn"
        ))
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
