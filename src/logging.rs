use tracing_subscriber::EnvFilter;

/// Sets up logging of events reported while resolving.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used, falling back
/// to `warn`. Events go to stderr so stdout carries only the report.
///
/// E.g. to watch every attempt and reply:
///   RUST_LOG=dns_client=debug
pub fn init_logging(default_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.unwrap_or("warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .ok();
}
