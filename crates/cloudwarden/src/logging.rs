use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber
///
/// `RUST_LOG` wins when set; otherwise the `-v` count picks the level.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "warn,warden=info,cloudwarden_cloud=info,cloudwarden_cloud_aws=info",
        2 => "warn,warden=debug,cloudwarden_cloud=debug,cloudwarden_cloud_aws=debug,cloudwarden_config=debug",
        // SDK internals too
        _ => "debug",
    }
}
