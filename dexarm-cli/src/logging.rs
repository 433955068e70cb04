use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Configure tracing. Verbosity rises with repeated `-v` flags; `RUST_LOG`
/// still overrides.
pub fn setup_tracing(verbosity_level: u8) {
    let default_level = match verbosity_level {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
