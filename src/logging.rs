use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize structured logging. Level comes from `ATTACHE_LOG`
/// (trace|debug|info|warn|error), defaulting to INFO. Logs go to stderr so
/// the interactive REPL keeps stdout for conversation output.
pub fn init() {
    let level = match std::env::var("ATTACHE_LOG").ok().as_deref() {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        Some("warn") => Level::WARN,
        Some("error") => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
