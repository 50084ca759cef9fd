use std::path::Path;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

static LOG_INIT: Once = Once::new();

/// Installs the global tracing subscriber. With a `log_dir` output goes to a
/// daily-rolling file, otherwise to stderr. Level selection follows
/// `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn init_logging(log_dir: Option<&Path>) {
    LOG_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).ok();
                let file = tracing_appender::rolling::daily(dir, "opsdeck.log");
                if tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(file)
                    .try_init()
                    .is_err()
                {
                    eprintln!("tracing subscriber already installed");
                }
            }
            None => {
                if tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .try_init()
                    .is_err()
                {
                    eprintln!("tracing subscriber already installed");
                }
            }
        }
    });
}
