//! Logging setup: console always, daily rolling file on request.

use sigil_core::config;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "sigil=info,sigil_core=info,sigil_platform=info";
const VERBOSE_FILTER: &str = "sigil=debug,sigil_core=debug,sigil_platform=debug";

/// Initialize logging. `RUST_LOG` overrides the default filter.
///
/// With `to_file`, logs are also written to `<config dir>/sigil/logs/sigil.log.<date>`.
pub fn setup(verbose: bool, to_file: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let file_layer = if to_file {
        let log_dir = config::log_dir();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Failed to create log directory {:?}: {}", log_dir, e);
            None
        } else {
            let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "sigil.log");
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(file_appender)
                    .with_filter(filter()),
            )
        }
    } else {
        None
    };

    match file_layer {
        Some(file_layer) => {
            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
            tracing::info!("File logging enabled: {:?}", config::log_dir());
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
        }
    }
}
