//! Logging setup using tracing
//!
//! The dashboard owns the terminal, so it logs to a daily-rotated file under
//! the user data directory. One-shot commands log to stderr. Either way the
//! level is controlled by `WTDASH_LOG`:
//!
//! ```bash
//! WTDASH_LOG=debug wtdash
//! WTDASH_LOG=wtdash_cli::mux=trace wtdash shell feat
//! ```

use std::io;
use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_ENV: &str = "WTDASH_LOG";
const LOG_FILE: &str = "wtdash.log";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log to stderr; quiet unless `WTDASH_LOG` says otherwise
pub fn init_stderr() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .try_init();
}

/// Log to the rotating file and return its directory
pub fn init_file() -> io::Result<PathBuf> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE);

    let _ = tracing_subscriber::registry()
        .with(env_filter("wtdash=info,warn"))
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .try_init();

    tracing::info!(dir = %log_dir.display(), "wtdash starting");
    Ok(log_dir)
}

pub fn log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("wtdash").join("logs")
}
