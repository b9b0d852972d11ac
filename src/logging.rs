//! Process-wide logger setup.
//!
//! Everything in the crate logs through the `log` facade. Strategy hooks emit
//! `tracing` events, which reach the same sink through tracing's `log` feature.

use log::LevelFilter;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("a global logger is already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

fn dispatch(level: LevelFilter) -> fern::Dispatch {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}: {}",
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
}

/// Log to stderr at `level`
pub fn init_logging(level: LevelFilter) -> Result<(), LoggingError> {
    dispatch(level).chain(std::io::stderr()).apply()?;
    Ok(())
}

/// Log to stderr and append to the file at `path`
pub fn init_logging_to_file(level: LevelFilter, path: impl AsRef<Path>) -> Result<(), LoggingError> {
    dispatch(level)
        .chain(std::io::stderr())
        .chain(fern::log_file(path)?)
        .apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        // another test binary may already own the global logger
        let first = init_logging_to_file(LevelFilter::Info, &path);
        if first.is_ok() {
            log::info!("logger installed");
            assert!(path.exists());
        }
        assert!(matches!(
            init_logging(LevelFilter::Debug),
            Err(LoggingError::AlreadyInstalled(_))
        ));
    }
}
