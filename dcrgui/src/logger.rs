use std::{error::Error, fs::File, path::Path, str::FromStr, sync::Arc};
use tracing_subscriber::{
    filter::{self, LevelFilter},
    fmt::writer::BoxMakeWriter,
    prelude::*,
};

const LOG_FILE_NAME: &str = "dcrgui.log";
const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Targets of the runtime crates, too chatty at debug level for the wallet
/// log.
const FILTERED_TARGETS: [&str; 3] = ["tokio", "runtime", "mio"];

fn is_filtered(target: &str) -> bool {
    FILTERED_TARGETS
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

/// Log to stdout and to `dcrgui.log` in the data directory, leaving out the
/// events of the tokio runtime (`tokio`, `runtime` and `mio` targets). Only the
/// binary calls this, the library never installs a subscriber.
pub fn setup_logger(log_level: filter::LevelFilter, datadir: &Path) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(datadir)?;
    let file = File::create(datadir.join(LOG_FILE_NAME))?;
    let writer = BoxMakeWriter::new(Arc::new(file));

    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(false);

    let stdout_log = tracing_subscriber::fmt::layer().pretty().with_file(false);

    tracing_subscriber::registry()
        .with(
            stdout_log
                .and_then(file_log)
                .with_filter(log_level)
                .with_filter(filter::filter_fn(|metadata| !is_filtered(metadata.target()))),
        )
        .try_init()?;

    Ok(())
}

/// Level set by the `LOG_LEVEL` environment variable, which overrides the one
/// of the configuration file.
pub fn parse_log_level() -> Result<Option<LevelFilter>, Box<dyn Error>> {
    level_override(std::env::var(LOG_LEVEL_VAR).ok())
}

fn level_override(value: Option<String>) -> Result<Option<LevelFilter>, Box<dyn Error>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(level) => LevelFilter::from_str(level)
            .map(Some)
            .map_err(|e| format!("Invalid {} '{}': {}", LOG_LEVEL_VAR, level, e).into()),
    }
}
