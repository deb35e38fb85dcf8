//! Tracing subscriber setup for the mxblast binaries.

use std::{fs::OpenOptions, io, path::Path, sync::Arc};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// A compact ANSI console layer is always installed; when `log_file` is
/// given, a plain-text layer appending to that file is added alongside it.
/// The filter is read from `MXBLAST_LOG` and defaults to `info`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened for appending.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let filter = EnvFilter::try_from_env("MXBLAST_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true),
        )
        .with(file_layer)
        .init();

    Ok(())
}
