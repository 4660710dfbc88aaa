use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::info;

use super::error::Result;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

pub struct LogParams<'a, P: AsRef<Path>> {
    /// Directory the log file is written to. Falls back to the system temp dir.
    pub dir: Option<P>,
    pub log_name: &'a str,
    pub output_to_console: bool,
}

/// Set up the global tracing subscriber: a non-blocking file layer, plus an
/// `EnvFilter` controlled console layer when requested. Returns the appender
/// guard; dropping it flushes buffered log lines.
#[allow(unused_mut)]
pub fn setup_logging<P: AsRef<Path>>(params: LogParams<P>) -> Result<non_blocking::WorkerGuard> {
    let LogParams {
        dir,
        log_name,
        mut output_to_console,
    } = params;

    let logger_dir = dir
        .map(|d| d.as_ref().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);

    let file_path = logger_dir.join(format!("{}.log", log_name));

    let f = create_file_with_dirs(&file_path)?;

    let (non_blocking, guard) = non_blocking(f);
    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::TRACE);

    let subscriber = Registry::default().with(file_layer);

    #[allow(unused_assignments, unused_mut)]
    let mut show_ansi_color = !output_to_console;

    #[cfg(debug_assertions)]
    {
        output_to_console = true;
        show_ansi_color = true;
    }

    if output_to_console {
        let stdout_layer = fmt::Layer::default()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_ansi(show_ansi_color)
            .with_filter(EnvFilter::from_default_env());

        let subscriber = subscriber.with(stdout_layer);
        tracing::subscriber::set_global_default(subscriber)
            .expect("Unable to set global subscriber");
    } else {
        tracing::subscriber::set_global_default(subscriber)
            .expect("Unable to set global subscriber");
    }

    info!("Logging to file: {:?}", file_path);

    Ok(guard)
}

fn create_file_with_dirs<P: AsRef<Path>>(file_path: P) -> io::Result<File> {
    if let Some(parent) = file_path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    File::options().create(true).append(true).open(file_path)
}

pub fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("props")
}
