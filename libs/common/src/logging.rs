//! Logging bootstrap shared by the station services
//!
//! Console output and a daily rolling file both use the bracketed level
//! format: `2026-10-19T08:12:03.114502Z [INFO] message`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{Error, Result};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message fields`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Append-only file writer that switches to a new file when the local date
/// changes or the current file disappears. Files are named
/// `{YYYYMMDD}_{stem}.log`.
///
/// Clones share the same underlying file handle.
#[derive(Clone)]
pub struct DailyRollingWriter {
    stem: Arc<str>,
    dir: Arc<Path>,
    state: Arc<Mutex<RollState>>,
}

struct RollState {
    date: String,
    file: File,
}

impl DailyRollingWriter {
    pub fn new(stem: impl Into<String>, dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let stem: Arc<str> = stem.into().into();
        let dir: Arc<Path> = dir.into().into();
        let date = today();

        fs::create_dir_all(&dir)?;
        let file = open_append(&file_path(&dir, &date, &stem))?;

        Ok(Self {
            stem,
            dir,
            state: Arc::new(Mutex::new(RollState { date, file })),
        })
    }

    /// Path of the file receiving today's records
    pub fn current_path(&self) -> PathBuf {
        file_path(&self.dir, &self.state.lock().date, &self.stem)
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> std::io::Result<T>) -> std::io::Result<T> {
        let mut state = self.state.lock();
        let date = today();
        if state.date != date || !file_path(&self.dir, &state.date, &self.stem).exists() {
            fs::create_dir_all(&self.dir)?;
            state.file = open_append(&file_path(&self.dir, &date, &self.stem))?;
            state.date = date;
        }
        op(&mut state.file)
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.with_file(File::flush)
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}

fn file_path(dir: &Path, date: &str, stem: &str) -> PathBuf {
    dir.join(format!("{}_{}.log", date, stem))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, also the file stem (e.g., "hmisrv")
    pub service_name: String,
    /// Directory receiving the daily log files
    pub log_dir: PathBuf,
    /// Default filter directive when `RUST_LOG` is unset (e.g., "info")
    pub level: String,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: std::env::var("STATION_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Keeps the non-blocking file appender alive; drop flushes pending records.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber: console + daily rolling file.
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let writer = DailyRollingWriter::new(config.service_name.clone(), config.log_dir.clone())?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let filter = match std::env::var("RUST_LOG") {
        Ok(directive) => EnvFilter::new(directive),
        Err(_) => EnvFilter::new(format!(
            "{},{}={}",
            config.level,
            config.service_name.replace('-', "_"),
            config.level
        )),
    };

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(BracketedLevelFormat)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_daily_writer_names_file_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DailyRollingWriter::new("commands", dir.path()).unwrap();

        let name = writer
            .current_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert_eq!(name, format!("{}_commands.log", today()));
    }

    #[test]
    fn test_daily_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DailyRollingWriter::new("commands", dir.path()).unwrap();
        writer.write_all(b"first\n").unwrap();

        let mut clone = writer.clone();
        clone.write_all(b"second\n").unwrap();
        clone.flush().unwrap();

        let content = fs::read_to_string(writer.current_path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_daily_writer_recreates_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DailyRollingWriter::new("commands", dir.path()).unwrap();
        fs::remove_file(writer.current_path()).unwrap();

        writer.write_all(b"after delete\n").unwrap();
        writer.flush().unwrap();

        let content = fs::read_to_string(writer.current_path()).unwrap();
        assert_eq!(content, "after delete\n");
    }

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::WARN), "[WARN]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }
}
