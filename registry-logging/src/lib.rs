//! Tracing subscriber setup for the package registry.
//!
//! Everything is driven by environment variables:
//!
//! | Variable        | Values                         | Default                     |
//! |-----------------|--------------------------------|-----------------------------|
//! | `RUST_LOG`      | `EnvFilter` directives         | value of `LOG_LEVEL`        |
//! | `LOG_LEVEL`     | `trace` ... `error`            | `info`                      |
//! | `LOG_FORMAT`    | `human`, `json`, `compact`     | `human`                     |
//! | `LOG_OUTPUT`    | `console`, `file`, `both`      | `console`                   |
//! | `LOG_FILE_PATH` | path of the daily-rolling file | `/tmp/package-registry.log` |

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::Layer,
    prelude::*,
    registry, EnvFilter, Registry,
};

const DEFAULT_LOG_FILE: &str = "/tmp/package-registry.log";

/// Dependencies capped at `warn` regardless of the configured level.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "tower_http=warn", "notify=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unknown values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("compact") => LogFormat::Compact,
            _ => LogFormat::Human,
        };
        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            _ => LogOutput::Console,
        };

        Self {
            level: lookup("LOG_LEVEL")
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| "info".to_string()),
            format,
            output,
            file_path: lookup("LOG_FILE_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for target in QUIET_TARGETS {
            if let Ok(directive) = target.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }

    fn file_parts(&self) -> (&Path, &Path) {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = self
            .file_path
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("package-registry.log"));
        (dir, name)
    }
}

// --- Custom "Tee" Writer ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write_all(buf);
        let res_b = self.b.write_all(buf);
        res_a.and(res_b).map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: LogFormat, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Human => layer.pretty().boxed(),
    }
}

/// Initializes the global tracing subscriber from the environment.
///
/// The returned guard flushes the log file on drop and must be kept alive for
/// the lifetime of the process. Calling this twice leaves the first subscriber
/// in place.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let (log_dir, log_file) = settings.file_parts();
    let mut guard = None;

    let layer = match settings.output {
        LogOutput::Console => fmt_layer(settings.format, io::stdout),
        LogOutput::File | LogOutput::Both => {
            let appender = tracing_appender::rolling::daily(log_dir, log_file);
            let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);

            if settings.output == LogOutput::Both {
                let tee = MakeTee {
                    make_a: io::stdout,
                    make_b: non_blocking,
                };
                fmt_layer(settings.format, tee)
            } else {
                fmt_layer(settings.format, non_blocking)
            }
        }
    };

    if registry()
        .with(layer)
        .with(settings.env_filter())
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already set");
    }

    guard
}
