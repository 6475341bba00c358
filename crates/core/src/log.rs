//! Logging setup shared by the gateway and reconciler binaries.
//!
//! Structured after `axon`'s `LogConfig`/`LogDriver` pair, but populated
//! directly from CLI flags rather than a YAML config file: these are
//! daemons with no on-disk configuration, not interactive CLIs.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::{
    Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// Where and at what level to emit logs.
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub file_path: Option<PathBuf>,
    pub emit_journald: bool,
    pub emit_stdout: bool,
    pub emit_stderr: bool,
    pub level: tracing::Level,
}

impl Default for LogConfig {
    /// Unlike `axon`, which defaults to journald-plus-stdout for a
    /// developer's desktop session, these components typically run as
    /// container processes, so only stdout is on by default.
    fn default() -> Self {
        Self {
            file_path: None,
            emit_journald: false,
            emit_stdout: true,
            emit_stderr: false,
            level: tracing::Level::INFO,
        }
    }
}

impl LogConfig {
    /// Initializes the global `tracing` subscriber from this configuration.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been installed.
    pub fn registry(&self) {
        let Self { emit_journald, file_path, emit_stdout, emit_stderr, level } = self;

        let filter_layer = tracing_subscriber::filter::LevelFilter::from_level(*level);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(emit_journald.then(|| LogDriver::Journald.layer()))
            .with(file_path.clone().map(|path| LogDriver::File(path).layer()))
            .with(emit_stdout.then(|| LogDriver::Stdout.layer()))
            .with(emit_stderr.then(|| LogDriver::Stderr.layer()))
            .init();
    }
}

#[derive(Clone, Debug)]
enum LogDriver {
    Stdout,
    Stderr,
    Journald,
    File(PathBuf),
}

impl LogDriver {
    #[allow(clippy::type_repetition_in_bounds)]
    fn layer<S>(self) -> Option<Box<dyn Layer<S> + Send + Sync + 'static>>
    where
        S: tracing::Subscriber,
        for<'a> S: LookupSpan<'a>,
    {
        let fmt = tracing_subscriber::fmt::layer().with_thread_ids(true).with_thread_names(true);

        match self {
            Self::Stdout => Some(Box::new(fmt.with_writer(std::io::stdout))),
            Self::Stderr => Some(Box::new(fmt.with_writer(std::io::stderr))),
            Self::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path).ok()?;
                Some(Box::new(fmt.with_writer(file)))
            }
            Self::Journald => Some(Box::new(tracing_journald::layer().ok()?)),
        }
    }
}
