pub mod logging {
    //! Process-wide `tracing` subscriber for the console.
    //!
    //! Every event the client emits uses a `linedesk::<area>` target, so the
    //! default filter only has to raise that one prefix. Dependencies stay at
    //! `warn` when the console runs at debug or trace, unless
    //! `LINEDESK_TRACE_DEPS` is set. `LINEDESK_LOG_FILTER` replaces the whole
    //! filter with an `EnvFilter` directive string.

    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    const OWN_TARGET: &str = "linedesk";

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn as_str(self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Warn => "warn",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Installs the global subscriber. Later calls are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let filter = match std::env::var("LINEDESK_LOG_FILTER") {
            Ok(custom) if !custom.trim().is_empty() => custom,
            _ => directives(config.level, env_flag("LINEDESK_TRACE_DEPS")),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;
        let _ = GUARD.set(guard);
        Ok(())
    }

    /// Filter directives for `level`. Below debug the level applies to every
    /// crate; at debug and trace only the client's own target is raised.
    pub(crate) fn directives(level: LogLevel, dependency_traces: bool) -> String {
        if level < LogLevel::Debug || dependency_traces {
            return level.as_str().to_string();
        }
        format!("warn,{OWN_TARGET}={}", level.as_str())
    }

    fn env_flag(var: &str) -> bool {
        std::env::var(var).is_ok_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

}
