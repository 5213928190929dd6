use anyhow::Result;
use embedfn_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
/// Output goes to stderr, or to a daily rolling file when `logging.directory`
/// is set. Keep the guard alive until exit or buffered lines are lost.
pub fn init_tracing(config: &LoggingConfig) -> Result<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let (writer, guard) = match &config.directory {
        Some(directory) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            directory,
            "embedfn.log",
        )),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_ansi(config.directory.is_none())
                .with_writer(writer),
        )
        .try_init()?;

    Ok(guard)
}
