pub mod relay;
pub mod server;

pub use relay::{RelayConfig, RelayConfigCli};
pub use server::{InfraPool, ServerConfig, ServerConfigCli};

use figment::value::magic::RelativePathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::error::Error;

pub struct TracingGuard {
    pub subscriber_guard: Option<tracing::subscriber::DefaultGuard>,
    pub file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Installs the component's tracing subscriber, optionally duplicating
/// output to a rolling file. The returned guard must be held for the
/// lifetime of the component.
pub(crate) fn setup_tracing_subscriber(
    log_path: Option<&RelativePathBuf>,
    file_log: bool,
    component: &str,
) -> crate::error::Result<TracingGuard> {
    if file_log {
        let file_logger = log_path
            .and_then(|p| {
                let path = p.relative();
                let dir = path.parent();
                let file_name = path.file_name();
                match (dir, file_name) {
                    (Some(dir), Some(file_name)) => {
                        Some(tracing_appender::rolling::never(dir, file_name))
                    }
                    _ => None,
                }
            })
            .or_else(|| {
                dirs::cache_dir()
                    .map(|mut p| {
                        p.push("regio");
                        p.push(component);
                        p
                    })
                    .map(|dir| tracing_appender::rolling::daily(dir, format!("{component}.log")))
            })
            .ok_or(Error::InvalidConfig(figment::Error::from(
                "log path not valid and cache directory not found",
            )))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_logger);
        let env_filter = tracing_subscriber::EnvFilter::try_from_env("REGIO_FILE_LOG")
            .unwrap_or_else(|_| "netregio=info".into());
        let subscriber_guard = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer().with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "netregio=info".into()),
                ),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_filter(env_filter),
            )
            .set_default();
        Ok(TracingGuard {
            subscriber_guard: Some(subscriber_guard),
            file_guard: Some(guard),
        })
    } else {
        let subscriber_guard = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer().with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "netregio=info".into()),
                ),
            )
            .set_default();
        Ok(TracingGuard {
            subscriber_guard: Some(subscriber_guard),
            file_guard: None,
        })
    }
}
