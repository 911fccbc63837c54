use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::router;
use crate::config::{InfraPool, ServerConfig, ServerConfigCli};
use crate::migration::{Migrator, MigratorTrait};
use crate::signal::shutdown_signal;

pub struct RegioServer {
    pub config: ServerConfig,
    pub infra_pool: InfraPool,
    pub cancel_token: CancellationToken,
}

impl RegioServer {
    pub async fn main(cli: ServerConfigCli) {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "netregio=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
        match ServerConfig::new(&cli) {
            Ok(config) => match Self::setup(config).await {
                Ok((server, _guard)) => {
                    if let Err(e) = server.run().await {
                        tracing::error!("{}", e);
                    }
                }
                Err(e) => {
                    tracing::error!("{}", e);
                }
            },
            Err(e) => {
                tracing::error!("{}", e);
            }
        }
    }

    pub async fn setup(
        config: ServerConfig,
    ) -> crate::error::Result<(Self, crate::config::TracingGuard)> {
        tracing::debug!("Server is setting up");
        let guard = config.setup_tracing_subscriber()?;
        let infra_pool = config.build_infra_pool().await?;
        Migrator::up(&infra_pool.db, None).await?;
        let cancel_token = CancellationToken::new();
        Ok((
            Self {
                config,
                infra_pool,
                cancel_token,
            },
            guard,
        ))
    }

    pub async fn run(self) -> crate::error::Result<()> {
        let app = router(self.infra_pool);
        let listener = tokio::net::TcpListener::bind(self.config.bind).await?;
        tracing::info!("Registration server is listening on: {}", self.config.bind);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel_token.clone()))
            .await
        {
            tracing::error!("Server error: {}", e);
        }
        tracing::info!("Server shutdown signal received");
        self.cancel_token.cancel();
        Ok(())
    }
}
