//! Bridges queued message envelopes to downstream HTTP calls.
//!
//! Each delivery names an endpoint and an optional JSON payload; the relay
//! performs the call and, when the message asked for one, publishes a
//! correlated response envelope back onto the broker. Settlement follows
//! the error taxonomy: timeouts requeue, malformed payloads and unexpected
//! failures drop.

use reqwest::{Client, Method};

use crate::broker::{BrokerClient, Delivery, Disposition};
use crate::config::{RelayConfig, RelayConfigCli};
use crate::error::RelayError;
use crate::schema::{MessageEnvelope, ResponseEnvelope};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub struct RegioRelay {
    broker: BrokerClient,
    http_client: Client,
}

impl RegioRelay {
    pub async fn main(cli: RelayConfigCli) {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "netregio=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
        match RelayConfig::new(&cli) {
            Ok(config) => match Self::setup(config) {
                Ok((relay, _guard)) => {
                    if let Err(e) = relay.run().await {
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

    pub fn setup(
        config: RelayConfig,
    ) -> crate::error::Result<(Self, crate::config::TracingGuard)> {
        tracing::debug!("Relay is setting up");
        let guard = config.setup_tracing_subscriber()?;
        let broker = BrokerClient::new(&config.redis_url, &config.exchange, &config.queue)?;
        let http_client = Client::builder().timeout(config.http_timeout).build()?;
        Ok((
            Self {
                broker,
                http_client,
            },
            guard,
        ))
    }

    /// Blocks on the receive loop until the process is stopped or the
    /// broker connection fails.
    pub async fn run(&self) -> crate::error::Result<()> {
        self.broker
            .consume(|delivery| self.handle_relay_message(delivery))
            .await
    }

    /// Default handler for one queued delivery. The downstream status code
    /// never fails the delivery; only transport-level errors do.
    pub async fn handle_relay_message(&self, delivery: Delivery) -> Disposition {
        match self.relay(&delivery).await {
            Ok(status) => {
                tracing::debug!("Relayed delivery {} with status {}", delivery.id, status);
                Disposition::Ack
            }
            Err(e) => {
                let disposition = e.disposition();
                tracing::error!(
                    "Relay of delivery {} failed ({:?}): {}",
                    delivery.id,
                    disposition,
                    e
                );
                disposition
            }
        }
    }

    async fn relay(
        &self,
        delivery: &Delivery,
    ) -> std::result::Result<reqwest::StatusCode, RelayError> {
        let envelope = MessageEnvelope::parse(&delivery.body)?;
        let method = Method::from_bytes(delivery.headers.method_type.as_bytes())
            .map_err(|_| RelayError::InvalidMethod(delivery.headers.method_type.clone()))?;

        let mut request = self.http_client.request(method, envelope.endpoint.clone());
        if let Some(payload) = &envelope.payload {
            request = request.json(payload);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout(e)
            } else {
                RelayError::Unexpected(e.to_string())
            }
        })?;
        let status = response.status();

        if let (Some(_), Some(exchange), Some(queue)) = (
            &delivery.headers.reply_to,
            &delivery.headers.exchange,
            &delivery.headers.queue,
        ) {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| RelayError::Unexpected(e.to_string()))?;
            let data = if bytes.is_empty() {
                None
            } else {
                Some(serde_json::from_slice(&bytes)?)
            };
            let reply = ResponseEnvelope {
                status_code: status.as_u16(),
                data,
            };
            self.broker
                .publish_to(exchange, queue, &serde_json::to_string(&reply)?)
                .await
                .map_err(|e| RelayError::Unexpected(e.to_string()))?;
            tracing::debug!("Published reply for delivery {} to {}", delivery.id, queue);
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RegioRelay;
    use crate::broker::{Delivery, Disposition, MessageHeaders};
    use crate::config::RelayConfig;
    use crate::error::RelayError;

    fn relay_with_timeout(timeout: Duration) -> RegioRelay {
        let config = RelayConfig {
            http_timeout: timeout,
            ..Default::default()
        };
        let (relay, guard) = RegioRelay::setup(config).unwrap();
        // The test asserts on dispositions, not log output
        drop(guard);
        relay
    }

    #[tokio::test]
    async fn test_downstream_timeout_requeues() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and hold them open without ever answering
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let relay = relay_with_timeout(Duration::from_millis(100));
        let delivery = Delivery {
            id: "1-1".to_string(),
            body: format!(r#"{{"endpoint":"http://{addr}/hook"}}"#),
            headers: MessageHeaders::default(),
        };
        assert_eq!(
            relay.handle_relay_message(delivery).await,
            Disposition::Requeue
        );
        silent.abort();
    }

    #[tokio::test]
    async fn test_malformed_body_drops_without_calling_out() {
        let relay = relay_with_timeout(Duration::from_millis(100));
        let delivery = Delivery {
            id: "1-2".to_string(),
            body: "{]".to_string(),
            headers: MessageHeaders::default(),
        };
        assert_eq!(relay.handle_relay_message(delivery).await, Disposition::Drop);
    }

    #[test]
    fn test_permanent_errors_drop() {
        let e = RelayError::MissingEndpoint;
        assert_eq!(e.disposition(), Disposition::Drop);

        let e = RelayError::MalformedPayload(
            serde_json::from_str::<serde_json::Value>("{]").unwrap_err(),
        );
        assert_eq!(e.disposition(), Disposition::Drop);

        let e = RelayError::InvalidMethod("NOT A VERB".to_string());
        assert_eq!(e.disposition(), Disposition::Drop);

        let e = RelayError::Unexpected("connection reset".to_string());
        assert_eq!(e.disposition(), Disposition::Drop);
    }
}
