//! Queue client over redis streams.
//!
//! A stream plus a consumer group stands in for the broker queue: `XADD`
//! publishes, `XREADGROUP` delivers, `XACK` settles. Requeueing re-adds a
//! copy of the entry before acking the original, so redelivery keeps
//! at-least-once semantics without a dead-letter stage.

use std::collections::HashMap;
use std::future::Future;

use redis::{
    aio::MultiplexedConnection,
    streams::{StreamId, StreamReadOptions, StreamReadReply},
    AsyncCommands,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, RelayError};

pub const DEFAULT_CONSUMER_GROUP: &str = "regio-relay";

const READ_BATCH_SIZE: usize = 16;
const READ_BLOCK_MILLIS: usize = 5000;

// Groups start at the beginning of the stream, not "$": a reply can be
// published between the queue name being handed out and the first read,
// and entries that predate the group would otherwise never be delivered.
const GROUP_START_ID: &str = "0";

/// Delivery metadata attached to a published message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishOptions {
    /// HTTP verb the relay should use, defaults to POST.
    pub method: Option<String>,
    /// Correlation key for the reply. Requires `exchange` and `queue`.
    pub reply_to: Option<String>,
    /// Reply destination exchange.
    pub exchange: Option<String>,
    /// Reply destination queue.
    pub queue: Option<String>,
}

/// Headers carried alongside the message body on the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub method_type: String,
    pub reply_to: Option<String>,
    pub exchange: Option<String>,
    pub queue: Option<String>,
}

impl Default for MessageHeaders {
    fn default() -> Self {
        Self {
            method_type: "POST".to_string(),
            reply_to: None,
            exchange: None,
            queue: None,
        }
    }
}

/// A single message taken off the queue, not yet settled.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub body: String,
    pub headers: MessageHeaders,
}

/// How a handled delivery is settled on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled, remove from the queue.
    Ack,
    /// Transient failure, put a copy back for redelivery.
    Requeue,
    /// Permanent failure, remove without redelivery.
    Drop,
}

pub(crate) fn stream_key(exchange: &str, queue: &str) -> String {
    if exchange.is_empty() {
        queue.to_string()
    } else {
        format!("{exchange}:{queue}")
    }
}

/// Validates publish options into the header set carried on the stream.
/// A reply target needs both a destination exchange and queue.
pub(crate) fn build_headers(opts: Option<&PublishOptions>) -> crate::error::Result<MessageHeaders> {
    let Some(opts) = opts else {
        return Ok(MessageHeaders::default());
    };
    if opts.reply_to.is_some() && (opts.exchange.is_none() || opts.queue.is_none()) {
        return Err(Error::InvalidArgument(
            "reply target requires both 'exchange' and 'queue'".to_string(),
        ));
    }
    Ok(MessageHeaders {
        method_type: opts.method.clone().unwrap_or_else(|| "POST".to_string()),
        reply_to: opts.reply_to.clone(),
        exchange: opts.exchange.clone(),
        queue: opts.queue.clone(),
    })
}

fn field_str(map: &HashMap<String, redis::Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| redis::from_redis_value::<String>(v).ok())
}

impl Delivery {
    fn from_entry(entry: &StreamId) -> Self {
        Self {
            id: entry.id.clone(),
            body: field_str(&entry.map, "body").unwrap_or_default(),
            headers: MessageHeaders {
                method_type: field_str(&entry.map, "method_type")
                    .unwrap_or_else(|| "POST".to_string()),
                reply_to: field_str(&entry.map, "reply_to"),
                exchange: field_str(&entry.map, "exchange"),
                queue: field_str(&entry.map, "queue"),
            },
        }
    }
}

/// Client bound to one exchange/queue pair. A connection is acquired per
/// operation and connect failures propagate as `Error::BrokerError` instead
/// of being absorbed, so callers can tell a dead broker from a clean run.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    client: redis::Client,
    exchange: String,
    queue: String,
    group: String,
    consumer: String,
}

impl BrokerClient {
    pub fn new(redis_url: &str, exchange: &str, queue: &str) -> crate::error::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            group: DEFAULT_CONSUMER_GROUP.to_string(),
            consumer: Uuid::new_v4().to_string(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn connect(&self) -> crate::error::Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Publishes a message to the client's own exchange/queue. No delivery
    /// confirmation beyond the broker accepting the entry.
    pub async fn publish(
        &self,
        body: &str,
        opts: Option<PublishOptions>,
    ) -> crate::error::Result<()> {
        let headers = build_headers(opts.as_ref())?;
        let mut conn = self.connect().await?;
        let key = stream_key(&self.exchange, &self.queue);
        self.publish_raw(&mut conn, &key, body, &headers).await
    }

    /// Publishes a bare message to another destination, used for replies.
    pub(crate) async fn publish_to(
        &self,
        exchange: &str,
        queue: &str,
        body: &str,
    ) -> crate::error::Result<()> {
        let mut conn = self.connect().await?;
        let key = stream_key(exchange, queue);
        self.publish_raw(&mut conn, &key, body, &MessageHeaders::default())
            .await
    }

    async fn publish_raw(
        &self,
        conn: &mut MultiplexedConnection,
        key: &str,
        body: &str,
        headers: &MessageHeaders,
    ) -> crate::error::Result<()> {
        let mut items: Vec<(&str, String)> = vec![
            ("body", body.to_string()),
            ("method_type", headers.method_type.clone()),
        ];
        if let Some(reply_to) = &headers.reply_to {
            items.push(("reply_to", reply_to.clone()));
        }
        if let Some(exchange) = &headers.exchange {
            items.push(("exchange", exchange.clone()));
        }
        if let Some(queue) = &headers.queue {
            items.push(("queue", queue.clone()));
        }
        let id: String = conn.xadd(key, "*", &items).await?;
        tracing::debug!("Published message {} to {}", id, key);
        Ok(())
    }

    pub(crate) async fn ensure_group(
        &self,
        conn: &mut MultiplexedConnection,
        key: &str,
    ) -> crate::error::Result<()> {
        let created: std::result::Result<String, redis::RedisError> = conn
            .xgroup_create_mkstream(key, &self.group, GROUP_START_ID)
            .await;
        if let Err(e) = created {
            // The group surviving a previous run is fine
            if e.code() != Some("BUSYGROUP") {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Long-lived receive loop over the client's queue. Each delivery is
    /// passed to `handler` and settled by the returned disposition. Runs
    /// until the process is stopped or the broker connection fails.
    pub async fn consume<F, Fut>(&self, mut handler: F) -> crate::error::Result<()>
    where
        F: FnMut(Delivery) -> Fut,
        Fut: Future<Output = Disposition>,
    {
        let mut conn = self.connect().await?;
        let key = stream_key(&self.exchange, &self.queue);
        self.ensure_group(&mut conn, &key).await?;
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(READ_BATCH_SIZE)
            .block(READ_BLOCK_MILLIS);
        tracing::info!("Consuming from {} as {}", key, self.consumer);
        loop {
            let reply: StreamReadReply = conn.xread_options(&[&key], &[">"], &opts).await?;
            for stream in &reply.keys {
                for entry in &stream.ids {
                    let delivery = Delivery::from_entry(entry);
                    let id = delivery.id.clone();
                    let requeue_body = delivery.body.clone();
                    let requeue_headers = delivery.headers.clone();
                    let disposition = handler(delivery).await;
                    if disposition == Disposition::Requeue {
                        self.publish_raw(&mut conn, &key, &requeue_body, &requeue_headers)
                            .await?;
                    }
                    let _: i64 = conn.xack(&key, &self.group, &[&id]).await?;
                    tracing::debug!("Settled delivery {} as {:?}", id, disposition);
                }
            }
        }
    }
}

/// Waits for a single correlated reply on an anonymous queue. The reply
/// stream gets a short expiry so abandoned waiters clean up after
/// themselves, mirroring an exclusive auto-deleting queue.
pub struct ResponseClient {
    broker: BrokerClient,
    /// Last-seen reply payload, if any.
    pub response: Option<serde_json::Value>,
}

const REPLY_STREAM_TTL_SECS: i64 = 300;

impl ResponseClient {
    /// Declares the reply queue up front, before its name is handed to any
    /// producer, so a reply published ahead of the first `poll` is kept.
    pub async fn new(redis_url: &str, exchange: &str) -> crate::error::Result<Self> {
        let queue = format!("reply:{}", Uuid::new_v4());
        let broker = BrokerClient::new(redis_url, exchange, &queue)?;
        let mut conn = broker.connect().await?;
        let key = stream_key(&broker.exchange, &broker.queue);
        broker.ensure_group(&mut conn, &key).await?;
        let _: bool = conn.expire(&key, REPLY_STREAM_TTL_SECS).await?;
        Ok(Self {
            broker,
            response: None,
        })
    }

    /// Name of the anonymous reply queue, to be handed to the producer.
    pub fn queue(&self) -> &str {
        self.broker.queue()
    }

    /// One bounded read attempt: waits up to the blocking window for a
    /// reply, parses its `response` field and retains the result as the
    /// last-seen response. Returns `Ok(None)` if nothing arrived in time;
    /// call again to keep waiting.
    pub async fn poll(&mut self) -> crate::error::Result<Option<serde_json::Value>> {
        let mut conn = self.broker.connect().await?;
        let key = stream_key(&self.broker.exchange, &self.broker.queue);
        let opts = StreamReadOptions::default()
            .group(&self.broker.group, &self.broker.consumer)
            .count(1)
            .block(READ_BLOCK_MILLIS);
        let reply: StreamReadReply = conn.xread_options(&[&key], &[">"], &opts).await?;
        for stream in &reply.keys {
            for entry in &stream.ids {
                let delivery = Delivery::from_entry(entry);
                // Settle before parsing: a malformed reply is dropped, not
                // left stranded in the pending-entries list
                let _: i64 = conn.xack(&key, &self.broker.group, &[&delivery.id]).await?;
                self.response = parse_response(&delivery.body)
                    .map_err(|e| Error::Custom(format!("bad reply payload: {e}")))?;
            }
        }
        Ok(self.response.clone())
    }
}

/// Extracts the `response` field from a reply envelope.
pub(crate) fn parse_response(
    body: &str,
) -> std::result::Result<Option<serde_json::Value>, RelayError> {
    let raw: serde_json::Value = serde_json::from_str(body)?;
    Ok(raw.get("response").cloned().filter(|v| !v.is_null()))
}
