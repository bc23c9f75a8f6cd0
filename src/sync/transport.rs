//! Broadcast transports carrying encoded sync events between instruments.

use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Default capacity of the in-process broadcast channel
pub const LOCAL_CHANNEL_CAPACITY: usize = 256;

/// A named broadcast channel shared by every instrument.
///
/// Every subscriber receives every published message, the publisher's own subscription
/// included. Delivery order is FIFO per publisher; there is no delivery confirmation.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Queue `payload` for broadcast without waiting for delivery
    fn publish(&self, payload: Bytes);

    /// Open a new subscription; messages published after this call are delivered to it
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Bytes>>;
}

/// In-process transport built on a tokio broadcast channel
#[derive(Clone)]
pub struct LocalTransport {
    sender: broadcast::Sender<Bytes>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::with_capacity(LOCAL_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncTransport for LocalTransport {
    fn publish(&self, payload: Bytes) {
        // No subscribers yet is not an error for a broadcast bus
        let _ = self.sender.send(payload);
        metrics::counter!("flightplan.sync.published_total").increment(1);
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        let mut receiver = self.sender.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Sync subscriber lagged, {} messages lost", skipped);
                        metrics::counter!("flightplan.sync.lagged_total").increment(skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}

/// Where a publishing task hands each payload
#[async_trait]
trait PublishSink: Send + Sync + 'static {
    async fn send(&self, subject: &str, payload: Bytes) -> Result<()>;
}

#[async_trait]
impl PublishSink for Client {
    async fn send(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.publish(subject.to_string(), payload).await?;
        Ok(())
    }
}

/// Drain `outbound` into `sink` one payload at a time, keeping publish order
async fn publisher_task(
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    sink: impl PublishSink,
    subject: String,
) {
    info!("Starting sync publisher on {}", subject);
    while let Some(payload) = outbound.recv().await {
        let start = std::time::Instant::now();
        match sink.send(&subject, payload).await {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as f64;
                metrics::histogram!("flightplan.sync.publish_duration_ms").record(duration_ms);
                metrics::counter!("flightplan.sync.published_total").increment(1);
            }
            Err(e) => {
                error!("Failed to publish sync event to {}: {:#}", subject, e);
                metrics::counter!("flightplan.sync.publish_error_total").increment(1);
            }
        }
    }
    info!("Sync publisher on {} shutting down", subject);
}

fn spawn_publisher(sink: impl PublishSink, subject: String) -> mpsc::UnboundedSender<Bytes> {
    let (outbound, rx) = mpsc::unbounded_channel();
    tokio::spawn(publisher_task(rx, sink, subject));
    outbound
}

/// Transport over a plain NATS subject (no JetStream)
#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
    subject: String,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl NatsTransport {
    /// Bind `client` to `subject` and start its publishing task; needs a tokio runtime
    pub fn new(client: Client, subject: String) -> Self {
        let outbound = spawn_publisher(client.clone(), subject.clone());
        Self {
            client,
            subject,
            outbound,
        }
    }

    /// Connect to `nats_url` and bind to `subject`
    pub async fn connect(nats_url: &str, subject: &str, client_name: &str) -> Result<Self> {
        info!("Connecting to NATS server at {}", nats_url);
        let client = async_nats::ConnectOptions::new()
            .name(client_name)
            .connect(nats_url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {nats_url}"))?;

        Ok(Self::new(client, subject.to_string()))
    }
}

#[async_trait]
impl SyncTransport for NatsTransport {
    /// Fire and forget, no ack. A single task publishes, so order is kept.
    fn publish(&self, payload: Bytes) {
        if self.outbound.send(payload).is_err() {
            error!("Sync publisher for {} has stopped, dropping event", self.subject);
            metrics::counter!("flightplan.sync.publish_error_total").increment(1);
        }
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        let mut subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.subject))?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if tx.send(message.payload).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
