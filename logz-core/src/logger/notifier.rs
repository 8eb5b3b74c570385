//! Fire-and-forget relays of entries to external systems.
//!
//! A [`QueuedNotifier`] owns a bounded queue and a worker thread, so the
//! logging call path only pays for a `try_send`. A full queue drops the new
//! entry; every drop and every failed delivery is counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::entry::Entry;
use super::error::{ConfigError, NotifyError};
use super::formatter::{LogFormatter, TextFormatter};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Notifier: Send + Sync {
    /// Hands the entry off. Must not block on the remote target.
    fn notify(&self, entry: &Entry);

    /// Waits up to `timeout` for queued entries to be delivered.
    fn flush(&self, _timeout: Duration) {}
}

/// One delivery destination.
#[async_trait]
pub trait Target: Send + Sync {
    fn describe(&self) -> String;

    async fn deliver(&self, entry: &Entry) -> Result<(), NotifyError>;
}

/// POSTs the entry as JSON to an external URL.
pub struct HttpTarget {
    url: String,
    client: reqwest::Client,
}

impl HttpTarget {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            url: url.into(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Target for HttpTarget {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn deliver(&self, entry: &Entry) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .json(entry)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Chat-style webhook: the entry is rendered as plain text in a `content` field.
pub struct WebhookTarget {
    url: String,
    client: reqwest::Client,
    formatter: TextFormatter,
}

impl WebhookTarget {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            url: url.into(),
            client: http_client()?,
            formatter: TextFormatter::plain(),
        })
    }
}

#[async_trait]
impl Target for WebhookTarget {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn deliver(&self, entry: &Entry) -> Result<(), NotifyError> {
        let content = self.formatter.format(entry)?;
        self.client
            .post(&self.url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Pushes newline-delimited JSON frames to a `tcp://host:port` queue endpoint.
pub struct QueueTarget {
    endpoint: String,
    addr: String,
}

impl QueueTarget {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        let endpoint = endpoint.into();
        let addr = parse_tcp_endpoint(&endpoint)
            .ok_or_else(|| NotifyError::InvalidEndpoint(endpoint.clone()))?
            .to_string();
        Ok(Self { endpoint, addr })
    }
}

#[async_trait]
impl Target for QueueTarget {
    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    async fn deliver(&self, entry: &Entry) -> Result<(), NotifyError> {
        let mut frame = serde_json::to_vec(entry)?;
        frame.push(b'\n');
        let push = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(&frame).await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(())
        };
        tokio::time::timeout(DELIVERY_TIMEOUT, push)
            .await
            .map_err(|_| NotifyError::Timeout(self.endpoint.clone()))??;
        Ok(())
    }
}

fn http_client() -> Result<reqwest::Client, NotifyError> {
    Ok(reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build()?)
}

fn parse_tcp_endpoint(endpoint: &str) -> Option<&str> {
    let addr = endpoint.strip_prefix("tcp://")?;
    let (host, port) = addr.rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    Some(addr)
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    pub queued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> NotifierStats {
        NotifierStats {
            queued: self.queued.load(Ordering::Acquire),
            delivered: self.delivered.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

/// Bounded asynchronous dispatch to an ordered list of targets.
pub struct QueuedNotifier {
    name: String,
    tx: Option<mpsc::Sender<Entry>>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedNotifier {
    pub fn spawn(
        name: impl Into<String>,
        targets: Vec<Box<dyn Target>>,
        capacity: usize,
    ) -> Result<Self, NotifyError> {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new()
            .name(format!("logz-notify-{name}"))
            .spawn(move || runtime.block_on(drain(rx, targets, worker_counters)))?;

        Ok(Self {
            name,
            tx: Some(tx),
            counters,
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> NotifierStats {
        self.counters.snapshot()
    }

    /// Closes the queue and waits up to `timeout` for the worker to drain it.
    pub fn shutdown(mut self, timeout: Duration) -> NotifierStats {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let deadline = Instant::now() + timeout;
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
        self.stats()
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, entry: &Entry) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(entry.clone()) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::AcqRel);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::AcqRel);
                tracing::debug!(notifier = %self.name, "notification queue full, entry dropped");
            }
        }
    }

    fn flush(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.stats();
            if stats.delivered + stats.failed >= stats.queued || Instant::now() >= deadline {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for QueuedNotifier {
    fn drop(&mut self) {
        // Closing the sender lets the worker finish whatever is queued.
        self.tx.take();
    }
}

async fn drain(
    mut rx: mpsc::Receiver<Entry>,
    targets: Vec<Box<dyn Target>>,
    counters: Arc<Counters>,
) {
    while let Some(entry) = rx.recv().await {
        let mut ok = true;
        for target in &targets {
            if let Err(error) = target.deliver(&entry).await {
                ok = false;
                tracing::warn!(destination = %target.describe(), %error, "notification delivery failed");
            }
        }
        let counter = if ok {
            &counters.delivered
        } else {
            &counters.failed
        };
        counter.fetch_add(1, Ordering::AcqRel);
    }
}

/// Notifier targets as they appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub external_url: Option<String>,
    pub queue_endpoint: Option<String>,
    pub webhook_url: Option<String>,
    pub queue_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            external_url: None,
            queue_endpoint: None,
            webhook_url: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl NotifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifiers.queue_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, url) in [
            ("notifiers.external_url", non_empty(&self.external_url)),
            ("notifiers.webhook_url", non_empty(&self.webhook_url)),
        ] {
            if let Some(url) = url {
                if !is_http_url(url) {
                    return Err(ConfigError::InvalidValue {
                        field,
                        reason: format!("`{url}` is not an http(s) URL"),
                    });
                }
            }
        }
        if let Some(endpoint) = non_empty(&self.queue_endpoint) {
            if parse_tcp_endpoint(endpoint).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "notifiers.queue_endpoint",
                    reason: format!("`{endpoint}` is not a tcp://host:port endpoint"),
                });
            }
        }
        Ok(())
    }

    /// True when at least one target is configured.
    pub fn is_active(&self) -> bool {
        non_empty(&self.external_url).is_some()
            || non_empty(&self.queue_endpoint).is_some()
            || non_empty(&self.webhook_url).is_some()
    }

    /// Builds the active notifiers: one for the external URL and queue
    /// endpoint, one for the webhook. Inactive groups produce nothing.
    pub fn build(&self) -> Result<Vec<QueuedNotifier>, NotifyError> {
        let mut notifiers = Vec::new();

        let mut external: Vec<Box<dyn Target>> = Vec::new();
        if let Some(url) = non_empty(&self.external_url) {
            external.push(Box::new(HttpTarget::new(url)?));
        }
        if let Some(endpoint) = non_empty(&self.queue_endpoint) {
            external.push(Box::new(QueueTarget::new(endpoint)?));
        }
        if !external.is_empty() {
            notifiers.push(QueuedNotifier::spawn(
                "external",
                external,
                self.queue_capacity,
            )?);
        }

        if let Some(url) = non_empty(&self.webhook_url) {
            notifiers.push(QueuedNotifier::spawn(
                "webhook",
                vec![Box::new(WebhookTarget::new(url)?)],
                self.queue_capacity,
            )?);
        }

        Ok(notifiers)
    }
}
