//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ara_delivery_engine::delivery::{Channel, RetryPolicy};
use ara_delivery_engine::dispatch::{DeliveryEngine, DispatchConfig};
use ara_delivery_engine::ledger::{DedupLedger, MemoryDedupLedger};
use ara_delivery_engine::queue::{DeliveryQueue, MemoryDeliveryQueue, QueueConfig};
use ara_delivery_engine::sender::{ChannelSender, SendError, SendReceipt, SenderRegistry};
use ara_delivery_engine::template::{RenderedDocument, TemplateStore};

/// A document handed to the fake sender
#[derive(Debug, Clone)]
pub struct SentDocument {
    pub recipient: String,
    pub subject: String,
    pub mime_type: String,
    pub reply_to: Option<String>,
    pub cc: Option<String>,
    pub file_name: Option<String>,
}

/// Email sender double: replays scripted failures, then accepts everything
#[derive(Default)]
pub struct FakeSender {
    script: Mutex<Vec<SendError>>,
    sent: Mutex<Vec<SentDocument>>,
    attempts: Mutex<usize>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

/// Counts a send as in flight until dropped, including when abandoned
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next sends with `failures`, in order
    pub fn failing(failures: Vec<SendError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(failures),
            ..Default::default()
        })
    }

    /// Accept every send after `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<SentDocument> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Most sends that were ever in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for FakeSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        recipient: &str,
        document: &RenderedDocument,
    ) -> Result<SendReceipt, SendError> {
        *self.attempts.lock().unwrap() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(self.in_flight.clone());
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };
        if let Some(err) = failure {
            return Err(err);
        }

        self.sent.lock().unwrap().push(SentDocument {
            recipient: recipient.to_string(),
            subject: document.subject.clone(),
            mime_type: document.mime_type.clone(),
            reply_to: document.reply_to.clone(),
            cc: document.cc.clone(),
            file_name: document.file_name.clone(),
        });
        Ok(SendReceipt::new(Channel::Email, Some("250 OK".to_string())))
    }
}

/// Retry policy with millisecond backoff and no jitter
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

pub struct TestEnvironment {
    pub queue: Arc<MemoryDeliveryQueue>,
    pub ledger: Arc<MemoryDedupLedger>,
    pub sender: Arc<FakeSender>,
    pub engine: Arc<DeliveryEngine>,
}

/// Engine over in-memory stores, built-in templates and `sender`
pub fn create_test_environment(
    sender: Arc<FakeSender>,
    max_attempts: u32,
    lease_timeout: Duration,
) -> TestEnvironment {
    create_test_environment_with_send_timeout(
        sender,
        max_attempts,
        lease_timeout,
        Duration::from_secs(2),
    )
}

/// Same as `create_test_environment` with an explicit `send_timeout`
pub fn create_test_environment_with_send_timeout(
    sender: Arc<FakeSender>,
    max_attempts: u32,
    lease_timeout: Duration,
    send_timeout: Duration,
) -> TestEnvironment {
    let queue = Arc::new(MemoryDeliveryQueue::new(QueueConfig {
        retry: fast_retry(max_attempts),
        lease_timeout,
    }));
    let ledger = Arc::new(MemoryDedupLedger::new());

    let engine = Arc::new(DeliveryEngine::new(
        queue.clone() as Arc<dyn DeliveryQueue>,
        ledger.clone() as Arc<dyn DedupLedger>,
        Arc::new(TemplateStore::with_builtin()),
        SenderRegistry::new().with(sender.clone()),
        DispatchConfig {
            worker_count: 4,
            batch_size: 8,
            poll_interval: Duration::from_millis(5),
            send_timeout,
            reservation_ttl: lease_timeout,
            in_flight_delay: Duration::from_millis(2),
        },
    ));

    TestEnvironment {
        queue,
        ledger,
        sender,
        engine,
    }
}
