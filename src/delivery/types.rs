use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Channel a delivery is transmitted through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email through the configured mail transport
    #[default]
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to render a template and deliver it to one recipient.
///
/// Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Unique request ID
    pub id: Uuid,
    /// Channel to deliver through
    pub channel: Channel,
    /// Channel-specific recipient address
    pub recipient: String,
    /// Template to render
    pub template_id: String,
    /// Data made available to the template
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Higher values are leased first
    #[serde(default)]
    pub priority: i32,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// Logical identity of the delivery intent
    pub dedup_key: String,
}

impl DeliveryRequest {
    /// Start building a request
    pub fn builder(
        channel: Channel,
        recipient: impl Into<String>,
        template_id: impl Into<String>,
    ) -> DeliveryRequestBuilder {
        DeliveryRequestBuilder::new(channel, recipient, template_id)
    }

    /// Same request with a fresh identity, used when re-driving a dead letter
    pub fn resubmission(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Builder for `DeliveryRequest`
#[derive(Debug, Clone)]
pub struct DeliveryRequestBuilder {
    channel: Channel,
    recipient: String,
    template_id: String,
    context: Map<String, Value>,
    priority: i32,
    dedup_key: Option<String>,
}

impl DeliveryRequestBuilder {
    pub fn new(
        channel: Channel,
        recipient: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            template_id: template_id.into(),
            context: Map::new(),
            priority: 0,
            dedup_key: None,
        }
    }

    /// Replace the whole template context
    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Set a single context variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Build the request. Without an explicit dedup key the request ID is used,
    /// which disables deduplication for this request.
    pub fn build(self) -> DeliveryRequest {
        let id = Uuid::new_v4();
        DeliveryRequest {
            id,
            channel: self.channel,
            recipient: self.recipient,
            template_id: self.template_id,
            context: self.context,
            priority: self.priority,
            created_at: Utc::now(),
            dedup_key: self.dedup_key.unwrap_or_else(|| id.to_string()),
        }
    }
}

/// Whether retrying a failed operation can help
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retry may succeed (network blip, rate limit, timeout)
    Transient,
    /// Retrying cannot help (invalid recipient, unknown template)
    Permanent,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
        }
    }
}

/// Classified failure recorded on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

/// Lifecycle state of a job held by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for `next_attempt_at`
    Pending,
    /// Claimed by a worker until the lease expires
    Leased,
    /// Terminal failure, requires operator intervention
    DeadLettered,
}

/// Exclusive claim a worker holds on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Unique per lease; must be presented on ack/retry/release
    pub lease_id: Uuid,
    pub worker_id: usize,
    pub leased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A request together with its retry and lease bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub request: DeliveryRequest,
    pub state: JobState,
    /// Failed attempts counted toward `max_attempts`
    pub attempt: u32,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseInfo>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    /// Wrap a freshly enqueued request; the job ID is the request ID
    pub fn new(request: DeliveryRequest) -> Self {
        let now = Utc::now();
        Self {
            next_attempt_at: request.created_at.min(now),
            request,
            state: JobState::Pending,
            attempt: 0,
            last_error: None,
            lease: None,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.request.id
    }

    pub fn dedup_key(&self) -> &str {
        &self.request.dedup_key
    }

    /// Whether a worker may lease this job at `now`
    pub fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => self.next_attempt_at <= now,
            JobState::Leased => self.lease.as_ref().map_or(true, |l| l.is_expired(now)),
            JobState::DeadLettered => false,
        }
    }

    /// Whether the job is currently leased under `lease_id`
    pub fn is_leased_by(&self, lease_id: Uuid) -> bool {
        self.state == JobState::Leased
            && self.lease.as_ref().is_some_and(|l| l.lease_id == lease_id)
    }

    /// Lease ID of the current lease, if any
    pub fn lease_id(&self) -> Option<Uuid> {
        self.lease.as_ref().map(|l| l.lease_id)
    }
}

/// How a leased job was completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDisposition {
    /// The sender accepted the document
    Delivered,
    /// The dedup key was already delivered; nothing was sent
    AlreadyDelivered,
}

/// Externally visible status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Delivered,
    AlreadyDelivered,
    DeadLettered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending | DeliveryStatus::InFlight)
    }
}

impl From<AckDisposition> for DeliveryStatus {
    fn from(disposition: AckDisposition) -> Self {
        match disposition {
            AckDisposition::Delivered => DeliveryStatus::Delivered,
            AckDisposition::AlreadyDelivered => DeliveryStatus::AlreadyDelivered,
        }
    }
}

/// Status snapshot handed back to callers and emitted on terminal states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub job_id: Uuid,
    pub dedup_key: String,
    pub state: DeliveryStatus,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInfo>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryResult {
    /// Snapshot of a job still owned by the queue
    pub fn from_job(job: &DeliveryJob) -> Self {
        let state = match job.state {
            JobState::Pending => DeliveryStatus::Pending,
            JobState::Leased => DeliveryStatus::InFlight,
            JobState::DeadLettered => DeliveryStatus::DeadLettered,
        };
        Self::with_state(job, state)
    }

    /// Snapshot of a job with an explicit final state
    pub fn with_state(job: &DeliveryJob, state: DeliveryStatus) -> Self {
        Self {
            job_id: job.id(),
            dedup_key: job.request.dedup_key.clone(),
            state,
            attempt: job.attempt,
            last_error: job.last_error.clone(),
            updated_at: job.updated_at,
        }
    }
}

/// Selection criteria for dead-letter inspection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeadLetterFilter {
    pub channel: Option<Channel>,
    pub template_id: Option<String>,
    pub kind: Option<ErrorKind>,
    pub limit: Option<usize>,
}

impl DeadLetterFilter {
    pub fn matches(&self, job: &DeliveryJob) -> bool {
        if let Some(channel) = self.channel {
            if job.request.channel != channel {
                return false;
            }
        }
        if let Some(ref template_id) = self.template_id {
            if &job.request.template_id != template_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if job.last_error.as_ref().map(|e| e.kind) != Some(kind) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_request() -> DeliveryRequest {
        DeliveryRequest::builder(Channel::Email, "a@x.com", "welcome")
            .var("name", "Ana")
            .priority(5)
            .dedup_key("k1")
            .build()
    }

    #[test]
    fn test_builder_defaults_dedup_key_to_id() {
        let request = DeliveryRequest::builder(Channel::Email, "a@x.com", "welcome").build();
        assert_eq!(request.dedup_key, request.id.to_string());
        assert_eq!(request.priority, 0);
        assert!(request.context.is_empty());
    }

    #[test]
    fn test_builder_sets_fields() {
        let request = sample_request();
        assert_eq!(request.dedup_key, "k1");
        assert_eq!(request.priority, 5);
        assert_eq!(request.context["name"], "Ana");
    }

    #[test]
    fn test_resubmission_gets_new_identity() {
        let request = sample_request();
        let again = request.resubmission();
        assert_ne!(again.id, request.id);
        assert_eq!(again.dedup_key, request.dedup_key);
        assert_eq!(again.recipient, request.recipient);
    }

    #[test]
    fn test_new_job_is_leasable_immediately() {
        let job = DeliveryJob::new(sample_request());
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempt, 0);
        assert!(job.is_leasable(Utc::now()));
    }

    #[test]
    fn test_leased_job_leasable_only_after_expiry() {
        let mut job = DeliveryJob::new(sample_request());
        let now = Utc::now();
        job.state = JobState::Leased;
        job.lease = Some(LeaseInfo {
            lease_id: Uuid::new_v4(),
            worker_id: 0,
            leased_at: now,
            expires_at: now + Duration::seconds(30),
        });

        assert!(!job.is_leasable(now));
        assert!(job.is_leasable(now + Duration::seconds(31)));
    }

    #[test]
    fn test_dead_lettered_never_leasable() {
        let mut job = DeliveryJob::new(sample_request());
        job.state = JobState::DeadLettered;
        assert!(!job.is_leasable(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InFlight.is_terminal());
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::AlreadyDelivered.is_terminal());
        assert!(DeliveryStatus::DeadLettered.is_terminal());
        assert!(DeliveryStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_dead_letter_filter() {
        let mut job = DeliveryJob::new(sample_request());
        job.last_error = Some(ErrorInfo::permanent("bad address"));

        assert!(DeadLetterFilter::default().matches(&job));
        assert!(DeadLetterFilter {
            kind: Some(ErrorKind::Permanent),
            template_id: Some("welcome".to_string()),
            ..Default::default()
        }
        .matches(&job));
        assert!(!DeadLetterFilter {
            kind: Some(ErrorKind::Transient),
            ..Default::default()
        }
        .matches(&job));
        assert!(!DeadLetterFilter {
            template_id: Some("invoice".to_string()),
            ..Default::default()
        }
        .matches(&job));
    }

    #[test]
    fn test_result_serialization_uses_snake_case() {
        let job = DeliveryJob::new(sample_request());
        let result = DeliveryResult::with_state(&job, DeliveryStatus::AlreadyDelivered);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["state"], "already_delivered");
        assert!(json.get("last_error").is_none());
    }
}
