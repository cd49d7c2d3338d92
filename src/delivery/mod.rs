//! Delivery domain model.
//!
//! Types shared by the queue, the dedup ledger and the dispatch workers:
//! - `DeliveryRequest`: immutable description of one delivery intent
//! - `DeliveryJob`: a request plus its retry/lease bookkeeping
//! - `DeliveryResult`: the externally observable status of a job
//! - `RetryPolicy`: exponential backoff with jitter for transient failures

mod backoff;
mod types;

pub use backoff::RetryPolicy;
pub use types::{
    AckDisposition, Channel, DeadLetterFilter, DeliveryJob, DeliveryRequest,
    DeliveryRequestBuilder, DeliveryResult, DeliveryStatus, ErrorInfo, ErrorKind, JobState,
    LeaseInfo,
};
