use chrono::{DateTime, Utc};

/// A domain event emitted by an aggregate's decision logic.
///
/// Events are facts: once decided they are applied, never edited.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "jobs.ticket.approved").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
