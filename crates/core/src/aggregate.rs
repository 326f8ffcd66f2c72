//! Aggregate root contract and shared lifecycle metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{AggregateId, CorrelationId};

/// Aggregate root marker + minimal interface.
///
/// Intentionally small so domain modules can decide how they model state
/// transitions without bringing in any infrastructure concerns.
pub trait AggregateRoot {
    /// Returns the aggregate identifier.
    fn id(&self) -> AggregateId;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Starts at 0 on creation; each mutation advances it by exactly 1 and
    /// the emitted event carries the post-mutation value.
    fn version(&self) -> u64;
}

/// Shared aggregate status lifecycle.
///
/// Transitions are restricted: draft may become active or archived, active
/// may only be archived, archived is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Draft,
    Active,
    Archived,
}

impl AggregateStatus {
    pub fn can_transition_to(self, next: AggregateStatus) -> bool {
        matches!(
            (self, next),
            (AggregateStatus::Draft, AggregateStatus::Active)
                | (AggregateStatus::Draft, AggregateStatus::Archived)
                | (AggregateStatus::Active, AggregateStatus::Archived)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateStatus::Draft => "draft",
            AggregateStatus::Active => "active",
            AggregateStatus::Archived => "archived",
        }
    }
}

impl core::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AggregateStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AggregateStatus::Draft),
            "active" => Ok(AggregateStatus::Active),
            "archived" => Ok(AggregateStatus::Archived),
            other => Err(DomainError::validation(format!(
                "unknown aggregate status: {other}"
            ))),
        }
    }
}

/// Lifecycle metadata every aggregate carries.
///
/// `created_at` is immutable. `published_at` latches on the first
/// draft→active transition and is never cleared afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateMeta {
    pub id: AggregateId,
    pub correlation_id: CorrelationId,
    pub version: u64,
    pub status: AggregateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl AggregateMeta {
    pub fn new(id: AggregateId, correlation_id: CorrelationId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            correlation_id,
            version: 0,
            status: AggregateStatus::Draft,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    /// Advance the version and stamp the mutation time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// Move to a new status, enforcing the shared transition rules.
    pub fn transition_to(
        &mut self,
        next: AggregateStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::rule(format!(
                "cannot transition from {} to {}",
                self.status, next
            )));
        }
        self.status = next;
        if next == AggregateStatus::Active && self.published_at.is_none() {
            self.published_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> AggregateMeta {
        AggregateMeta::new(AggregateId::new(), CorrelationId::new(), Utc::now())
    }

    #[test]
    fn new_meta_starts_as_draft_version_zero() {
        let m = meta();
        assert_eq!(m.version, 0);
        assert_eq!(m.status, AggregateStatus::Draft);
        assert_eq!(m.created_at, m.updated_at);
        assert!(m.published_at.is_none());
    }

    #[test]
    fn touch_advances_version_and_updated_at() {
        let mut m = meta();
        let later = m.created_at + chrono::Duration::seconds(5);
        m.touch(later);
        assert_eq!(m.version, 1);
        assert_eq!(m.updated_at, later);
        assert_eq!(m.created_at + chrono::Duration::seconds(5), m.updated_at);
    }

    #[test]
    fn published_at_latches_on_first_activation() {
        let mut m = meta();
        let t1 = m.created_at + chrono::Duration::seconds(1);
        m.transition_to(AggregateStatus::Active, t1).unwrap();
        assert_eq!(m.published_at, Some(t1));

        let t2 = t1 + chrono::Duration::seconds(1);
        m.transition_to(AggregateStatus::Archived, t2).unwrap();
        assert_eq!(m.published_at, Some(t1));
    }

    #[test]
    fn archived_is_terminal() {
        let mut m = meta();
        m.transition_to(AggregateStatus::Archived, Utc::now()).unwrap();
        let err = m
            .transition_to(AggregateStatus::Active, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn active_cannot_return_to_draft() {
        assert!(!AggregateStatus::Active.can_transition_to(AggregateStatus::Draft));
        assert!(!AggregateStatus::Archived.can_transition_to(AggregateStatus::Draft));
        assert!(AggregateStatus::Active.can_transition_to(AggregateStatus::Archived));
    }
}
