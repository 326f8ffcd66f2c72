//! Aggregate root: Schedule.
//!
//! A schedule owns an ordered tree of child entries. Paired entries span a
//! start and an end date; single entries fire at one instant. Entries move
//! pending → active → completed, or to cancelled from any non-terminal
//! state; completed and cancelled are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merchkit_core::{
    AggregateId, AggregateMeta, AggregateRoot, AggregateStatus, CorrelationId, DomainError, Entity,
};
use merchkit_events::{EventName, PendingEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleEntryStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl ScheduleEntryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScheduleEntryStatus::Completed | ScheduleEntryStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleEntryStatus::Pending => "pending",
            ScheduleEntryStatus::Active => "active",
            ScheduleEntryStatus::Completed => "completed",
            ScheduleEntryStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for ScheduleEntryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The time window an entry owns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleWindow {
    Single {
        starts_at: DateTime<Utc>,
    },
    Paired {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub entry_id: AggregateId,
    pub label: String,
    pub window: ScheduleWindow,
    pub status: ScheduleEntryStatus,
}

impl Entity for ScheduleEntry {
    type Id = AggregateId;

    fn id(&self) -> &AggregateId {
        &self.entry_id
    }
}

/// Full serialisable schedule state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    #[serde(flatten)]
    pub meta: AggregateMeta,
    pub name: String,
    pub entries: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    meta: AggregateMeta,
    name: String,
    entries: Vec<ScheduleEntry>,
    uncommitted: Vec<PendingEvent<ScheduleState>>,
}

impl AggregateRoot for Schedule {
    fn id(&self) -> AggregateId {
        self.meta.id
    }

    fn version(&self) -> u64 {
        self.meta.version
    }
}

impl Schedule {
    pub fn create(
        id: AggregateId,
        correlation_id: CorrelationId,
        name: String,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("schedule name cannot be empty"));
        }

        let mut schedule = Self {
            meta: AggregateMeta::new(id, correlation_id, now),
            name,
            entries: Vec::new(),
            uncommitted: Vec::new(),
        };
        let new_state = schedule.to_state();
        schedule.uncommitted.push(PendingEvent {
            name: EventName::ScheduleCreated,
            version: 0,
            occurred_at: now,
            prior_state: None,
            new_state,
        });
        Ok(schedule)
    }

    pub fn load_from_snapshot(state: ScheduleState) -> Self {
        Self {
            meta: state.meta,
            name: state.name,
            entries: state.entries,
            uncommitted: Vec::new(),
        }
    }

    pub fn to_state(&self) -> ScheduleState {
        ScheduleState {
            meta: self.meta.clone(),
            name: self.name.clone(),
            entries: self.entries.clone(),
        }
    }

    pub fn status(&self) -> AggregateStatus {
        self.meta.status
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn take_uncommitted(&mut self) -> Vec<PendingEvent<ScheduleState>> {
        std::mem::take(&mut self.uncommitted)
    }

    pub fn add_paired_entry(
        &mut self,
        entry_id: AggregateId,
        label: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if ends_at <= starts_at {
            return Err(DomainError::validation(
                "paired schedule entry must end after it starts",
            ));
        }
        self.add_entry(entry_id, label, ScheduleWindow::Paired { starts_at, ends_at }, now)
    }

    pub fn add_single_entry(
        &mut self,
        entry_id: AggregateId,
        label: String,
        starts_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.add_entry(entry_id, label, ScheduleWindow::Single { starts_at }, now)
    }

    fn add_entry(
        &mut self,
        entry_id: AggregateId,
        label: String,
        window: ScheduleWindow,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("add an entry to")?;
        if self.entries.iter().any(|e| e.entry_id == entry_id) {
            return Err(DomainError::rule(format!(
                "entry {entry_id} already exists in the schedule"
            )));
        }

        let prior = self.to_state();
        self.entries.push(ScheduleEntry {
            entry_id,
            label,
            window,
            status: ScheduleEntryStatus::Pending,
        });
        self.record(EventName::ScheduleEntryAdded, prior, now);
        Ok(())
    }

    pub fn activate_entry(
        &mut self,
        entry_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_entry(
            entry_id,
            ScheduleEntryStatus::Pending,
            ScheduleEntryStatus::Active,
            EventName::ScheduleEntryActivated,
            now,
        )
    }

    pub fn complete_entry(
        &mut self,
        entry_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_entry(
            entry_id,
            ScheduleEntryStatus::Active,
            ScheduleEntryStatus::Completed,
            EventName::ScheduleEntryCompleted,
            now,
        )
    }

    pub fn cancel_entry(
        &mut self,
        entry_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("cancel an entry of")?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.entry_id == entry_id)
            .ok_or_else(|| DomainError::rule(format!("entry {entry_id} does not exist")))?;
        if entry.status.is_terminal() {
            return Err(DomainError::rule(format!(
                "entry {entry_id} is already {}",
                entry.status
            )));
        }

        let prior = self.to_state();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.status = ScheduleEntryStatus::Cancelled;
        }
        self.record(EventName::ScheduleEntryCancelled, prior, now);
        Ok(())
    }

    /// Cancel every non-terminal entry in one mutation.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_not_archived("cancel")?;
        if self.entries.iter().all(|e| e.status.is_terminal()) {
            return Err(DomainError::rule(
                "schedule has no entries left to cancel",
            ));
        }

        let prior = self.to_state();
        for entry in &mut self.entries {
            if !entry.status.is_terminal() {
                entry.status = ScheduleEntryStatus::Cancelled;
            }
        }
        self.record(EventName::ScheduleCancelled, prior, now);
        Ok(())
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Active, now)?;
        self.record(EventName::SchedulePublished, prior, now);
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Archived, now)?;
        self.record(EventName::ScheduleArchived, prior, now);
        Ok(())
    }

    fn transition_entry(
        &mut self,
        entry_id: AggregateId,
        from: ScheduleEntryStatus,
        to: ScheduleEntryStatus,
        event: EventName,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("modify an entry of")?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.entry_id == entry_id)
            .ok_or_else(|| DomainError::rule(format!("entry {entry_id} does not exist")))?;
        if entry.status != from {
            return Err(DomainError::rule(format!(
                "entry {entry_id} is {}, expected {from}",
                entry.status
            )));
        }

        let prior = self.to_state();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.status = to;
        }
        self.record(event, prior, now);
        Ok(())
    }

    fn ensure_not_archived(&self, action: &str) -> Result<(), DomainError> {
        if self.meta.status == AggregateStatus::Archived {
            return Err(DomainError::rule(format!(
                "cannot {action} an archived schedule"
            )));
        }
        Ok(())
    }

    fn record(&mut self, name: EventName, prior: ScheduleState, now: DateTime<Utc>) {
        self.meta.touch(now);
        let new_state = self.to_state();
        self.uncommitted.push(PendingEvent {
            name,
            version: self.meta.version,
            occurred_at: now,
            prior_state: Some(prior),
            new_state,
        });
    }
}
