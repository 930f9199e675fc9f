//! Publish job states and reports.

use crate::error::SyncResult;
use crate::remote::PublishKind;
use relsync_core::RelationKey;
use serde::Serialize;

/// The state of a publish job.
///
/// `Pending → WaitingForIdentifier (optional) → Publishing → Succeeded`,
/// with `Retrying` looping back to either `WaitingForIdentifier` or
/// `Publishing`, and `Failed` once the job gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// Scheduled, not started.
    Pending,
    /// Suspended until an identifier fetch finishes.
    WaitingForIdentifier,
    /// Talking to the registry.
    Publishing,
    /// Waiting before the next attempt.
    Retrying,
    /// All required descriptors were published.
    Succeeded,
    /// Gave up.
    Failed,
}

impl JobState {
    /// Returns true if the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// What happened to one publish job.
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Job id, unique per coordinator.
    pub job_id: u64,
    /// The relationship published.
    pub key: RelationKey,
    /// Create or update.
    pub kind: PublishKind,
    /// Attempts made.
    pub attempts: u32,
    /// Every state the job went through, in order.
    pub transitions: Vec<JobState>,
    /// Final result.
    pub outcome: SyncResult<()>,
}

impl PublishReport {
    pub(crate) fn new(job_id: u64, key: RelationKey, kind: PublishKind) -> Self {
        Self {
            job_id,
            key,
            kind,
            attempts: 0,
            transitions: vec![JobState::Pending],
            outcome: Ok(()),
        }
    }

    pub(crate) fn enter(&mut self, state: JobState) {
        self.transitions.push(state);
    }

    pub(crate) fn finish(&mut self, outcome: SyncResult<()>) {
        let state = if outcome.is_ok() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        self.enter(state);
        self.outcome = outcome;
    }

    /// Returns the state the job ended in.
    pub fn final_state(&self) -> JobState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(JobState::Pending)
    }

    /// Returns true if the job succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok() && self.final_state() == JobState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use relsync_core::PartnerId;

    #[test]
    fn report_tracks_states() {
        let mut report = PublishReport::new(1, RelationKey::new("M1", PartnerId::nil()), PublishKind::Create);
        assert_eq!(report.final_state(), JobState::Pending);
        assert!(!report.is_success());

        report.enter(JobState::Publishing);
        report.finish(Err(SyncError::PoolClosed));
        assert_eq!(
            report.transitions,
            vec![JobState::Pending, JobState::Publishing, JobState::Failed]
        );
        assert!(report.final_state().is_terminal());
        assert!(!report.is_success());
    }
}
