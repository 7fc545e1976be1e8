//! The single in-flight job
//!
//! `Job` holds the bookkeeping of one polling cycle. It is owned by the
//! [`Engine`](super::Engine) behind a mutex and only mutated through the
//! methods below, so every transition is applied atomically with respect to
//! the guard flags.

use chrono::{DateTime, Utc};
use gleaner_core::domain::item::{ItemState, WorkItem};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::worker::ItemFailure;

/// Reason recorded on items still unsettled when the deadline fires
pub const TIMEOUT_REASON: &str = "collect timeout";

/// Reason recorded on admitted items the worker never settled
pub const UNSETTLED_REASON: &str = "failed due to timeout or worker did not settle it";

/// Reason recorded on an item whose settlement could not be matched by id
pub const MALFORMED_REASON: &str = "malformed worker result";

/// Classified worker settlement
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Worker fulfilled with an admitted item
    Settled(WorkItem),
    /// Worker rejected with an admitted item
    Failed { item: WorkItem, error: String },
    /// Settlement at this position carried no admitted `globalId`
    Malformed(usize),
}

impl Settlement {
    /// Classifies the settlement of the future at `index`
    ///
    /// `is_admitted` decides whether a `globalId` belongs to the job.
    pub fn classify(
        index: usize,
        result: Result<WorkItem, ItemFailure>,
        is_admitted: impl Fn(&str) -> bool,
    ) -> Self {
        match result {
            Ok(item) if item.has_identity() && is_admitted(&item.global_id) => {
                Settlement::Settled(item)
            }
            Err(ItemFailure {
                item: Some(item),
                reason,
            }) if item.has_identity() && is_admitted(&item.global_id) => Settlement::Failed {
                item,
                error: reason,
            },
            _ => Settlement::Malformed(index),
        }
    }
}

/// State of the job slot
#[derive(Debug)]
pub struct Job {
    /// Set from admission until reset
    pub id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub total_items: Vec<WorkItem>,
    /// Settled items by `globalId`
    pub collected: HashMap<String, WorkItem>,
    pub timed_out: bool,
    /// Single-flight lock, held from admission until reconciliation completes
    pub locked: bool,
    /// Items fetched and handed to the worker; before this the job cannot be reconciled
    pub collecting: bool,
    /// Reconciliation in progress
    pub ending: bool,
    /// Settlements that could not be matched to an admitted item
    pub malformed: usize,
    cancel: CancellationToken,
}

impl Default for Job {
    fn default() -> Self {
        Self::idle()
    }
}

impl Job {
    pub fn idle() -> Self {
        Self {
            id: None,
            started_at: None,
            total_items: Vec::new(),
            collected: HashMap::new(),
            timed_out: false,
            locked: false,
            collecting: false,
            ending: false,
            malformed: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Whether an admission must be refused
    pub fn is_busy(&self) -> bool {
        self.id.is_some() || self.locked || self.ending
    }

    /// Whether `job_id` still owns the slot
    pub fn is_current(&self, job_id: Uuid) -> bool {
        self.id == Some(job_id)
    }

    /// Admits a new job and returns its id with the token cancelling its collection
    pub fn begin(&mut self) -> (Uuid, CancellationToken) {
        *self = Self::idle();
        let id = Uuid::new_v4();
        self.id = Some(id);
        self.started_at = Some(Utc::now());
        self.locked = true;
        (id, self.cancel.clone())
    }

    /// Cancels the collection phase of the current job
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stores the fetched batch; the job now waits on the worker
    pub fn accept(&mut self, items: Vec<WorkItem>) {
        self.total_items = items;
        self.collecting = true;
    }

    /// Whether reconciliation may start for this job
    pub fn is_reconcilable(&self) -> bool {
        self.locked && self.collecting && !self.ending
    }

    pub fn is_admitted(&self, global_id: &str) -> bool {
        self.total_items.iter().any(|i| i.global_id == global_id)
    }

    /// Applies one worker settlement
    ///
    /// Returns `None` when the settlement arrives after the deadline or
    /// during reconciliation; it must not overwrite the forced outcome.
    pub fn record(
        &mut self,
        index: usize,
        result: Result<WorkItem, ItemFailure>,
    ) -> Option<Settlement> {
        if self.timed_out || self.ending || !self.locked {
            return None;
        }

        let settlement = Settlement::classify(index, result, |id| self.is_admitted(id));

        match &settlement {
            Settlement::Settled(item) => {
                let mut item = item.clone();
                item.finish();
                self.collected.insert(item.global_id.clone(), item);
            }
            Settlement::Failed { item, error } => {
                let mut item = item.clone();
                item.fail(error.clone());
                self.collected.insert(item.global_id.clone(), item);
            }
            Settlement::Malformed(index) => {
                self.malformed += 1;
                if let Some(admitted) = self.total_items.get(*index)
                    && !self.collected.contains_key(&admitted.global_id)
                {
                    let mut item = admitted.clone();
                    item.fail(MALFORMED_REASON);
                    self.collected.insert(item.global_id.clone(), item);
                }
            }
        }

        Some(settlement)
    }

    /// Forces every unsettled item of `job_id` to `TIMEOUT`
    ///
    /// Sets `timed_out` once; returns how many items were forced. A deadline
    /// of a job that no longer owns the slot forces nothing.
    pub fn expire(&mut self, job_id: Uuid) -> usize {
        if !self.is_current(job_id) || self.timed_out || self.ending || !self.locked {
            return 0;
        }
        self.timed_out = true;

        let mut forced = 0;
        for admitted in &self.total_items {
            if !self.collected.contains_key(&admitted.global_id) {
                let mut item = admitted.clone();
                item.time_out(TIMEOUT_REASON);
                self.collected.insert(item.global_id.clone(), item);
                forced += 1;
            }
        }
        forced
    }

    /// Gives every admitted item a terminal state
    ///
    /// Unsettled items become `FAILED`; settled items without a terminal
    /// state are `FINISHED` when they carry a dataset and `FAILED` otherwise.
    /// Afterwards `collected` holds exactly one entry per admitted item.
    pub fn reconcile(&mut self) -> Vec<WorkItem> {
        let mut reconciled = Vec::with_capacity(self.total_items.len());

        for admitted in &self.total_items {
            let item = match self.collected.get(&admitted.global_id).cloned() {
                None => {
                    let mut item = admitted.clone();
                    item.fail(UNSETTLED_REASON);
                    item
                }
                Some(mut item) if !item.state.is_terminal() => {
                    if item.has_result() {
                        item.finish();
                    } else {
                        item.mark(ItemState::Failed, None);
                    }
                    item
                }
                Some(item) => item,
            };
            reconciled.push(item);
        }

        self.collected = reconciled
            .iter()
            .map(|item| (item.global_id.clone(), item.clone()))
            .collect();

        reconciled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn admitted(ids: &[&str]) -> Job {
        let mut job = Job::idle();
        job.begin();
        job.accept(ids.iter().map(|id| WorkItem::new(*id)).collect());
        job
    }

    fn expire(job: &mut Job) -> usize {
        let id = job.id.unwrap();
        job.expire(id)
    }

    #[test]
    fn test_begin_locks_the_slot() {
        let mut job = Job::idle();
        assert!(!job.is_busy());

        let (id, token) = job.begin();
        assert!(job.is_busy());
        assert!(job.locked);
        assert!(job.is_current(id));
        assert!(job.started_at.is_some());
        assert!(!token.is_cancelled());

        job.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_classify() {
        let admitted = |id: &str| id == "a";

        assert!(matches!(
            Settlement::classify(0, Ok(WorkItem::new("a")), admitted),
            Settlement::Settled(_)
        ));
        assert!(matches!(
            Settlement::classify(0, Err(ItemFailure::new(WorkItem::new("a"), "x")), admitted),
            Settlement::Failed { .. }
        ));
        assert_eq!(
            Settlement::classify(3, Ok(WorkItem::new("")), admitted),
            Settlement::Malformed(3)
        );
        assert_eq!(
            Settlement::classify(1, Ok(WorkItem::new("zzz")), admitted),
            Settlement::Malformed(1)
        );
        assert_eq!(
            Settlement::classify(2, Err(ItemFailure::detached("lost")), admitted),
            Settlement::Malformed(2)
        );
    }

    #[test]
    fn test_record_marks_states() {
        let mut job = admitted(&["a", "b"]);

        job.record(0, Ok(WorkItem::new("a")));
        job.record(1, Err(ItemFailure::new(WorkItem::new("b"), "refused")));

        assert_eq!(job.collected["a"].state, ItemState::Finished);
        assert_eq!(job.collected["b"].state, ItemState::Failed);
        assert_eq!(job.collected["b"].failures_reason.as_deref(), Some("refused"));
    }

    #[test]
    fn test_malformed_settlement_fails_item_at_its_position() {
        let mut job = admitted(&["a", "b"]);

        let settlement = job.record(1, Err(ItemFailure::detached("panic in worker")));
        assert_eq!(settlement, Some(Settlement::Malformed(1)));
        assert_eq!(job.malformed, 1);
        assert_eq!(job.collected["b"].state, ItemState::Failed);
        assert_eq!(
            job.collected["b"].failures_reason.as_deref(),
            Some(MALFORMED_REASON)
        );
    }

    #[test]
    fn test_malformed_settlement_does_not_override_settled_item() {
        let mut job = admitted(&["a"]);
        job.record(0, Ok(WorkItem::new("a")));
        job.record(0, Ok(WorkItem::new("")));

        assert_eq!(job.malformed, 1);
        assert_eq!(job.collected["a"].state, ItemState::Finished);
    }

    #[test]
    fn test_malformed_settlement_out_of_range_is_only_counted() {
        let mut job = admitted(&["a"]);
        job.record(7, Ok(WorkItem::new("")));

        assert_eq!(job.malformed, 1);
        assert!(job.collected.is_empty());
    }

    #[test]
    fn test_expire_keeps_partial_results() {
        let mut job = admitted(&["a", "b", "c"]);
        job.record(0, Ok(WorkItem::new("a")));

        assert_eq!(expire(&mut job), 2);
        assert!(job.timed_out);
        assert_eq!(job.collected["a"].state, ItemState::Finished);
        assert_eq!(job.collected["b"].state, ItemState::Timeout);
        assert_eq!(
            job.collected["c"].failures_reason.as_deref(),
            Some(TIMEOUT_REASON)
        );

        // only once
        assert_eq!(expire(&mut job), 0);
    }

    #[test]
    fn test_late_settlement_is_ignored_after_timeout() {
        let mut job = admitted(&["a"]);
        expire(&mut job);

        assert_eq!(job.record(0, Ok(WorkItem::new("a"))), None);
        assert_eq!(job.collected["a"].state, ItemState::Timeout);
    }

    #[test]
    fn test_settlement_is_ignored_while_ending() {
        let mut job = admitted(&["a"]);
        job.ending = true;

        assert_eq!(job.record(0, Ok(WorkItem::new("a"))), None);
        assert!(job.collected.is_empty());
        assert_eq!(expire(&mut job), 0);
    }

    #[test]
    fn test_reconcile_is_total() {
        let mut job = admitted(&["a", "b", "c", "d"]);
        job.record(0, Ok(WorkItem::new("a")));
        job.record(1, Err(ItemFailure::new(WorkItem::new("b"), "x")));

        let mut pending_with_data = WorkItem::new("c");
        pending_with_data.dataset = Some(json!({ "title": "t" }));
        job.collected.insert("c".to_string(), pending_with_data);

        let reconciled = job.reconcile();

        assert_eq!(reconciled.len(), job.total_items.len());
        assert_eq!(job.collected.len(), job.total_items.len());
        assert!(reconciled.iter().all(|i| i.state.is_terminal()));

        let states: Vec<_> = reconciled.iter().map(|i| i.state).collect();
        assert_eq!(
            states,
            vec![
                ItemState::Finished,
                ItemState::Failed,
                ItemState::Finished,
                ItemState::Failed
            ]
        );
        assert_eq!(reconciled[3].failures_reason.as_deref(), Some(UNSETTLED_REASON));
    }

    #[test]
    fn test_reconcile_infers_failure_without_dataset() {
        let mut job = admitted(&["a"]);
        job.collected.insert("a".to_string(), WorkItem::new("a"));

        let reconciled = job.reconcile();
        assert_eq!(reconciled[0].state, ItemState::Failed);
        assert!(reconciled[0].failures_reason.is_none());
    }

    #[test]
    fn test_deadline_of_previous_job_forces_nothing() {
        let mut job = admitted(&["a"]);
        let stale = job.id.unwrap();

        job.begin();
        job.accept(vec![WorkItem::new("b")]);

        assert_eq!(job.expire(stale), 0);
        assert!(!job.timed_out);
        assert!(job.collected.is_empty());
    }

    #[test]
    fn test_duplicate_ids_share_one_record() {
        let mut job = admitted(&["a", "a"]);
        job.record(0, Ok(WorkItem::new("a")));

        let reconciled = job.reconcile();

        assert_eq!(reconciled.len(), 2);
        assert!(reconciled.iter().all(|i| i.state == ItemState::Finished));
        assert!(reconciled.iter().all(|i| i.failures_reason.is_none()));
    }

    #[test]
    fn test_only_accepted_job_is_reconcilable() {
        let mut job = Job::idle();
        job.begin();
        assert!(!job.is_reconcilable());

        job.accept(vec![WorkItem::new("a")]);
        assert!(job.is_reconcilable());

        job.ending = true;
        assert!(!job.is_reconcilable());
    }
}
