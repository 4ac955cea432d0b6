//! Focus session ("Task Go") state machine.
//!
//! ```text
//! idle -> running <-> paused
//!            |           |
//!            v           |
//!         expired -------+--> complete -> idle
//! ```
//!
//! Pause policy: monitoring pauses together with the countdown. Time spent
//! paused is neither elapsed nor sampled, so it can neither earn nor dilute
//! XP. Cancelling from any state discards everything accumulated for the
//! current item.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use taskgo_atoms::tasks::{self, Grouping, TaskItem};
use taskgo_atoms::xp::{ActivityReport, MonitoringStatus};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("added time must be positive")]
    ZeroDuration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSession {
    state: SessionState,
    budget_seconds: u64,
    elapsed_seconds: u64,
    sampled_intervals: u32,
    active_intervals: u32,
    monitoring: MonitoringStatus,
}

impl Default for FocusSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            budget_seconds: 0,
            elapsed_seconds: 0,
            sampled_intervals: 0,
            active_intervals: 0,
            monitoring: MonitoringStatus::Unavailable,
        }
    }
}

impl FocusSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.budget_seconds.saturating_sub(self.elapsed_seconds)
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    pub fn start(&mut self, budget_seconds: u64, monitoring: MonitoringStatus) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("start"));
        }
        if budget_seconds == 0 {
            return Err(SessionError::ZeroDuration);
        }
        *self = Self {
            state: SessionState::Running,
            budget_seconds,
            monitoring,
            ..Self::default()
        };
        Ok(())
    }

    /// Advances the countdown by one sampling interval of `seconds`.
    ///
    /// Only a running session counts time; while paused or expired the tick
    /// is ignored. Activity is sampled only when monitoring was granted.
    pub fn tick(&mut self, seconds: u64, input_detected: bool) -> Result<SessionState, SessionError> {
        match self.state {
            SessionState::Idle => return Err(self.invalid("tick")),
            SessionState::Paused | SessionState::Expired => return Ok(self.state),
            SessionState::Running => {}
        }

        self.elapsed_seconds += seconds.min(self.remaining_seconds());
        if self.monitoring == MonitoringStatus::Granted {
            self.sampled_intervals += 1;
            if input_detected {
                self.active_intervals += 1;
            }
        }
        if self.remaining_seconds() == 0 {
            tracing::debug!("Focus session expired after {}s", self.elapsed_seconds);
            self.state = SessionState::Expired;
        }
        Ok(self.state)
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(self.invalid("pause"));
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(self.invalid("resume"));
        }
        self.state = SessionState::Running;
        Ok(())
    }

    /// Extends the budget. From `expired` this re-enters `running`.
    pub fn add_time(&mut self, seconds: u64) -> Result<(), SessionError> {
        if seconds == 0 {
            return Err(SessionError::ZeroDuration);
        }
        match self.state {
            SessionState::Idle => Err(self.invalid("add time")),
            SessionState::Expired => {
                self.budget_seconds = self.elapsed_seconds + seconds;
                self.state = SessionState::Running;
                Ok(())
            }
            SessionState::Running | SessionState::Paused => {
                self.budget_seconds += seconds;
                Ok(())
            }
        }
    }

    /// Finalizes the session and returns what was observed.
    pub fn complete(&mut self) -> Result<ActivityReport, SessionError> {
        if self.state == SessionState::Idle {
            return Err(self.invalid("complete"));
        }
        let report = ActivityReport {
            elapsed_seconds: self.elapsed_seconds,
            sampled_intervals: self.sampled_intervals,
            active_intervals: self.active_intervals,
            monitoring: self.monitoring,
        };
        *self = Self::default();
        Ok(report)
    }

    /// Stops the session; nothing accumulated survives.
    pub fn cancel(&mut self) {
        *self = Self::default();
    }
}

// ========== TASK GO QUEUE ==========

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueKind {
    Single,
    /// Shown as its leader; completing it completes every member.
    Batch { batch_id: String },
    /// Shown as its lowest-order incomplete step.
    Chain { chain_id: String, step: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedItem {
    pub task_id: String,
    pub name: String,
    /// Countdown budget in seconds.
    pub time_estimate: u64,
    #[serde(flatten)]
    pub kind: QueueKind,
}

impl QueuedItem {
    pub fn single(task: &TaskItem) -> Self {
        Self {
            task_id: task.task_id.clone(),
            name: task.name.clone(),
            time_estimate: task.time_estimate,
            kind: QueueKind::Single,
        }
    }

    pub fn chain_step(task: &TaskItem) -> Self {
        match (&task.chain_id, task.chain_order) {
            (Some(chain_id), Some(step)) => Self {
                kind: QueueKind::Chain {
                    chain_id: chain_id.clone(),
                    step,
                },
                ..Self::single(task)
            },
            _ => Self::single(task),
        }
    }
}

/// Orders a group's incomplete work for a Task Go run: by position, with
/// each batch collapsed to its leader and each chain to its leader step.
pub fn build_queue(tasks: &[TaskItem]) -> Vec<QueuedItem> {
    let mut incomplete: Vec<&TaskItem> = tasks.iter().filter(|t| !t.completed).collect();
    incomplete.sort_by_key(|t| t.position);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue = Vec::new();
    for task in incomplete {
        match task.grouping() {
            Grouping::Ungrouped => queue.push(QueuedItem::single(task)),
            Grouping::Batch(batch_id) => {
                if !seen.insert(batch_id) {
                    continue;
                }
                let members: Vec<TaskItem> = tasks
                    .iter()
                    .filter(|t| !t.completed && t.batch_id.as_deref() == Some(batch_id))
                    .cloned()
                    .collect();
                let leader = tasks::batch_leader(&members).unwrap_or(task);
                let estimate = tasks
                    .iter()
                    .find(|t| t.batch_id.as_deref() == Some(batch_id) && t.batch_time_estimate.is_some())
                    .and_then(|t| t.batch_time_estimate)
                    .unwrap_or_else(|| members.iter().map(|t| t.time_estimate).sum());
                queue.push(QueuedItem {
                    task_id: leader.task_id.clone(),
                    name: leader.name.clone(),
                    time_estimate: estimate,
                    kind: QueueKind::Batch {
                        batch_id: batch_id.to_string(),
                    },
                });
            }
            Grouping::Chain(chain_id) => {
                if !seen.insert(chain_id) {
                    continue;
                }
                let mut steps: Vec<TaskItem> = tasks
                    .iter()
                    .filter(|t| t.chain_id.as_deref() == Some(chain_id))
                    .cloned()
                    .collect();
                steps.sort_by_key(|t| t.chain_order.unwrap_or(u32::MAX));
                if let Some(leader) = tasks::next_incomplete_chain_step(&steps) {
                    queue.push(QueuedItem::chain_step(leader));
                }
            }
        }
    }
    queue
}

/// Runs queued items back to back through one `FocusSession`.
#[derive(Debug, Clone)]
pub struct TaskGo {
    queue: VecDeque<QueuedItem>,
    current: Option<QueuedItem>,
    session: FocusSession,
    monitoring: MonitoringStatus,
}

impl TaskGo {
    pub fn new(items: Vec<QueuedItem>, monitoring: MonitoringStatus) -> Self {
        Self {
            queue: items.into(),
            current: None,
            session: FocusSession::new(),
            monitoring,
        }
    }

    pub fn current(&self) -> Option<&QueuedItem> {
        self.current.as_ref()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn session(&self) -> &FocusSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FocusSession {
        &mut self.session
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Starts the next queued item. Returns `None` (and stays idle) when the
    /// queue is empty.
    pub fn advance(&mut self) -> Result<Option<&QueuedItem>, SessionError> {
        if self.session.state() != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                state: self.session.state(),
                action: "advance",
            });
        }
        self.current = None;
        while let Some(next) = self.queue.pop_front() {
            if next.time_estimate == 0 {
                tracing::warn!("Skipping {} with no time estimate", next.task_id);
                continue;
            }
            self.session.start(next.time_estimate, self.monitoring)?;
            self.current = Some(next);
            break;
        }
        Ok(self.current.as_ref())
    }

    /// Finishes the current item and returns it with its activity report.
    /// The caller completes it, then calls `advance` to keep the run going.
    pub fn finish_current(&mut self) -> Result<(QueuedItem, ActivityReport), SessionError> {
        let Some(current) = self.current.take() else {
            return Err(SessionError::InvalidTransition {
                state: self.session.state(),
                action: "complete",
            });
        };
        match self.session.complete() {
            Ok(report) => Ok((current, report)),
            Err(e) => {
                self.current = Some(current);
                Err(e)
            }
        }
    }

    /// Puts the next chain step at the front of the queue, so a chain runs
    /// step after step before anything else.
    pub fn queue_next_step(&mut self, step: &TaskItem) {
        self.queue.push_front(QueuedItem::chain_step(step));
    }

    /// Cancels the run: the current item earns nothing and the queue is dropped.
    pub fn stop(&mut self) {
        if let Some(current) = self.current.take() {
            tracing::info!("Task Go stopped during {}", current.task_id);
        }
        self.session.cancel();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn running(budget: u64) -> FocusSession {
        let mut s = FocusSession::new();
        s.start(budget, MonitoringStatus::Granted).unwrap();
        s
    }

    fn task(id: &str, position: u32) -> TaskItem {
        TaskItem {
            task_id: id.to_string(),
            user_id: "u1".to_string(),
            group_id: "g1".to_string(),
            name: id.to_uppercase(),
            description: None,
            time_estimate: 600,
            position,
            completed: false,
            completed_at: None,
            batch_id: None,
            batch_time_estimate: None,
            chain_id: None,
            chain_order: None,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn countdown_expires_and_more_time_resumes() {
        let mut s = running(120);
        assert_eq!(s.tick(60, true), Ok(SessionState::Running));
        assert_eq!(s.tick(90, true), Ok(SessionState::Expired));
        assert_eq!(s.elapsed_seconds(), 120);
        // expired: ticks no longer count
        assert_eq!(s.tick(60, true), Ok(SessionState::Expired));
        assert_eq!(s.elapsed_seconds(), 120);
        assert!(s.pause().is_err());

        s.add_time(60).unwrap();
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.remaining_seconds(), 60);
    }

    #[test]
    fn paused_time_is_neither_elapsed_nor_sampled() {
        let mut s = running(600);
        s.tick(60, true).unwrap();
        s.pause().unwrap();
        s.tick(60, false).unwrap();
        s.tick(60, false).unwrap();
        s.resume().unwrap();
        s.tick(60, false).unwrap();

        let report = s.complete().unwrap();
        assert_eq!(report.elapsed_seconds, 120);
        assert_eq!(report.sampled_intervals, 2);
        assert_eq!(report.active_intervals, 1);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn unmonitored_sessions_collect_no_samples() {
        let mut s = FocusSession::new();
        s.start(300, MonitoringStatus::Denied).unwrap();
        s.tick(60, true).unwrap();
        let report = s.complete().unwrap();
        assert_eq!(report.sampled_intervals, 0);
        assert_eq!(report.monitoring, MonitoringStatus::Denied);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut s = FocusSession::new();
        assert!(matches!(s.complete(), Err(SessionError::InvalidTransition { .. })));
        assert!(s.resume().is_err());
        assert_eq!(s.start(0, MonitoringStatus::Granted), Err(SessionError::ZeroDuration));

        let mut s = running(60);
        assert!(s.start(60, MonitoringStatus::Granted).is_err());
        assert!(s.resume().is_err());
    }

    #[test]
    fn cancel_discards_progress() {
        let mut s = running(600);
        s.tick(300, true).unwrap();
        s.cancel();
        assert_eq!(s, FocusSession::new());
    }

    #[test]
    fn queue_collapses_batches_and_chains() {
        let mut b1 = task("b1", 1);
        b1.batch_id = Some("batch".into());
        b1.batch_time_estimate = Some(1500);
        let mut b2 = task("b2", 3);
        b2.batch_id = Some("batch".into());
        let mut c1 = task("c1", 2);
        c1.chain_id = Some("chain".into());
        c1.chain_order = Some(1);
        c1.completed = true;
        let mut c2 = task("c2", 4);
        c2.chain_id = Some("chain".into());
        c2.chain_order = Some(2);

        let queue = build_queue(&[task("a", 0), b1, b2, c1, c2, task("d", 5)]);
        let ids: Vec<&str> = queue.iter().map(|q| q.task_id.as_str()).collect();
        assert_eq!(ids, ["a", "b1", "c2", "d"]);
        assert_eq!(queue[1].time_estimate, 1500);
        assert_eq!(
            queue[2].kind,
            QueueKind::Chain {
                chain_id: "chain".into(),
                step: 2
            }
        );
    }

    #[test]
    fn task_go_runs_items_back_to_back() {
        let mut go = TaskGo::new(
            vec![QueuedItem::single(&task("a", 0)), QueuedItem::single(&task("b", 1))],
            MonitoringStatus::Granted,
        );
        assert_eq!(go.advance().unwrap().map(|q| q.task_id.clone()), Some("a".to_string()));
        go.session_mut().tick(600, true).unwrap();

        let mut next_step = task("a2", 2);
        next_step.chain_id = Some("chain".into());
        next_step.chain_order = Some(2);
        let (done, report) = go.finish_current().unwrap();
        assert_eq!(done.task_id, "a");
        assert_eq!(report.elapsed_seconds, 600);
        go.queue_next_step(&next_step);

        assert_eq!(go.advance().unwrap().map(|q| q.task_id.clone()), Some("a2".to_string()));
        go.stop();
        assert!(!go.is_active());
        assert_eq!(go.remaining(), 0);
        assert_eq!(go.advance().unwrap(), None);
        assert_eq!(go.session().state(), SessionState::Idle);
    }
}
