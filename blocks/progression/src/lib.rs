//! Flows that cross entities: the focus session and Task Go queue, session
//! completion with XP award and mirroring, the weekly reset sweep, and
//! account deletion.

pub mod account;
pub mod completion;
pub mod http;
pub mod session;
pub mod weekly_reset;

use taskgo_atoms::xp::AwardPolicy;
use taskgo_atoms::WeekBoundary;

/// Award policy plus the weekly boundary every XP write is measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressionRules {
    pub award: AwardPolicy,
    pub week: WeekBoundary,
}

pub use account::{delete_account, DeletionReport, DeletionStep, StepResult};
pub use completion::{complete_focus_session, retry_pending_award, AwardResult, CompletionOutcome, PendingAward, XpStatus};
pub use session::{build_queue, FocusSession, QueueKind, QueuedItem, SessionError, SessionState, TaskGo};
pub use weekly_reset::{reset_user_weekly_xp, reset_weekly_xp, ResetReport};
