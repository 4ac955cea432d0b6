use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::xp;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    /// Display case is kept here; the registry stores the lowercase form.
    pub username: String,
    pub display_name: String,
    pub total_xp: u64,
    pub level: u32,
    pub weekly_xp: u64,
    pub weekly_xp_reset_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped on every profile write.
    #[serde(default)]
    pub revision: u64,
}

impl UserProfile {
    pub fn username_key(&self) -> String {
        self.username.to_lowercase()
    }
}

/// usernames/{lowercase} -> owner
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UsernameClaim {
    pub username: String,
    pub user_id: String,
    pub claimed_at: DateTime<Utc>,
}

/// users/{id}/xpAwards/{task_id}: proof that an item's XP was granted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct XpAwardReceipt {
    pub task_id: String,
    pub xp: u64,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AwardOutcome {
    Committed(UserProfile),
    AlreadyAwarded,
}

#[derive(Debug, Deserialize)]
pub struct SignUpPayload {
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfilePayload {
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub progress: f64,
    pub xp_to_next: u64,
}

impl From<UserProfile> for ProfileView {
    fn from(profile: UserProfile) -> Self {
        Self {
            progress: xp::progress(profile.total_xp),
            xp_to_next: xp::xp_to_next(profile.total_xp),
            profile,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}
