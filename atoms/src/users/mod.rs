pub mod http;
pub mod model;
pub mod service;

pub use model::{
    AwardOutcome, ProfileView, SignUpPayload, UpdateProfilePayload, UserProfile, UsernameClaim,
    XpAwardReceipt,
};
pub use service::*;
