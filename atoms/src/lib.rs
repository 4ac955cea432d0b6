//! Single-entity building blocks for Task Go: the document store boundary,
//! the XP engine, users and the username registry, task groups, and social
//! groups with their leaderboard mirror.

pub mod clock;
pub mod error;
pub mod http;
pub mod social;
pub mod store;
pub mod tasks;
pub mod users;
pub mod xp;

pub use clock::{Clock, FixedClock, SystemClock, WeekBoundary};
pub use error::{CoreError, CoreResult, StoreError};
pub use store::{DocumentStore, DynamoStore, MemoryStore};
