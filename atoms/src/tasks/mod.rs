//! Task store: groups, tasks, batches and chains
pub mod http;
pub mod model;
pub mod service;

pub use model::{
    CompletionReport, CreateBatchPayload, CreateChainPayload, CreateGroupPayload, CreateTaskPayload,
    Grouping, TaskGroup, TaskItem,
};
pub use service::*;
