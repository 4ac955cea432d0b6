pub mod config;

use std::sync::Arc;

use progression_block::ProgressionRules;
use taskgo_atoms::{Clock, DocumentStore, DynamoStore, SystemClock};

pub use config::Config;

/// Everything a handler needs, built once at cold start and shared across
/// invocations.
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
}

impl AppState {
    /// DynamoDB-backed state from the Lambda environment.
    pub async fn from_env() -> Self {
        let config = Config::from_env();
        let aws = aws_config::load_from_env().await;
        let client = aws_sdk_dynamodb::Client::new(&aws);
        tracing::info!("Using table {}", config.table_name);
        Self {
            store: Arc::new(DynamoStore::new(client, config.table_name.clone())),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self { store, clock, config }
    }

    pub fn rules(&self) -> ProgressionRules {
        self.config.rules()
    }
}
