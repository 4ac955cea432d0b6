use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::sync::Arc;
use taskgo_shared::AppState;

mod event_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let state = Arc::new(AppState::from_env().await);

    run(service_fn(move |event: LambdaEvent<CloudWatchEvent>| {
        let state = state.clone();
        async move { event_handler::function_handler(event, state).await }
    }))
    .await
}
