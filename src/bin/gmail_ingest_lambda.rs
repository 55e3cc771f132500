use std::sync::Arc;

use anyhow::Context;
use gmail_ingest::app::{build_ingestor, LiveIngestor};
use gmail_ingest::config::IngestConfig;
use gmail_ingest::response::InvocationResponse;
use gmail_ingest::types::IngestRequest;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(true)
        .init();

    tracing::trace!("initiating lambda");

    let config = IngestConfig::from_env().context("loading ingest configuration")?;
    let ingestor = Arc::new(build_ingestor(&config).await);

    tracing::trace!("initialized ingestor");

    let func = service_fn(move |event: LambdaEvent<IngestRequest>| {
        let ingestor = ingestor.clone();
        async move { handler(&ingestor, event).await }
    });

    run(func).await
}

#[tracing::instrument(skip(ingestor, event), fields(request_id = %event.context.request_id))]
async fn handler(
    ingestor: &LiveIngestor,
    event: LambdaEvent<IngestRequest>,
) -> Result<InvocationResponse, Error> {
    let result = ingestor.run(&event.payload).await;
    Ok(InvocationResponse::from_result(result))
}
