//! HTTP API
//!
//! `POST /get-news-summary` runs the crew for a topic. Each run is spawned on
//! its own task and gated by a semaphore, so the request loop stays free and
//! at most `max_concurrent_pipelines` runs are active at once. The endpoint
//! always answers 200 with a `status` field telling success from failure.

use crate::crew::{NewsCrew, PipelineOutcome};
use crate::error::{AppError, ErrorDetails};
use crate::observability::metrics;
use crate::request_span;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, Instrument};
use uuid::Uuid;
use warp::Filter;

/// Body of `GET /`
pub const HEALTH_MESSAGE: &str = "AI News Agent API is running!";

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Request body of `POST /get-news-summary`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRequest {
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response body of `POST /get-news-summary`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub status: ResponseStatus,
    pub summary: String,
    pub request_id: String,
    pub error: Option<ErrorDetails>,
}

impl SummaryResponse {
    pub fn from_outcome(request_id: Uuid, outcome: &PipelineOutcome) -> Self {
        Self {
            status: if outcome.is_success() {
                ResponseStatus::Success
            } else {
                ResponseStatus::Error
            },
            summary: outcome.text(),
            request_id: request_id.to_string(),
            error: outcome.error_details(),
        }
    }
}

/// Shared state behind every route
pub struct AppState {
    crew: Arc<NewsCrew>,
    permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(crew: NewsCrew, max_concurrent_pipelines: usize) -> Self {
        Self {
            crew: Arc::new(crew),
            permits: Arc::new(Semaphore::new(max_concurrent_pipelines.max(1))),
        }
    }

    /// Run the crew for `topic` on a spawned task and wait for it.
    ///
    /// Dropping the returned future does not stop the run.
    pub async fn summarize(&self, topic: String, request_id: Uuid) -> SummaryResponse {
        metrics().pipeline_received();

        if topic.trim().is_empty() {
            metrics().pipeline_rejected();
            let outcome = PipelineOutcome::Failure {
                error: AppError::invalid_input("topic must not be empty"),
            };
            return SummaryResponse::from_outcome(request_id, &outcome);
        }

        let crew = Arc::clone(&self.crew);
        let permits = Arc::clone(&self.permits);
        let submitted = Instant::now();

        let handle = tokio::spawn(
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::internal_error(format!("worker pool closed: {e}")))?;

                metrics().pipeline_started();
                let started = Instant::now();
                let outcome = crew.kickoff(&topic).await;
                if outcome.is_success() {
                    metrics().pipeline_completed(started.elapsed());
                } else {
                    metrics().pipeline_failed(started.elapsed());
                }
                Ok::<_, AppError>(outcome)
            }
            .in_current_span(),
        );

        let outcome = match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => PipelineOutcome::Failure { error },
            Err(join_error) => {
                error!(error = %join_error, "Pipeline task aborted");
                metrics().pipeline_failed(submitted.elapsed());
                PipelineOutcome::Failure {
                    error: AppError::internal_error("pipeline task terminated unexpectedly"),
                }
            }
        };

        info!(
            success = outcome.is_success(),
            elapsed_ms = submitted.elapsed().as_millis() as u64,
            "Request finished"
        );
        SummaryResponse::from_outcome(request_id, &outcome)
    }
}

async fn handle_news_summary(
    request: TopicRequest,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, Infallible> {
    let request_id = Uuid::new_v4();
    let span = request_span!(request_id = %request_id, topic = %request.topic);
    let response = state
        .summarize(request.topic, request_id)
        .instrument(span)
        .await;
    Ok(warp::reply::json(&response))
}

/// All routes, with CORS applied
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let with_state = warp::any().map(move || Arc::clone(&state));

    let summary_route = warp::path("get-news-summary")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state)
        .and_then(handle_news_summary);

    let root_route = warp::path::end().and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({ "status": HEALTH_MESSAGE }))
    });

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()));

    summary_route.or(root_route).or(metrics_route).with(
        warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST"])
            .allow_headers(vec!["content-type"]),
    )
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| AppError::internal_error(format!("failed to bind {addr}: {e}")))?;

    info!(address = %bound, "News agent API listening");
    server.await;
    info!("HTTP server stopped");
    Ok(())
}
