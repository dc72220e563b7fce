use crate::circuit_breaker::UpstreamBreaker;
use crate::config::Config;
use crate::errors::AppError;
use crate::geo::{self, Department};
use crate::models::{LeadDataset, NormalizedLead};
use crate::pipeline::PipelineContext;
use crate::report::{FilterOptions, LeadFilter, LeadQuery, LeadSummary};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const DATASET_KEY: &str = "leads";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Ingestion pipeline, including the token cache.
    pub pipeline: Arc<PipelineContext>,
    /// Latest successful dataset, kept for one refresh interval.
    pub dataset_cache: Cache<String, Arc<LeadDataset>>,
    /// Stops hammering the CRM after repeated failed runs.
    pub breaker: UpstreamBreaker,
}

impl AppState {
    pub fn new(config: Config, pipeline: PipelineContext, breaker: UpstreamBreaker) -> Self {
        let dataset_cache = Cache::builder()
            .time_to_live(config.refresh_interval())
            .max_capacity(1)
            .build();

        Self {
            config,
            pipeline: Arc::new(pipeline),
            dataset_cache,
            breaker,
        }
    }

    /// Returns the cached dataset, running the pipeline when it has expired.
    ///
    /// Concurrent callers share one run. A failed run caches nothing, so callers
    /// get the error rather than stale or partial data.
    pub async fn dataset(&self) -> Result<Arc<LeadDataset>, AppError> {
        let pipeline = self.pipeline.clone();
        let breaker = self.breaker.clone();

        self.dataset_cache
            .try_get_with(DATASET_KEY.to_string(), async move {
                match breaker.call(pipeline.run()).await {
                    Ok(dataset) => Ok(Arc::new(dataset)),
                    Err(failsafe::Error::Inner(e)) => Err(e),
                    Err(failsafe::Error::Rejected) => Err(AppError::Unavailable(
                        "Sellsy is failing repeatedly, ingestion paused".to_string(),
                    )),
                }
            })
            .await
            .map_err(|e| e.as_ref().clone())
    }
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "sellsy-leads",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[derive(Debug, Serialize)]
pub struct LeadsResponse {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub count: usize,
    pub leads: Vec<NormalizedLead>,
}

/// GET /api/v1/leads
///
/// Normalized leads matching the query filters, newest first.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `params` - Optional `period`, `pipelines` and `statuses` filters.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadQuery>,
) -> Result<Json<LeadsResponse>, AppError> {
    tracing::info!("GET /leads - params: {:?}", params);

    let filter = LeadFilter::from_query(&params)?;
    let dataset = state.dataset().await?;
    let leads: Vec<NormalizedLead> = filter
        .apply(&dataset.leads, Utc::now())
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(LeadsResponse {
        run_id: dataset.run_id,
        fetched_at: dataset.fetched_at,
        count: leads.len(),
        leads,
    }))
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: LeadSummary,
}

/// GET /api/v1/leads/summary
///
/// Counts per status, pipeline, step group, funnel stage and day.
pub async fn leads_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    tracing::info!("GET /leads/summary - params: {:?}", params);

    let filter = LeadFilter::from_query(&params)?;
    let dataset = state.dataset().await?;
    let selected = filter.apply(&dataset.leads, Utc::now());

    Ok(Json(SummaryResponse {
        run_id: dataset.run_id,
        fetched_at: dataset.fetched_at,
        summary: LeadSummary::from_leads(&selected),
    }))
}

/// GET /api/v1/pipelines
///
/// Pipelines and statuses present in the current dataset.
pub async fn filter_options(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FilterOptions>, AppError> {
    let dataset = state.dataset().await?;
    Ok(Json(FilterOptions::from_leads(&dataset.leads)))
}

/// GET /api/v1/departments
pub async fn list_departments() -> Json<Vec<Department>> {
    Json(geo::departments().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let (status, Json(body)) = health().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_departments_include_corsica() {
        let Json(departments) = list_departments().await;
        assert!(departments.iter().any(|d| d.code == "2A"));
        assert!(departments.iter().any(|d| d.code == "2B"));
        assert!(!departments.iter().any(|d| d.code == "20"));
    }
}
