//! One ingestion run: token, pages, normalization, post-filter.

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::assembler;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::LeadDataset;
use crate::normalizer::FieldNormalizer;
use crate::paginator::OpportunityPager;
use crate::token::TokenProvider;

/// Everything a pipeline run needs, built once at startup and passed explicitly.
///
/// The token cache lives inside `tokens`, so credentials are reused across runs
/// for as long as they stay valid.
#[derive(Clone)]
pub struct PipelineContext {
    client_id: String,
    client_secret: String,
    tokens: TokenProvider,
    pager: OpportunityPager,
    normalizer: FieldNormalizer,
    excluded_pipeline: String,
}

impl PipelineContext {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tokens: TokenProvider,
        pager: OpportunityPager,
        normalizer: FieldNormalizer,
        excluded_pipeline: impl Into<String>,
    ) -> Result<Self, AppError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(AppError::Configuration(
                "Sellsy client id and client secret are required".to_string(),
            ));
        }

        Ok(Self {
            client_id,
            client_secret,
            tokens,
            pager,
            normalizer,
            excluded_pipeline: excluded_pipeline.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sellsy-leads/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AppError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let tokens = TokenProvider::new(client.clone(), &config.auth_url, config.auth_timeout());
        let pager = OpportunityPager::new(client, &config.opportunities_url, config.page_timeout());
        let normalizer = FieldNormalizer::builtin()?;

        Self::new(
            &config.client_id,
            &config.client_secret,
            tokens,
            pager,
            normalizer,
            &config.excluded_pipeline,
        )
    }

    /// Runs the pipeline end to end. Either every page is fetched and normalized,
    /// or an `Authentication` / `Transport` error is returned and nothing is kept.
    pub async fn run(&self) -> Result<LeadDataset, AppError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", %run_id);

        async move {
            tracing::info!("Starting Sellsy ingestion");

            let credential = self
                .tokens
                .acquire(&self.client_id, &self.client_secret)
                .await
                .inspect_err(|e| tracing::error!("Token acquisition failed: {}", e))?;

            let raw = self
                .pager
                .fetch_all(&credential)
                .await
                .inspect_err(|e| tracing::error!("Opportunity paging failed: {}", e))?;

            let fetched = raw.len();
            let leads = assembler::assemble(&self.normalizer, &raw);
            let leads = assembler::exclude_pipeline(leads, &self.excluded_pipeline);

            tracing::info!(
                "✓ Ingestion complete: {} fetched, {} leads kept",
                fetched,
                leads.len()
            );

            Ok(LeadDataset {
                run_id,
                fetched_at: Utc::now(),
                fetched,
                leads,
            })
        }
        .instrument(span)
        .await
    }
}
