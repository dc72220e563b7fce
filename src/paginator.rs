use crate::errors::AppError;
use crate::models::{Credential, OpportunityPage, RawOpportunity};
use std::time::Duration;

/// Records requested per page.
pub const PAGE_SIZE: u64 = 100;

/// Walks the Sellsy opportunities list endpoint with limit/offset paging.
#[derive(Clone)]
pub struct OpportunityPager {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpportunityPager {
    /// Creates a new `OpportunityPager`.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `base_url` - Full URL of the opportunities list endpoint.
    /// * `timeout` - Upper bound for each page request.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Fetches every opportunity, oldest first.
    ///
    /// Stops when a page reports `count == 0` or the running offset reaches the
    /// reported `total`. Any failed page fails the whole call; records gathered
    /// so far are dropped.
    pub async fn fetch_all(&self, credential: &Credential) -> Result<Vec<RawOpportunity>, AppError> {
        let mut records = Vec::new();
        let mut offset: u64 = 0;
        let mut pages = 0usize;
        let mut malformed = 0usize;

        loop {
            let page = self.fetch_page(credential, offset).await?;
            pages += 1;

            for value in &page.data {
                let (record, issues) = RawOpportunity::from_value(value);
                for issue in issues {
                    malformed += 1;
                    tracing::debug!("{}", issue);
                }
                records.push(record);
            }

            let total = page.pagination.total;
            let count = page.pagination.count;
            offset = offset.saturating_add(count);

            tracing::debug!(
                "Page {} received: count={}, offset={}, total={}",
                pages,
                count,
                offset,
                total
            );

            if count == 0 || offset >= total {
                break;
            }
        }

        if malformed > 0 {
            tracing::warn!("{} malformed fields replaced by defaults", malformed);
        }
        tracing::info!(
            "Fetched {} opportunities from Sellsy in {} pages",
            records.len(),
            pages
        );
        Ok(records)
    }

    async fn fetch_page(
        &self,
        credential: &Credential,
        offset: u64,
    ) -> Result<OpportunityPage, AppError> {
        let transport = |message: String| AppError::Transport {
            offset: Some(offset),
            message,
        };

        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("direction", "asc".to_string()),
            ],
        )
        .map_err(|e| transport(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .header("Authorization", credential.bearer())
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport(format!("Sellsy request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                "Sellsy returned {} at offset {}: {}",
                status,
                offset,
                error_text
            );
            return Err(transport(format!(
                "Sellsy returned status {}: {}",
                status, error_text
            )));
        }

        response
            .json::<OpportunityPage>()
            .await
            .map_err(|e| transport(format!("Failed to parse Sellsy page: {}", e)))
    }
}
