//! Marketplace Checker
//!
//! Asks TonAPI whether matched NFTs are listed for sale. Requests are paced:
//! a short delay between requests and a longer pause after every batch, with
//! retries on HTTP 429.
//!
//! The match engine never calls this; the service filters matched results
//! through it when the user asked for on-sale NFTs only.

use crate::config::{MarketplaceConfig, Pacing};
use crate::error::{Error, Result};
use crate::matching::MatchResult;
use crate::nft::SalePrice;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const USER_AGENT: &str = "SynergySort/1.0";

/// Listing state of one NFT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleStatus {
    pub is_on_sale: bool,
    pub price: Option<SalePrice>,
}

/// Source of sale status for an NFT address
pub trait MarketplaceChecker: Send + Sync {
    fn check(&self, address: &str) -> impl Future<Output = Result<SaleStatus>> + Send;
}

/// TonAPI `GET /v2/nfts/{address}` client
#[derive(Debug, Clone)]
pub struct TonApiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
}

impl TonApiClient {
    pub fn new(config: &MarketplaceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.pacing.max_retries,
            retry_delay: config.pacing.retry_delay,
            request_timeout: config.request_timeout,
        })
    }

    fn transport_error(&self, address: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            Error::marketplace(address, err.to_string())
        }
    }

    fn parse_status(body: &Value) -> SaleStatus {
        let sale = body.get("sale").filter(|s| !s.is_null());
        let price = sale
            .and_then(|s| s.get("price"))
            .and_then(|p| serde_json::from_value::<SalePrice>(p.clone()).ok());

        SaleStatus {
            is_on_sale: sale.is_some(),
            price,
        }
    }
}

impl MarketplaceChecker for TonApiClient {
    #[instrument(skip(self))]
    async fn check(&self, address: &str) -> Result<SaleStatus> {
        let url = format!("{}/v2/nfts/{}", self.base_url, address);

        for attempt in 0..=self.max_retries {
            let mut request = self.http.get(&url).header("Accept", "application/json");
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| self.transport_error(address, e))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt < self.max_retries {
                    let delay = self.retry_delay * (attempt + 1);
                    warn!(
                        "Rate limited (429) for {}, retry {}/{} in {:?}",
                        address,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(Error::RateLimited {
                    attempts: attempt + 1,
                });
            }

            if !status.is_success() {
                return Err(Error::marketplace(address, format!("HTTP {}", status)));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| self.transport_error(address, e))?;
            return Ok(Self::parse_status(&body));
        }

        Err(Error::RateLimited {
            attempts: self.max_retries + 1,
        })
    }
}

/// Counters of one on-sale pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnSaleStats {
    pub total_checked: usize,
    pub on_sale: usize,
    pub not_on_sale: usize,
    pub errors: usize,
    pub rate_limit_errors: usize,
    pub pauses: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OnSaleReport {
    /// Listed NFTs, annotated with `on_sale` and `sale_price`, in input order
    pub on_sale: Vec<MatchResult>,
    pub stats: OnSaleStats,
}

/// Check every candidate in order and keep the listed ones.
///
/// A failed check counts as an error and the NFT is left out.
pub async fn filter_on_sale<C: MarketplaceChecker>(
    checker: &C,
    candidates: &[MatchResult],
    pacing: &Pacing,
) -> OnSaleReport {
    let mut report = OnSaleReport::default();
    let batch = pacing.requests_before_pause.max(1);

    info!("🏷️ Checking {} NFTs for sale listings", candidates.len());

    for (i, candidate) in candidates.iter().enumerate() {
        report.stats.total_checked += 1;

        match checker.check(&candidate.nft.address).await {
            Ok(status) if status.is_on_sale => {
                report.stats.on_sale += 1;
                let mut listed = candidate.clone();
                listed.nft.on_sale = Some(true);
                listed.nft.sale_price = status.price;
                report.on_sale.push(listed);
            }
            Ok(_) => report.stats.not_on_sale += 1,
            Err(e) => {
                if matches!(e, Error::RateLimited { .. }) {
                    report.stats.rate_limit_errors += 1;
                }
                report.stats.errors += 1;
                debug!("Sale check failed for {}: {}", candidate.nft.address, e);
            }
        }

        let remaining = i + 1 < candidates.len();
        if !remaining {
            break;
        }
        if (i + 1) % batch == 0 {
            report.stats.pauses += 1;
            debug!(
                "Checked {}/{}, pausing {:?}",
                i + 1,
                candidates.len(),
                pacing.pause_duration
            );
            tokio::time::sleep(pacing.pause_duration).await;
        } else if !pacing.delay_between_requests.is_zero() {
            tokio::time::sleep(pacing.delay_between_requests).await;
        }
    }

    info!(
        "🏷️ {} of {} NFTs on sale ({} errors, {} rate limited)",
        report.stats.on_sale,
        report.stats.total_checked,
        report.stats.errors,
        report.stats.rate_limit_errors
    );
    report
}
