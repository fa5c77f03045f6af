//! CoinGecko simple-price client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::cache::{PriceError, PriceSource};

/// Request timeout for a single price fetch
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    bitcoin: Option<FiatPrices>,
}

#[derive(Debug, Deserialize)]
struct FiatPrices {
    aud: Option<f64>,
}

/// Extract the BTC/AUD price from a `{"bitcoin":{"aud":...}}` body
pub fn parse_simple_price(body: &str) -> Result<f64, PriceError> {
    let response: SimplePriceResponse =
        serde_json::from_str(body).map_err(|e| PriceError::ParseError(e.to_string()))?;

    response
        .bitcoin
        .and_then(|prices| prices.aud)
        .ok_or_else(|| PriceError::ParseError("missing bitcoin.aud".to_string()))
}

/// CoinGecko HTTP price source
#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client: Client,
    url: String,
}

impl CoinGeckoSource {
    pub fn new(url: &str) -> Result<Self, PriceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch_btc_aud(&self) -> Result<f64, PriceError> {
        let resp = self.client.get(&self.url).send().await?;

        if !resp.status().is_success() {
            return Err(PriceError::Unavailable(format!(
                "price source returned {}",
                resp.status()
            )));
        }

        let body = resp.text().await?;
        parse_simple_price(&body)
    }
}
