//! HTTP price source shaped like the market_chart/range endpoint:
//! `{ "prices": [[ts_ms, price], ...] }`, ascending by time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::state::{Config, DateRange};

use super::MarketSource;

#[derive(Debug, Deserialize)]
struct MarketRangeDto {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

pub struct HttpMarketSource {
    client: Client,
    base: String,
}

impl HttpMarketSource {
    pub fn new(cfg: &Config) -> Self {
        Self { client: Client::new(), base: cfg.market_base.clone() }
    }
}

#[async_trait]
impl MarketSource for HttpMarketSource {
    async fn price_range(&self, range: &DateRange) -> Result<Vec<f64>> {
        let url = format!(
            "{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.base,
            range.start_ts(),
            range.end_ts()
        );
        let dto: MarketRangeDto = self
            .client
            .get(&url)
            .send()
            .await
            .context("market range request failed")?
            .error_for_status()
            .context("market range request rejected")?
            .json()
            .await
            .context("market range payload malformed")?;
        Ok(dto.prices.into_iter().map(|(_, price)| price).collect())
    }
}
