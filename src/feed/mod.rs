//! External data sources. Fetches are fire-and-forget and keyed by a
//! generation number: a new date range bumps the generation, and any response
//! carrying a stale generation is discarded rather than merged.

pub mod market;
pub mod staking;

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::state::{Config, DateRange};
use crate::synth::RawEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Generation(pub u64);

/// Monotonic counter tagging each refresh. There is no cancellation token;
/// superseded fetches simply fail the `is_current` check on arrival.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.current()
    }
}

#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Ascending price series over the window. Empty is a valid answer.
    async fn price_range(&self, range: &DateRange) -> Result<Vec<f64>>;
}

#[async_trait]
pub trait ValidatorSource: Send + Sync {
    async fn validators(&self) -> Result<Vec<RawEntity>>;
}

/// Fixed in-memory series for tests and offline replay.
#[derive(Debug, Clone, Default)]
pub struct StaticMarket(pub Vec<f64>);

#[async_trait]
impl MarketSource for StaticMarket {
    async fn price_range(&self, _range: &DateRange) -> Result<Vec<f64>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticValidators(pub Vec<RawEntity>);

#[async_trait]
impl ValidatorSource for StaticValidators {
    async fn validators(&self) -> Result<Vec<RawEntity>> {
        Ok(self.0.clone())
    }
}

/// Derive the secondary asset's series from the primary one.
pub fn derive_secondary(prices: &[f64], cfg: &Config) -> Vec<f64> {
    prices
        .iter()
        .map(|p| p * cfg.secondary_price_scale + p.sin() * cfg.secondary_price_wobble)
        .collect()
}
