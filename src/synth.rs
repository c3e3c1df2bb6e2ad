//! Seeded metric synthesis: raw validator records + a price series in, an
//! immutable feature vector per entity out. Entities are rebuilt wholesale on
//! every refresh and never patched in place.

use serde::{Deserialize, Serialize};

use crate::seed::{RollingHash, SeedSource};
use crate::state::{Config, ContextSalt};

/// Upstream record before derivation: identity, label, raw stake/volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntity {
    pub identity: String,
    pub display_name: String,
    /// Stake or volume in whole units (already scaled out of micro-denom).
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingClass {
    Lead,
    Sync,
    Lag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dominance {
    PrimaryDominant,
    SecondaryDominant,
    Mixed,
}

impl Dominance {
    pub fn label(&self) -> &'static str {
        match self {
            Dominance::PrimaryDominant => "Primary Dominant",
            Dominance::SecondaryDominant => "Secondary Dominant",
            Dominance::Mixed => "Mixed",
        }
    }
}

/// Derived feature vector. Immutable after synthesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub key: String,
    pub name: String,
    pub dominance: Dominance,
    pub scale_volume: f64,
    pub avg_trade_size: f64,
    pub net_buy_ratio: f64,
    pub tx_count: u64,
    pub primary_share: f64,
    pub secondary_share: f64,
    pub aux_share: f64,
    pub active_days: u32,
    pub recency_days: u32,
    pub impact_score: f64,
    pub timing_class: TimingClass,
    pub timing_score: f64,
    pub correlation: f64,
    pub x_metric: f64,
    pub y_metric: f64,
    pub description: String,
}

/// Global statistics over the fetched price window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PriceStats {
    pub start: f64,
    pub end: f64,
    /// Fractional change over the window (0.1 = +10%).
    pub change: f64,
    /// Stddev of price divided by mean.
    pub volatility: f64,
}

impl PriceStats {
    pub fn from_series(prices: &[f64]) -> Self {
        if prices.is_empty() {
            return Self::default();
        }
        let start = prices[0];
        let end = prices[prices.len() - 1];
        let denom = if start != 0.0 { start } else { 1.0 };
        let change = (end - start) / denom;
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        let variance =
            prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
        let volatility = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };
        Self { start, end, change, volatility }
    }
}

pub fn classify(primary_share: f64, cfg: &Config) -> Dominance {
    if primary_share > cfg.dominant_high {
        Dominance::PrimaryDominant
    } else if primary_share < cfg.dominant_low {
        Dominance::SecondaryDominant
    } else {
        Dominance::Mixed
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn finite_or_midpoint(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        50.0
    }
}

/// Derive the full entity set for one refresh. Deterministic: identical
/// inputs always produce identical output. Records below the weight floor
/// are dropped as noise; an empty raw list yields an empty entity list.
pub fn synthesize(
    raw: &[RawEntity],
    prices: &[f64],
    salt: &ContextSalt,
    cfg: &Config,
) -> Vec<Entity> {
    let stats = PriceStats::from_series(prices);
    let seeder = RollingHash;

    let max_weight = raw.iter().map(|r| r.weight).fold(0.0_f64, f64::max);
    let log_max = {
        let lm = (max_weight + 1.0).log10();
        if lm > 0.0 {
            lm
        } else {
            1.0
        }
    };

    raw.iter()
        .filter(|r| r.weight >= cfg.min_weight)
        .map(|r| {
            let h = seeder.raw(&r.identity, &salt.text);
            let n = crate::seed::unit_from_raw(h);

            let mut primary_share = n;
            if stats.change > cfg.change_band {
                primary_share = clamp01(primary_share + cfg.share_nudge);
            } else if stats.change < -cfg.change_band {
                primary_share = clamp01(primary_share - cfg.share_nudge);
            }
            let entropy =
                ((h + salt.start_ts) as f64).sin() * stats.volatility * cfg.entropy_gain;
            primary_share = clamp01(primary_share + entropy);
            let secondary_share = 1.0 - primary_share;

            let log_vp = (r.weight + 1.0).log10();
            let noise = ((salt.end_ts + h) as f64).sin() * cfg.impact_noise_gain;
            let impact_score =
                ((log_vp / log_max) * 100.0 + noise).clamp(cfg.impact_floor, 100.0).floor();

            let x_metric = finite_or_midpoint(impact_score * primary_share);
            let y_metric = finite_or_midpoint(impact_score * secondary_share);

            let timing_class = match (n * 3.0).floor() as i64 {
                0 => TimingClass::Lead,
                1 => TimingClass::Sync,
                _ => TimingClass::Lag,
            };

            Entity {
                key: r.identity.clone(),
                name: r.display_name.clone(),
                dominance: classify(primary_share, cfg),
                scale_volume: r.weight,
                avg_trade_size: r.weight / 100.0,
                net_buy_ratio: n * 2.0 - 1.0,
                tx_count: (r.weight * 0.1).floor() as u64,
                primary_share,
                secondary_share,
                aux_share: ((h.wrapping_mul(3)).abs() % 100) as f64 / 100.0,
                active_days: ((h.wrapping_mul(7) + salt.start_ts).abs() % 30 + 1) as u32,
                recency_days: ((h.wrapping_mul(2)).abs() % 30) as u32,
                impact_score,
                timing_class,
                timing_score: (n * 100.0).floor(),
                correlation: n * 2.0 - 1.0,
                x_metric,
                y_metric,
                description: r.description.clone(),
            }
        })
        .collect()
}
