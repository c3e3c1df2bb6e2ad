use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct Config {
    // Synthesis
    pub min_weight: f64,
    pub token_denom: f64,
    pub share_nudge: f64,
    pub change_band: f64,
    pub entropy_gain: f64,
    pub impact_noise_gain: f64,
    pub impact_floor: f64,
    pub dominant_high: f64,
    pub dominant_low: f64,
    pub secondary_price_scale: f64,
    pub secondary_price_wobble: f64,
    // Viewport
    pub chart_padding: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub wheel_sensitivity: f64,
    pub click_threshold_px: f64,
    pub trigger_radius: f64,
    pub emphasis_gain: f64,
    pub radius_min: f64,
    pub radius_max: f64,
    pub frame_rate: u64,
    // Simulator
    pub sim_window_days: usize,
    pub ma_window: usize,
    pub buy_band: f64,
    pub sell_band: f64,
    pub signal_gate: f64,
    pub position_fraction: f64,
    pub cash_epsilon: f64,
    // Feeds
    pub market_base: String,
    pub staking_base: String,
    pub validator_page_limit: u32,
    pub refresh_secs: u64,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            min_weight: env_f64("MIN_WEIGHT", 1.0),
            token_denom: env_f64("TOKEN_DENOM", 1_000_000.0),
            share_nudge: env_f64("SHARE_NUDGE", 0.2),
            change_band: env_f64("CHANGE_BAND", 0.1),
            entropy_gain: env_f64("ENTROPY_GAIN", 2.0),
            impact_noise_gain: env_f64("IMPACT_NOISE_GAIN", 10.0),
            impact_floor: env_f64("IMPACT_FLOOR", 5.0),
            dominant_high: env_f64("DOMINANT_HIGH", 0.6),
            dominant_low: env_f64("DOMINANT_LOW", 0.4),
            secondary_price_scale: env_f64("SECONDARY_PRICE_SCALE", 0.3),
            secondary_price_wobble: env_f64("SECONDARY_PRICE_WOBBLE", 0.05),
            chart_padding: env_f64("CHART_PADDING", 60.0),
            zoom_min: env_f64("ZOOM_MIN", 0.5),
            zoom_max: env_f64("ZOOM_MAX", 5.0),
            wheel_sensitivity: env_f64("WHEEL_SENSITIVITY", 0.001),
            click_threshold_px: env_f64("CLICK_THRESHOLD_PX", 5.0),
            trigger_radius: env_f64("TRIGGER_RADIUS", 200.0),
            emphasis_gain: env_f64("EMPHASIS_GAIN", 1.0),
            radius_min: env_f64("RADIUS_MIN", 4.0),
            radius_max: env_f64("RADIUS_MAX", 45.0),
            frame_rate: env_u64("FRAME_RATE", 60),
            sim_window_days: env_u64("SIM_WINDOW_DAYS", 90) as usize,
            ma_window: env_u64("MA_WINDOW", 6) as usize,
            buy_band: env_f64("BUY_BAND", 0.98),
            sell_band: env_f64("SELL_BAND", 1.02),
            signal_gate: env_f64("SIGNAL_GATE", 0.2),
            position_fraction: env_f64("POSITION_FRACTION", 0.5),
            cash_epsilon: env_f64("CASH_EPSILON", 0.1),
            market_base: std::env::var("MARKET_BASE")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3/coins/cosmos".to_string()),
            staking_base: std::env::var("STAKING_BASE").unwrap_or_else(|_| {
                "https://rest.cosmos.directory/cosmoshub/cosmos/staking/v1beta1".to_string()
            }),
            validator_page_limit: env_u64("VALIDATOR_PAGE_LIMIT", 200) as u32,
            refresh_secs: env_u64("REFRESH_SECS", 300),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Inclusive date window driving both the fetch window and the synthesis salt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .with_context(|| format!("bad start date {}", start))?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .with_context(|| format!("bad end date {}", end))?;
        Ok(Self { start, end })
    }

    /// DATE_START/DATE_END, defaulting to the trailing 30 days.
    pub fn from_env() -> Result<Self> {
        let today = Utc::now().date_naive();
        let start = match std::env::var("DATE_START") {
            Ok(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .with_context(|| format!("bad DATE_START {}", v))?,
            Err(_) => today - Duration::days(30),
        };
        let end = match std::env::var("DATE_END") {
            Ok(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .with_context(|| format!("bad DATE_END {}", v))?,
            Err(_) => today,
        };
        Ok(Self { start, end })
    }

    pub fn last_days(days: i64) -> Self {
        let today = Utc::now().date_naive();
        Self { start: today - Duration::days(days), end: today }
    }

    pub fn start_ts(&self) -> i64 {
        self.start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0)
    }

    pub fn end_ts(&self) -> i64 {
        self.end.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0)
    }

    pub fn salt(&self) -> ContextSalt {
        ContextSalt {
            text: format!("{}{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d")),
            start_ts: self.start_ts(),
            end_ts: self.end_ts(),
        }
    }
}

/// Salt fed into every per-entity derivation. Two refreshes over the same
/// window produce identical salts, hence identical feature vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextSalt {
    pub text: String,
    pub start_ts: i64,
    pub end_ts: i64,
}

pub fn now_ts() -> u64 {
    Utc::now().timestamp() as u64
}
