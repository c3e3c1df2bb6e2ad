//! Multi-factor filter matching. Pure: criteria never mutate entities, and a
//! criteria set at its neutral defaults matches everything.

use serde::{Deserialize, Serialize};

use crate::state::DateRange;
use crate::synth::{Entity, TimingClass};

/// Dual-ended range; excludes values strictly outside [min, max].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Recency bucket: maximum days since last activity, or no constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecencyWindow {
    Days(u32),
    All,
}

impl RecencyWindow {
    pub fn admits(&self, recency_days: u32) -> bool {
        match self {
            RecencyWindow::Days(limit) => recency_days <= *limit,
            RecencyWindow::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingFilter {
    All,
    Class(TimingClass),
}

impl TimingFilter {
    pub fn admits(&self, class: TimingClass) -> bool {
        match self {
            TimingFilter::All => true,
            TimingFilter::Class(c) => *c == class,
        }
    }
}

/// One named constraint per feature. Scalar fields are lower bounds; bands
/// are dual ranges; categoricals carry an "All" wildcard. `Default` is the
/// neutral set that excludes nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub date_range: DateRange,
    pub min_volume: f64,
    pub min_avg_trade_size: f64,
    pub net_buy_ratio: Band,
    pub min_tx_count: u64,
    pub min_primary_share: f64,
    pub min_secondary_share: f64,
    pub min_aux_share: f64,
    pub min_active_days: u32,
    pub recency: RecencyWindow,
    pub min_impact_score: f64,
    pub timing: TimingFilter,
    pub correlation: Band,
}

impl FilterCriteria {
    pub fn neutral(date_range: DateRange) -> Self {
        Self {
            date_range,
            min_volume: 0.0,
            min_avg_trade_size: 0.0,
            net_buy_ratio: Band::new(-1.0, 1.0),
            min_tx_count: 0,
            min_primary_share: 0.0,
            min_secondary_share: 0.0,
            min_aux_share: 0.0,
            min_active_days: 0,
            recency: RecencyWindow::All,
            min_impact_score: 0.0,
            timing: TimingFilter::All,
            correlation: Band::new(-1.0, 1.0),
        }
    }

    pub fn matches(&self, e: &Entity) -> bool {
        e.scale_volume >= self.min_volume
            && e.avg_trade_size >= self.min_avg_trade_size
            && self.net_buy_ratio.contains(e.net_buy_ratio)
            && e.tx_count >= self.min_tx_count
            && e.primary_share >= self.min_primary_share
            && e.secondary_share >= self.min_secondary_share
            && e.aux_share >= self.min_aux_share
            && e.active_days >= self.min_active_days
            && self.recency.admits(e.recency_days)
            && e.impact_score >= self.min_impact_score
            && self.timing.admits(e.timing_class)
            && self.correlation.contains(e.correlation)
    }
}

/// An entity plus its committed-criteria verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flagged {
    pub entity: Entity,
    pub matched: bool,
}

/// Evaluate every criterion against every entity (AND semantics). Order and
/// identity are preserved; only the flag is attached.
pub fn apply_filters(entities: &[Entity], criteria: &FilterCriteria) -> Vec<Flagged> {
    entities
        .iter()
        .map(|e| Flagged { entity: e.clone(), matched: criteria.matches(e) })
        .collect()
}

/// Stable draw-priority reorder: non-matching entities first, matched last so
/// they paint on top. Match flags are untouched.
pub fn render_order(flagged: &mut [Flagged]) {
    flagged.sort_by_key(|f| f.matched);
}

/// What changed when the pending set was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub changed: bool,
    pub date_range_changed: bool,
}

/// Two copies of the criteria: a pending set the user edits freely, and the
/// committed set that actually gates matching. The only transition between
/// them is `commit()`.
#[derive(Debug, Clone)]
pub struct FilterState {
    pending: FilterCriteria,
    committed: FilterCriteria,
}

impl FilterState {
    pub fn new(date_range: DateRange) -> Self {
        let neutral = FilterCriteria::neutral(date_range);
        Self { pending: neutral.clone(), committed: neutral }
    }

    pub fn pending(&self) -> &FilterCriteria {
        &self.pending
    }

    pub fn committed(&self) -> &FilterCriteria {
        &self.committed
    }

    /// Edit the pending set. The committed set (and therefore the displayed
    /// match flags) is unaffected until `commit()`.
    pub fn edit(&mut self, f: impl FnOnce(&mut FilterCriteria)) {
        f(&mut self.pending);
    }

    pub fn commit(&mut self) -> CommitOutcome {
        let changed = self.pending != self.committed;
        let date_range_changed = self.pending.date_range != self.committed.date_range;
        self.committed = self.pending.clone();
        CommitOutcome { changed, date_range_changed }
    }

    /// Discard pending edits, restoring them to the committed set.
    pub fn revert(&mut self) {
        self.pending = self.committed.clone();
    }
}
