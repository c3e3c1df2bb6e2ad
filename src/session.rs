//! Session orchestration: owns the entity set, filter state, selection,
//! portfolio, viewport, and simulator, and drives the refresh cycle.
//!
//! Refreshes are keyed by generation. Entities are replaced wholesale on each
//! ingest; synthesis and filtering are pure recomputations, so re-running
//! them on any upstream change is always safe.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::detail::{detail_context, DetailContext};
use crate::feed::{derive_secondary, Generation, GenerationCounter, MarketSource, ValidatorSource};
use crate::filter::{apply_filters, render_order, CommitOutcome, FilterCriteria, FilterState, Flagged};
use crate::logging::{self, obj, v_num, v_str, Domain, Level};
use crate::sim::{Portfolio, RunOutcome, SimPhase, SimulationResult, Simulator, SlotId, StrategyMode};
use crate::state::{Config, DateRange};
use crate::synth::{synthesize, Entity, PriceStats, RawEntity};
use crate::viewport::{compute_frame, Point, PointerUp, RenderState, Viewport};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssetStats {
    pub price: f64,
    pub change_pct: f64,
    pub sparkline: Vec<f64>,
}

impl AssetStats {
    fn from_series(prices: Vec<f64>) -> Self {
        let stats = PriceStats::from_series(&prices);
        Self { price: stats.end, change_pct: stats.change * 100.0, sparkline: prices }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketSnapshot {
    pub primary: AssetStats,
    pub secondary: AssetStats,
}

/// Which asset's series the simulator replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaseAsset {
    Primary,
    Secondary,
}

pub struct DashboardSession {
    cfg: Config,
    generation: GenerationCounter,
    entities: Vec<Flagged>,
    filters: FilterState,
    selection: Option<String>,
    portfolio: Portfolio,
    viewport: Viewport,
    simulator: Simulator,
    market: MarketSnapshot,
}

impl DashboardSession {
    pub fn new(cfg: Config, date_range: DateRange) -> Self {
        Self {
            viewport: Viewport::new(cfg.clone()),
            simulator: Simulator::new(cfg.clone()),
            cfg,
            generation: GenerationCounter::new(),
            entities: Vec::new(),
            filters: FilterState::new(date_range),
            selection: None,
            portfolio: Portfolio::new(),
            market: MarketSnapshot::default(),
        }
    }

    pub fn date_range(&self) -> DateRange {
        self.filters.committed().date_range
    }

    pub fn market(&self) -> &MarketSnapshot {
        &self.market
    }

    pub fn entities(&self) -> &[Flagged] {
        &self.entities
    }

    pub fn matched_count(&self) -> usize {
        self.entities.iter().filter(|f| f.matched).count()
    }

    // -------------------------------------------------------------------------
    // Refresh cycle
    // -------------------------------------------------------------------------

    /// Start a new refresh: bumps the generation so any in-flight fetch for
    /// an older range is superseded, not queued behind.
    pub fn begin_refresh(&self) -> Generation {
        let generation = self.generation.next();
        logging::log(
            Level::Debug,
            Domain::System,
            "refresh_started",
            obj(&[("generation", json!(generation.0))]),
        );
        generation
    }

    /// Fetch and ingest in one step. Upstream failure degrades to an empty
    /// entity list; it never surfaces as an error to the caller.
    pub async fn refresh(
        &mut self,
        market: &dyn MarketSource,
        validators: &dyn ValidatorSource,
    ) -> Result<()> {
        let generation = self.begin_refresh();
        let range = self.date_range();

        let prices = match market.price_range(&range).await {
            Ok(prices) => prices,
            Err(err) => {
                logging::log(
                    Level::Warn,
                    Domain::Market,
                    "price_fetch_failed",
                    obj(&[("error", v_str(&format!("{:#}", err)))]),
                );
                Vec::new()
            }
        };
        let raw = match validators.validators().await {
            Ok(raw) => raw,
            Err(err) => {
                logging::log(
                    Level::Warn,
                    Domain::Market,
                    "validator_fetch_failed",
                    obj(&[("error", v_str(&format!("{:#}", err)))]),
                );
                Vec::new()
            }
        };

        self.ingest(generation, prices, raw);
        Ok(())
    }

    /// Land a fetch response. Returns false (and changes nothing) when the
    /// response belongs to a superseded generation.
    pub fn ingest(&mut self, generation: Generation, prices: Vec<f64>, raw: Vec<RawEntity>) -> bool {
        if !self.generation.is_current(generation) {
            logging::log_stale_discard(generation.0, self.generation.current().0);
            return false;
        }

        let secondary = derive_secondary(&prices, &self.cfg);
        let salt = self.date_range().salt();
        let entities = synthesize(&raw, &prices, &salt, &self.cfg);
        logging::log(
            Level::Debug,
            Domain::Synth,
            "synthesized",
            obj(&[("raw", json!(raw.len())), ("entities", json!(entities.len()))]),
        );

        self.market = MarketSnapshot {
            primary: AssetStats::from_series(prices),
            secondary: AssetStats::from_series(secondary),
        };
        self.entities = apply_filters(&entities, self.filters.committed());
        render_order(&mut self.entities);

        // Wholesale replacement can invalidate the previous selection.
        let selection_stale = match self.selection.as_deref() {
            Some(key) => !self.entities.iter().any(|f| f.matched && f.entity.key == key),
            None => false,
        };
        if selection_stale {
            self.selection = None;
        }

        logging::log_refresh(
            generation.0,
            self.entities.len(),
            self.matched_count(),
            self.market.primary.sparkline.len(),
        );
        true
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    pub fn pending_filters(&self) -> &FilterCriteria {
        self.filters.pending()
    }

    pub fn edit_filters(&mut self, f: impl FnOnce(&mut FilterCriteria)) {
        self.filters.edit(f);
    }

    /// Apply the pending criteria. Clears the selection, re-flags the entity
    /// set, and reports whether the date range moved (in which case the
    /// caller should kick off a new refresh).
    pub fn commit_filters(&mut self) -> CommitOutcome {
        let outcome = self.filters.commit();
        if outcome.changed {
            self.selection = None;
            let entities: Vec<Entity> =
                self.entities.iter().map(|f| f.entity.clone()).collect();
            self.entities = apply_filters(&entities, self.filters.committed());
            render_order(&mut self.entities);
            logging::log(
                Level::Info,
                Domain::Filter,
                "criteria_committed",
                obj(&[
                    ("matched", json!(self.matched_count())),
                    ("total", json!(self.entities.len())),
                    ("date_range_changed", json!(outcome.date_range_changed)),
                ]),
            );
        }
        outcome
    }

    // -------------------------------------------------------------------------
    // Viewport & selection
    // -------------------------------------------------------------------------

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport.set_size(width, height);
    }

    pub fn on_wheel(&mut self, delta_y: f64) {
        self.viewport.on_wheel(delta_y);
    }

    pub fn on_pointer_down(&mut self, p: Point) {
        self.viewport.on_pointer_down(p);
    }

    pub fn on_pointer_move(&mut self, p: Point) {
        self.viewport.on_pointer_move(p);
    }

    pub fn on_pointer_leave(&mut self) {
        self.viewport.on_pointer_leave();
    }

    /// A click on empty space clears the selection; a pan leaves it alone.
    pub fn on_pointer_up(&mut self, p: Point) -> PointerUp {
        let outcome = self.viewport.on_pointer_up(p);
        if outcome == PointerUp::Click {
            self.selection = None;
        }
        outcome
    }

    /// Select a matched entity by key; selecting it again deselects.
    /// Unmatched entities are non-interactive.
    pub fn toggle_select(&mut self, key: &str) -> bool {
        let interactive = self.entities.iter().any(|f| f.matched && f.entity.key == key);
        if !interactive {
            return false;
        }
        if self.selection.as_deref() == Some(key) {
            self.selection = None;
        } else {
            self.selection = Some(key.to_string());
        }
        true
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn selected_entity(&self) -> Option<&Entity> {
        let key = self.selection.as_deref()?;
        self.entities.iter().find(|f| f.entity.key == key).map(|f| &f.entity)
    }

    /// One emphasis tick: screen coordinates and live radii for every
    /// matched entity under the current pan/zoom and pointer position.
    pub fn frame(&self) -> Vec<RenderState> {
        compute_frame(&self.entities, &self.viewport)
    }

    pub fn detail(&self) -> Option<DetailContext> {
        let entity = self.selected_entity()?;
        detail_context(entity, &self.market.primary.sparkline)
    }

    // -------------------------------------------------------------------------
    // Portfolio & simulation
    // -------------------------------------------------------------------------

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn assign_selected_to_slot(&mut self, id: SlotId) -> bool {
        match self.selected_entity().cloned() {
            Some(entity) => {
                self.portfolio.assign(id, entity);
                true
            }
            None => false,
        }
    }

    pub fn assign_slot(&mut self, id: SlotId, entity: Entity) {
        self.portfolio.assign(id, entity);
    }

    pub fn clear_slot(&mut self, id: SlotId) {
        self.portfolio.clear(id);
    }

    pub fn set_slot_weight(&mut self, id: SlotId, weight: u32) {
        self.portfolio.set_weight(id, weight);
    }

    pub fn sim_phase(&self) -> SimPhase {
        self.simulator.phase()
    }

    pub fn simulation(&self) -> Option<&SimulationResult> {
        self.simulator.last_result()
    }

    pub fn reset_simulation(&mut self) {
        self.simulator.reset();
    }

    pub fn run_backtest(
        &mut self,
        initial_capital: f64,
        mode: StrategyMode,
        base: BaseAsset,
    ) -> RunOutcome {
        let prices = match base {
            BaseAsset::Primary => &self.market.primary.sparkline,
            BaseAsset::Secondary => &self.market.secondary.sparkline,
        };
        self.simulator.run(&self.portfolio, prices, initial_capital, mode)
    }

    /// Snapshot summary line for the refresh loop.
    pub fn log_snapshot(&self) {
        logging::log(
            Level::Info,
            Domain::System,
            "snapshot",
            obj(&[
                ("entities", json!(self.entities.len())),
                ("matched", json!(self.matched_count())),
                ("primary_price", v_num(self.market.primary.price)),
                ("primary_change_pct", v_num(self.market.primary.change_pct)),
                ("selection", self.selection.as_deref().map(v_str).unwrap_or(serde_json::Value::Null)),
            ]),
        );
    }
}
