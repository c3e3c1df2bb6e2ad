//! Portfolio backtest simulator: three weighted slots replay a moving-average
//! plus oscillator rule over a historical price series. One synchronous batch
//! per run, fully deterministic given its inputs.

use serde::Serialize;

use crate::logging;
use crate::state::Config;
use crate::synth::Entity;

pub const SLOT_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotId {
    A,
    B,
    C,
}

impl SlotId {
    pub fn all() -> [SlotId; SLOT_COUNT] {
        [SlotId::A, SlotId::B, SlotId::C]
    }

    fn index(&self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
            SlotId::C => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SlotId::A => "A",
            SlotId::B => "B",
            SlotId::C => "C",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSlot {
    pub id: SlotId,
    pub entity: Option<Entity>,
    /// Integer percentage of initial capital. All three always sum to 100.
    pub weight: u32,
    pub color: &'static str,
}

/// Ordered set of exactly three slots. Weight invariant: the three weights
/// sum to 100 after every operation; `set_weight` redistributes the
/// remainder proportionally and parks rounding residue on one slot.
#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    slots: [PortfolioSlot; SLOT_COUNT],
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::new()
    }
}

impl Portfolio {
    pub fn new() -> Self {
        Self {
            slots: [
                PortfolioSlot { id: SlotId::A, entity: None, weight: 50, color: "#F43F5E" },
                PortfolioSlot { id: SlotId::B, entity: None, weight: 30, color: "#06B6D4" },
                PortfolioSlot { id: SlotId::C, entity: None, weight: 20, color: "#8B5CF6" },
            ],
        }
    }

    pub fn slots(&self) -> &[PortfolioSlot; SLOT_COUNT] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> &PortfolioSlot {
        &self.slots[id.index()]
    }

    pub fn assign(&mut self, id: SlotId, entity: Entity) {
        self.slots[id.index()].entity = Some(entity);
    }

    pub fn clear(&mut self, id: SlotId) {
        self.slots[id.index()].entity = None;
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entity.is_some()).count()
    }

    /// Weight held by occupied slots; the rest is idle capital.
    pub fn assigned_weight(&self) -> u32 {
        self.slots.iter().filter(|s| s.entity.is_some()).map(|s| s.weight).sum()
    }

    pub fn total_weight(&self) -> u32 {
        self.slots.iter().map(|s| s.weight).sum()
    }

    /// Set one slot's weight and redistribute the remainder across the other
    /// two in proportion to their previous weights (equal split when both
    /// were zero). Integer floors throughout; the rounding residue lands on
    /// the first other slot so the total is exactly 100.
    pub fn set_weight(&mut self, id: SlotId, weight: u32) {
        let target = id.index();
        let new_weight = weight.min(100);
        let remaining = 100 - new_weight;

        let other_sum: u32 =
            self.slots.iter().enumerate().filter(|(i, _)| *i != target).map(|(_, s)| s.weight).sum();

        self.slots[target].weight = new_weight;
        for i in 0..SLOT_COUNT {
            if i == target {
                continue;
            }
            self.slots[i].weight = if other_sum == 0 {
                remaining / (SLOT_COUNT as u32 - 1)
            } else {
                remaining * self.slots[i].weight / other_sum
            };
        }

        let total = self.total_weight();
        if total != 100 {
            let residual_slot = (0..SLOT_COUNT).find(|i| *i != target).unwrap_or(0);
            self.slots[residual_slot].weight += 100 - total;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrategyMode {
    /// Mirror both buy and sell decisions.
    CopyAll,
    /// Sell decisions are downgraded to hold.
    BuyOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Decision rule for one slot-day: price against the trailing mean band,
/// gated by the oscillating signal.
fn decide(price: f64, moving_avg: f64, signal: f64, mode: StrategyMode, cfg: &Config) -> TradeAction {
    if price < moving_avg * cfg.buy_band && signal > cfg.signal_gate {
        TradeAction::Buy
    } else if price > moving_avg * cfg.sell_band && signal < -cfg.signal_gate {
        match mode {
            StrategyMode::BuyOnly => TradeAction::Hold,
            StrategyMode::CopyAll => TradeAction::Sell,
        }
    } else {
        TradeAction::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub day: usize,
    /// Percent of initial capital.
    pub value: f64,
    pub raw_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub roi: f64,
    pub profit: f64,
    pub timeline: Vec<TimelinePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimPhase {
    Idle,
    Running,
    Complete,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(SimulationResult),
    /// No slot holds an entity; the run is a no-op, not an error.
    NothingToSimulate,
    /// Price data unavailable; the run refuses rather than dividing by air.
    NoPriceData,
}

struct SlotSim {
    cash: f64,
    holdings: f64,
    seed: f64,
}

/// State machine per run: Idle -> Running -> {Complete | Aborted}. Results
/// are recomputed wholesale each run, never updated incrementally.
pub struct Simulator {
    cfg: Config,
    phase: SimPhase,
    last: Option<SimulationResult>,
}

impl Simulator {
    pub fn new(cfg: Config) -> Self {
        Self { cfg, phase: SimPhase::Idle, last: None }
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn last_result(&self) -> Option<&SimulationResult> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.phase = SimPhase::Idle;
        self.last = None;
    }

    pub fn run(
        &mut self,
        portfolio: &Portfolio,
        prices: &[f64],
        initial_capital: f64,
        mode: StrategyMode,
    ) -> RunOutcome {
        if portfolio.occupied_count() == 0 || initial_capital <= 0.0 {
            self.phase = SimPhase::Idle;
            logging::log_sim_outcome("nothing_to_simulate", None, 0);
            return RunOutcome::NothingToSimulate;
        }
        self.phase = SimPhase::Running;

        let trim = self.cfg.sim_window_days.max(1);
        let sim_prices = if prices.len() > trim { &prices[prices.len() - trim..] } else { prices };
        if sim_prices.is_empty() {
            self.phase = SimPhase::Aborted;
            logging::log_sim_outcome("aborted_no_prices", None, 0);
            return RunOutcome::NoPriceData;
        }

        let mut slot_sims: Vec<Option<SlotSim>> = portfolio
            .slots()
            .iter()
            .map(|slot| {
                slot.entity.as_ref().map(|e| SlotSim {
                    cash: initial_capital * slot.weight as f64 / 100.0,
                    holdings: 0.0,
                    seed: e.key.len() as f64 + e.impact_score,
                })
            })
            .collect();

        let idle_capital =
            initial_capital * (100 - portfolio.assigned_weight()) as f64 / 100.0;
        let lookback = self.cfg.ma_window.max(1) - 1;

        let mut timeline = Vec::with_capacity(sim_prices.len());
        let mut final_value = initial_capital;

        for (day, &price) in sim_prices.iter().enumerate() {
            let win_start = day.saturating_sub(lookback);
            let window = &sim_prices[win_start..=day];
            let moving_avg = window.iter().sum::<f64>() / window.len() as f64;

            let mut day_value = 0.0;
            for sim in slot_sims.iter_mut().flatten() {
                let signal = (day as f64 + sim.seed).sin();
                match decide(price, moving_avg, signal, mode, &self.cfg) {
                    TradeAction::Buy if sim.cash > self.cfg.cash_epsilon => {
                        let trade = sim.cash * self.cfg.position_fraction;
                        sim.cash -= trade;
                        sim.holdings += trade / price;
                    }
                    TradeAction::Sell if sim.holdings > 0.0 => {
                        let units = sim.holdings * self.cfg.position_fraction;
                        sim.holdings -= units;
                        sim.cash += units * price;
                    }
                    _ => {}
                }
                day_value += sim.cash + sim.holdings * price;
            }
            day_value += idle_capital;

            timeline.push(TimelinePoint {
                day,
                value: day_value / initial_capital * 100.0,
                raw_value: day_value,
            });
            final_value = day_value;
        }

        let profit = final_value - initial_capital;
        let roi = profit / initial_capital * 100.0;
        let result = SimulationResult { roi, profit, timeline };

        self.phase = SimPhase::Complete;
        self.last = Some(result.clone());
        logging::log_sim_outcome("complete", Some(roi), sim_prices.len());
        RunOutcome::Completed(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{Dominance, TimingClass};

    fn test_cfg() -> Config {
        Config::from_env()
    }

    fn entity(key: &str, impact: f64) -> Entity {
        Entity {
            key: key.to_string(),
            name: key.to_string(),
            dominance: Dominance::Mixed,
            scale_volume: 1000.0,
            avg_trade_size: 10.0,
            net_buy_ratio: 0.0,
            tx_count: 100,
            primary_share: 0.5,
            secondary_share: 0.5,
            aux_share: 0.2,
            active_days: 10,
            recency_days: 1,
            impact_score: impact,
            timing_class: TimingClass::Sync,
            timing_score: 50.0,
            correlation: 0.0,
            x_metric: 40.0,
            y_metric: 40.0,
            description: String::new(),
        }
    }

    // =========================================================================
    // Portfolio weight invariant
    // =========================================================================

    #[test]
    fn test_initial_weights_sum_to_100() {
        assert_eq!(Portfolio::new().total_weight(), 100);
    }

    #[test]
    fn test_set_weight_preserves_sum() {
        let mut p = Portfolio::new();
        for w in [0, 1, 17, 33, 50, 99, 100, 250] {
            p.set_weight(SlotId::A, w);
            assert_eq!(p.total_weight(), 100, "after A={}", w);
            p.set_weight(SlotId::C, w / 2);
            assert_eq!(p.total_weight(), 100, "after C={}", w / 2);
        }
    }

    #[test]
    fn test_set_weight_clamps_to_100() {
        let mut p = Portfolio::new();
        p.set_weight(SlotId::B, 400);
        assert_eq!(p.slot(SlotId::B).weight, 100);
        assert_eq!(p.slot(SlotId::A).weight, 0);
        assert_eq!(p.slot(SlotId::C).weight, 0);
    }

    #[test]
    fn test_set_weight_proportional_redistribution() {
        let mut p = Portfolio::new(); // 50/30/20
        p.set_weight(SlotId::A, 0);
        // Remaining 100 split 30:20 across B and C -> 60/40.
        assert_eq!(p.slot(SlotId::B).weight, 60);
        assert_eq!(p.slot(SlotId::C).weight, 40);
    }

    #[test]
    fn test_set_weight_equal_split_when_others_zero() {
        let mut p = Portfolio::new();
        p.set_weight(SlotId::A, 100); // others now 0/0
        p.set_weight(SlotId::A, 40);
        // 60 split equally with residue on the first other slot.
        assert_eq!(p.slot(SlotId::B).weight, 30);
        assert_eq!(p.slot(SlotId::C).weight, 30);
        assert_eq!(p.total_weight(), 100);
    }

    #[test]
    fn test_set_weight_residual_keeps_exact_sum() {
        let mut p = Portfolio::new();
        p.set_weight(SlotId::A, 34); // 66 across 30:20 floors to 39/26 = 99
        assert_eq!(p.total_weight(), 100);
        assert!(p.slots().iter().all(|s| s.weight <= 100));
    }

    // =========================================================================
    // Decision rule
    // =========================================================================

    #[test]
    fn test_decide_buy_needs_both_conditions() {
        let cfg = test_cfg();
        assert_eq!(decide(9.0, 10.0, 0.5, StrategyMode::CopyAll, &cfg), TradeAction::Buy);
        // Price dip without signal confirmation holds.
        assert_eq!(decide(9.0, 10.0, 0.1, StrategyMode::CopyAll, &cfg), TradeAction::Hold);
        // Signal without a dip holds.
        assert_eq!(decide(10.0, 10.0, 0.5, StrategyMode::CopyAll, &cfg), TradeAction::Hold);
    }

    #[test]
    fn test_decide_sell_downgraded_in_buy_only() {
        let cfg = test_cfg();
        assert_eq!(decide(11.0, 10.0, -0.5, StrategyMode::CopyAll, &cfg), TradeAction::Sell);
        assert_eq!(decide(11.0, 10.0, -0.5, StrategyMode::BuyOnly, &cfg), TradeAction::Hold);
    }

    #[test]
    fn test_decide_band_is_strict() {
        let cfg = test_cfg();
        // Exactly at the band edges no trigger fires.
        assert_eq!(decide(9.8, 10.0, 0.9, StrategyMode::CopyAll, &cfg), TradeAction::Hold);
        assert_eq!(decide(10.2, 10.0, -0.9, StrategyMode::CopyAll, &cfg), TradeAction::Hold);
    }

    // =========================================================================
    // Simulator state machine
    // =========================================================================

    #[test]
    fn test_empty_portfolio_stays_idle() {
        let mut sim = Simulator::new(test_cfg());
        let outcome = sim.run(&Portfolio::new(), &[10.0, 11.0], 100.0, StrategyMode::CopyAll);
        assert_eq!(outcome, RunOutcome::NothingToSimulate);
        assert_eq!(sim.phase(), SimPhase::Idle);
        assert!(sim.last_result().is_none());
    }

    #[test]
    fn test_empty_prices_abort() {
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v1", 50.0));
        let outcome = sim.run(&p, &[], 100.0, StrategyMode::CopyAll);
        assert_eq!(outcome, RunOutcome::NoPriceData);
        assert_eq!(sim.phase(), SimPhase::Aborted);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v1", 50.0));
        sim.run(&p, &[10.0; 10], 100.0, StrategyMode::CopyAll);
        assert_eq!(sim.phase(), SimPhase::Complete);
        sim.reset();
        assert_eq!(sim.phase(), SimPhase::Idle);
        assert!(sim.last_result().is_none());
    }

    // =========================================================================
    // Scenario properties
    // =========================================================================

    #[test]
    fn test_constant_prices_never_trade() {
        // Moving average equals price every day; strict inequalities mean no
        // trigger ever fires, so the final value is exactly the capital.
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v1", 72.0));
        p.assign(SlotId::B, entity("v2", 31.0));
        let prices = vec![10.0; 30];
        match sim.run(&p, &prices, 100.0, StrategyMode::CopyAll) {
            RunOutcome::Completed(result) => {
                assert_eq!(result.roi, 0.0);
                assert_eq!(result.profit, 0.0);
                assert_eq!(result.timeline.len(), 30);
                for point in &result.timeline {
                    assert!((point.value - 100.0).abs() < 1e-9);
                }
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_buy_only_rising_market_never_loses() {
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.set_weight(SlotId::A, 100);
        p.assign(SlotId::A, entity("v1", 64.0));
        // 10 -> 20 monotonically over 90 points.
        let prices: Vec<f64> = (0..90).map(|i| 10.0 + 10.0 * i as f64 / 89.0).collect();
        match sim.run(&p, &prices, 100.0, StrategyMode::BuyOnly) {
            RunOutcome::Completed(result) => {
                assert!(result.roi >= 0.0, "buy-only on a rising series lost: {}", result.roi);
                let final_point = result.timeline.last().unwrap();
                assert!(final_point.raw_value >= 100.0 - 1e-9);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_rising_market_buy_only_profits_with_seeded_buyer() {
        // A seed whose early signal exceeds the gate guarantees at least one
        // buy during the initial dip-free ramp is impossible; instead feed a
        // series with early dips below the trailing mean so buys can fire.
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.set_weight(SlotId::A, 100);
        p.assign(SlotId::A, entity("v1", 64.0));
        let mut prices = Vec::with_capacity(90);
        for i in 0..90 {
            let trend = 10.0 + 10.0 * i as f64 / 89.0;
            let dip = if i % 7 == 3 { -0.8 } else { 0.0 };
            prices.push(trend + dip);
        }
        match sim.run(&p, &prices, 100.0, StrategyMode::BuyOnly) {
            RunOutcome::Completed(result) => {
                assert!(result.roi > 0.0, "expected profit, roi={}", result.roi);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_series_trimmed_to_window() {
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v1", 50.0));
        let prices = vec![10.0; 500];
        match sim.run(&p, &prices, 100.0, StrategyMode::CopyAll) {
            RunOutcome::Completed(result) => assert_eq!(result.timeline.len(), 90),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_capital_carried_without_trading() {
        // One occupied slot at weight 50: the other 50% rides along unchanged.
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v1", 50.0));
        let prices = vec![10.0; 20];
        match sim.run(&p, &prices, 200.0, StrategyMode::CopyAll) {
            RunOutcome::Completed(result) => {
                // Constant prices: occupied half never trades, idle half is
                // constant, so every day equals the full capital.
                for point in &result.timeline {
                    assert!((point.raw_value - 200.0).abs() < 1e-9);
                }
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_determinism_across_runs() {
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v-alpha", 64.0));
        p.assign(SlotId::B, entity("v-beta", 37.0));
        let prices: Vec<f64> =
            (0..120).map(|i| 10.0 + ((i as f64) * 0.7).sin() * 2.0).collect();
        let mut sim1 = Simulator::new(test_cfg());
        let mut sim2 = Simulator::new(test_cfg());
        let a = sim1.run(&p, &prices, 500.0, StrategyMode::CopyAll);
        let b = sim2.run(&p, &prices, 500.0, StrategyMode::CopyAll);
        assert_eq!(a, b);
    }

    #[test]
    fn test_timeline_normalized_to_percent_of_capital() {
        let mut sim = Simulator::new(test_cfg());
        let mut p = Portfolio::new();
        p.assign(SlotId::A, entity("v1", 50.0));
        let prices = vec![10.0; 15];
        match sim.run(&p, &prices, 400.0, StrategyMode::CopyAll) {
            RunOutcome::Completed(result) => {
                for point in &result.timeline {
                    assert!((point.value - point.raw_value / 400.0 * 100.0).abs() < 1e-9);
                }
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }
}
