//! Offline replay: synthesize entities from a JSON record file, replay the
//! backtest over a CSV price series, print JSON result lines.
//!
//! Usage: backtest <prices.csv> <entities.json>
//!   prices.csv    one `ts,price` row per line (header and # comments skipped)
//!   entities.json array of { identity, display_name, weight, description? }

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use serde_json::json;

use aetherscope::filter::{apply_filters, FilterCriteria};
use aetherscope::sim::{Portfolio, RunOutcome, Simulator, SlotId, StrategyMode};
use aetherscope::state::{Config, DateRange};
use aetherscope::synth::{synthesize, RawEntity};

fn load_prices(path: &str) -> Result<Vec<f64>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path))?;
    let mut prices = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.to_lowercase().starts_with("ts,")
        {
            continue;
        }
        let price = trimmed
            .split(',')
            .nth(1)
            .with_context(|| format!("expected ts,price row, got {:?}", trimmed))?;
        prices.push(price.trim().parse()?);
    }
    Ok(prices)
}

fn load_entities(path: &str) -> Result<Vec<RawEntity>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path))?;
    serde_json::from_reader(BufReader::new(file)).context("entity JSON malformed")
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let prices_path = args.next().unwrap_or_else(|| "prices.csv".to_string());
    let entities_path = args.next().unwrap_or_else(|| "entities.json".to_string());

    let cfg = Config::from_env();
    let range = DateRange::from_env()?;
    let prices = load_prices(&prices_path)?;
    let raw = load_entities(&entities_path)?;

    let entities = synthesize(&raw, &prices, &range.salt(), &cfg);
    let flagged = apply_filters(&entities, &FilterCriteria::neutral(range));
    let matched = flagged.iter().filter(|f| f.matched).count();
    println!(
        "{}",
        json!({ "entities": entities.len(), "matched": matched, "prices": prices.len() })
    );

    let mut top: Vec<_> =
        flagged.into_iter().filter(|f| f.matched).map(|f| f.entity).collect();
    top.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));

    let mut portfolio = Portfolio::new();
    for (slot, entity) in SlotId::all().into_iter().zip(top.into_iter()) {
        portfolio.assign(slot, entity);
    }

    for mode in [StrategyMode::CopyAll, StrategyMode::BuyOnly] {
        let mut simulator = Simulator::new(cfg.clone());
        match simulator.run(&portfolio, &prices, 100.0, mode) {
            RunOutcome::Completed(result) => println!(
                "{}",
                json!({
                    "mode": format!("{:?}", mode),
                    "roi": result.roi,
                    "profit": result.profit,
                    "days": result.timeline.len(),
                    "final_value": result.timeline.last().map(|p| p.raw_value),
                })
            ),
            outcome => println!(
                "{}",
                json!({ "mode": format!("{:?}", mode), "outcome": format!("{:?}", outcome) })
            ),
        }
    }
    Ok(())
}
