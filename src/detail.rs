//! Detail-panel context for a selected entity: a short price/accumulation
//! history, a transaction-mix composition, and a one-line summary. Pure
//! derivation from the entity's feature vector and the market window.

use serde::Serialize;

use crate::synth::Entity;

const HISTORY_WINDOW: usize = 30;
const SUMMARY_DESC_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub label: String,
    pub price: f64,
    /// Day-over-day price change scaled by the entity's size and correlation.
    pub net_buy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionSlice {
    pub name: &'static str,
    pub value: u32,
    pub fill: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailContext {
    pub history: Vec<HistoryPoint>,
    pub composition: Vec<CompositionSlice>,
    pub summary: String,
}

/// Build the detail context, or nothing when no market window exists yet.
pub fn detail_context(entity: &Entity, prices: &[f64]) -> Option<DetailContext> {
    if prices.is_empty() {
        return None;
    }
    let take = prices.len().min(HISTORY_WINDOW);
    let window = &prices[prices.len() - take..];

    let node_factor = entity.scale_volume / 100_000.0;
    let history = window
        .iter()
        .enumerate()
        .map(|(i, &price)| {
            let prev = if i > 0 { window[i - 1] } else { price };
            let change = price - prev;
            HistoryPoint {
                label: format!("T-{}", take - 1 - i),
                price,
                net_buy: change * 10_000.0 * node_factor * (1.0 + entity.correlation),
            }
        })
        .collect();

    let composition = vec![
        CompositionSlice {
            name: "Swap",
            value: (entity.primary_share * 60.0).floor() as u32,
            fill: "#fb7185",
        },
        CompositionSlice {
            name: "IBC",
            value: (entity.secondary_share * 30.0).floor() as u32 + 10,
            fill: "#22d3ee",
        },
        CompositionSlice { name: "Stake", value: 30, fill: "#a78bfa" },
    ];

    let desc = if entity.description.len() > SUMMARY_DESC_LIMIT {
        let cut: String = entity.description.chars().take(SUMMARY_DESC_LIMIT).collect();
        format!("{}...", cut)
    } else {
        entity.description.clone()
    };
    let summary = format!(
        "High impact node with {:.1}k voting power. {}",
        entity.scale_volume / 1000.0,
        desc
    );

    Some(DetailContext { history, composition, summary })
}
