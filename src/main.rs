use anyhow::Result;
use serde_json::json;
use tokio::time::{sleep, Duration};

use aetherscope::feed::market::HttpMarketSource;
use aetherscope::feed::staking::HttpValidatorSource;
use aetherscope::logging::{self, obj, Domain, Level};
use aetherscope::session::{BaseAsset, DashboardSession};
use aetherscope::sim::{RunOutcome, SlotId, StrategyMode};
use aetherscope::state::{Config, DateRange};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let range = DateRange::from_env()?;
    let market = HttpMarketSource::new(&cfg);
    let validators = HttpValidatorSource::new(&cfg);
    let mut session = DashboardSession::new(cfg.clone(), range);

    logging::log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("date_start", json!(range.start.format("%Y-%m-%d").to_string())),
            ("date_end", json!(range.end.format("%Y-%m-%d").to_string())),
            ("refresh_secs", json!(cfg.refresh_secs)),
        ]),
    );

    let once = std::env::var("REFRESH_ONCE").as_deref() == Ok("1");
    loop {
        session.refresh(&market, &validators).await?;
        session.log_snapshot();

        // With slots still empty, seed them from the highest-impact matches
        // and run one demonstration backtest over the fetched window.
        if session.portfolio().occupied_count() == 0 {
            let mut top: Vec<_> = session
                .entities()
                .iter()
                .filter(|f| f.matched)
                .map(|f| f.entity.clone())
                .collect();
            top.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
            for (slot, entity) in SlotId::all().into_iter().zip(top.into_iter()) {
                session.assign_slot(slot, entity);
            }
        }
        match session.run_backtest(100.0, StrategyMode::CopyAll, BaseAsset::Primary) {
            RunOutcome::Completed(result) => logging::log(
                Level::Info,
                Domain::Sim,
                "demo_backtest",
                obj(&[
                    ("roi", json!(result.roi)),
                    ("profit", json!(result.profit)),
                    ("days", json!(result.timeline.len())),
                ]),
            ),
            RunOutcome::NothingToSimulate => logging::log(
                Level::Info,
                Domain::Sim,
                "demo_backtest",
                obj(&[("outcome", json!("nothing_to_simulate"))]),
            ),
            RunOutcome::NoPriceData => logging::log(
                Level::Warn,
                Domain::Sim,
                "demo_backtest",
                obj(&[("outcome", json!("no_price_data"))]),
            ),
        }

        if once {
            break;
        }
        sleep(Duration::from_secs(cfg.refresh_secs)).await;
    }
    Ok(())
}
