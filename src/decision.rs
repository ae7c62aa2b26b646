// Decision trigger
// Packages a short bar history and runs one agent cycle off the tick path

use crate::agent;
use crate::context::AppContext;
use crate::indicators;
use crate::types::Bar;
use anyhow::Result;
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

/// Fire one decision cycle on its own task. A slow or failing model round
/// trip never blocks tick processing; overlapping cycles run independently.
pub fn spawn_cycle(ctx: Arc<AppContext>, tick_bar: Bar) {
    let cycle_id = Uuid::new_v4();
    tokio::spawn(async move {
        if let Err(err) = run_cycle(&ctx, tick_bar, cycle_id).await {
            error!("DECISION: cycle {cycle_id} failed: {err:?}");
        }
    });
}

async fn run_cycle(ctx: &Arc<AppContext>, tick_bar: Bar, cycle_id: Uuid) -> Result<()> {
    info!("DECISION: starting cycle {cycle_id}");

    // Fresh short history for the configured interval, last 15 entries, with
    // the just-received bar stamped against them and appended.
    let history = ctx
        .marketdata
        .fetch_history(ctx.cfg.interval as i64)
        .await?;
    let skip = history.len().saturating_sub(15);
    let mut short: Vec<Bar> = history.into_iter().skip(skip).collect();
    let mut bar = tick_bar;
    indicators::stamp_indicators(&mut bar, &short);
    short.push(bar);

    let payload = serde_json::to_string(&short)?;
    let decision = agent::run_decision_cycle(
        ctx.chat.as_ref(),
        &ctx.brokerage,
        ctx.cfg.disable_agent,
        ctx.cfg.interval,
        &ctx.cfg.symbol,
        &payload,
    )
    .await?;

    match decision {
        Some(text) => info!("DECISION: cycle {cycle_id} decided: {text}"),
        None => info!("DECISION: cycle {cycle_id} produced no decision"),
    }
    Ok(())
}
