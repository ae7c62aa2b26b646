use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use trading_agent::aggregator::BarAggregator;
use trading_agent::agent::XaiClient;
use trading_agent::brokerage::BrokerageFacade;
use trading_agent::config::AppCfg;
use trading_agent::context::AppContext;
use trading_agent::gateway::{self, BroadcastSink};
use trading_agent::marketdata::MarketDataClient;
use trading_agent::types::RawTick;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cfg = AppCfg::from_env()?;
    info!(
        "MAIN: starting trading agent for {} (interval {}m, paper={}, agent disabled={})",
        cfg.symbol, cfg.interval, cfg.paper, cfg.disable_agent
    );

    let sink = BroadcastSink::new();
    let aggregator = Arc::new(BarAggregator::new(cfg.interval));
    let brokerage = Arc::new(BrokerageFacade::new(&cfg));
    let marketdata = Arc::new(MarketDataClient::new(&cfg));
    let chat = Arc::new(XaiClient::new(cfg.xai_api_key.clone(), cfg.model.clone()));

    let ctx = Arc::new(AppContext {
        cfg: cfg.clone(),
        aggregator: aggregator.clone(),
        brokerage,
        marketdata: marketdata.clone(),
        chat,
        sink: sink.clone(),
    });

    // Seed the four windows from history before live ticks arrive.
    match seed_windows(&ctx).await {
        Ok(()) => info!("MAIN: windows seeded from history"),
        Err(err) => warn!("MAIN: window seed failed, starting empty: {err:?}"),
    }

    let gateway_task = {
        let sink = sink.clone();
        let bind = cfg.gateway_bind.clone();
        tokio::spawn(async move {
            if let Err(err) = gateway::run_gateway(sink, bind).await {
                error!("MAIN: gateway terminated: {err:?}");
            }
        })
    };

    let feed_task = {
        let ctx = ctx.clone();
        let marketdata = marketdata.clone();
        tokio::spawn(async move {
            let handler = {
                let ctx = ctx.clone();
                move |tick: RawTick| {
                    let ctx = ctx.clone();
                    async move {
                        ctx.aggregator.handle_tick(&ctx, tick).await;
                    }
                }
            };
            if let Err(err) = marketdata.run_stream(handler).await {
                error!("MAIN: feed terminated: {err:?}");
            }
        })
    };

    tokio::select! {
        _ = gateway_task => warn!("MAIN: gateway task finished"),
        _ = feed_task => warn!("MAIN: feed task finished"),
        _ = tokio::signal::ctrl_c() => info!("MAIN: received shutdown signal"),
    }

    info!("MAIN: shutting down");
    Ok(())
}

async fn seed_windows(ctx: &Arc<AppContext>) -> Result<()> {
    let one = ctx.marketdata.fetch_history(1).await?;
    let fifteen = ctx.marketdata.fetch_history(15).await?;
    let hour = ctx.marketdata.fetch_history(60).await?;
    let day = ctx.marketdata.fetch_history(60 * 24).await?;
    ctx.aggregator.seed(one, fifteen, hour, day).await;
    Ok(())
}
