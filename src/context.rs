// Process-wide dependency container
// Built once at startup and passed explicitly; no global singletons

use crate::agent::ChatApi;
use crate::aggregator::BarAggregator;
use crate::brokerage::BrokerageFacade;
use crate::config::AppCfg;
use crate::gateway::BroadcastSink;
use crate::marketdata::MarketDataClient;
use crate::types::Settings;
use std::sync::Arc;

pub struct AppContext {
    pub cfg: AppCfg,
    pub aggregator: Arc<BarAggregator>,
    pub brokerage: Arc<BrokerageFacade>,
    pub marketdata: Arc<MarketDataClient>,
    pub chat: Arc<dyn ChatApi>,
    pub sink: BroadcastSink,
}

impl AppContext {
    /// Settings snapshot for the outward query surface.
    pub fn settings(&self) -> Settings {
        Settings {
            model: self.cfg.model.clone(),
            disabled: self.cfg.disable_agent,
            interval: self.cfg.interval,
            paper: self.cfg.paper,
        }
    }
}
