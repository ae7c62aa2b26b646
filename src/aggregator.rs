// Multi-timeframe bar aggregation
// Four rolling windows mutated together under one exclusive section per tick

use crate::context::AppContext;
use crate::decision;
use crate::indicators;
use crate::types::{AggregatedState, Bar, RawTick, Timeframe, Window};
use chrono::Timelike;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Rolling window capacity per timeframe.
pub const WINDOW_CAP: usize = 60;

#[derive(Default)]
struct Windows {
    one: Window,
    fifteen: Window,
    hour: Window,
    day: Window,
}

impl Windows {
    fn get_mut(&mut self, tf: Timeframe) -> &mut Window {
        match tf {
            Timeframe::One => &mut self.one,
            Timeframe::Fifteen => &mut self.fifteen,
            Timeframe::Hour => &mut self.hour,
            Timeframe::Day => &mut self.day,
        }
    }

    fn snapshot(&self) -> AggregatedState {
        fn tail(window: &Window) -> Vec<Bar> {
            let skip = window.len().saturating_sub(WINDOW_CAP);
            window.iter().skip(skip).cloned().collect()
        }
        AggregatedState {
            one: tail(&self.one),
            fifteen: tail(&self.fifteen),
            hour: tail(&self.hour),
            day: tail(&self.day),
        }
    }
}

fn truncate_to_cap(window: &mut Window) {
    while window.len() > WINDOW_CAP {
        window.pop_front();
    }
}

/// Owns the four windows and all their mutation. A tick passes through one
/// exclusive section covering all four; snapshot reads take the same lock so
/// an observer never sees three of four windows updated.
pub struct BarAggregator {
    windows: Mutex<Windows>,
    interval: u32,
}

impl BarAggregator {
    pub fn new(interval: u32) -> Self {
        Self {
            windows: Mutex::new(Windows::default()),
            interval,
        }
    }

    /// Startup backfill: replace every window with its fetched history,
    /// keeping only the most recent entries.
    pub async fn seed(&self, one: Vec<Bar>, fifteen: Vec<Bar>, hour: Vec<Bar>, day: Vec<Bar>) {
        let mut windows = self.windows.lock().await;
        windows.one = one.into();
        windows.fifteen = fifteen.into();
        windows.hour = hour.into();
        windows.day = day.into();
        for tf in Timeframe::ALL {
            truncate_to_cap(windows.get_mut(tf));
        }
    }

    /// Process one tick: per-window admission, indicator stamping, then an
    /// unconditional broadcast. Runs on the single ordered tick path; the
    /// decision gate fires off the hot path.
    pub async fn handle_tick(&self, ctx: &Arc<AppContext>, tick: RawTick) {
        let state = {
            let mut windows = self.windows.lock().await;
            for tf in Timeframe::ALL {
                let window = windows.get_mut(tf);
                truncate_to_cap(window);
                if Self::admits(window, &tick, tf) {
                    let mut bar = Bar::from_tick(&tick);
                    let trailing: Vec<Bar> = window.iter().cloned().collect();
                    indicators::stamp_indicators(&mut bar, &trailing);
                    window.push_back(bar);
                    truncate_to_cap(window);
                    debug!("AGGREGATOR: admitted bar into {tf:?} window");
                }
            }
            windows.snapshot()
        };

        // Every tick is published, whether or not any window admitted a bar.
        if let Err(err) = ctx.sink.broadcast(&state).await {
            warn!("AGGREGATOR: broadcast failed: {err:?}");
        }

        if tick.timestamp.minute() % self.interval == 0 {
            decision::spawn_cycle(ctx.clone(), Bar::from_tick(&tick));
        }
    }

    /// A window admits a tick iff it is empty or the elapsed time since its
    /// last bar reaches the timeframe's period. Minute-granularity elapsed
    /// time, not calendar-aligned boundaries.
    fn admits(window: &Window, tick: &RawTick, tf: Timeframe) -> bool {
        match window.back() {
            None => true,
            Some(last) => {
                let elapsed_minutes = tick
                    .timestamp
                    .signed_duration_since(last.timestamp)
                    .num_seconds() as f64
                    / 60.0;
                elapsed_minutes >= tf.minutes() as f64
            }
        }
    }

    /// Snapshot of all four windows, taken under the same exclusive section
    /// the tick path uses.
    pub async fn current_data(&self) -> AggregatedState {
        self.windows.lock().await.snapshot()
    }
}
