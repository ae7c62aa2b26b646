// Library crate so integration tests can exercise the modules directly

pub mod agent;
pub mod aggregator;
pub mod brokerage;
pub mod cache;
pub mod config;
pub mod context;
pub mod decision;
pub mod gateway;
pub mod indicators;
pub mod marketdata;
pub mod types;
