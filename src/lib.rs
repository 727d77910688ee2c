//! Environmental risk scoring and alerting.
//!
//! Observations come in through [`ingest`], are scored per domain in
//! [`analysis`], spread over regional grids for cyclone formation forecasts,
//! and turned into alerts by [`alert`]. [`engine::RiskEngine`] wires it all
//! together from an [`config::AlertConfiguration`].

pub mod alert;
pub mod analysis;
pub mod climatology;
pub mod config;
pub mod db;
pub mod engine;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod recommend;
pub mod regions;
pub mod verify;
