//! greenhouse - live monitor for simulated carnivorous-plant telemetry.
//!
//! Users sign up, log in and register plants; connected dashboards receive a
//! synthetic sensor reading per plant on every telemetry tick. A per-session
//! "error mode" randomly fails operations so client error handling can be
//! exercised.

pub mod api;
pub mod broker;
pub mod config;
pub mod fault;
pub mod otel;
pub mod password;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;
pub mod telemetry;
