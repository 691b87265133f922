//! Daily action plan pipeline: cache, provider gateway, content curator,
//! toxic-signal detector, engagement tracker and the orchestrator that
//! ties them together.

pub mod cache;
pub mod config;
pub mod context;
pub mod curator;
pub mod engagement;
pub mod motivation;
pub mod orchestrator;
pub mod provider;
pub mod store;
pub mod toxic;
pub mod types;

pub use orchestrator::{PlanEnvelope, PlanError, PlanRequest, Planner};
