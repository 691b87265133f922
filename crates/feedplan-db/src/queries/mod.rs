//! Query functions, one module per table.
//!
//! Reads take `&PgPool`. Statements that must run inside a caller-owned
//! transaction take `&mut PgConnection`; pass `&mut *tx`.

pub mod ai_logs;
pub mod blocked;
pub mod cache;
pub mod catalog;
pub mod completions;
pub mod engagement;
pub mod plan_actions;
pub mod plans;
pub mod templates;
