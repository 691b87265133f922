//! Persistence layer for feedplan: connection pool, embedded migrations,
//! row models and one query module per table.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
