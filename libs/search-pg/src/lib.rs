//! PostgreSQL search engine
//!
//! Turns a generic paged search request plus an entity search
//! configuration into parameterized SQL (predicates, joins, existence
//! subqueries, ordering, pagination), executes the count and data queries
//! via `sqlx`, and returns a typed page of results.

pub mod engine;
pub mod error;
pub mod query_builder;
pub mod service;

pub use engine::SearchEngine;
pub use error::{Error, Result};
pub use query_builder::{BindValue, QueryBuilder, QueryFragment};
pub use service::SearchableService;
