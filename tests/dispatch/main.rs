//! In-process dispatch integration tests.
//!
//! Covers the messaging service end to end:
//! - command cardinality and single-handler delivery
//! - domain event fan-out and failure isolation
//! - the dispatch error tree for nested publishes
//! - enrichers, query filters, rules and per-dispatch scopes

mod support;
mod commands;
mod events;
mod errors;
mod queries;
