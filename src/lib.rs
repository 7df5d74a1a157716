//! Tollgate - Fixed-Window Request Rate Governor
//!
//! This crate limits how many requests a client identity may issue within a
//! fixed time window. Counts live in a shared window store (Redis in
//! production, an in-memory map for tests and single-process use), so any
//! number of request-handling workers can share one quota per identity.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
