//! Linkwatch - URL monitoring service.
//!
//! Clients register URLs through the HTTP API; a background scheduler probes
//! every registered target on a fixed interval under global and per-host
//! concurrency limits, and both the registry and per-target probe history
//! are queryable.

pub mod canon;
pub mod config;
pub mod db;
pub mod probe;
pub mod scheduler;
pub mod web;
