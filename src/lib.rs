//! Request guard
//!
//! Classifies inbound API requests as browser or automated traffic, enforces
//! a per-client fixed-window rate limit and temporarily blocks clients that
//! keep failing validation.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;

#[cfg(test)]
mod test_support;
