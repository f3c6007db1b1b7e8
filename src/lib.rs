//! Scoped settings resolution with per-request and per-render-context caches.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
