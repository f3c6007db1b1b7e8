//! Settings registry, resolution caches and the service tying them together.

mod adapter;
pub mod context;
pub mod error;
pub mod instance;
pub mod proxy;
pub mod registry;
pub mod repos;
pub mod request;
pub mod service;
