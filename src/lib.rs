pub mod api;
pub mod cache;
pub mod core;
pub mod service;
pub mod store;
