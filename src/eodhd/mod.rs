// src/eodhd/mod.rs
pub mod client;
pub mod models;
pub mod rate;

pub use client::EodhdClient;
pub use models::RawReport;
