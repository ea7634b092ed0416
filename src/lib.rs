// src/lib.rs
pub mod checkpoint;
pub mod engine;
pub mod eodhd;
pub mod flatten;
pub mod storage;
pub mod utils;
