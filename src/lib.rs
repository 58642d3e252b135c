pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod logging;
pub mod parser;
pub mod retention;
pub mod scheduler;
pub mod schema;
pub mod service;
pub mod stats;
pub mod storage;
pub mod store;
