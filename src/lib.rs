pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod validation;
pub mod xml;
