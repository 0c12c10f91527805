//! Core domain types and logic.

pub mod ticker;
pub mod price_table;
pub mod weights;
pub mod returns;
pub mod estimator;
pub mod optimizer;
pub mod allocation;
pub mod summary;
pub mod repository;
pub mod request;
pub mod pipeline;
pub mod config_validation;
pub mod error;
