//! Core engine: score → plan → scan.

pub mod scoring;
pub mod plan;
pub mod scanner;

pub use plan::TradePlanBuilder;
pub use scanner::{OpportunityScanner, ScannerConfig};
