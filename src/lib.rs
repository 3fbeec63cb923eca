//! OMNISCIENT: market opportunity scanner.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod auth;
pub mod config;
pub mod types;
pub mod data;
pub mod engine;
pub mod subscription;
pub mod storage;
pub mod dashboard;
