//! Librarian indexer search pipeline
//!
//! Turns a normalized search query into typed release records from
//! heterogeneous indexer sites, while tracking each indexer's health.

pub mod config;
pub mod indexer;
