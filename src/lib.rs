//! Terminal client for the casino operations backend.
//!
//! Browses casinos and machines, records meter readings and previews machine
//! and casino balances before asking the backend for the authoritative figures.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod parser;
pub mod period;
pub mod render;
pub mod views;

pub use aggregator::{preview_balance, BalancePreview, Denomination};
pub use client::ApiClient;
pub use error::{ConsoleError, Result};
