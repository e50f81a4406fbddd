//! Stockroom
//!
//! Parts catalog, multi-warehouse stock ledger and physical stock counts
//! for a small parts store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, NegativeStockPolicy};
pub use db::DbPool;
pub use errors::{LocationConflict, ServiceError};
pub use events::{Event, EventSender};
pub use services::{AppServices, ImportReport, RowError, ServiceSettings};
