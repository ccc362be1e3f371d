//! I/O module
//!
//! Handles CSV output.
//!
//! # Components
//!
//! - `csv_format` - Accounts export serialization

pub mod csv_format;

pub use csv_format::write_accounts_csv;
