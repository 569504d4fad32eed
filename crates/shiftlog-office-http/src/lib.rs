//! HTTP office backend for shiftd
//!
//! This crate provides:
//! - A client for the office's spreadsheet script endpoint
//! - Conversion between the sheet's column names and the shift types
//! - A simulated badge/tag scanner

mod client;
mod scanner;
mod wire;

pub use client::*;
pub use scanner::*;
