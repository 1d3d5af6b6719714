//! Blynk dashboard client for DD-Guard
//!
//! This crate provides:
//! - The Blynk binary wire codec (header, NUL-separated bodies)
//! - A persistent client that logs in, keeps the session alive with
//!   heartbeat pings and reconnects when the server goes away

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{BlynkClient, ClientConfig};
pub use error::{BlynkError, BlynkResult};
