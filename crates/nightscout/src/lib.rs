//! Nightscout uploader for DD-Guard
//!
//! Payload types for the Nightscout v1 REST API and a small client that
//! posts them with the hashed API secret.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod payload;

pub use client::{hash_secret, Endpoint, NightscoutClient};
pub use error::{NightscoutError, NightscoutResult};
pub use payload::{
    device_id, BolusTreatment, DeviceStatus, Direction, Entry, ErrorSgv, InsulinOnBoard,
    PumpBattery, PumpState, PumpStatus, TempBasalTreatment, UPLOADER_BATTERY,
};
