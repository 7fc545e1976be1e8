//! Core domain types
//!
//! These types are exchanged with the coordinator and with destination
//! callbacks, and are owned by the producer while a job is in flight.

pub mod configuration;
pub mod item;
