//! Gleaner Core
//!
//! Core types shared by the Gleaner producer and its HTTP clients.
//!
//! This crate contains:
//! - Domain types: work items, their destinations and the remote producer configuration
//! - URL helpers used to address destination callbacks

pub mod domain;
pub mod url;
