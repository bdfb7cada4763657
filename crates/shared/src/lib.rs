//! Shared utilities and common types for the RSVP inbox client.
//!
//! This crate provides common functionality used across all other crates:
//! - Lookups over loosely-shaped backend JSON payloads
//! - Lenient timestamp parsing
//! - Email normalization and validation

pub mod json;
pub mod time;
pub mod validation;
