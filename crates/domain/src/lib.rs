//! Domain layer for the RSVP inbox client.
//!
//! This crate contains:
//! - Domain models (Notification, GuestIdentity, RsvpStatus)
//! - The gateway abstraction and an in-memory gateway
//! - Inbox, identity resolution, RSVP and detail-session services

pub mod models;
pub mod services;
