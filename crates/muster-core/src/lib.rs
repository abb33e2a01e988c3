//! Core types and engines for Muster, the location-verified attendance
//! service.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! geometry, token and fraud engines are pure; the [`tracker::Tracker`] and
//! [`pipeline::Pipeline`] services orchestrate them over any
//! [`store::AttendanceStore`] backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attendance;
pub mod clock;
pub mod error;
pub mod event;
pub mod fraud;
pub mod geo;
pub mod geofence;
pub mod pipeline;
pub mod policy;
pub mod presence;
pub mod store;
pub mod token;
pub mod tracker;
pub mod violation;

pub use error::{Error, Result};
