//! Round state machine for Manaduel.
//!
//! Every client runs its own controller; the shared store's
//! compare-and-swap is the only coordination between them.
//!
//! # Key types
//!
//! - [`RoomController`]: join, leave, start, submit, and advance one room
//! - [`spawn_driver`] / [`DriverHandle`]: poll a room until the duel ends
//! - [`DuelState`]: lifecycle state machine
//! - [`RoomConfig`]: plan duration, polling, combat rules

#![allow(async_fn_in_trait)]

mod config;
mod controller;
mod driver;
mod error;

pub use config::{DuelState, RoomConfig};
pub use controller::{Advance, JoinRole, RoomController, RoomWatch, Seat};
pub use driver::{DriverHandle, DriverStats, spawn_driver};
pub use error::RoomError;
