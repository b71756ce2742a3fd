//! PillSync dispenser controller library.
//!
//! Exposes the controller, drivers and scheduler for the daemon and for
//! integration testing. All hardware is reached through `embedded-hal`
//! traits, so everything here runs on a development host against
//! simulated or mocked peripherals.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod scheduler;
