//! API Module
//!
//! REST surface for driving grow sessions, plus health and metrics
//! endpoints.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
