//! # pwreset-core
//!
//! Network-free building blocks for the self-service password reset gateway.
//!
//! This crate holds everything the reset flow needs that does not talk to the directory:
//! configuration, the shared error taxonomy, password generation and the credential wire
//! encoding.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and caller-safe messages
//! - [`config`] - Immutable directory and reset configuration
//! - [`generator`] - Cryptographically random password generation
//! - [`codec`] - Password attribute wire encoding
//! - [`types`] - Request/response contract consumed by callers

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod config;
pub mod error;
pub mod generator;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
