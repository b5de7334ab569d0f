#![cfg_attr(docsrs, feature(doc_cfg))]
//! # basenbms_lib
//!
//! This crate decodes the binary protocol spoken by Basen BMS (Battery Management System)
//! devices. The byte stream arrives in arbitrary chunks (BLE notifications, serial reads);
//! the [`assembler`] turns it back into frames, validates them and decodes every known
//! frame type into a [`protocol::Record`].
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `basenbms`
//!   command-line tool and pulls in `serialport` and `serde`.
//!
//! ### Client Features
//! - `serialport`: Enables the **synchronous** client and transport using the `serialport` crate.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for serializing/deserializing decoded records.
//! - `bin-dependencies`: Enables all features required by the `basenbms` binary executable.

/// Contains error types for the library.
mod error;

/// Reassembles frames from chunks of the byte stream.
pub mod assembler;
/// Bit tables for the status bitmasks.
pub mod labels;
/// Defines the communication protocol for Basen BMS.
pub mod protocol;
/// Transport and sink traits plus the polling cycle.
pub mod session;

pub use error::Error;

/// Synchronous client for Basen BMS communication.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;
