#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// Operations which act on the backend directly, outside any session.
pub mod admin;

/// The request/response command channel to the backend driver.
pub mod channel;

/// Session configuration: link parameters, defaults, config files.
pub mod config;

/// Decoding inbound bytes into text.
pub mod decode;

/// Possible errors in this library.
pub mod error;

/// The push-based event channel: topics, chunks, subscriptions.
pub mod events;

/// Logging/tracing setup.
pub mod logging;

/// In-memory backend for exercising sessions without serial hardware.
pub mod mock;

/// The serial session state machine.
pub mod session;
