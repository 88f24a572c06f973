//! vcr-proxy - Record-and-replay HTTP/SOAP interception proxy
//!
//! Sits between a client under test and the real services it calls. The
//! first time a request is seen it is forwarded, and the response is
//! recorded into a dated YAML cassette. Every later matching request is
//! answered from the cassette without touching the network.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod network;
pub mod proxy;
pub mod recording;
pub mod storage;

pub use error::{ProxyError, Result};
