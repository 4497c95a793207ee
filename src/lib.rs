//! borehole: pair a sender and a receiver through a rendezvous relay,
//! then stream a binary payload in bounded chunks.
//!
//! # Architecture
//!
//! ```text
//! +--------+   join/role    +---------+   join/role    +----------+
//! | sender | -------------> |  relay  | <------------- | receiver |
//! |        | == chunks ===> | (pairs) | == chunks ===> |          |
//! +--------+                +---------+                +----------+
//! ```
//!
//! Two anonymous clients rendezvous on a human-chosen channel name.
//! The relay enforces role exclusivity (one sender, one receiver per
//! channel) and forwards opaque chunk messages in order. Chunks carry
//! sequencing metadata; the receiver validates the sequence and
//! reconstructs the byte stream.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod transfer;

pub use error::{Error, Result};
