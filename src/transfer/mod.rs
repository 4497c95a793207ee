//! File transfer pipeline: chunking on the sending side, sequenced
//! reassembly on the receiving side. Both halves speak through a
//! [`crate::client::RelayConnection`] and never talk to each other
//! directly.

pub mod driver;
pub mod receiver;

pub use driver::{TransferDriver, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use receiver::{TransferReceiver, TransferState};
