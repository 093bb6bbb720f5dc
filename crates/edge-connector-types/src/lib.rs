//! Shared message envelopes and status/error vocabulary for the
//! file-transfer and firmware-update subsystem. Wire-format-agnostic:
//! nothing here knows how to serialize itself onto a transport.

pub mod messages;
pub mod record;
pub mod status;

pub use messages::*;
pub use record::{FileChunk, FileInfo};
pub use status::{FirmwareError, FirmwareStatus, TransferError, TransferStatus};
