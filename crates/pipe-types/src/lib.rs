//! # Pipe Types Crate
//!
//! The value types exchanged over a message pipe.
//!
//! ## Design Principles
//!
//! - **Opaque payloads**: the payload is a byte buffer; its encoding belongs
//!   to the application, not to this layer.
//! - **Typed routing**: the raw flag bits are decoded exactly once into a
//!   [`MessageKind`], and everything above the wire works with the enum.
//! - **Handle ownership**: attached handles move with the message; a sender
//!   loses them once a write succeeds.

pub mod errors;
pub mod header;
pub mod message;

pub use errors::{ConnectionError, MessageError, PipeError};
pub use header::{MessageHeader, HEADER_SIZE_V0, HEADER_SIZE_V1};
pub use message::{HandleId, Message, MessageFlags, MessageKind};
