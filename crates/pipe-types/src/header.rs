//! # Message Header Codec
//!
//! Fixed little-endian header shared with peer implementations.
//!
//! ```text
//! v0 (16 bytes)                      v1 (24 bytes)
//! ┌───────────┬───────────┐          ┌───────────┬───────────┐
//! │ num_bytes │  version  │          │ num_bytes │  version  │
//! ├───────────┼───────────┤          ├───────────┼───────────┤
//! │   name    │   flags   │          │   name    │   flags   │
//! └───────────┴───────────┘          ├───────────┴───────────┤
//!                                    │      request_id       │
//!                                    └───────────────────────┘
//! ```
//!
//! Any header with a routing flag is written as v1.

use crate::errors::MessageError;
use crate::message::MessageFlags;

/// Size of a header without a request id.
pub const HEADER_SIZE_V0: usize = 16;

/// Size of a header with a request id.
pub const HEADER_SIZE_V1: usize = 24;

/// Envelope fields of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Method ordinal.
    pub name: u32,
    /// Raw routing flags.
    pub flags: MessageFlags,
    /// Request id; only meaningful with a routing flag.
    pub request_id: Option<u64>,
}

impl MessageHeader {
    fn has_routing_flag(&self) -> bool {
        self.flags
            .intersects(MessageFlags::EXPECTS_RESPONSE | MessageFlags::IS_RESPONSE)
    }

    /// Number of bytes [`MessageHeader::encode_into`] will write.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        if self.has_routing_flag() {
            HEADER_SIZE_V1
        } else {
            HEADER_SIZE_V0
        }
    }

    /// Append the encoded header to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let with_id = self.has_routing_flag();
        let (num_bytes, version) = if with_id {
            (HEADER_SIZE_V1 as u32, 1u32)
        } else {
            (HEADER_SIZE_V0 as u32, 0u32)
        };

        buf.extend_from_slice(&num_bytes.to_le_bytes());
        buf.extend_from_slice(&version.to_le_bytes());
        buf.extend_from_slice(&self.name.to_le_bytes());
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        if with_id {
            buf.extend_from_slice(&self.request_id.unwrap_or(0).to_le_bytes());
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a header from the front of `bytes`.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), MessageError> {
        if bytes.len() < HEADER_SIZE_V0 {
            return Err(MessageError::Truncated {
                needed: HEADER_SIZE_V0,
                actual: bytes.len(),
            });
        }

        let num_bytes = read_u32(bytes, 0);
        let version = read_u32(bytes, 4);
        let name = read_u32(bytes, 8);
        let flags = MessageFlags::from_bits_retain(read_u32(bytes, 12));

        let mut header = Self {
            name,
            flags,
            request_id: None,
        };

        match (version, num_bytes as usize) {
            (0, HEADER_SIZE_V0) => {
                if header.has_routing_flag() {
                    return Err(MessageError::MissingRequestId {
                        flags: flags.bits(),
                    });
                }
                Ok((header, HEADER_SIZE_V0))
            }
            (1, HEADER_SIZE_V1) => {
                if bytes.len() < HEADER_SIZE_V1 {
                    return Err(MessageError::Truncated {
                        needed: HEADER_SIZE_V1,
                        actual: bytes.len(),
                    });
                }
                header.request_id = Some(read_u64(bytes, 16));
                Ok((header, HEADER_SIZE_V1))
            }
            _ => Err(MessageError::UnsupportedHeader { version, num_bytes }),
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}
