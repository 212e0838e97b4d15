//! # Message Envelope
//!
//! A [`Message`] is built once and then only moves: an opaque payload, the
//! handles travelling with it, and the routing envelope (method `name`, flag
//! bits, request id).
//!
//! ## Routing
//!
//! | flags                | kind                   |
//! |----------------------|------------------------|
//! | none                 | `OneWay`               |
//! | `EXPECTS_RESPONSE`   | `Request { id }`       |
//! | `IS_RESPONSE`        | `Response { id }`      |
//! | both                 | rejected               |

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::errors::MessageError;
use crate::header::MessageHeader;

/// Opaque side-channel resource attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u32);

bitflags! {
    /// Routing bits as they appear on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u32 {
        /// The sender expects a response carrying the same request id.
        const EXPECTS_RESPONSE = 1 << 0;
        /// This message answers an earlier request.
        const IS_RESPONSE = 1 << 1;
    }
}

/// Routing role of a message, decoded from [`MessageFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Fire-and-forget.
    OneWay,
    /// Two-way call awaiting a response.
    Request { id: u64 },
    /// Answer to the request with the same id.
    Response { id: u64 },
}

impl MessageKind {
    /// Decode the routing role from raw flag bits.
    ///
    /// Unknown bits are ignored. A request id is required whenever either
    /// routing flag is set, and it must not be 0.
    pub fn decode(flags: MessageFlags, request_id: Option<u64>) -> Result<Self, MessageError> {
        let expects = flags.contains(MessageFlags::EXPECTS_RESPONSE);
        let is_response = flags.contains(MessageFlags::IS_RESPONSE);

        match (expects, is_response, request_id) {
            (false, false, _) => Ok(Self::OneWay),
            (true, true, _) => Err(MessageError::ConflictingFlags {
                flags: flags.bits(),
            }),
            (_, _, None) => Err(MessageError::MissingRequestId {
                flags: flags.bits(),
            }),
            (_, _, Some(0)) => Err(MessageError::ReservedRequestId),
            (true, false, Some(id)) => Ok(Self::Request { id }),
            (false, true, Some(id)) => Ok(Self::Response { id }),
        }
    }

    /// Flag bits for this kind.
    #[must_use]
    pub fn flags(self) -> MessageFlags {
        match self {
            Self::OneWay => MessageFlags::empty(),
            Self::Request { .. } => MessageFlags::EXPECTS_RESPONSE,
            Self::Response { .. } => MessageFlags::IS_RESPONSE,
        }
    }

    /// Request id carried by this kind, if any.
    #[must_use]
    pub fn request_id(self) -> Option<u64> {
        match self {
            Self::OneWay => None,
            Self::Request { id } | Self::Response { id } => Some(id),
        }
    }
}

/// A message travelling over a pipe.
///
/// Not `Clone`: attached handles have a single owner.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Message {
    name: u32,
    flags: MessageFlags,
    request_id: Option<u64>,
    payload: Vec<u8>,
    handles: Vec<HandleId>,
}

impl Message {
    /// Create a one-way message for method `name`.
    #[must_use]
    pub fn new(name: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Rebuild a message from a decoded header and its body.
    #[must_use]
    pub fn from_parts(header: MessageHeader, payload: Vec<u8>, handles: Vec<HandleId>) -> Self {
        Self {
            name: header.name,
            flags: header.flags,
            request_id: header.request_id,
            payload,
            handles,
        }
    }

    /// Attach handles to the message.
    #[must_use]
    pub fn with_handles(mut self, handles: Vec<HandleId>) -> Self {
        self.handles = handles;
        self
    }

    /// Set the routing role of the message.
    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.set_kind(kind);
        self
    }

    /// Overwrite the routing flags and request id.
    pub fn set_kind(&mut self, kind: MessageKind) {
        let retained = self.flags - (MessageFlags::EXPECTS_RESPONSE | MessageFlags::IS_RESPONSE);
        self.flags = retained | kind.flags();
        self.request_id = kind.request_id();
    }

    /// Method ordinal.
    #[must_use]
    pub fn name(&self) -> u32 {
        self.name
    }

    /// Raw flag bits.
    #[must_use]
    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    /// Raw request id field.
    #[must_use]
    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    /// Decoded routing role.
    pub fn kind(&self) -> Result<MessageKind, MessageError> {
        MessageKind::decode(self.flags, self.request_id)
    }

    #[must_use]
    pub fn expects_response(&self) -> bool {
        self.flags.contains(MessageFlags::EXPECTS_RESPONSE)
    }

    #[must_use]
    pub fn is_response(&self) -> bool {
        self.flags.contains(MessageFlags::IS_RESPONSE)
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn handles(&self) -> &[HandleId] {
        &self.handles
    }

    /// Move the attached handles out, leaving none behind.
    pub fn take_handles(&mut self) -> Vec<HandleId> {
        std::mem::take(&mut self.handles)
    }

    /// Envelope of this message.
    #[must_use]
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            name: self.name,
            flags: self.flags,
            request_id: self.request_id,
        }
    }

    /// Header bytes followed by the payload.
    #[must_use]
    pub fn to_frame(&self) -> Vec<u8> {
        let header = self.header();
        let mut frame = Vec::with_capacity(header.encoded_len() + self.payload.len());
        header.encode_into(&mut frame);
        frame.extend_from_slice(&self.payload);
        frame
    }

    /// Parse a frame produced by [`Message::to_frame`].
    pub fn from_frame(frame: &[u8], handles: Vec<HandleId>) -> Result<Self, MessageError> {
        let (header, consumed) = MessageHeader::decode(frame)?;
        Ok(Self::from_parts(header, frame[consumed..].to_vec(), handles))
    }
}
