use thiserror::Error;

use crate::coding::{DecodeError, EncodeError};

/// A QUICR error with an associated wire error code.
#[derive(Clone, Debug, Error)]
pub enum Error {
	/// A clean termination, used when a stream or session is closed on purpose.
	#[error("closed")]
	Closed,

	/// A malformed control message or datagram header; fatal to the connection.
	#[error("decode error: {0}")]
	Decode(#[from] DecodeError),

	/// A value could not be represented on the wire.
	#[error("encode error: {0}")]
	Encode(#[from] EncodeError),

	/// An unexpected message for the current stream state; fatal to the stream.
	#[error("protocol violation: msg={0}")]
	ProtocolViolation(u8),

	/// The requested media was not found.
	#[error("not found: url={0}")]
	NotFound(String),

	/// A resource already exists with that name or ID.
	#[error("duplicate")]
	Duplicate,

	/// A condition the code proves impossible; surfaces as a connection close.
	#[error("internal error")]
	Internal,

	/// The in-flight operation failed for lack of resources; the stream resets.
	#[error("resource exhausted")]
	Exhausted,
}

impl Error {
	/// An integer code that is sent over the wire.
	pub fn code(&self) -> u32 {
		match self {
			Self::Closed => 0,
			Self::Decode(_) => 401,
			Self::Encode(_) => 402,
			Self::NotFound(_) => 404,
			Self::ProtocolViolation(_) => 405,
			Self::Duplicate => 409,
			Self::Exhausted => 413,
			Self::Internal => 500,
		}
	}

	/// A reason that is sent over the wire.
	pub fn reason(&self) -> &str {
		match self {
			Self::Closed => "closed",
			Self::Decode(_) => "decode error",
			Self::Encode(_) => "encode error",
			Self::NotFound(_) => "not found",
			Self::ProtocolViolation(_) => "protocol violation",
			Self::Duplicate => "duplicate",
			Self::Exhausted => "resource exhausted",
			Self::Internal => "internal error",
		}
	}
}
