use bytes::{Buf, Bytes};

use thiserror::Error;

/// Decoding failed; the connection is expected to close.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("unexpected end of buffer")]
	UnexpectedEnd,

	#[error("unknown message type: {0}")]
	InvalidMessage(u8),

	#[error("invalid payload value")]
	InvalidValue,

	#[error("trailing bytes after message")]
	TrailingBytes,

	#[error("value too large for varint encoding")]
	BoundsExceeded,
}

pub trait Decode: Sized {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError>;
}

impl Decode for u8 {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		if !buf.has_remaining() {
			return Err(DecodeError::UnexpectedEnd);
		}

		Ok(buf.get_u8())
	}
}

impl Decode for bool {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		match u8::decode(buf)? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(DecodeError::InvalidValue),
		}
	}
}

/// A length-prefixed byte string: varint length, then the bytes themselves.
impl Decode for Bytes {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let size = usize::try_from(u64::decode(buf)?).map_err(|_| DecodeError::BoundsExceeded)?;
		if buf.remaining() < size {
			return Err(DecodeError::UnexpectedEnd);
		}

		Ok(buf.copy_to_bytes(size))
	}
}

/// A length-prefixed UTF-8 string, used for URLs.
impl Decode for String {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let data = Bytes::decode(buf)?;
		String::from_utf8(data.into()).map_err(|_| DecodeError::InvalidValue)
	}
}
