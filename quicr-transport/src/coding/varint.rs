// Varint scheme derived from quinn-proto
// https://github.com/quinn-rs/quinn/blob/main/quinn-proto/src/varint.rs
// Licensed via Apache 2.0 and MIT

use bytes::{Buf, BufMut};

use super::{Decode, DecodeError, Encode, EncodeError};

/// The largest value representable as a variable-length integer: 2^62 - 1.
pub const VARINT_MAX: u64 = (1 << 62) - 1;

/// The number of bytes the value occupies on the wire.
///
/// The first two bits of the first byte name the length class: 1, 2, 4 or 8 bytes.
pub fn varint_size(x: u64) -> usize {
	if x < 2u64.pow(6) {
		1
	} else if x < 2u64.pow(14) {
		2
	} else if x < 2u64.pow(30) {
		4
	} else {
		8
	}
}

impl Decode for u64 {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		if !buf.has_remaining() {
			return Err(DecodeError::UnexpectedEnd);
		}

		let first = buf.get_u8();
		let tag = first >> 6;
		let mut x = u64::from(first & 0b0011_1111);

		let more = match tag {
			0b00 => 0,
			0b01 => 1,
			0b10 => 3,
			_ => 7,
		};

		if buf.remaining() < more {
			return Err(DecodeError::UnexpectedEnd);
		}

		for _ in 0..more {
			x = x << 8 | u64::from(buf.get_u8());
		}

		Ok(x)
	}
}

impl Encode for u64 {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		let x = *self;
		if x < 2u64.pow(6) {
			buf.put_u8(x as u8);
		} else if x < 2u64.pow(14) {
			buf.put_u16(0b01 << 14 | x as u16);
		} else if x < 2u64.pow(30) {
			buf.put_u32(0b10 << 30 | x as u32);
		} else if x < 2u64.pow(62) {
			buf.put_u64(0b11 << 62 | x);
		} else {
			return Err(EncodeError::BoundsExceeded);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	fn round_trip(x: u64) -> usize {
		let mut buf = BytesMut::new();
		x.encode(&mut buf).unwrap();
		assert_eq!(buf.len(), varint_size(x));

		let mut read = buf.freeze();
		assert_eq!(u64::decode(&mut read).unwrap(), x);
		assert!(!read.has_remaining());

		varint_size(x)
	}

	#[test]
	fn length_classes() {
		assert_eq!(round_trip(0), 1);
		assert_eq!(round_trip(63), 1);
		assert_eq!(round_trip(64), 2);
		assert_eq!(round_trip(16383), 2);
		assert_eq!(round_trip(16384), 4);
		assert_eq!(round_trip((1 << 30) - 1), 4);
		assert_eq!(round_trip(1 << 30), 8);
		assert_eq!(round_trip(VARINT_MAX), 8);
	}

	#[test]
	fn out_of_range() {
		let mut buf = BytesMut::new();
		assert_eq!((VARINT_MAX + 1).encode(&mut buf), Err(EncodeError::BoundsExceeded));
	}

	#[test]
	fn truncated() {
		let mut buf = BytesMut::new();
		123_456u64.encode(&mut buf).unwrap();

		for cut in 0..buf.len() {
			let mut short = buf.clone().freeze().slice(..cut);
			assert_eq!(u64::decode(&mut short), Err(DecodeError::UnexpectedEnd));
		}
	}
}
