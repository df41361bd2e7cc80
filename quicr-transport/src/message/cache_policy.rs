use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Propagate the publisher's eviction mode so relay caches evict consistently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePolicy {
	pub is_real_time: bool,
}

impl Decode for CachePolicy {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let is_real_time = bool::decode(buf)?;
		Ok(Self { is_real_time })
	}
}

impl Encode for CachePolicy {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.is_real_time.encode(buf)
	}
}
