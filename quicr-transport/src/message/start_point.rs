use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Announce the earliest point of the media that will be delivered.
///
/// Sent by the cache owner when it learns (or rounds up) its start; the
/// receiver snaps its own first point and receive frontier forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartPoint {
	pub group_id: u64,
	pub object_id: u64,
}

impl Decode for StartPoint {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let group_id = u64::decode(buf)?;
		let object_id = u64::decode(buf)?;

		Ok(Self { group_id, object_id })
	}
}

impl Encode for StartPoint {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.group_id.encode(buf)?;
		self.object_id.encode(buf)
	}
}
