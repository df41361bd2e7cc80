use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Announce the end of the media: the final point is one past the last object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinDatagram {
	pub final_group_id: u64,
	pub final_object_id: u64,
}

impl Decode for FinDatagram {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let final_group_id = u64::decode(buf)?;
		let final_object_id = u64::decode(buf)?;

		Ok(Self {
			final_group_id,
			final_object_id,
		})
	}
}

impl Encode for FinDatagram {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.final_group_id.encode(buf)?;
		self.final_object_id.encode(buf)
	}
}
