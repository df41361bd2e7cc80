use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Ask the peer to retransmit an object.
///
/// Defined on the wire but not yet handled on receive; see session/stream.rs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestRepair {
	pub final_object_id: u64,
	pub object_id: u64,
}

impl Decode for RequestRepair {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let final_object_id = u64::decode(buf)?;
		let object_id = u64::decode(buf)?;

		Ok(Self {
			final_object_id,
			object_id,
		})
	}
}

impl Encode for RequestRepair {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.final_object_id.encode(buf)?;
		self.object_id.encode(buf)
	}
}
