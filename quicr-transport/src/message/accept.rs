use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Accept a POST: the receiver picks the datagram stream ID it will demultiplex on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accept {
	pub datagram_stream_id: u64,
}

impl Decode for Accept {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let datagram_stream_id = u64::decode(buf)?;
		Ok(Self { datagram_stream_id })
	}
}

impl Encode for Accept {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.datagram_stream_id.encode(buf)
	}
}
