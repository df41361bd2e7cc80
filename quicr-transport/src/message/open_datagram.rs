use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Subscribe to a URL, receiving its media as unreliable datagrams.
///
/// The subscriber picks the `datagram_stream_id` it will demultiplex on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenDatagram {
	pub url: String,
	pub datagram_stream_id: u64,
}

impl Decode for OpenDatagram {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let url = String::decode(buf)?;
		let datagram_stream_id = u64::decode(buf)?;

		Ok(Self {
			url,
			datagram_stream_id,
		})
	}
}

impl Encode for OpenDatagram {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.url.encode(buf)?;
		self.datagram_stream_id.encode(buf)
	}
}
