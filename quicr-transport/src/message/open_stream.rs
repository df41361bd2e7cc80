use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Subscribe to a URL, receiving its media as reliable in-order messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenStream {
	pub url: String,
}

impl Decode for OpenStream {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let url = String::decode(buf)?;
		Ok(Self { url })
	}
}

impl Encode for OpenStream {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.url.encode(buf)
	}
}
