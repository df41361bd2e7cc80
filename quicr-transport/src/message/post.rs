use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Offer to publish a URL to the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
	pub url: String,
}

impl Decode for Post {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let url = String::decode(buf)?;
		Ok(Self { url })
	}
}

impl Encode for Post {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.url.encode(buf)
	}
}
