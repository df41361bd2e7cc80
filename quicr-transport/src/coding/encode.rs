use bytes::{BufMut, Bytes};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
	#[error("value too large for varint encoding")]
	BoundsExceeded,
}

pub trait Encode {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError>;
}

impl Encode for u8 {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		buf.put_u8(*self);
		Ok(())
	}
}

impl Encode for bool {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		buf.put_u8(*self as u8);
		Ok(())
	}
}

impl Encode for Bytes {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		(self.len() as u64).encode(buf)?;
		buf.put_slice(self);
		Ok(())
	}
}

impl Encode for String {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		(self.len() as u64).encode(buf)?;
		buf.put_slice(self.as_bytes());
		Ok(())
	}
}
