use bytes::{Buf, BufMut, Bytes};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// A media fragment carried on a reliable stream.
///
/// Stream-mode delivery and loss repair both use this message. It carries the
/// full fragment identity so a relay can re-serve the bytes in datagram mode,
/// including the drop class and queue delay assigned by the publisher.
///
/// The last-fragment flag is packed into the low bit of the length varint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repair {
	pub group_id: u64,
	pub object_id: u64,
	pub offset: u64,
	pub queue_delay: u64,
	pub flags: u8,
	/// Meaningful only at `object_id == 0, offset == 0`: the number of objects
	/// in the previous group.
	pub nb_objects_previous_group: u64,
	pub is_last_fragment: bool,
	pub payload: Bytes,
}

impl Decode for Repair {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let group_id = u64::decode(buf)?;
		let object_id = u64::decode(buf)?;
		let offset = u64::decode(buf)?;
		let queue_delay = u64::decode(buf)?;
		let flags = u8::decode(buf)?;
		let nb_objects_previous_group = u64::decode(buf)?;

		let length = u64::decode(buf)?;
		let is_last_fragment = length & 1 != 0;
		let length = usize::try_from(length >> 1).map_err(|_| DecodeError::BoundsExceeded)?;

		if buf.remaining() < length {
			return Err(DecodeError::UnexpectedEnd);
		}
		let payload = buf.copy_to_bytes(length);

		Ok(Self {
			group_id,
			object_id,
			offset,
			queue_delay,
			flags,
			nb_objects_previous_group,
			is_last_fragment,
			payload,
		})
	}
}

impl Encode for Repair {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.group_id.encode(buf)?;
		self.object_id.encode(buf)?;
		self.offset.encode(buf)?;
		self.queue_delay.encode(buf)?;
		self.flags.encode(buf)?;
		self.nb_objects_previous_group.encode(buf)?;

		let length = (self.payload.len() as u64) << 1 | self.is_last_fragment as u64;
		length.encode(buf)?;
		buf.put_slice(&self.payload);

		Ok(())
	}
}
