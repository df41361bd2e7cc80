use bytes::{Buf, BufMut};

use crate::coding::{varint_size, Decode, DecodeError, Encode, EncodeError};

/// The header prepended to every media datagram; the fragment payload is the
/// remainder of the datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatagramHeader {
	pub datagram_stream_id: u64,
	pub group_id: u64,
	pub object_id: u64,
	pub offset: u64,
	pub queue_delay: u64,
	pub flags: u8,
	/// Meaningful only at `object_id == 0, offset == 0`: the number of objects
	/// in the previous group.
	pub nb_objects_previous_group: u64,
	pub is_last_fragment: bool,
}

impl DatagramHeader {
	/// The encoded size of the header in bytes.
	pub fn size(&self) -> usize {
		varint_size(self.datagram_stream_id)
			+ varint_size(self.group_id)
			+ varint_size(self.object_id)
			+ varint_size(self.offset)
			+ varint_size(self.queue_delay)
			+ 1
			+ varint_size(self.nb_objects_previous_group)
			+ 1
	}
}

impl Decode for DatagramHeader {
	fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let datagram_stream_id = u64::decode(buf)?;
		let group_id = u64::decode(buf)?;
		let object_id = u64::decode(buf)?;
		let offset = u64::decode(buf)?;
		let queue_delay = u64::decode(buf)?;
		let flags = u8::decode(buf)?;
		let nb_objects_previous_group = u64::decode(buf)?;
		let is_last_fragment = bool::decode(buf)?;

		Ok(Self {
			datagram_stream_id,
			group_id,
			object_id,
			offset,
			queue_delay,
			flags,
			nb_objects_previous_group,
			is_last_fragment,
		})
	}
}

impl Encode for DatagramHeader {
	fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
		self.datagram_stream_id.encode(buf)?;
		self.group_id.encode(buf)?;
		self.object_id.encode(buf)?;
		self.offset.encode(buf)?;
		self.queue_delay.encode(buf)?;
		self.flags.encode(buf)?;
		self.nb_objects_previous_group.encode(buf)?;
		self.is_last_fragment.encode(buf)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn round_trip() {
		let header = DatagramHeader {
			datagram_stream_id: 5,
			group_id: 1000,
			object_id: 3,
			offset: 70_000,
			queue_delay: 33_333,
			flags: 0xff,
			nb_objects_previous_group: 0,
			is_last_fragment: true,
		};

		let mut buf = BytesMut::new();
		header.encode(&mut buf).unwrap();
		assert_eq!(buf.len(), header.size());

		let mut read = buf.freeze();
		assert_eq!(DatagramHeader::decode(&mut read).unwrap(), header);
		assert_eq!(read.remaining(), 0);
	}

	#[test]
	fn reject_truncation() {
		let header = DatagramHeader {
			datagram_stream_id: 1,
			group_id: 0,
			object_id: 64,
			offset: 0,
			queue_delay: 0,
			flags: 0,
			nb_objects_previous_group: 0,
			is_last_fragment: false,
		};

		let mut buf = BytesMut::new();
		header.encode(&mut buf).unwrap();
		let full = buf.freeze();

		for cut in 0..full.len() {
			let mut short = full.slice(..cut);
			assert!(DatagramHeader::decode(&mut short).is_err());
		}
	}
}
