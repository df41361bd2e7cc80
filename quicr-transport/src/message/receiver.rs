use bytes::{Buf, BytesMut};

use crate::coding::{Decode, DecodeError};

use super::Message;

/// Reassembles length-prefixed control messages from stream data.
///
/// Each frame is a 16-bit big-endian length followed by one encoded message.
/// Stream chunks may split frames at any byte position.
#[derive(Default)]
pub struct Receiver {
	buffer: BytesMut,
}

impl Receiver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, data: &[u8]) {
		self.buffer.extend_from_slice(data);
	}

	/// Decode the next complete message, or None if more stream data is needed.
	pub fn next(&mut self) -> Result<Option<Message>, DecodeError> {
		if self.buffer.len() < 2 {
			return Ok(None);
		}

		let length = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
		if self.buffer.len() < 2 + length {
			return Ok(None);
		}

		self.buffer.advance(2);
		let mut frame = self.buffer.split_to(length).freeze();

		let msg = Message::decode(&mut frame)?;
		if frame.has_remaining() {
			return Err(DecodeError::TrailingBytes);
		}

		Ok(Some(msg))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coding::Encode;
	use crate::message::{Accept, StartPoint};
	use bytes::BufMut;

	fn frame(msg: &Message) -> Vec<u8> {
		let mut body = BytesMut::new();
		msg.encode(&mut body).unwrap();

		let mut out = Vec::new();
		out.put_u16(body.len() as u16);
		out.extend_from_slice(&body);
		out
	}

	#[test]
	fn reassembles_split_frames() {
		let first: Message = StartPoint {
			group_id: 4,
			object_id: 0,
		}
		.into();
		let second: Message = Accept { datagram_stream_id: 9 }.into();

		let mut wire = frame(&first);
		wire.extend(frame(&second));

		let mut recv = Receiver::new();

		// Deliver one byte at a time; messages pop out exactly at frame ends.
		let mut got = Vec::new();
		for byte in wire {
			recv.push(&[byte]);
			while let Some(msg) = recv.next().unwrap() {
				got.push(msg);
			}
		}

		assert_eq!(got, vec![first, second]);
	}

	#[test]
	fn rejects_trailing_bytes() {
		let msg: Message = Accept { datagram_stream_id: 1 }.into();

		let mut body = BytesMut::new();
		msg.encode(&mut body).unwrap();
		body.put_u8(0);

		let mut wire = Vec::new();
		wire.put_u16(body.len() as u16);
		wire.extend_from_slice(&body);

		let mut recv = Receiver::new();
		recv.push(&wire);
		assert_eq!(recv.next(), Err(DecodeError::TrailingBytes));
	}
}
