use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::coding::{Encode, EncodeError};

use super::Message;

/// The largest encoded message that fits the 16-bit length prefix.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Queues framed control messages for a stream, drained under a byte budget.
#[derive(Default)]
pub struct Sender {
	queue: VecDeque<Bytes>,
}

impl Sender {
	pub fn new() -> Self {
		Self::default()
	}

	/// Frame and queue a message.
	pub fn send<M: Into<Message>>(&mut self, msg: M) -> Result<(), EncodeError> {
		let msg = msg.into();

		let mut body = BytesMut::new();
		msg.encode(&mut body)?;
		if body.len() > MAX_FRAME_SIZE {
			return Err(EncodeError::BoundsExceeded);
		}

		let mut frame = BytesMut::with_capacity(2 + body.len());
		frame.put_u16(body.len() as u16);
		frame.extend_from_slice(&body);

		self.queue.push_back(frame.freeze());
		Ok(())
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	/// The number of queued bytes, including frame prefixes.
	pub fn len(&self) -> usize {
		self.queue.iter().map(Bytes::len).sum()
	}

	/// Drain up to `budget` bytes; frames may be split mid-frame.
	pub fn poll(&mut self, budget: usize) -> Option<Bytes> {
		if self.queue.is_empty() || budget == 0 {
			return None;
		}

		let mut out = BytesMut::new();

		while out.len() < budget {
			let Some(front) = self.queue.front_mut() else { break };

			let take = front.len().min(budget - out.len());
			out.extend_from_slice(&front.split_to(take));

			if front.is_empty() {
				self.queue.pop_front();
			}
		}

		Some(out.freeze())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::{Receiver, StartPoint};

	#[test]
	fn drains_under_budget() {
		let mut sender = Sender::new();
		for group_id in 0..4 {
			sender.send(StartPoint { group_id, object_id: 0 }).unwrap();
		}

		let mut recv = Receiver::new();
		let mut got = 0;
		while let Some(chunk) = sender.poll(3) {
			assert!(chunk.len() <= 3);
			recv.push(&chunk);
			while recv.next().unwrap().is_some() {
				got += 1;
			}
		}

		assert_eq!(got, 4);
		assert!(sender.is_empty());
	}
}
