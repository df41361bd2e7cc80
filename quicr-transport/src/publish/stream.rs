use bytes::Bytes;

use crate::cache::{Cache, TrackCache};
use crate::message::{CachePolicy, FinDatagram, Message, Repair, StartPoint};

use super::{CongestionPolicy, BACKLOG_AGE, FLAG_SKIPPED};

/// Reads a track cache in key order, producing framed messages for a reliable
/// stream: the media as repair-style chunks, then a FIN with the final point.
pub struct StreamPublisher {
	cache: TrackCache,
	reader_id: u64,

	group_id: u64,
	object_id: u64,
	offset: u64,

	policy: CongestionPolicy,
	policy_announced: bool,
	drops: u64,
	fin_sent: bool,
}

impl StreamPublisher {
	pub fn new(cache: TrackCache, policy: CongestionPolicy) -> Self {
		let (reader_id, (group_id, object_id)) = cache.state().lock().attach_reader();

		Self {
			cache,
			reader_id,
			group_id,
			object_id,
			offset: 0,
			policy,
			policy_announced: false,
			drops: 0,
			fin_sent: false,
		}
	}

	pub fn is_finished(&self) -> bool {
		self.fin_sent
	}

	pub fn nb_drops(&self) -> u64 {
		self.drops
	}

	/// Produce the next message, with at most `max_payload` bytes of media, or
	/// None when there is nothing to send until the cache wakes the reader.
	pub fn poll_message(&mut self, max_payload: usize, now: u64) -> Option<Message> {
		let mut state = self.cache.state().lock();

		// Relay a newly learned start before any data, snapping the cursor.
		if let Some(reader) = state.reader(self.reader_id) {
			if reader.start_pending {
				reader.start_pending = false;

				let (group_id, object_id) = state.effective_start();
				if (self.group_id, self.object_id) < (group_id, object_id) {
					self.group_id = group_id;
					self.object_id = object_id;
					self.offset = 0;
				}

				return Some(StartPoint { group_id, object_id }.into());
			}
		}

		if !self.policy_announced && state.is_real_time {
			self.policy_announced = true;
			return Some(CachePolicy { is_real_time: true }.into());
		}

		if self.fin_sent {
			return None;
		}

		loop {
			let found = state
				.get_containing(self.group_id, self.object_id, self.offset)
				.map(|(fragment, skip)| (fragment.clone(), skip));

			let Some((fragment, skip_bytes)) = found else {
				// The group may have ended; its successor confirms the count.
				if self.offset == 0 && self.object_id > 0 {
					if let Some(opener) = state.get(self.group_id + 1, 0, 0) {
						if self.object_id >= opener.nb_objects_previous_group {
							self.group_id += 1;
							self.object_id = 0;
							continue;
						}
					}
				}

				// End of stream.
				if let Some((final_group, final_object)) = state.final_point {
					if (self.group_id, self.object_id) >= (final_group, final_object) {
						self.fin_sent = true;
						return Some(
							FinDatagram {
								final_group_id: final_group,
								final_object_id: final_object,
							}
							.into(),
						);
					}
				}

				if let Some(reader) = state.reader(self.reader_id) {
					reader.active = false;
				}
				return None;
			};

			// Congestion decision, made once per object at its head.
			if self.offset == 0 {
				let has_backlog = self.object_id > 0
					&& !fragment.is_empty()
					&& now.saturating_sub(fragment.cache_time) > BACKLOG_AGE;

				if self
					.policy
					.should_skip(fragment.flags, self.object_id, has_backlog, self.drops)
				{
					self.drops += 1;

					let msg = Repair {
						group_id: self.group_id,
						object_id: self.object_id,
						offset: 0,
						queue_delay: 0,
						flags: FLAG_SKIPPED,
						nb_objects_previous_group: fragment.nb_objects_previous_group,
						is_last_fragment: true,
						payload: Bytes::new(),
					};

					self.object_id += 1;
					self.offset = 0;
					self.update_fence(&mut state);
					return Some(msg.into());
				}
			}

			let available = fragment.payload.len() - skip_bytes;
			if max_payload == 0 && available > 0 {
				return None;
			}

			let take = available.min(max_payload);
			let through_end = skip_bytes + take == fragment.payload.len();
			let is_last = fragment.is_last_fragment && through_end;

			let msg = Repair {
				group_id: self.group_id,
				object_id: self.object_id,
				offset: self.offset,
				queue_delay: fragment.queue_delay,
				flags: fragment.flags,
				nb_objects_previous_group: if self.offset == 0 {
					fragment.nb_objects_previous_group
				} else {
					0
				},
				is_last_fragment: is_last,
				payload: fragment.payload.slice(skip_bytes..skip_bytes + take),
			};

			if is_last {
				self.object_id += 1;
				self.offset = 0;
			} else {
				self.offset += take as u64;
			}
			self.update_fence(&mut state);

			return Some(msg.into());
		}
	}

	fn update_fence(&self, state: &mut Cache) {
		if let Some(reader) = state.reader(self.reader_id) {
			reader.group_id = self.group_id;
			reader.object_id = self.object_id;
		}
	}
}

impl Drop for StreamPublisher {
	fn drop(&mut self) {
		self.cache.state().lock().detach_reader(self.reader_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::TrackCache;

	fn publish(cache: &TrackCache, objects: &[&'static [u8]]) {
		let mut producer = cache.producer();
		for payload in objects {
			producer.publish_object(Bytes::from_static(payload), 0, 0, 10);
		}
		producer.finish();
	}

	fn collect(publisher: &mut StreamPublisher, max_payload: usize) -> Vec<Message> {
		let mut out = Vec::new();
		while let Some(msg) = publisher.poll_message(max_payload, 20) {
			out.push(msg);
		}
		out
	}

	#[test]
	fn emits_objects_in_order_then_fin() {
		let cache = TrackCache::new("quicr://test/a", false);
		publish(&cache, &[b"first", b"second"]);

		let mut publisher = StreamPublisher::new(cache, CongestionPolicy::default());
		let messages = collect(&mut publisher, 1000);

		assert_eq!(messages.len(), 3);
		match (&messages[0], &messages[1], &messages[2]) {
			(Message::Repair(a), Message::Repair(b), Message::FinDatagram(fin)) => {
				assert_eq!((a.object_id, a.payload.as_ref()), (0, b"first".as_ref()));
				assert!(a.is_last_fragment);
				assert_eq!((b.object_id, b.payload.as_ref()), (1, b"second".as_ref()));
				assert_eq!((fin.final_group_id, fin.final_object_id), (0, 2));
			}
			other => panic!("unexpected messages: {other:?}"),
		}
		assert!(publisher.is_finished());
	}

	#[test]
	fn splits_objects_under_small_budget() {
		let cache = TrackCache::new("quicr://test/a", false);
		publish(&cache, &[b"0123456789"]);

		let mut publisher = StreamPublisher::new(cache, CongestionPolicy::default());
		let messages = collect(&mut publisher, 4);

		// 10 bytes in chunks of 4: three repair messages, then the fin.
		assert_eq!(messages.len(), 4);
		let mut bytes = Vec::new();
		for msg in &messages[..3] {
			match msg {
				Message::Repair(repair) => {
					assert_eq!(repair.offset, bytes.len() as u64);
					bytes.extend_from_slice(&repair.payload);
				}
				other => panic!("unexpected message: {other:?}"),
			}
		}
		assert_eq!(bytes, b"0123456789");
	}

	#[test]
	fn waits_for_missing_data_before_fin() {
		let cache = TrackCache::new("quicr://test/a", false);
		let mut publisher = StreamPublisher::new(cache.clone(), CongestionPolicy::default());

		assert!(publisher.poll_message(1000, 20).is_none());
		assert!(!publisher.is_finished());

		publish(&cache, &[b"late"]);
		let messages = collect(&mut publisher, 1000);
		assert_eq!(messages.len(), 2);
		assert!(publisher.is_finished());
	}
}
