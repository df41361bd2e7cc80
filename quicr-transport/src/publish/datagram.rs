use bytes::Bytes;

use crate::ack::{encode_datagram, AckTracker};
use crate::cache::{ArrivalPos, Cache, FragmentKey, TrackCache};
use crate::message::{CachePolicy, DatagramHeader, FinDatagram, Message, StartPoint};

use super::{CongestionPolicy, ObjectLedger, BACKLOG_AGE, FLAG_SKIPPED};

/// Reads a track cache in arrival order, producing media datagrams.
///
/// Arrival order lets a relay forward fragments as they come in, out of key
/// order; the peer's cache reassembles. Each object is either sent in full or
/// replaced by a zero-length skip sentinel when the link falls behind.
pub struct DatagramPublisher {
	cache: TrackCache,
	reader_id: u64,
	datagram_stream_id: u64,

	start: (u64, u64),
	current: Option<ArrivalPos>,
	length_sent: u64,
	is_current_sent: bool,

	ledger: ObjectLedger,
	policy: CongestionPolicy,
	policy_announced: bool,
	drops: u64,
	fin_sent: bool,

	pub(crate) ack: AckTracker,
}

impl DatagramPublisher {
	pub fn new(cache: TrackCache, datagram_stream_id: u64, policy: CongestionPolicy) -> Self {
		let (reader_id, start) = cache.state().lock().attach_reader();

		Self {
			cache,
			reader_id,
			datagram_stream_id,
			start,
			current: None,
			length_sent: 0,
			is_current_sent: false,
			ledger: ObjectLedger::default(),
			policy,
			policy_announced: false,
			drops: 0,
			fin_sent: false,
			ack: AckTracker::new(),
		}
	}

	pub fn datagram_stream_id(&self) -> u64 {
		self.datagram_stream_id
	}

	pub fn nb_drops(&self) -> u64 {
		self.drops
	}

	pub fn is_finished(&self) -> bool {
		self.fin_sent
	}

	/// Control messages owed on the companion stream: a learned start, the
	/// eviction policy, and the FIN once everything cached has been sent.
	pub fn poll_control(&mut self) -> Option<Message> {
		let mut state = self.cache.state().lock();

		if let Some(reader) = state.reader(self.reader_id) {
			if reader.start_pending {
				reader.start_pending = false;

				let (group_id, object_id) = state.effective_start();
				if (group_id, object_id) > self.start {
					self.start = (group_id, object_id);
				}

				return Some(StartPoint { group_id, object_id }.into());
			}
		}

		if !self.policy_announced && state.is_real_time {
			self.policy_announced = true;
			return Some(CachePolicy { is_real_time: true }.into());
		}

		if !self.fin_sent {
			if let Some((final_group, final_object)) = state.final_point {
				let done = match self.current {
					Some(pos) if state.arrival_valid(pos) => {
						state.arrival_is_tail(pos) && self.is_current_sent
					}
					Some(_) => state.arrival_head().is_none(),
					None => state.is_empty(),
				};

				if done {
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
		}

		None
	}

	/// Build the next media datagram of at most `max_size` bytes: queued
	/// repeats first, then fresh fragments in arrival order.
	pub fn poll_datagram(&mut self, max_size: usize, now: u64) -> Option<Bytes> {
		if let Some(repeat) = self.ack.poll_repeat(max_size, now) {
			return Some(repeat);
		}

		let mut state = self.cache.state().lock();

		// Advance to the next fragment owing bytes.
		loop {
			let pos = match self.current {
				Some(pos) if state.arrival_valid(pos) => {
					if !self.is_current_sent {
						break;
					}
					match state.arrival_next(pos) {
						Some(next) => next,
						None => {
							if let Some(reader) = state.reader(self.reader_id) {
								reader.active = false;
							}
							return None;
						}
					}
				}
				// Never started, or the cursor was purged from under us.
				_ => match state.arrival_head() {
					Some(head) => head,
					None => {
						if let Some(reader) = state.reader(self.reader_id) {
							reader.active = false;
						}
						return None;
					}
				},
			};

			self.current = Some(pos);
			self.is_current_sent = false;
			self.length_sent = 0;

			let (group_id, object_id) = state.arrival_fragment(pos)?.key.object();
			if (group_id, object_id) < self.start
				|| self.ledger.is_behind(group_id, object_id)
				|| self.ledger.is_dropped(group_id, object_id)
			{
				self.is_current_sent = true;
				continue;
			}

			break;
		}

		let pos = self.current?;
		let fragment = state.arrival_fragment(pos)?.clone();
		let (group_id, object_id) = fragment.key.object();

		// Congestion decision, made once at the first encounter of an object.
		if self.length_sent == 0 && !self.ledger.is_known(group_id, object_id) {
			let has_backlog = object_id > 0
				&& !fragment.is_empty()
				&& now.saturating_sub(fragment.cache_time) > BACKLOG_AGE;

			if self
				.policy
				.should_skip(fragment.flags, object_id, has_backlog, self.drops)
			{
				self.drops += 1;
				self.ledger.mark_dropped(group_id, object_id);
				self.is_current_sent = true;

				let header = DatagramHeader {
					datagram_stream_id: self.datagram_stream_id,
					group_id,
					object_id,
					offset: 0,
					queue_delay: 0,
					flags: FLAG_SKIPPED,
					nb_objects_previous_group: 0,
					is_last_fragment: true,
				};

				self.ledger.record(group_id, object_id, 0, Some(0));
				self.update_fence(&mut state, group_id, object_id);

				let datagram = encode_datagram(&header, b"");
				self.ack.on_sent(header, Bytes::new(), now);
				return Some(datagram);
			}
		}

		let offset = fragment.key.offset + self.length_sent;
		let remaining = (fragment.len() - self.length_sent) as usize;

		let mut header = DatagramHeader {
			datagram_stream_id: self.datagram_stream_id,
			group_id,
			object_id,
			offset,
			queue_delay: fragment.queue_delay,
			flags: fragment.flags,
			nb_objects_previous_group: if offset == 0 {
				fragment.nb_objects_previous_group
			} else {
				0
			},
			is_last_fragment: fragment.is_last_fragment,
		};

		if header.size() + remaining.min(1) > max_size {
			return None;
		}

		let take = remaining.min(max_size - header.size());
		if take < remaining {
			// The budget truncates the fragment: the tail goes out separately.
			header.is_last_fragment = false;
		}

		let payload = fragment
			.payload
			.slice(self.length_sent as usize..self.length_sent as usize + take);

		self.length_sent += take as u64;
		if self.length_sent == fragment.len() {
			self.is_current_sent = true;
		}

		self.ledger.record(
			group_id,
			object_id,
			take as u64,
			fragment.is_last_fragment.then(|| fragment.end()),
		);
		self.update_fence(&mut state, group_id, object_id);

		let datagram = encode_datagram(&header, &payload);
		self.ack.on_sent(header, payload, now);
		Some(datagram)
	}

	pub fn on_acked(&mut self, key: FragmentKey) {
		self.ack.on_acked(key);
	}

	pub fn on_lost(&mut self, key: FragmentKey, sent_time: u64) {
		self.ack.on_lost(key, sent_time);
	}

	pub fn on_spurious(&mut self, key: FragmentKey) {
		self.ack.on_spurious(key);
	}

	pub fn poll_extra_repeats(&mut self, now: u64, delay: u64, max_count: u32) {
		self.ack.poll_extra_repeats(now, delay, max_count);
	}

	pub fn has_repeats(&self) -> bool {
		self.ack.has_repeats()
	}

	fn update_fence(&self, state: &mut Cache, group_id: u64, object_id: u64) {
		let fence = self.ledger.first_pending().unwrap_or((group_id, object_id));
		if let Some(reader) = state.reader(self.reader_id) {
			reader.group_id = fence.0;
			reader.object_id = fence.1;
		}
	}
}

impl Drop for DatagramPublisher {
	fn drop(&mut self) {
		self.cache.state().lock().detach_reader(self.reader_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coding::Decode;

	const MAX_DATAGRAM: usize = 1280;

	fn decode(datagram: &Bytes) -> (DatagramHeader, Bytes) {
		let mut buf = datagram.clone();
		let header = DatagramHeader::decode(&mut buf).unwrap();
		(header, buf)
	}

	fn publish_objects(cache: &TrackCache, count: u64, flags: u8, now: u64) {
		let mut producer = cache.producer();
		for index in 0..count {
			producer.publish_object(Bytes::from(vec![index as u8; 40]), flags, 0, now);
		}
		producer.finish();
	}

	#[test]
	fn sends_fragments_in_arrival_order() {
		let cache = TrackCache::new("quicr://test/a", false);
		publish_objects(&cache, 3, 0, 10);

		let mut publisher = DatagramPublisher::new(cache, 4, CongestionPolicy::default());

		for expected in 0..3u64 {
			let datagram = publisher.poll_datagram(MAX_DATAGRAM, 20).unwrap();
			let (header, payload) = decode(&datagram);
			assert_eq!(header.datagram_stream_id, 4);
			assert_eq!(header.object_id, expected);
			assert!(header.is_last_fragment);
			assert_eq!(payload.len(), 40);
		}

		assert!(publisher.poll_datagram(MAX_DATAGRAM, 21).is_none());
		match publisher.poll_control() {
			Some(Message::FinDatagram(fin)) => {
				assert_eq!((fin.final_group_id, fin.final_object_id), (0, 3))
			}
			other => panic!("expected fin, got {other:?}"),
		}
	}

	#[test]
	fn truncation_clears_last_fragment_flag() {
		let cache = TrackCache::new("quicr://test/a", false);
		{
			let mut producer = cache.producer();
			producer.publish_object(Bytes::from(vec![9u8; 100]), 0, 0, 10);
		}

		let mut publisher = DatagramPublisher::new(cache, 1, CongestionPolicy::default());

		let first = publisher.poll_datagram(40, 20).unwrap();
		let (header, payload) = decode(&first);
		assert!(!header.is_last_fragment);
		assert_eq!(header.offset, 0);

		let second = publisher.poll_datagram(MAX_DATAGRAM, 21).unwrap();
		let (tail, tail_payload) = decode(&second);
		assert!(tail.is_last_fragment);
		assert_eq!(tail.offset, payload.len() as u64);
		assert_eq!(payload.len() + tail_payload.len(), 100);
	}

	#[test]
	fn backlogged_objects_are_skipped_with_a_sentinel() {
		let cache = TrackCache::new("quicr://test/a", false);
		publish_objects(&cache, 3, 0x90, 0);

		let policy = CongestionPolicy {
			enabled: true,
			min_loss_class: 0x82,
			max_drops: None,
		};
		let mut publisher = DatagramPublisher::new(cache, 1, policy);

		// Well past the backlog age: everything but the group opener is skipped.
		let now = BACKLOG_AGE * 10;

		let (header, _) = decode(&publisher.poll_datagram(MAX_DATAGRAM, now).unwrap());
		assert_eq!(header.object_id, 0);
		assert_ne!(header.flags, FLAG_SKIPPED);

		for expected in 1..3u64 {
			let (header, payload) = decode(&publisher.poll_datagram(MAX_DATAGRAM, now).unwrap());
			assert_eq!(header.object_id, expected);
			assert_eq!(header.flags, FLAG_SKIPPED);
			assert!(header.is_last_fragment);
			assert!(payload.is_empty());
		}

		assert_eq!(publisher.nb_drops(), 2);
	}

	#[test]
	fn lost_datagrams_are_repeated() {
		let cache = TrackCache::new("quicr://test/a", false);
		publish_objects(&cache, 1, 0, 10);

		let mut publisher = DatagramPublisher::new(cache, 1, CongestionPolicy::default());

		let original = publisher.poll_datagram(MAX_DATAGRAM, 20).unwrap();
		let (header, _) = decode(&original);
		let key = FragmentKey::new(header.group_id, header.object_id, header.offset);

		publisher.on_lost(key, 20);
		let repeat = publisher.poll_datagram(MAX_DATAGRAM, 50_000).unwrap();
		assert_eq!(repeat, original);

		publisher.on_acked(key);
		assert_eq!(publisher.ack.outstanding(), 0);
	}
}
