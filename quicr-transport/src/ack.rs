use std::collections::{BTreeMap, VecDeque};

use bytes::{Bytes, BytesMut};

use crate::cache::FragmentKey;
use crate::coding::Encode;
use crate::message::DatagramHeader;

/// A loss report for a fragment re-sent more than this long before the report
/// refers to a stale copy.
const REPEAT_SUPPRESS_WINDOW: u64 = 1_000;

struct Record {
	header: DatagramHeader,
	payload: Bytes,
	is_acked: bool,
	fec_needed: bool,
	last_sent_time: u64,
	repeat_count: u32,
}

impl Record {
	fn key(&self) -> FragmentKey {
		FragmentKey::new(self.header.group_id, self.header.object_id, self.header.offset)
	}

	fn end(&self) -> u64 {
		self.header.offset + self.payload.len() as u64
	}
}

#[derive(Clone, Copy)]
struct Horizon {
	key: FragmentKey,
	end: u64,
	is_last_fragment: bool,
}

/// Tracks outstanding fragments on one outgoing datagram stream.
///
/// Records are keyed by fragment identity; the horizon collapses the
/// contiguous fully-acknowledged prefix so the tree only holds in-flight and
/// lost fragments. Loss reports queue repeats.
#[derive(Default)]
pub struct AckTracker {
	records: BTreeMap<FragmentKey, Record>,
	horizon: Option<Horizon>,
	repeats: VecDeque<FragmentKey>,

	/// Sends at or below the horizon: duplicates of data already acknowledged.
	nb_obsolete_sends: u64,
}

impl AckTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a sent fragment. Fragments at or below the horizon are counted
	/// but never re-created.
	pub fn on_sent(&mut self, header: DatagramHeader, payload: Bytes, now: u64) {
		let key = FragmentKey::new(header.group_id, header.object_id, header.offset);
		if self.below_horizon(key) {
			self.nb_obsolete_sends += 1;
			return;
		}

		if let Some(record) = self.records.get_mut(&key) {
			// A repeat of something still tracked.
			record.last_sent_time = now;
			record.fec_needed = false;
			return;
		}

		self.records.insert(
			key,
			Record {
				header,
				payload,
				is_acked: false,
				fec_needed: false,
				last_sent_time: now,
				repeat_count: 0,
			},
		);
	}

	pub fn on_acked(&mut self, key: FragmentKey) {
		if self.below_horizon(key) {
			return;
		}

		if let Some(record) = self.records.get_mut(&key) {
			record.is_acked = true;
			record.fec_needed = false;
		}

		self.collapse();
	}

	/// Spurious loss reports arrive when the "lost" datagram was delivered
	/// after all; treat them as acknowledgements.
	pub fn on_spurious(&mut self, key: FragmentKey) {
		self.on_acked(key);
	}

	pub fn on_lost(&mut self, key: FragmentKey, sent_time: u64) {
		if self.below_horizon(key) {
			return;
		}

		let Some(record) = self.records.get_mut(&key) else { return };
		if record.is_acked {
			return;
		}

		// A newer copy is already in flight; this report is about an old one.
		if record.last_sent_time > sent_time.saturating_add(REPEAT_SUPPRESS_WINDOW) {
			return;
		}

		if !record.fec_needed {
			record.fec_needed = true;
			self.repeats.push_back(key);
		}
	}

	pub fn has_repeats(&self) -> bool {
		!self.repeats.is_empty()
	}

	/// Build the next repeat datagram, splitting records that no longer fit
	/// the transport's maximum datagram size.
	pub fn poll_repeat(&mut self, max_size: usize, now: u64) -> Option<Bytes> {
		loop {
			let key = self.repeats.pop_front()?;

			let Some(record) = self.records.get(&key) else { continue };
			if record.is_acked || !record.fec_needed {
				continue;
			}

			let mut record = self.records.remove(&key).expect("record vanished");

			let header_size = record.header.size();
			if header_size + record.payload.len() > max_size && record.payload.len() > 1 {
				// Split the record: the first half loses the last-fragment flag,
				// the second half is queued as its own repeat.
				let head_len = (max_size.saturating_sub(header_size)).max(1).min(record.payload.len() - 1);

				let mut tail_header = record.header.clone();
				tail_header.offset += head_len as u64;
				tail_header.nb_objects_previous_group = 0;

				let tail = Record {
					header: tail_header,
					payload: record.payload.split_off(head_len),
					is_acked: false,
					fec_needed: true,
					last_sent_time: record.last_sent_time,
					repeat_count: record.repeat_count,
				};

				record.header.is_last_fragment = false;
				let tail_key = tail.key();
				self.records.insert(tail_key, tail);
				self.repeats.push_front(tail_key);
			}

			record.fec_needed = false;
			record.last_sent_time = now;
			record.repeat_count += 1;

			let datagram = encode_datagram(&record.header, &record.payload);
			self.records.insert(record.key(), record);

			return Some(datagram);
		}
	}

	/// Queue proactive repeats for fragments unacknowledged longer than
	/// `delay`, at most `max_count` times per fragment.
	pub fn poll_extra_repeats(&mut self, now: u64, delay: u64, max_count: u32) {
		let mut due: Vec<FragmentKey> = Vec::new();
		for (key, record) in &self.records {
			if !record.is_acked
				&& !record.fec_needed
				&& record.repeat_count < max_count
				&& now.saturating_sub(record.last_sent_time) > delay
			{
				due.push(*key);
			}
		}

		for key in due {
			if let Some(record) = self.records.get_mut(&key) {
				record.fec_needed = true;
				self.repeats.push_back(key);
			}
		}
	}

	/// The contiguous fully-acknowledged prefix, for tests and accounting.
	pub fn horizon(&self) -> Option<(FragmentKey, bool)> {
		self.horizon.map(|h| (h.key, h.is_last_fragment))
	}

	pub fn outstanding(&self) -> usize {
		self.records.len()
	}

	fn below_horizon(&self, key: FragmentKey) -> bool {
		self.horizon.is_some_and(|h| key <= h.key)
	}

	fn collapse(&mut self) {
		loop {
			let Some((&key, record)) = self.records.first_key_value() else { break };
			if !record.is_acked {
				break;
			}

			// The previous record's last-fragment flag tells whether the next
			// key starts a new object at offset 0 or continues at an offset.
			let adjacent = match self.horizon {
				None => key.offset == 0,
				Some(h) => {
					if h.is_last_fragment {
						key.offset == 0 && key.object() > h.key.object()
					} else {
						key.object() == h.key.object() && key.offset == h.end
					}
				}
			};

			if !adjacent {
				break;
			}

			self.horizon = Some(Horizon {
				key,
				end: record.end(),
				is_last_fragment: record.header.is_last_fragment,
			});
			self.records.remove(&key);
		}
	}
}

pub fn encode_datagram(header: &DatagramHeader, payload: &[u8]) -> Bytes {
	let mut out = BytesMut::with_capacity(header.size() + payload.len());
	header.encode(&mut out).expect("datagram header encoding");
	out.extend_from_slice(payload);
	out.freeze()
}
