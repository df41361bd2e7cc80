use std::collections::{BTreeMap, HashMap};

use bytes::{Bytes, BytesMut};

use super::{Fragment, FragmentKey};

/// Reclaim delay after close when the end of the media was not yet known.
pub const CACHE_DELETE_DELAY: u64 = 30_000_000;

/// Reclaim delay after close when the end was already learned.
pub const CACHE_DELETE_DELAY_FIN: u64 = 3_000_000;

struct Slot {
	fragment: Fragment,
	prev: Option<usize>,
	next: Option<usize>,
	generation: u64,
}

/// A stable reference into the arrival order, checked against slot reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrivalPos {
	index: usize,
	generation: u64,
}

/// Book-keeping for one attached reader stream.
pub struct ReaderSlot {
	/// Set whenever the cache changes; cleared when the reader polls dry.
	pub active: bool,

	/// The reader's current object; fragments at or after it are never evicted.
	pub group_id: u64,
	pub object_id: u64,

	/// A start point learned by the cache has not yet been relayed downstream.
	pub start_pending: bool,
}

/// The fragment store for one track.
///
/// Fragments live in a slab; the key-order index and the arrival-order links
/// both refer to slab indices. A single consumer merges fragments in; any
/// number of readers traverse, each registered in `readers` so eviction can
/// stay behind every cursor.
pub struct Cache {
	slots: Vec<Option<Slot>>,
	free: Vec<usize>,
	generation: u64,
	by_key: BTreeMap<FragmentKey, usize>,
	head: Option<usize>,
	tail: Option<usize>,

	/// Earliest addressable point; advances on purge and on a learned start.
	pub first_group_id: u64,
	pub first_object_id: u64,
	start_learned: bool,

	/// The contiguous-receive frontier: everything below it is present.
	pub next_group_id: u64,
	pub next_object_id: u64,
	pub next_offset: u64,

	/// One past the last object, once the end of the media is learned.
	pub final_point: Option<(u64, u64)>,

	/// The consumer side of the cache has finished.
	pub is_closed: bool,

	/// Discard old groups aggressively instead of ageing them out.
	pub is_real_time: bool,

	/// When set, wall time after which an empty or closed cache may be reclaimed.
	pub cache_delete_time: Option<u64>,

	/// Objects known complete, for progress reporting.
	pub nb_object_received: u64,

	readers: HashMap<u64, ReaderSlot>,
	next_reader_id: u64,
}

impl Cache {
	pub fn new(is_real_time: bool) -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
			generation: 0,
			by_key: BTreeMap::new(),
			head: None,
			tail: None,
			first_group_id: 0,
			first_object_id: 0,
			start_learned: false,
			next_group_id: 0,
			next_object_id: 0,
			next_offset: 0,
			final_point: None,
			is_closed: false,
			is_real_time,
			cache_delete_time: None,
			nb_object_received: 0,
			readers: HashMap::new(),
			next_reader_id: 0,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.by_key.is_empty()
	}

	pub fn len(&self) -> usize {
		self.by_key.len()
	}

	/// Merge an arriving fragment, inserting only the byte ranges not already
	/// covered. Returns whether anything new entered the cache.
	pub fn propose(&mut self, mut incoming: Fragment, now: u64) -> bool {
		incoming.cache_time = now;
		let (group_id, object_id) = incoming.key.object();

		if (group_id, object_id) < (self.first_group_id, self.first_object_id) {
			return false;
		}

		if let Some(final_point) = self.final_point {
			// The terminal object itself may exist as an empty sentinel.
			if (group_id, object_id) > final_point
				|| ((group_id, object_id) == final_point && !incoming.is_empty())
			{
				return false;
			}
		}

		let inserted = if incoming.is_empty() {
			self.propose_empty(incoming)
		} else {
			self.propose_bytes(incoming)
		};

		if inserted {
			self.advance_frontier();

			if self.object_complete(group_id, object_id) {
				self.nb_object_received += 1;
			}

			if self.is_real_time {
				self.purge_realtime();
			}

			self.wake_readers();
		}

		inserted
	}

	/// A zero-length last fragment: an object skipped by the publisher, or the
	/// terminal sentinel. Stored only when the object has no bytes already.
	fn propose_empty(&mut self, incoming: Fragment) -> bool {
		if !incoming.is_last_fragment {
			return false;
		}

		let (group_id, object_id) = incoming.key.object();
		if self.object_range(group_id, object_id).next().is_some() {
			return false;
		}

		self.insert(Fragment {
			key: FragmentKey::new(group_id, object_id, 0),
			..incoming
		});
		true
	}

	fn propose_bytes(&mut self, incoming: Fragment) -> bool {
		let (group_id, object_id) = incoming.key.object();
		let start = incoming.key.offset;
		let mut end = incoming.end();

		// Nothing may extend past an already-known last fragment.
		if let Some(last) = self.object_range(group_id, object_id).next_back() {
			if last.is_last_fragment {
				end = end.min(last.end());
				if start >= end {
					return false;
				}
			}
		}

		// Existing coverage overlapping [start, end), in offset order.
		let covered: Vec<(u64, u64)> = self
			.by_key
			.range(FragmentKey::new(group_id, object_id, 0)..FragmentKey::new(group_id, object_id, end))
			.map(|(_, &index)| {
				let fragment = &self.slot(index).fragment;
				(fragment.key.offset, fragment.end())
			})
			.filter(|&(_, cover_end)| cover_end > start)
			.collect();

		// A last-fragment claim stands only if nothing exists past the claimed end.
		let tail_clear = self
			.by_key
			.range(FragmentKey::new(group_id, object_id, end)..=FragmentKey::new(group_id, object_id, u64::MAX))
			.next()
			.is_none();

		let mut inserted = false;
		let mut position = start;

		let mut pieces: Vec<(u64, u64)> = Vec::new();
		for (cover_start, cover_end) in covered {
			if cover_start > position {
				pieces.push((position, cover_start.min(end)));
			}
			position = position.max(cover_end);
			if position >= end {
				break;
			}
		}
		if position < end {
			pieces.push((position, end));
		}

		for (piece_start, piece_end) in pieces {
			let piece = Fragment {
				key: FragmentKey::new(group_id, object_id, piece_start),
				payload: incoming
					.payload
					.slice((piece_start - start) as usize..(piece_end - start) as usize),
				flags: incoming.flags,
				queue_delay: incoming.queue_delay,
				is_last_fragment: incoming.is_last_fragment && piece_end == end && tail_clear,
				nb_objects_previous_group: if piece_start == 0 {
					incoming.nb_objects_previous_group
				} else {
					0
				},
				cache_time: incoming.cache_time,
			};

			self.insert(piece);
			inserted = true;
		}

		inserted
	}

	/// Advance the contiguous-receive frontier past every fragment now present.
	fn advance_frontier(&mut self) {
		loop {
			let key = FragmentKey::new(self.next_group_id, self.next_object_id, self.next_offset);
			if let Some(&index) = self.by_key.get(&key) {
				let (is_last, length) = {
					let fragment = &self.slot(index).fragment;
					(fragment.is_last_fragment, fragment.len())
				};

				if is_last {
					self.next_object_id += 1;
					self.next_offset = 0;
				} else {
					self.next_offset += length;
				}
				continue;
			}

			// A group is crossed only once its object count is confirmed by the
			// first fragment of the next group.
			if self.next_offset == 0 && self.next_object_id > 0 {
				let probe = FragmentKey::new(self.next_group_id + 1, 0, 0);
				if let Some(&index) = self.by_key.get(&probe) {
					if self.slot(index).fragment.nb_objects_previous_group == self.next_object_id {
						self.next_group_id += 1;
						self.next_object_id = 0;
						continue;
					}
				}
			}

			break;
		}
	}

	/// Record the earliest point of the media; everything below it is dropped
	/// and attached readers are told to relay the start downstream.
	pub fn learn_start(&mut self, group_id: u64, object_id: u64) {
		if self.start_learned && (group_id, object_id) <= (self.first_group_id, self.first_object_id) {
			return;
		}

		self.first_group_id = group_id;
		self.first_object_id = object_id;
		self.start_learned = true;

		if (self.next_group_id, self.next_object_id) < (group_id, object_id) {
			self.next_group_id = group_id;
			self.next_object_id = object_id;
			self.next_offset = 0;
		}

		let below: Vec<FragmentKey> = self
			.by_key
			.range(..FragmentKey::new(group_id, object_id, 0))
			.map(|(&key, _)| key)
			.collect();
		for key in below {
			self.remove(key);
		}

		self.advance_frontier();

		let (start_group, start_object) = self.effective_start();
		for reader in self.readers.values_mut() {
			reader.start_pending = true;
			reader.active = true;
			if (reader.group_id, reader.object_id) < (start_group, start_object) {
				reader.group_id = start_group;
				reader.object_id = start_object;
			}
		}
	}

	pub fn start_learned(&self) -> bool {
		self.start_learned
	}

	/// Record the end of the media: one past the last object.
	pub fn learn_end(&mut self, group_id: u64, object_id: u64) {
		if self.final_point.is_some() {
			return;
		}

		self.final_point = Some((group_id, object_id));

		// Nothing lives past the final point except the terminal sentinel.
		let beyond: Vec<FragmentKey> = self
			.by_key
			.range(FragmentKey::new(group_id, object_id, 0)..)
			.filter(|(key, &index)| {
				key.object() > (group_id, object_id) || !self.slot(index).fragment.is_empty()
			})
			.map(|(&key, _)| key)
			.collect();
		for key in beyond {
			self.remove(key);
		}

		self.wake_readers();
	}

	/// Consumer close: derive the final point if it was never announced, and
	/// schedule reclamation.
	pub fn close(&mut self, now: u64) {
		if self.is_closed {
			return;
		}

		let end_known = self.final_point.is_some();
		if !end_known {
			let final_point = if self.next_offset == 0 {
				(self.next_group_id, self.next_object_id)
			} else if self.next_object_id > 1 {
				(self.next_group_id, self.next_object_id - 1)
			} else if let Some(fragment) = self.get_previous(FragmentKey::new(self.next_group_id, 0, 0)) {
				fragment.key.object()
			} else {
				(self.first_group_id, self.first_object_id)
			};
			self.final_point = Some(final_point);
		}

		self.cache_delete_time = Some(now + if end_known { CACHE_DELETE_DELAY_FIN } else { CACHE_DELETE_DELAY });
		self.is_closed = true;
		self.wake_readers();
	}

	/// The receive frontier has caught up with the announced end.
	pub fn is_finished(&self) -> bool {
		self.final_point == Some((self.next_group_id, self.next_object_id))
	}

	/// Age out leading objects older than `max_age`, one object at a time,
	/// never crossing a reader cursor or the frontier.
	pub fn purge_archival(&mut self, now: u64, max_age: u64) {
		let min_kept = self
			.readers
			.values()
			.map(|reader| (reader.group_id, reader.object_id))
			.min()
			.unwrap_or((u64::MAX, u64::MAX))
			.min((self.next_group_id, self.next_object_id));

		loop {
			let (group_id, object_id) = (self.first_group_id, self.first_object_id);
			if (group_id, object_id) >= min_kept {
				break;
			}

			let fragments: Vec<(FragmentKey, u64)> = self
				.object_range(group_id, object_id)
				.map(|fragment| (fragment.key, fragment.cache_time))
				.collect();

			if !fragments.is_empty() {
				// Only complete objects age out while the consumer is live.
				if !(self.object_complete(group_id, object_id) || self.is_closed) {
					break;
				}

				if fragments.iter().any(|&(_, cache_time)| now.saturating_sub(cache_time) <= max_age) {
					break;
				}

				for (key, _) in fragments {
					self.remove(key);
				}
			}

			self.step_first();
		}
	}

	fn step_first(&mut self) {
		self.first_object_id += 1;

		// Cross into the next group once this one is drained behind the frontier.
		if self.next_group_id > self.first_group_id {
			let rest = FragmentKey::new(self.first_group_id, self.first_object_id, 0)
				..FragmentKey::new(self.first_group_id + 1, 0, 0);
			if self.by_key.range(rest).next().is_none() {
				self.first_group_id += 1;
				self.first_object_id = 0;
			}
		}
	}

	/// Drop every group below the frontier and all reader cursors.
	pub fn purge_realtime(&mut self) {
		let kept_group = self
			.readers
			.values()
			.map(|reader| reader.group_id)
			.min()
			.unwrap_or(u64::MAX)
			.min(self.next_group_id);

		if kept_group <= self.first_group_id {
			return;
		}

		let below: Vec<FragmentKey> = self
			.by_key
			.range(..FragmentKey::new(kept_group, 0, 0))
			.map(|(&key, _)| key)
			.collect();
		for key in below {
			self.remove(key);
		}

		if kept_group > self.first_group_id {
			self.first_group_id = kept_group;
			self.first_object_id = 0;
		}
	}

	pub fn get(&self, group_id: u64, object_id: u64, offset: u64) -> Option<&Fragment> {
		let index = *self.by_key.get(&FragmentKey::new(group_id, object_id, offset))?;
		Some(&self.slot(index).fragment)
	}

	/// The largest fragment whose key is at or below `key`.
	pub fn get_previous(&self, key: FragmentKey) -> Option<&Fragment> {
		let (_, &index) = self.by_key.range(..=key).next_back()?;
		Some(&self.slot(index).fragment)
	}

	/// The fragment covering byte `offset` of an object, along with how far
	/// into its payload that byte lies.
	pub fn get_containing(&self, group_id: u64, object_id: u64, offset: u64) -> Option<(&Fragment, usize)> {
		let range = FragmentKey::new(group_id, object_id, 0)..=FragmentKey::new(group_id, object_id, offset);
		let (_, &index) = self.by_key.range(range).next_back()?;

		let fragment = &self.slot(index).fragment;
		if fragment.end() > offset || (fragment.is_empty() && fragment.key.offset == offset) {
			Some((fragment, (offset - fragment.key.offset) as usize))
		} else {
			None
		}
	}

	/// Whether every byte of the object is present, terminated by a last fragment.
	pub fn object_complete(&self, group_id: u64, object_id: u64) -> bool {
		let mut position = 0;
		let mut last = false;

		for fragment in self.object_range(group_id, object_id) {
			if fragment.key.offset != position || last {
				return false;
			}
			position = fragment.end();
			last = fragment.is_last_fragment;
		}

		last
	}

	/// The reassembled bytes of a complete object.
	pub fn object_bytes(&self, group_id: u64, object_id: u64) -> Option<Bytes> {
		if !self.object_complete(group_id, object_id) {
			return None;
		}

		let mut out = BytesMut::new();
		for fragment in self.object_range(group_id, object_id) {
			out.extend_from_slice(&fragment.payload);
		}
		Some(out.freeze())
	}

	fn object_range(&self, group_id: u64, object_id: u64) -> impl DoubleEndedIterator<Item = &Fragment> {
		self.by_key
			.range(FragmentKey::new(group_id, object_id, 0)..=FragmentKey::new(group_id, object_id, u64::MAX))
			.map(|(_, &index)| &self.slot(index).fragment)
	}

	// Arrival-order traversal, used by datagram readers.

	pub fn arrival_head(&self) -> Option<ArrivalPos> {
		self.head.map(|index| ArrivalPos {
			index,
			generation: self.slot(index).generation,
		})
	}

	pub fn arrival_next(&self, pos: ArrivalPos) -> Option<ArrivalPos> {
		if !self.arrival_valid(pos) {
			return None;
		}

		self.slot(pos.index).next.map(|index| ArrivalPos {
			index,
			generation: self.slot(index).generation,
		})
	}

	pub fn arrival_valid(&self, pos: ArrivalPos) -> bool {
		matches!(self.slots.get(pos.index), Some(Some(slot)) if slot.generation == pos.generation)
	}

	pub fn arrival_fragment(&self, pos: ArrivalPos) -> Option<&Fragment> {
		if !self.arrival_valid(pos) {
			return None;
		}
		Some(&self.slot(pos.index).fragment)
	}

	pub fn arrival_is_tail(&self, pos: ArrivalPos) -> bool {
		self.arrival_valid(pos) && self.tail == Some(pos.index)
	}

	// Reader registration.

	/// Attach a reader. It starts at the cache's effective start: a cache whose
	/// media begins mid-group serves from the next group boundary.
	pub fn attach_reader(&mut self) -> (u64, (u64, u64)) {
		let start = self.effective_start();
		let id = self.next_reader_id;
		self.next_reader_id += 1;

		self.readers.insert(
			id,
			ReaderSlot {
				active: true,
				group_id: start.0,
				object_id: start.1,
				start_pending: self.start_learned,
			},
		);

		(id, start)
	}

	pub fn detach_reader(&mut self, id: u64) {
		self.readers.remove(&id);
	}

	pub fn reader(&mut self, id: u64) -> Option<&mut ReaderSlot> {
		self.readers.get_mut(&id)
	}

	pub fn reader_count(&self) -> usize {
		self.readers.len()
	}

	pub fn effective_start(&self) -> (u64, u64) {
		if self.first_object_id > 0 {
			(self.first_group_id + 1, 0)
		} else {
			(self.first_group_id, 0)
		}
	}

	fn wake_readers(&mut self) {
		for reader in self.readers.values_mut() {
			reader.active = true;
		}
	}

	// Slab plumbing.

	fn slot(&self, index: usize) -> &Slot {
		self.slots[index].as_ref().expect("vacant cache slot")
	}

	fn insert(&mut self, fragment: Fragment) {
		let slot = Slot {
			fragment,
			prev: self.tail,
			next: None,
			generation: self.generation,
		};
		let key = slot.fragment.key;

		let index = match self.free.pop() {
			Some(index) => {
				self.slots[index] = Some(slot);
				index
			}
			None => {
				self.slots.push(Some(slot));
				self.slots.len() - 1
			}
		};

		if let Some(tail) = self.tail {
			self.slots[tail].as_mut().expect("vacant cache slot").next = Some(index);
		} else {
			self.head = Some(index);
		}
		self.tail = Some(index);

		let replaced = self.by_key.insert(key, index);
		debug_assert!(replaced.is_none(), "duplicate fragment key {key:?}");
	}

	fn remove(&mut self, key: FragmentKey) {
		let Some(index) = self.by_key.remove(&key) else { return };
		let slot = self.slots[index].take().expect("vacant cache slot");

		match slot.prev {
			Some(prev) => self.slots[prev].as_mut().expect("vacant cache slot").next = slot.next,
			None => self.head = slot.next,
		}
		match slot.next {
			Some(next) => self.slots[next].as_mut().expect("vacant cache slot").prev = slot.prev,
			None => self.tail = slot.prev,
		}

		self.free.push(index);
		self.generation += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fragment(group_id: u64, object_id: u64, offset: u64, data: &[u8], last: bool) -> Fragment {
		Fragment {
			key: FragmentKey::new(group_id, object_id, offset),
			payload: Bytes::copy_from_slice(data),
			flags: 0,
			queue_delay: 0,
			is_last_fragment: last,
			nb_objects_previous_group: 0,
			cache_time: 0,
		}
	}

	fn frontier(cache: &Cache) -> (u64, u64, u64) {
		(cache.next_group_id, cache.next_object_id, cache.next_offset)
	}

	#[test]
	fn merge_is_idempotent() {
		let mut cache = Cache::new(false);

		assert!(cache.propose(fragment(0, 0, 0, b"hello", false), 1));
		assert!(!cache.propose(fragment(0, 0, 0, b"hello", false), 2));
		assert_eq!(cache.len(), 1);
		assert_eq!(frontier(&cache), (0, 0, 5));
	}

	#[test]
	fn overlap_inserts_only_uncovered_ranges() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 2, b"cd", false), 1);
		// Straddles the existing [2, 4): only [0, 2) and [4, 6) are inserted.
		assert!(cache.propose(fragment(0, 0, 0, b"abxxef", true), 2));

		assert_eq!(cache.len(), 3);
		assert_eq!(cache.object_bytes(0, 0).unwrap().as_ref(), b"abcdef");
		assert_eq!(frontier(&cache), (0, 1, 0));
		assert_eq!(cache.nb_object_received, 1);
	}

	#[test]
	fn frontier_waits_for_gaps() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 3, b"def", true), 1);
		assert_eq!(frontier(&cache), (0, 0, 0));

		cache.propose(fragment(0, 0, 0, b"abc", false), 2);
		assert_eq!(frontier(&cache), (0, 1, 0));
	}

	#[test]
	fn group_crossing_requires_matching_object_count() {
		let mut cache = Cache::new(false);

		for object_id in 0..4 {
			cache.propose(fragment(0, object_id, 0, b"x", true), 1);
		}
		assert_eq!(frontier(&cache), (0, 4, 0));

		// Group 1 opens claiming five objects in group 0; object 4 is missing.
		let mut opener = fragment(1, 0, 0, b"y", true);
		opener.nb_objects_previous_group = 5;
		cache.propose(opener, 2);
		assert_eq!(frontier(&cache), (0, 4, 0));

		// The missing object completes; the frontier jumps across the boundary.
		cache.propose(fragment(0, 4, 0, b"z", true), 3);
		assert_eq!(frontier(&cache), (1, 1, 0));
	}

	#[test]
	fn learn_start_drops_earlier_fragments() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 0, b"a", true), 1);
		cache.propose(fragment(0, 1, 0, b"b", true), 1);
		cache.propose(fragment(0, 2, 0, b"c", true), 1);

		cache.learn_start(0, 2);
		assert_eq!(cache.len(), 1);
		assert_eq!((cache.first_group_id, cache.first_object_id), (0, 2));
		assert!(frontier(&cache) >= (0, 2, 0));

		// Fragments below the start are no longer accepted.
		assert!(!cache.propose(fragment(0, 1, 0, b"b", true), 2));
	}

	#[test]
	fn mid_group_start_serves_from_next_boundary() {
		let mut cache = Cache::new(false);
		cache.learn_start(0, 12_345);

		assert_eq!(cache.effective_start(), (1, 0));
		let (_, start) = cache.attach_reader();
		assert_eq!(start, (1, 0));
	}

	#[test]
	fn empty_fragment_terminates_object() {
		let mut cache = Cache::new(false);

		assert!(cache.propose(fragment(0, 0, 0, b"", true), 1));
		assert_eq!(frontier(&cache), (0, 1, 0));
		assert_eq!(cache.object_bytes(0, 0).unwrap().len(), 0);
		assert_eq!(cache.nb_object_received, 1);
	}

	#[test]
	fn close_derives_final_point() {
		let mut cache = Cache::new(false);

		for object_id in 0..3 {
			cache.propose(fragment(0, object_id, 0, b"x", true), 1);
		}

		cache.close(100);
		assert!(cache.is_closed);
		assert_eq!(cache.final_point, Some((0, 3)));
		assert_eq!(cache.cache_delete_time, Some(100 + CACHE_DELETE_DELAY));
	}

	#[test]
	fn close_after_learn_end_uses_short_delay() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 0, b"x", true), 1);
		cache.learn_end(0, 1);
		cache.close(100);

		assert!(cache.is_finished());
		assert_eq!(cache.cache_delete_time, Some(100 + CACHE_DELETE_DELAY_FIN));
	}

	#[test]
	fn archival_purge_keeps_young_and_guarded_objects() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 0, b"old", true), 1_000);
		cache.propose(fragment(0, 1, 0, b"old", true), 2_000);
		cache.propose(fragment(0, 2, 0, b"new", true), 9_000_000);

		cache.purge_archival(10_000_000, 5_000_000);

		assert!(cache.get(0, 0, 0).is_none());
		assert!(cache.get(0, 1, 0).is_none());
		assert!(cache.get(0, 2, 0).is_some());
		assert_eq!((cache.first_group_id, cache.first_object_id), (0, 2));
	}

	#[test]
	fn archival_purge_respects_reader_cursor() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 0, b"old", true), 1_000);
		cache.propose(fragment(0, 1, 0, b"old", true), 2_000);
		let (_, _) = cache.attach_reader();

		// The reader still sits at (0, 0): nothing may be evicted.
		cache.purge_archival(10_000_000, 5_000_000);
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn realtime_purge_drops_groups_behind_every_reader() {
		fn opener(group_id: u64, nb_prev: u64) -> Fragment {
			Fragment {
				key: FragmentKey::new(group_id, 0, 0),
				payload: Bytes::from_static(b"x"),
				flags: 0,
				queue_delay: 0,
				is_last_fragment: true,
				nb_objects_previous_group: nb_prev,
				cache_time: 0,
			}
		}

		let mut cache = Cache::new(true);
		cache.propose(opener(0, 0), 1);
		cache.propose(opener(1, 1), 2);
		cache.propose(opener(2, 1), 3);

		// No readers: everything below the frontier group goes.
		assert!(cache.get(0, 0, 0).is_none());
		assert!(cache.get(1, 0, 0).is_none());
		assert!(cache.get(2, 0, 0).is_some());
		assert_eq!(cache.first_group_id, 2);
	}

	#[test]
	fn stale_arrival_positions_are_rejected() {
		let mut cache = Cache::new(false);

		cache.propose(fragment(0, 0, 0, b"a", true), 1);
		let pos = cache.arrival_head().unwrap();

		cache.learn_start(0, 1);
		assert!(!cache.arrival_valid(pos));
		assert!(cache.arrival_fragment(pos).is_none());
	}
}
