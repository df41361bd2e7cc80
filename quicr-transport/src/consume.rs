use bytes::Bytes;

use crate::cache::{Fragment, FragmentKey, TrackCache};
use crate::message::{DatagramHeader, Repair};

/// Writes fragments received from the network into a track cache.
///
/// One consumer per subscriber stream; it owns the cache's write side for the
/// lifetime of the stream and derives the final point if the stream closes
/// before the end was announced.
pub struct Consumer {
	cache: TrackCache,
	closed: bool,
}

impl Consumer {
	pub fn new(cache: TrackCache) -> Self {
		Self { cache, closed: false }
	}

	pub fn cache(&self) -> &TrackCache {
		&self.cache
	}

	pub fn on_repair(&mut self, msg: Repair, now: u64) -> bool {
		self.cache.state().lock().propose(
			Fragment {
				key: FragmentKey::new(msg.group_id, msg.object_id, msg.offset),
				payload: msg.payload,
				flags: msg.flags,
				queue_delay: msg.queue_delay,
				is_last_fragment: msg.is_last_fragment,
				nb_objects_previous_group: msg.nb_objects_previous_group,
				cache_time: now,
			},
			now,
		)
	}

	pub fn on_datagram(&mut self, header: &DatagramHeader, payload: Bytes, now: u64) -> bool {
		self.cache.state().lock().propose(
			Fragment {
				key: FragmentKey::new(header.group_id, header.object_id, header.offset),
				payload,
				flags: header.flags,
				queue_delay: header.queue_delay,
				is_last_fragment: header.is_last_fragment,
				nb_objects_previous_group: header.nb_objects_previous_group,
				cache_time: now,
			},
			now,
		)
	}

	pub fn on_final(&mut self, group_id: u64, object_id: u64) {
		self.cache.state().lock().learn_end(group_id, object_id);
	}

	pub fn on_start(&mut self, group_id: u64, object_id: u64) {
		self.cache.state().lock().learn_start(group_id, object_id);
	}

	pub fn on_cache_policy(&mut self, is_real_time: bool) {
		self.cache.state().lock().is_real_time = is_real_time;
	}

	/// The stream delivering into this cache is gone.
	pub fn on_close(&mut self, now: u64) {
		if self.closed {
			return;
		}
		self.closed = true;
		self.cache.state().lock().close(now);
	}

	/// Everything up to the announced end has been received; the transport
	/// should close the stream.
	pub fn is_finished(&self) -> bool {
		self.cache.state().lock().is_finished()
	}
}
