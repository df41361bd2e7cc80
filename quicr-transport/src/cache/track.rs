use std::sync::Arc;

use bytes::Bytes;

use crate::util::Shared;

use super::{Cache, Fragment, FragmentKey};

/// Static information about a track: one published URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
	pub url: String,
}

/// Shared handle to a track's fragment cache.
///
/// One consumer writes into the cache (through a [TrackProducer] or a network
/// consumer); any number of readers traverse it independently.
#[derive(Clone)]
pub struct TrackCache {
	info: Arc<Track>,
	state: Shared<Cache>,
}

impl TrackCache {
	pub fn new(url: &str, is_real_time: bool) -> Self {
		Self {
			info: Arc::new(Track { url: url.to_string() }),
			state: Shared::new(Cache::new(is_real_time)),
		}
	}

	pub fn url(&self) -> &str {
		&self.info.url
	}

	pub(crate) fn state(&self) -> &Shared<Cache> {
		&self.state
	}

	pub fn producer(&self) -> TrackProducer {
		TrackProducer::new(self.clone())
	}

	pub fn reader(&self) -> TrackReader {
		TrackReader::new(self.clone())
	}

	/// Whether the cache may be reclaimed: closed, no attached reader, and
	/// either empty or past its delete time.
	pub fn is_reclaimable(&self, now: u64) -> bool {
		let cache = self.state.lock();
		cache.is_closed
			&& cache.reader_count() == 0
			&& (cache.is_empty() || cache.cache_delete_time.is_some_and(|at| now >= at))
	}

	pub fn first_point(&self) -> (u64, u64) {
		let cache = self.state.lock();
		(cache.first_group_id, cache.first_object_id)
	}

	pub fn final_point(&self) -> Option<(u64, u64)> {
		self.state.lock().final_point
	}

	/// The contiguous-receive frontier.
	pub fn next_point(&self) -> (u64, u64, u64) {
		let cache = self.state.lock();
		(cache.next_group_id, cache.next_object_id, cache.next_offset)
	}

	pub fn reader_count(&self) -> usize {
		self.state.lock().reader_count()
	}

	pub fn nb_fragments(&self) -> usize {
		self.state.lock().len()
	}

	pub fn nb_object_received(&self) -> u64 {
		self.state.lock().nb_object_received
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().is_closed
	}

	pub fn set_real_time(&self, is_real_time: bool) {
		self.state.lock().is_real_time = is_real_time;
	}

	pub fn is_real_time(&self) -> bool {
		self.state.lock().is_real_time
	}
}

/// Application-side publishing: appends whole objects in order, group by group.
pub struct TrackProducer {
	cache: TrackCache,
	group_id: u64,
	object_id: u64,
	previous_group_objects: u64,
}

impl TrackProducer {
	fn new(cache: TrackCache) -> Self {
		Self {
			cache,
			group_id: 0,
			object_id: 0,
			previous_group_objects: 0,
		}
	}

	/// Begin publishing from a point other than (0, 0).
	pub fn start_at(&mut self, group_id: u64, object_id: u64) {
		self.cache.state().lock().learn_start(group_id, object_id);
		self.group_id = group_id;
		self.object_id = object_id;
	}

	/// Append one object as a single last fragment.
	pub fn publish_object(&mut self, payload: Bytes, flags: u8, queue_delay: u64, now: u64) {
		let fragment = Fragment {
			key: FragmentKey::new(self.group_id, self.object_id, 0),
			payload,
			flags,
			queue_delay,
			is_last_fragment: true,
			nb_objects_previous_group: if self.object_id == 0 {
				self.previous_group_objects
			} else {
				0
			},
			cache_time: now,
		};

		self.cache.state().lock().propose(fragment, now);
		self.object_id += 1;
	}

	/// Close the current group; the next object starts the following group.
	pub fn next_group(&mut self) {
		if self.object_id == 0 {
			return;
		}

		self.previous_group_objects = self.object_id;
		self.group_id += 1;
		self.object_id = 0;
	}

	pub fn group_id(&self) -> u64 {
		self.group_id
	}

	pub fn object_id(&self) -> u64 {
		self.object_id
	}

	/// Announce the end of the media at the current point.
	pub fn finish(&mut self) {
		self.cache.state().lock().learn_end(self.group_id, self.object_id);
	}

	/// The producer is done; the cache schedules its own reclamation.
	pub fn close(&mut self, now: u64) {
		self.cache.state().lock().close(now);
	}
}

/// Application-side consumption: complete objects in key order.
pub struct TrackReader {
	cache: TrackCache,
	reader_id: u64,
	group_id: u64,
	object_id: u64,
}

impl TrackReader {
	fn new(cache: TrackCache) -> Self {
		let (reader_id, (group_id, object_id)) = cache.state().lock().attach_reader();
		Self {
			cache,
			reader_id,
			group_id,
			object_id,
		}
	}

	/// The next complete object below the receive frontier, if any.
	pub fn poll_object(&mut self) -> Option<(u64, u64, Bytes)> {
		let mut state = self.cache.state().lock();

		// Snap forward if the start moved under us.
		let start = state.effective_start();
		if (self.group_id, self.object_id) < start {
			self.group_id = start.0;
			self.object_id = start.1;
		}

		loop {
			if (self.group_id, self.object_id) >= (state.next_group_id, state.next_object_id) {
				return None;
			}

			match state.object_bytes(self.group_id, self.object_id) {
				Some(payload) => {
					let delivered = (self.group_id, self.object_id, payload);
					self.object_id += 1;

					if let Some(reader) = state.reader(self.reader_id) {
						reader.group_id = self.group_id;
						reader.object_id = self.object_id;
					}

					return Some(delivered);
				}
				// The group ended before this object id.
				None => {
					self.group_id += 1;
					self.object_id = 0;
				}
			}
		}
	}

	/// Whether everything up to the announced end has been delivered.
	pub fn finished(&self) -> bool {
		let state = self.cache.state().lock();
		state
			.final_point
			.is_some_and(|point| (self.group_id, self.object_id) >= point)
	}

	pub fn first_point(&self) -> (u64, u64) {
		self.cache.first_point()
	}
}

impl Drop for TrackReader {
	fn drop(&mut self) {
		self.cache.state().lock().detach_reader(self.reader_id);
	}
}
