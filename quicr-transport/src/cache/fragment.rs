use bytes::Bytes;

/// Addresses a fragment within a track: lexicographic by group, object, offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentKey {
	pub group_id: u64,
	pub object_id: u64,
	pub offset: u64,
}

impl FragmentKey {
	pub fn new(group_id: u64, object_id: u64, offset: u64) -> Self {
		Self {
			group_id,
			object_id,
			offset,
		}
	}

	/// The object the fragment belongs to.
	pub fn object(&self) -> (u64, u64) {
		(self.group_id, self.object_id)
	}
}

/// A cached slice of an object, as received from the publisher.
#[derive(Clone, Debug)]
pub struct Fragment {
	pub key: FragmentKey,
	pub payload: Bytes,

	/// Opaque priority/class byte assigned by the publisher, e.g. a drop class.
	pub flags: u8,

	/// Publisher-assigned age hint, transported verbatim.
	pub queue_delay: u64,

	pub is_last_fragment: bool,

	/// Meaningful only at `object_id == 0, offset == 0`: the number of objects
	/// in the previous group.
	pub nb_objects_previous_group: u64,

	/// Local monotonic time at which the fragment entered the cache.
	pub cache_time: u64,
}

impl Fragment {
	pub fn len(&self) -> u64 {
		self.payload.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.payload.is_empty()
	}

	/// One past the last byte offset the fragment covers.
	pub fn end(&self) -> u64 {
		self.key.offset + self.len()
	}
}
