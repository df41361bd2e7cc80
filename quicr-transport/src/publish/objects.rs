use std::collections::BTreeMap;

/// Per-object send accounting for one datagram reader.
///
/// One ledger per reader, not per cache: each reader prunes independently once
/// it has confirmed all bytes of an object were handed to the transport.
#[derive(Default)]
pub struct ObjectLedger {
	objects: BTreeMap<(u64, u64), SentObject>,

	/// The highest object fully sent and pruned, if any.
	floor: Option<(u64, u64)>,
}

#[derive(Default)]
struct SentObject {
	bytes_sent: u64,

	/// The object's total length, learned when its last fragment is observed.
	final_offset: Option<u64>,

	is_dropped: bool,
	is_sent: bool,
}

impl ObjectLedger {
	/// The object was skipped; its remaining fragments are not sent.
	pub fn mark_dropped(&mut self, group_id: u64, object_id: u64) {
		self.objects.entry((group_id, object_id)).or_default().is_dropped = true;
	}

	pub fn is_dropped(&self, group_id: u64, object_id: u64) -> bool {
		self.objects
			.get(&(group_id, object_id))
			.is_some_and(|object| object.is_dropped)
	}

	/// The object was already fully sent and pruned.
	pub fn is_behind(&self, group_id: u64, object_id: u64) -> bool {
		self.floor
			.is_some_and(|floor| (group_id, object_id) <= floor)
			&& !self.objects.contains_key(&(group_id, object_id))
	}

	pub fn is_known(&self, group_id: u64, object_id: u64) -> bool {
		self.objects.contains_key(&(group_id, object_id))
	}

	/// Account bytes handed to the transport; `final_offset` is the object
	/// length once the last fragment is being sent.
	pub fn record(&mut self, group_id: u64, object_id: u64, length: u64, final_offset: Option<u64>) {
		let object = self.objects.entry((group_id, object_id)).or_default();
		object.bytes_sent += length;
		if final_offset.is_some() {
			object.final_offset = final_offset;
		}

		if object.final_offset.is_some_and(|total| object.bytes_sent >= total) {
			object.is_sent = true;
		}

		self.prune();
	}

	/// Drop leading objects that are fully sent, so the tree stays small.
	fn prune(&mut self) {
		while let Some((&key, object)) = self.objects.first_key_value() {
			if !object.is_sent {
				break;
			}
			self.objects.remove(&key);
			self.floor = Some(key);
		}
	}

	/// The earliest object still owed bytes, used as the eviction fence.
	pub fn first_pending(&self) -> Option<(u64, u64)> {
		self.objects.keys().next().copied()
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prunes_leading_sent_objects() {
		let mut ledger = ObjectLedger::default();

		ledger.record(0, 0, 100, Some(100));
		assert!(ledger.is_empty());
		assert!(ledger.is_behind(0, 0));

		// Out of order: object 2 completes while 1 is still partial.
		ledger.record(0, 1, 50, None);
		ledger.record(0, 2, 10, Some(10));
		assert_eq!(ledger.len(), 2);

		ledger.record(0, 1, 50, Some(100));
		assert!(ledger.is_empty());
		assert!(ledger.is_behind(0, 2));
		assert!(!ledger.is_behind(0, 3));
	}

	#[test]
	fn dropped_objects_complete_via_sentinel() {
		let mut ledger = ObjectLedger::default();

		ledger.mark_dropped(0, 1);
		assert!(ledger.is_dropped(0, 1));

		// The zero-length sentinel counts as the whole object.
		ledger.record(0, 1, 0, Some(0));
		assert!(ledger.is_empty());
	}
}
