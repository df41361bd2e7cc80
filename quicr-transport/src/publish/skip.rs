/// A fragment older than this when it comes up for sending means the link is
/// not keeping up: one frame at 30 fps.
pub const BACKLOG_AGE: u64 = 33_333;

/// The flags byte carried by a skip sentinel.
pub const FLAG_SKIPPED: u8 = 0xff;

/// Decides whether a backlogged object may be skipped, by priority class.
///
/// Skipping is monotone in backlog: with no backlog nothing is skipped. The
/// first object of a group is never skipped, since the group cannot be decoded
/// without it.
#[derive(Clone, Debug)]
pub struct CongestionPolicy {
	pub enabled: bool,

	/// Objects whose flags class is below this are never skipped.
	pub min_loss_class: u8,

	/// Upper bound on objects skipped per reader, if any.
	pub max_drops: Option<u64>,
}

impl Default for CongestionPolicy {
	fn default() -> Self {
		Self {
			enabled: false,
			min_loss_class: 0x80,
			max_drops: None,
		}
	}
}

impl CongestionPolicy {
	pub fn should_skip(&self, flags: u8, object_id: u64, has_backlog: bool, drops: u64) -> bool {
		self.enabled
			&& has_backlog
			&& object_id > 0
			&& flags >= self.min_loss_class
			&& self.max_drops.map_or(true, |max| drops < max)
	}
}
