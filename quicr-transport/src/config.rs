use std::path::PathBuf;

use crate::publish::CongestionPolicy;

/// The ALPN token spoken on the transport.
pub const ALPN: &str = "quicr-q-00";

/// What the endpoint does with URLs it does not publish itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
	/// Publish and subscribe only; never create sources on demand.
	Client,

	/// Cache-and-forward node with no upstream: the root of the triangle.
	Origin { use_datagrams: bool },

	/// Cache-and-forward node pulling unknown URLs from `addr`.
	Relay {
		sni: String,
		addr: String,
		use_datagrams: bool,
	},
}

#[derive(Clone, Debug)]
pub struct Config {
	pub alpn: String,

	/// Server credentials, loaded by the transport.
	pub cert_file: Option<PathBuf>,
	pub key_file: Option<PathBuf>,

	/// Client trust roots, loaded by the transport.
	pub cert_root_store: Option<PathBuf>,

	/// Optional session-resumption secret, handed to the transport.
	pub ticket_encryption_key: Option<Vec<u8>>,

	/// Drive the endpoint on a virtual clock, for tests and simulation.
	pub simulated_time: bool,

	/// Archival eviction age, in microseconds.
	pub cache_duration: u64,

	/// New sources default to real-time eviction.
	pub real_time_cache: bool,

	pub congestion: CongestionPolicy,

	/// Proactive retransmits per fragment; 0 disables them.
	pub extra_repeat_count: u32,
	pub extra_repeat_delay: u64,

	pub role: Role,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			alpn: ALPN.to_string(),
			cert_file: None,
			key_file: None,
			cert_root_store: None,
			ticket_encryption_key: None,
			simulated_time: false,
			cache_duration: 10_000_000,
			real_time_cache: false,
			congestion: CongestionPolicy::default(),
			extra_repeat_count: 0,
			extra_repeat_delay: 50_000,
			role: Role::Client,
		}
	}
}

impl Config {
	pub fn enable_origin(mut self, use_datagrams: bool) -> Self {
		self.role = Role::Origin { use_datagrams };
		self
	}

	pub fn enable_relay(mut self, sni: &str, addr: &str, use_datagrams: bool) -> Self {
		self.role = Role::Relay {
			sni: sni.to_string(),
			addr: addr.to_string(),
			use_datagrams,
		};
		self
	}

	pub fn set_cache_duration(mut self, micros: u64) -> Self {
		self.cache_duration = micros;
		self
	}

	pub fn set_real_time_cache(mut self) -> Self {
		self.real_time_cache = true;
		self
	}

	pub fn enable_congestion_control(mut self, enabled: bool) -> Self {
		self.congestion.enabled = enabled;
		self
	}

	pub fn set_congestion_limits(mut self, min_loss_class: u8, max_drops: Option<u64>) -> Self {
		self.congestion.min_loss_class = min_loss_class;
		self.congestion.max_drops = max_drops;
		self
	}

	pub fn set_extra_repeat(mut self, count: u32) -> Self {
		self.extra_repeat_count = count;
		self
	}

	pub fn set_extra_repeat_delay(mut self, micros: u64) -> Self {
		self.extra_repeat_delay = micros;
		self
	}

	pub fn set_simulated_time(mut self) -> Self {
		self.simulated_time = true;
		self
	}
}
