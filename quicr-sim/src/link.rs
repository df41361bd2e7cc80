/// One direction of a simulated point-to-point link.
#[derive(Clone, Debug)]
pub struct LinkConfig {
	/// One-way propagation delay, in microseconds.
	pub latency: u64,

	/// Bits per second; 0 means unlimited.
	pub bandwidth: u64,

	/// Rotating 64-bit loss mask applied to datagrams by send index: a set bit
	/// drops the datagram.
	pub loss_mask: u64,
}

impl Default for LinkConfig {
	fn default() -> Self {
		Self {
			latency: 10_000,
			bandwidth: 0,
			loss_mask: 0,
		}
	}
}

impl LinkConfig {
	pub fn with_loss_mask(mut self, loss_mask: u64) -> Self {
		self.loss_mask = loss_mask;
		self
	}

	pub fn with_bandwidth(mut self, bits_per_second: u64) -> Self {
		self.bandwidth = bits_per_second;
		self
	}

	pub fn with_latency(mut self, micros: u64) -> Self {
		self.latency = micros;
		self
	}
}

pub(crate) struct Link {
	pub config: LinkConfig,

	/// Earliest time the link can accept another send.
	next_free: u64,

	/// Datagram send index, for the loss mask.
	nb_datagrams: u64,
}

impl Link {
	pub fn new(config: LinkConfig) -> Self {
		Self {
			config,
			next_free: 0,
			nb_datagrams: 0,
		}
	}

	pub fn is_free(&self, now: u64) -> bool {
		self.next_free <= now
	}

	pub fn next_free(&self) -> u64 {
		self.next_free
	}

	/// Occupy the link for `bytes`; returns (departure, arrival) times.
	pub fn send(&mut self, now: u64, bytes: usize) -> (u64, u64) {
		let start = now.max(self.next_free);
		let transmission = if self.config.bandwidth == 0 {
			0
		} else {
			(bytes as u64).saturating_mul(8_000_000) / self.config.bandwidth
		};

		let departure = start + transmission;
		self.next_free = departure;
		(departure, departure + self.config.latency)
	}

	/// Whether the loss mask claims the next datagram.
	pub fn drops_next_datagram(&mut self) -> bool {
		let bit = (self.config.loss_mask >> (self.nb_datagrams & 63)) & 1;
		self.nb_datagrams += 1;
		bit != 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bandwidth_paces_sends() {
		// 8 kbit/s: 1000 bytes take one second on the wire.
		let mut link = Link::new(LinkConfig {
			latency: 0,
			bandwidth: 8_000,
			loss_mask: 0,
		});

		let (departure, arrival) = link.send(0, 1000);
		assert_eq!(departure, 1_000_000);
		assert_eq!(arrival, 1_000_000);
		assert!(!link.is_free(500_000));

		// The next send queues behind the first.
		let (departure, _) = link.send(0, 1000);
		assert_eq!(departure, 2_000_000);
	}

	#[test]
	fn loss_mask_rotates() {
		let mut link = Link::new(LinkConfig::default().with_loss_mask(0x7080));

		let drops: Vec<bool> = (0..128).map(|_| link.drops_next_datagram()).collect();
		assert_eq!(drops.iter().filter(|&&d| d).count(), 8);
		assert!(drops[7] && drops[12] && drops[13] && drops[14]);
		assert!(drops[64 + 7]);
	}
}
