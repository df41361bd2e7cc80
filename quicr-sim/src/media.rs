use bytes::{BufMut, Bytes, BytesMut};

use quicr_transport::cache::{TrackProducer, TrackReader};

/// Shape of the deterministic test media.
#[derive(Clone, Debug)]
pub struct MediaConfig {
	pub object_size: usize,
	pub objects_per_group: u64,

	/// Microseconds between objects: one frame at 30 fps by default.
	pub interval: u64,

	pub nb_objects: u64,
}

impl Default for MediaConfig {
	fn default() -> Self {
		Self {
			object_size: 47,
			objects_per_group: 10,
			interval: 33_333,
			nb_objects: 100,
		}
	}
}

/// Drop class per object: group openers are never droppable, and every other
/// object alternates between a protected and a droppable class.
pub fn object_flags(object_id: u64) -> u8 {
	if object_id == 0 {
		0x80
	} else if object_id % 2 == 0 {
		0x81
	} else {
		0x84
	}
}

/// Deterministic object bytes, so a verifier can regenerate them.
pub fn object_payload(config: &MediaConfig, group_id: u64, object_id: u64) -> Bytes {
	let mut out = BytesMut::with_capacity(config.object_size);
	for index in 0..config.object_size as u64 {
		out.put_u8((group_id.wrapping_mul(31) ^ object_id.wrapping_mul(7) ^ index) as u8);
	}
	out.freeze()
}

/// Feeds a producer one object per frame interval; the test codec of the
/// canonical triangle.
pub struct MediaSource {
	producer: TrackProducer,
	config: MediaConfig,
	published: u64,
	closed: bool,
}

impl MediaSource {
	pub fn new(producer: TrackProducer, config: MediaConfig) -> Self {
		Self {
			producer,
			config,
			published: 0,
			closed: false,
		}
	}

	/// Begin publishing from a point other than (0, 0).
	pub fn start_at(&mut self, group_id: u64, object_id: u64) {
		self.producer.start_at(group_id, object_id);
	}

	/// Publish the next object. Returns false once the media ended; the first
	/// such call announces the end and closes the producer.
	pub fn publish_next(&mut self, now: u64) -> bool {
		if self.published >= self.config.nb_objects {
			if !self.closed {
				self.closed = true;
				self.producer.finish();
				self.producer.close(now);
			}
			return false;
		}

		if self.producer.object_id() > 0 && self.producer.object_id() % self.config.objects_per_group == 0 {
			self.producer.next_group();
		}

		let group_id = self.producer.group_id();
		let object_id = self.producer.object_id();
		let payload = object_payload(&self.config, group_id, object_id);

		self.producer.publish_object(payload, object_flags(object_id), 0, now);
		self.published += 1;
		true
	}

	pub fn is_done(&self) -> bool {
		self.closed
	}
}

/// Collects what a subscriber received and checks it against the generator.
pub struct MediaSink {
	reader: TrackReader,
	pub received: Vec<(u64, u64, Bytes)>,
}

impl MediaSink {
	pub fn new(reader: TrackReader) -> Self {
		Self {
			reader,
			received: Vec::new(),
		}
	}

	/// Drain every complete object currently below the frontier.
	pub fn poll(&mut self) {
		while let Some(object) = self.reader.poll_object() {
			self.received.push(object);
		}
	}

	pub fn finished(&self) -> bool {
		self.reader.finished()
	}

	pub fn first_point(&self) -> (u64, u64) {
		self.reader.first_point()
	}

	pub fn nb_received(&self) -> usize {
		self.received.len()
	}

	/// Objects replaced by a zero-length skip sentinel.
	pub fn skipped(&self) -> Vec<(u64, u64)> {
		self.received
			.iter()
			.filter(|(_, _, payload)| payload.is_empty())
			.map(|&(group_id, object_id, _)| (group_id, object_id))
			.collect()
	}

	/// Every non-skipped object must be byte-identical to the generator.
	pub fn verify(&self, config: &MediaConfig) -> Result<(), String> {
		for (group_id, object_id, payload) in &self.received {
			if payload.is_empty() {
				continue;
			}

			let expected = object_payload(config, *group_id, *object_id);
			if payload != &expected {
				return Err(format!("object ({group_id}, {object_id}) differs from source"));
			}
		}
		Ok(())
	}
}
