use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use bytes::Bytes;

use quicr_transport::{Endpoint, Session};

use crate::link::{Link, LinkConfig};

/// Maximum queued-datagram size of the substrate, known to senders for
/// repeat splitting.
pub const MAX_DATAGRAM_SIZE: usize = 1280;

/// Byte budget per prepare-to-send callback on a stream.
const STREAM_BUDGET: usize = 1024;

/// Extra delay before a dropped datagram is reported lost, on top of three
/// propagation delays.
const LOSS_DETECTION_EXTRA: u64 = 25_000;

/// A client/server session pair wired through a pipe.
pub struct Connection {
	pub client: Session,
	pub server: Session,
	pipe: usize,
}

struct Pipe {
	client: Session,
	server: Session,
	up: Link,
	down: Link,
	active: bool,
}

struct Event {
	at: u64,
	seq: u64,
	kind: EventKind,
}

enum EventKind {
	/// Stream bytes reach the receiver.
	StreamData {
		pipe: usize,
		to_server: bool,
		stream_id: u64,
		data: Bytes,
		fin: bool,
	},

	/// A datagram reaches the receiver.
	Datagram {
		pipe: usize,
		to_server: bool,
		payload: Bytes,
	},

	/// The sender learns its datagram was acknowledged.
	DatagramAcked {
		pipe: usize,
		to_server: bool,
		payload: Bytes,
	},

	/// The sender learns its datagram was (probably) lost.
	DatagramLost {
		pipe: usize,
		to_server: bool,
		payload: Bytes,
		sent_time: u64,
	},

	/// A pacing gate opened; nothing to do beyond re-pumping.
	Poll,
}

impl PartialEq for Event {
	fn eq(&self, other: &Self) -> bool {
		(self.at, self.seq) == (other.at, other.seq)
	}
}

impl Eq for Event {}

impl PartialOrd for Event {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Event {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.at, self.seq).cmp(&(other.at, other.seq))
	}
}

/// The simulated network: endpoints, pipes, and one time-ordered event queue.
///
/// Deterministic by construction: virtual time only advances to event
/// timestamps, and same-time events run in scheduling order.
#[derive(Default)]
pub struct Net {
	now: u64,
	seq: u64,
	events: BinaryHeap<Reverse<Event>>,
	pipes: Vec<Pipe>,
	endpoints: Vec<Endpoint>,
}

impl Net {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn now(&self) -> u64 {
		self.now
	}

	/// Register an endpoint for periodic housekeeping sweeps.
	pub fn add_endpoint(&mut self, endpoint: &Endpoint) {
		self.endpoints.push(endpoint.clone());
	}

	/// Connect a client endpoint to a server endpoint with symmetric links.
	pub fn connect(&mut self, client: &Endpoint, server: &Endpoint, link: LinkConfig) -> Connection {
		self.connect_asymmetric(client, server, link.clone(), link)
	}

	/// Connect with distinct upstream (client to server) and downstream links.
	pub fn connect_asymmetric(
		&mut self,
		client: &Endpoint,
		server: &Endpoint,
		up: LinkConfig,
		down: LinkConfig,
	) -> Connection {
		self.add_endpoint(client);
		self.add_endpoint(server);

		let client = Session::new(client.clone(), true);
		let server = Session::new(server.clone(), false);

		let pipe = self.pipes.len();
		self.pipes.push(Pipe {
			client: client.clone(),
			server: server.clone(),
			up: Link::new(up),
			down: Link::new(down),
			active: true,
		});

		Connection { client, server, pipe }
	}

	/// Tear a connection down on both ends, as a transport close would.
	pub fn disconnect(&mut self, connection: &Connection) {
		let now = self.now;
		if let Some(pipe) = self.pipes.get_mut(connection.pipe) {
			pipe.active = false;
			pipe.client.close(now);
			pipe.server.close(now);
		}
	}

	/// Run every due event and transmission until virtual time `deadline`.
	pub fn run_until(&mut self, deadline: u64) {
		loop {
			self.pump();
			self.sweep();

			let due = match self.events.peek() {
				Some(Reverse(event)) if event.at <= deadline => true,
				_ => false,
			};
			if !due {
				break;
			}

			let Reverse(event) = self.events.pop().expect("peeked event");
			self.now = self.now.max(event.at);
			self.dispatch(event);
		}

		self.now = self.now.max(deadline);
		self.sweep();
	}

	fn sweep(&mut self) {
		for endpoint in &self.endpoints {
			endpoint.sweep(self.now);
		}
	}

	fn push(&mut self, at: u64, kind: EventKind) {
		let seq = self.seq;
		self.seq += 1;
		self.events.push(Reverse(Event { at, seq, kind }));
	}

	/// Poll every session for outgoing data until the round is quiescent.
	fn pump(&mut self) {
		loop {
			let mut progressed = false;
			for pipe in 0..self.pipes.len() {
				progressed |= self.pump_direction(pipe, true);
				progressed |= self.pump_direction(pipe, false);
			}
			if !progressed {
				break;
			}
		}
	}

	fn pump_direction(&mut self, pipe_index: usize, to_server: bool) -> bool {
		let now = self.now;

		let sender = {
			let pipe = &self.pipes[pipe_index];
			if !pipe.active {
				return false;
			}
			if to_server {
				pipe.client.clone()
			} else {
				pipe.server.clone()
			}
		};

		// A busy link means backpressure: wake up when it frees.
		{
			let link = self.link(pipe_index, to_server);
			if !link.is_free(now) {
				let wake = link.next_free();
				self.push(wake, EventKind::Poll);
				return false;
			}
		}

		let mut progressed = false;

		for stream_id in sender.stream_ids() {
			if !self.link(pipe_index, to_server).is_free(now) {
				break;
			}

			if let Some((data, fin)) = sender.poll_stream(stream_id, STREAM_BUDGET, now) {
				let (_, arrival) = self.link(pipe_index, to_server).send(now, data.len().max(1));
				self.push(
					arrival,
					EventKind::StreamData {
						pipe: pipe_index,
						to_server,
						stream_id,
						data,
						fin,
					},
				);
				progressed = true;
			}
		}

		while self.link(pipe_index, to_server).is_free(now) {
			let Some(payload) = sender.poll_datagram(MAX_DATAGRAM_SIZE, now) else { break };

			let link = self.link(pipe_index, to_server);
			let latency = link.config.latency;
			let (departure, arrival) = link.send(now, payload.len());
			let dropped = link.drops_next_datagram();

			if dropped {
				self.push(
					departure + 3 * latency + LOSS_DETECTION_EXTRA,
					EventKind::DatagramLost {
						pipe: pipe_index,
						to_server,
						payload,
						sent_time: now,
					},
				);
			} else {
				self.push(
					arrival,
					EventKind::Datagram {
						pipe: pipe_index,
						to_server,
						payload: payload.clone(),
					},
				);
				self.push(
					arrival + latency,
					EventKind::DatagramAcked {
						pipe: pipe_index,
						to_server,
						payload,
					},
				);
			}

			progressed = true;
		}

		progressed
	}

	fn link(&mut self, pipe_index: usize, to_server: bool) -> &mut Link {
		let pipe = &mut self.pipes[pipe_index];
		if to_server {
			&mut pipe.up
		} else {
			&mut pipe.down
		}
	}

	fn dispatch(&mut self, event: Event) {
		let now = self.now;

		match event.kind {
			EventKind::StreamData {
				pipe,
				to_server,
				stream_id,
				data,
				fin,
			} => {
				let Some(pipe) = self.pipes.get(pipe) else { return };
				if !pipe.active {
					return;
				}

				let receiver = if to_server { &pipe.server } else { &pipe.client };
				if let Err(err) = receiver.on_stream_data(stream_id, &data, fin, now) {
					log::error!("stream error: stream={stream_id} err={err}");
					receiver.close(now);
				}
			}

			EventKind::Datagram { pipe, to_server, payload } => {
				let Some(pipe) = self.pipes.get(pipe) else { return };
				if !pipe.active {
					return;
				}

				let receiver = if to_server { &pipe.server } else { &pipe.client };
				if let Err(err) = receiver.on_datagram(&payload, now) {
					// A malformed header is fatal; a stray stream id is not.
					if matches!(err, quicr_transport::Error::Decode(_)) {
						log::error!("datagram decode error: err={err}");
						receiver.close(now);
					} else {
						log::warn!("datagram error: err={err}");
					}
				}
			}

			EventKind::DatagramAcked { pipe, to_server, payload } => {
				let Some(pipe) = self.pipes.get(pipe) else { return };
				if !pipe.active {
					return;
				}

				let sender = if to_server { &pipe.client } else { &pipe.server };
				sender.on_datagram_acked(&payload);
			}

			EventKind::DatagramLost {
				pipe,
				to_server,
				payload,
				sent_time,
			} => {
				let Some(pipe) = self.pipes.get(pipe) else { return };
				if !pipe.active {
					return;
				}

				let sender = if to_server { &pipe.client } else { &pipe.server };
				sender.on_datagram_lost(&payload, sent_time);
			}

			EventKind::Poll => {}
		}
	}
}
