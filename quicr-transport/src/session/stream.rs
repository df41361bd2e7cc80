use crate::cache::TrackCache;
use crate::consume::Consumer;
use crate::message;
use crate::publish::{DatagramPublisher, StreamPublisher};

/// How media travels on a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
	/// Reliable, in key order, framed on the stream itself.
	Stream,
	/// Unreliable datagrams in arrival order, with repeats.
	Datagram,
}

/// One bidirectional stream and its role in the protocol.
pub(crate) struct StreamContext {
	pub id: u64,
	pub recv: message::Receiver,
	pub send: message::Sender,
	pub role: StreamRole,

	/// We owe the peer a stream FIN once the send queue drains.
	pub local_fin_pending: bool,
	pub local_fin_sent: bool,
	pub peer_fin: bool,
}

impl StreamContext {
	pub fn new(id: u64, role: StreamRole) -> Self {
		Self {
			id,
			recv: message::Receiver::new(),
			send: message::Sender::new(),
			role,
			local_fin_pending: false,
			local_fin_sent: false,
			peer_fin: false,
		}
	}
}

pub(crate) enum StreamRole {
	/// Peer-initiated stream whose first message decides the role.
	Pending,

	/// Media flows in: we sent OPEN_*, or accepted a POST.
	Consume(ConsumeState),

	/// Media flows out: we received OPEN_*, or our POST was accepted.
	Publish(PublishState),

	/// We sent a POST and wait for the ACCEPT.
	PostPending {
		cache: TrackCache,
		use_datagrams: bool,
	},
}

pub(crate) struct ConsumeState {
	pub consumer: Consumer,
	pub datagram_stream_id: Option<u64>,
	pub finished_signaled: bool,
}

impl ConsumeState {
	pub fn new(cache: TrackCache, datagram_stream_id: Option<u64>) -> Self {
		Self {
			consumer: Consumer::new(cache),
			datagram_stream_id,
			finished_signaled: false,
		}
	}
}

pub(crate) enum PublishState {
	Stream(StreamPublisher),
	Datagram(DatagramPublisher),
}
