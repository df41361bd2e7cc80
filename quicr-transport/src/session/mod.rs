mod stream;

pub use stream::TransferMode;
pub(crate) use stream::*;

use std::collections::{BTreeMap, HashMap};

use bytes::{Buf, Bytes};

use crate::cache::{FragmentKey, TrackCache, TrackReader};
use crate::coding::Decode;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::message::{Accept, DatagramHeader, Message, OpenDatagram, OpenStream, Post};
use crate::publish::{DatagramPublisher, StreamPublisher};
use crate::util::Shared;

/// How many bytes of media ride in one stream-mode repair message.
const STREAM_CHUNK: usize = 1024;

/// One transport connection: dispatches stream and datagram callbacks into the
/// per-stream state machines.
#[derive(Clone)]
pub struct Session {
	state: Shared<SessionState>,
}

struct SessionState {
	endpoint: Endpoint,
	streams: BTreeMap<u64, StreamContext>,
	next_stream_id: u64,

	/// Maps a datagram stream id to the stream consuming that media.
	recv_datagram: HashMap<u64, u64>,

	/// Maps a datagram stream id to the stream publishing that media.
	send_datagram: HashMap<u64, u64>,
	next_datagram_stream_id: u64,

	/// Datagrams below this id arriving after a local abandon are dropped.
	next_abandon_datagram_id: u64,

	/// Round-robin position for datagram polling.
	last_datagram_poll: u64,
}

impl Session {
	/// `is_client` decides stream-id parity, as on the QUIC substrate.
	pub fn new(endpoint: Endpoint, is_client: bool) -> Self {
		Self {
			state: Shared::new(SessionState {
				endpoint,
				streams: BTreeMap::new(),
				next_stream_id: if is_client { 0 } else { 1 },
				recv_datagram: HashMap::new(),
				send_datagram: HashMap::new(),
				next_datagram_stream_id: 0,
				next_abandon_datagram_id: 0,
				last_datagram_poll: u64::MAX,
			}),
		}
	}

	/// Subscribe to a URL, returning a reader over the local cache the media
	/// lands in.
	pub fn subscribe(&self, url: &str, mode: TransferMode, now: u64) -> Result<TrackReader, Error> {
		let endpoint = self.state.lock().endpoint.clone();
		let cache = endpoint.consume_track(url);

		// Attach the reader first so the eviction fence exists before data.
		let reader = cache.reader();
		self.subscribe_cache(url, mode, cache, now)?;
		Ok(reader)
	}

	/// Open a subscription feeding an existing cache; used directly by relays
	/// propagating a downstream subscribe.
	pub(crate) fn subscribe_cache(
		&self,
		url: &str,
		mode: TransferMode,
		cache: TrackCache,
		_now: u64,
	) -> Result<u64, Error> {
		let mut state = self.state.lock();
		let stream_id = state.alloc_stream_id();
		let mut ctx = StreamContext::new(stream_id, StreamRole::Pending);

		match mode {
			TransferMode::Stream => {
				ctx.send.send(OpenStream { url: url.to_string() })?;
				ctx.role = StreamRole::Consume(ConsumeState::new(cache, None));
			}
			TransferMode::Datagram => {
				let datagram_stream_id = state.alloc_datagram_id();
				ctx.send.send(OpenDatagram {
					url: url.to_string(),
					datagram_stream_id,
				})?;
				ctx.role = StreamRole::Consume(ConsumeState::new(cache, Some(datagram_stream_id)));
				state.recv_datagram.insert(datagram_stream_id, stream_id);
			}
		}

		log::debug!("subscribing: url={url} stream={stream_id} mode={mode:?}");
		state.streams.insert(stream_id, ctx);
		Ok(stream_id)
	}

	/// Offer a locally published URL to the peer.
	pub fn post(&self, url: &str, use_datagrams: bool) -> Result<(), Error> {
		let endpoint = self.state.lock().endpoint.clone();
		let cache = endpoint.track(url).ok_or_else(|| Error::NotFound(url.to_string()))?;
		self.post_cache(url, cache, use_datagrams)?;
		Ok(())
	}

	pub(crate) fn post_cache(&self, url: &str, cache: TrackCache, use_datagrams: bool) -> Result<u64, Error> {
		let mut state = self.state.lock();
		let stream_id = state.alloc_stream_id();
		let mut ctx = StreamContext::new(
			stream_id,
			StreamRole::PostPending { cache, use_datagrams },
		);
		ctx.send.send(Post { url: url.to_string() })?;

		log::debug!("posting: url={url} stream={stream_id}");
		state.streams.insert(stream_id, ctx);
		Ok(stream_id)
	}

	/// Stream bytes arrived from the transport.
	pub fn on_stream_data(&self, stream_id: u64, data: &[u8], fin: bool, now: u64) -> Result<(), Error> {
		self.state.lock().on_stream_data(stream_id, data, fin, now)
	}

	/// The transport has room on a stream; produce up to `budget` bytes and
	/// possibly a FIN.
	pub fn poll_stream(&self, stream_id: u64, budget: usize, now: u64) -> Option<(Bytes, bool)> {
		self.state.lock().poll_stream(stream_id, budget, now)
	}

	/// The transport can take a datagram of at most `max_size` bytes.
	pub fn poll_datagram(&self, max_size: usize, now: u64) -> Option<Bytes> {
		self.state.lock().poll_datagram(max_size, now)
	}

	/// A datagram arrived from the peer.
	pub fn on_datagram(&self, payload: &[u8], now: u64) -> Result<(), Error> {
		self.state.lock().on_datagram(payload, now)
	}

	pub fn on_datagram_acked(&self, payload: &[u8]) {
		self.state.lock().on_datagram_event(payload, AckEvent::Acked, 0);
	}

	pub fn on_datagram_lost(&self, payload: &[u8], sent_time: u64) {
		self.state.lock().on_datagram_event(payload, AckEvent::Lost, sent_time);
	}

	pub fn on_datagram_spurious(&self, payload: &[u8]) {
		self.state.lock().on_datagram_event(payload, AckEvent::Spurious, 0);
	}

	/// Abandon one stream locally: stop consuming and FIN our side.
	pub fn close_stream(&self, stream_id: u64, now: u64) {
		let mut state = self.state.lock();
		if let Some(ctx) = state.streams.get_mut(&stream_id) {
			if let StreamRole::Consume(consume) = &mut ctx.role {
				consume.consumer.on_close(now);
			}
			ctx.local_fin_pending = true;
		}
	}

	/// The transport connection is gone; cascade teardown.
	pub fn close(&self, now: u64) {
		let mut state = self.state.lock();
		let ids: Vec<u64> = state.streams.keys().copied().collect();
		for stream_id in ids {
			if let Some(ctx) = state.streams.get_mut(&stream_id) {
				if let StreamRole::Consume(consume) = &mut ctx.role {
					consume.consumer.on_close(now);
				}
			}
			state.remove_stream(stream_id);
		}
	}

	pub fn stream_ids(&self) -> Vec<u64> {
		self.state.lock().streams.keys().copied().collect()
	}

	pub fn has_streams(&self) -> bool {
		!self.state.lock().streams.is_empty()
	}
}

enum AckEvent {
	Acked,
	Lost,
	Spurious,
}

impl SessionState {
	fn alloc_stream_id(&mut self) -> u64 {
		let id = self.next_stream_id;
		self.next_stream_id += 4;
		id
	}

	fn alloc_datagram_id(&mut self) -> u64 {
		let id = self.next_datagram_stream_id;
		self.next_datagram_stream_id += 1;
		id
	}

	fn on_stream_data(&mut self, stream_id: u64, data: &[u8], fin: bool, now: u64) -> Result<(), Error> {
		let ctx = self
			.streams
			.entry(stream_id)
			.or_insert_with(|| StreamContext::new(stream_id, StreamRole::Pending));
		ctx.recv.push(data);

		loop {
			let msg = {
				let ctx = self.streams.get_mut(&stream_id).ok_or(Error::Internal)?;
				match ctx.recv.next()? {
					Some(msg) => msg,
					None => break,
				}
			};
			self.handle_message(stream_id, msg, now)?;
		}

		if fin {
			self.on_peer_fin(stream_id, now);
		}

		Ok(())
	}

	fn handle_message(&mut self, stream_id: u64, msg: Message, now: u64) -> Result<(), Error> {
		let endpoint = self.endpoint.clone();
		let ctx = self.streams.get_mut(&stream_id).ok_or(Error::Internal)?;

		// Take the role out for the transition; every arm yields the next one.
		let role = std::mem::replace(&mut ctx.role, StreamRole::Pending);

		let role = match (role, msg) {
			(StreamRole::Pending, Message::OpenStream(open)) => {
				log::debug!("serving subscribe: url={} stream={stream_id} mode=stream", open.url);
				let cache = endpoint.subscribed_track(&open.url, now)?;
				let publisher = StreamPublisher::new(cache, endpoint.congestion_policy());
				StreamRole::Publish(PublishState::Stream(publisher))
			}

			(StreamRole::Pending, Message::OpenDatagram(open)) => {
				log::debug!(
					"serving subscribe: url={} stream={stream_id} datagram={}",
					open.url,
					open.datagram_stream_id
				);
				let cache = endpoint.subscribed_track(&open.url, now)?;
				let publisher =
					DatagramPublisher::new(cache, open.datagram_stream_id, endpoint.congestion_policy());
				self.send_datagram.insert(open.datagram_stream_id, stream_id);
				StreamRole::Publish(PublishState::Datagram(publisher))
			}

			(StreamRole::Pending, Message::Post(post)) => {
				log::debug!("accepting post: url={} stream={stream_id}", post.url);
				let cache = endpoint.posted_track(&post.url)?;

				let datagram_stream_id = self.next_datagram_stream_id;
				self.next_datagram_stream_id += 1;

				ctx.send.send(Accept { datagram_stream_id })?;
				self.recv_datagram.insert(datagram_stream_id, stream_id);

				endpoint.propagate_post(&post.url, cache.clone())?;
				StreamRole::Consume(ConsumeState::new(cache, Some(datagram_stream_id)))
			}

			(StreamRole::PostPending { cache, use_datagrams }, Message::Accept(accept)) => {
				log::debug!(
					"post accepted: url={} stream={stream_id} datagram={}",
					cache.url(),
					accept.datagram_stream_id
				);

				if use_datagrams {
					let publisher = DatagramPublisher::new(
						cache,
						accept.datagram_stream_id,
						endpoint.congestion_policy(),
					);
					self.send_datagram.insert(accept.datagram_stream_id, stream_id);
					StreamRole::Publish(PublishState::Datagram(publisher))
				} else {
					let publisher = StreamPublisher::new(cache, endpoint.congestion_policy());
					StreamRole::Publish(PublishState::Stream(publisher))
				}
			}

			(StreamRole::Consume(mut consume), Message::Repair(repair)) => {
				consume.consumer.on_repair(repair, now);
				StreamRole::Consume(consume)
			}

			(StreamRole::Consume(mut consume), Message::FinDatagram(fin)) => {
				log::debug!(
					"end of media: stream={stream_id} final=({}, {})",
					fin.final_group_id,
					fin.final_object_id
				);
				consume.consumer.on_final(fin.final_group_id, fin.final_object_id);
				StreamRole::Consume(consume)
			}

			(StreamRole::Consume(mut consume), Message::StartPoint(start)) => {
				consume.consumer.on_start(start.group_id, start.object_id);
				StreamRole::Consume(consume)
			}

			(StreamRole::Consume(mut consume), Message::CachePolicy(policy)) => {
				consume.consumer.on_cache_policy(policy.is_real_time);
				StreamRole::Consume(consume)
			}

			// Defined on the wire, but its receive side is not part of the
			// protocol yet.
			(role, Message::RequestRepair(_)) => {
				ctx.role = role;
				return Err(Error::ProtocolViolation(0x4));
			}

			(role, msg) => {
				ctx.role = role;
				return Err(Error::ProtocolViolation(msg.tag()));
			}
		};

		ctx.role = role;
		Self::check_finished(ctx, now);
		Ok(())
	}

	fn check_finished(ctx: &mut StreamContext, now: u64) {
		let peer_fin = ctx.peer_fin;
		if let StreamRole::Consume(consume) = &mut ctx.role {
			if !consume.finished_signaled && consume.consumer.is_finished() {
				consume.finished_signaled = true;
				ctx.local_fin_pending = true;
				if peer_fin {
					consume.consumer.on_close(now);
				}
				log::debug!("media complete: stream={}", ctx.id);
			}
		}
	}

	fn on_peer_fin(&mut self, stream_id: u64, now: u64) {
		if let Some(ctx) = self.streams.get_mut(&stream_id) {
			ctx.peer_fin = true;

			match &mut ctx.role {
				StreamRole::Consume(consume) => {
					// On a reliable stream the FIN follows all the data; in
					// datagram mode lost fragments may still be repaired, so
					// hold the stream open until the frontier reaches the end.
					if consume.datagram_stream_id.is_none() || consume.consumer.is_finished() {
						consume.consumer.on_close(now);
						ctx.local_fin_pending = true;
					}
				}
				_ => ctx.local_fin_pending = true,
			}
		}

		self.maybe_remove(stream_id);
	}

	fn poll_stream(&mut self, stream_id: u64, budget: usize, now: u64) -> Option<(Bytes, bool)> {
		let ctx = self.streams.get_mut(&stream_id)?;

		match &mut ctx.role {
			StreamRole::Publish(PublishState::Stream(publisher)) => {
				while ctx.send.len() < budget {
					let Some(msg) = publisher.poll_message(STREAM_CHUNK, now) else { break };
					let finished = matches!(msg, Message::FinDatagram(_));
					if ctx.send.send(msg).is_err() {
						break;
					}
					if finished {
						ctx.local_fin_pending = true;
						break;
					}
				}
			}
			StreamRole::Publish(PublishState::Datagram(publisher)) => {
				while ctx.send.len() < budget {
					let Some(msg) = publisher.poll_control() else { break };
					let finished = matches!(msg, Message::FinDatagram(_));
					if ctx.send.send(msg).is_err() {
						break;
					}
					if finished {
						// The peer closes once its frontier reaches the end;
						// repeats keep flowing as datagrams meanwhile.
						ctx.local_fin_pending = true;
						break;
					}
				}
			}
			_ => {}
		}

		let data = ctx.send.poll(budget);
		let fin = ctx.local_fin_pending && !ctx.local_fin_sent && ctx.send.is_empty();
		if fin {
			ctx.local_fin_sent = true;
		}

		let result = match (data, fin) {
			(None, false) => None,
			(data, fin) => Some((data.unwrap_or_default(), fin)),
		};

		if fin {
			self.maybe_remove(stream_id);
		}

		result
	}

	fn poll_datagram(&mut self, max_size: usize, now: u64) -> Option<Bytes> {
		let (extra_count, extra_delay) = self.endpoint.extra_repeat();

		let ids: Vec<u64> = self
			.streams
			.iter()
			.filter(|(_, ctx)| matches!(ctx.role, StreamRole::Publish(PublishState::Datagram(_))))
			.map(|(&id, _)| id)
			.collect();
		if ids.is_empty() {
			return None;
		}

		let start = ids
			.iter()
			.position(|&id| id > self.last_datagram_poll)
			.unwrap_or(0);

		for index in 0..ids.len() {
			let id = ids[(start + index) % ids.len()];
			let Some(ctx) = self.streams.get_mut(&id) else { continue };

			if let StreamRole::Publish(PublishState::Datagram(publisher)) = &mut ctx.role {
				if extra_count > 0 {
					publisher.poll_extra_repeats(now, extra_delay, extra_count);
				}

				if let Some(datagram) = publisher.poll_datagram(max_size, now) {
					self.last_datagram_poll = id;
					return Some(datagram);
				}
			}
		}

		None
	}

	fn on_datagram(&mut self, payload: &[u8], now: u64) -> Result<(), Error> {
		let mut buf = payload;
		let header = DatagramHeader::decode(&mut buf)?;
		let data = Bytes::copy_from_slice(buf.chunk());

		match self.recv_datagram.get(&header.datagram_stream_id).copied() {
			Some(stream_id) => {
				let ctx = self.streams.get_mut(&stream_id).ok_or(Error::Internal)?;
				if let StreamRole::Consume(consume) = &mut ctx.role {
					consume.consumer.on_datagram(&header, data, now);
				}
				Self::check_finished(ctx, now);
				Ok(())
			}
			None if header.datagram_stream_id < self.next_abandon_datagram_id => {
				log::debug!(
					"late datagram for abandoned stream: datagram={}",
					header.datagram_stream_id
				);
				Ok(())
			}
			None => Err(Error::ProtocolViolation(0)),
		}
	}

	/// Ack, loss, and spurious-loss callbacks all carry the original datagram
	/// payload; route by its header.
	fn on_datagram_event(&mut self, payload: &[u8], event: AckEvent, sent_time: u64) {
		let mut buf = payload;
		let Ok(header) = DatagramHeader::decode(&mut buf) else {
			log::warn!("undecodable datagram in transport callback");
			return;
		};

		let Some(&stream_id) = self.send_datagram.get(&header.datagram_stream_id) else {
			// The stream was torn down; the repeat state went with it.
			return;
		};
		let Some(ctx) = self.streams.get_mut(&stream_id) else { return };

		if let StreamRole::Publish(PublishState::Datagram(publisher)) = &mut ctx.role {
			let key = FragmentKey::new(header.group_id, header.object_id, header.offset);
			match event {
				AckEvent::Acked => publisher.on_acked(key),
				AckEvent::Lost => publisher.on_lost(key, sent_time),
				AckEvent::Spurious => publisher.on_spurious(key),
			}
		}
	}

	fn maybe_remove(&mut self, stream_id: u64) {
		let done = self
			.streams
			.get(&stream_id)
			.is_some_and(|ctx| ctx.local_fin_sent && ctx.peer_fin);
		if done {
			self.remove_stream(stream_id);
		}
	}

	fn remove_stream(&mut self, stream_id: u64) {
		let Some(ctx) = self.streams.remove(&stream_id) else { return };

		match ctx.role {
			StreamRole::Consume(consume) => {
				if let Some(datagram_stream_id) = consume.datagram_stream_id {
					self.recv_datagram.remove(&datagram_stream_id);
					self.next_abandon_datagram_id =
						self.next_abandon_datagram_id.max(datagram_stream_id + 1);
				}
			}
			StreamRole::Publish(PublishState::Datagram(publisher)) => {
				self.send_datagram.remove(&publisher.datagram_stream_id());
			}
			_ => {}
		}

		log::debug!("stream closed: stream={stream_id}");
	}
}
