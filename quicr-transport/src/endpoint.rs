use std::collections::HashMap;

use crate::cache::{TrackCache, TrackProducer};
use crate::config::{Config, Role};
use crate::error::Error;
use crate::publish::CongestionPolicy;
use crate::session::{Session, TransferMode};
use crate::util::Shared;

/// The per-process context: configuration, the registry of media sources, and
/// the relay/origin role.
#[derive(Clone)]
pub struct Endpoint {
	state: Shared<EndpointState>,
}

struct EndpointState {
	config: Config,
	tracks: HashMap<String, TrackEntry>,

	/// The connection toward the next cache, when the node is a relay.
	upstream: Option<Session>,
}

struct TrackEntry {
	cache: TrackCache,

	/// Published by the local application rather than cached from the network.
	is_local: bool,

	/// Our upstream subscription feeding this cache.
	upstream_stream: Option<u64>,
}

impl Endpoint {
	pub fn new(config: Config) -> Self {
		Self {
			state: Shared::new(EndpointState {
				config,
				tracks: HashMap::new(),
				upstream: None,
			}),
		}
	}

	pub fn config(&self) -> Config {
		self.state.lock().config.clone()
	}

	pub(crate) fn congestion_policy(&self) -> CongestionPolicy {
		self.state.lock().config.congestion.clone()
	}

	pub(crate) fn extra_repeat(&self) -> (u32, u64) {
		let state = self.state.lock();
		(state.config.extra_repeat_count, state.config.extra_repeat_delay)
	}

	/// Install the relay's upstream connection once it is established.
	pub fn set_upstream(&self, session: Session) {
		self.state.lock().upstream = Some(session);
	}

	/// Register a URL published by the local application.
	pub fn publish(&self, url: &str) -> Result<TrackProducer, Error> {
		let mut state = self.state.lock();
		if state.tracks.contains_key(url) {
			return Err(Error::Duplicate);
		}

		let cache = TrackCache::new(url, state.config.real_time_cache);
		let producer = cache.producer();
		state.tracks.insert(
			url.to_string(),
			TrackEntry {
				cache,
				is_local: true,
				upstream_stream: None,
			},
		);

		log::info!("published source: url={url}");
		Ok(producer)
	}

	pub fn track(&self, url: &str) -> Option<TrackCache> {
		self.state.lock().tracks.get(url).map(|entry| entry.cache.clone())
	}

	pub fn nb_tracks(&self) -> usize {
		self.state.lock().tracks.len()
	}

	/// A local cache to receive a subscription into.
	pub(crate) fn consume_track(&self, url: &str) -> TrackCache {
		let mut state = self.state.lock();
		if let Some(entry) = state.tracks.get(url) {
			return entry.cache.clone();
		}

		let cache = TrackCache::new(url, state.config.real_time_cache);
		state.tracks.insert(
			url.to_string(),
			TrackEntry {
				cache: cache.clone(),
				is_local: false,
				upstream_stream: None,
			},
		);
		cache
	}

	/// Look up (or, at a cache-and-forward node, create) the track behind an
	/// incoming subscription. A relay pulls unknown URLs from its upstream.
	pub(crate) fn subscribed_track(&self, url: &str, now: u64) -> Result<TrackCache, Error> {
		let (cache, propagate) = {
			let mut state = self.state.lock();
			if let Some(entry) = state.tracks.get(url) {
				(entry.cache.clone(), None)
			} else {
				let propagate = match &state.config.role {
					Role::Client => return Err(Error::NotFound(url.to_string())),
					Role::Origin { .. } => None,
					Role::Relay { use_datagrams, .. } => {
						state.upstream.clone().map(|session| (session, *use_datagrams))
					}
				};

				let cache = TrackCache::new(url, state.config.real_time_cache);
				state.tracks.insert(
					url.to_string(),
					TrackEntry {
						cache: cache.clone(),
						is_local: false,
						upstream_stream: None,
					},
				);

				log::debug!("created source on subscribe: url={url}");
				(cache, propagate)
			}
		};

		if let Some((session, use_datagrams)) = propagate {
			let mode = if use_datagrams {
				TransferMode::Datagram
			} else {
				TransferMode::Stream
			};
			let stream_id = session.subscribe_cache(url, mode, cache.clone(), now)?;
			if let Some(entry) = self.state.lock().tracks.get_mut(url) {
				entry.upstream_stream = Some(stream_id);
			}
		}

		Ok(cache)
	}

	/// The cache behind an accepted POST.
	pub(crate) fn posted_track(&self, url: &str) -> Result<TrackCache, Error> {
		let state = self.state.lock();
		if let Some(entry) = state.tracks.get(url) {
			// The local application already publishes this URL.
			if entry.is_local {
				return Err(Error::Duplicate);
			}
			return Ok(entry.cache.clone());
		}
		drop(state);

		Ok(self.consume_track(url))
	}

	/// A relay re-posts incoming media toward its upstream.
	pub(crate) fn propagate_post(&self, url: &str, cache: TrackCache) -> Result<(), Error> {
		let propagate = {
			let state = self.state.lock();
			match &state.config.role {
				Role::Relay { use_datagrams, .. } => {
					state.upstream.clone().map(|session| (session, *use_datagrams))
				}
				_ => None,
			}
		};

		if let Some((session, use_datagrams)) = propagate {
			session.post_cache(url, cache, use_datagrams)?;
		}

		Ok(())
	}

	/// Periodic housekeeping: archival ageing, dropping upstream feeds nobody
	/// reads, and reclaiming finished sources.
	pub fn sweep(&self, now: u64) {
		let mut closers: Vec<(Session, u64)> = Vec::new();

		{
			let mut state = self.state.lock();
			let cache_duration = state.config.cache_duration;
			let upstream = state.upstream.clone();

			for entry in state.tracks.values_mut() {
				{
					let mut cache = entry.cache.state().lock();
					if !cache.is_real_time {
						cache.purge_archival(now, cache_duration);
					}
				}

				// A cached source nobody reads: stop pulling it.
				if !entry.is_local && entry.cache.state().lock().reader_count() == 0 {
					if let Some(stream_id) = entry.upstream_stream.take() {
						if let Some(session) = upstream.clone() {
							closers.push((session, stream_id));
						}
					}
				}
			}

			let reclaimed: Vec<String> = state
				.tracks
				.iter()
				.filter(|(_, entry)| entry.cache.is_reclaimable(now))
				.map(|(url, _)| url.clone())
				.collect();
			for url in reclaimed {
				state.tracks.remove(&url);
				log::info!("reclaimed source: url={url}");
			}
		}

		for (session, stream_id) in closers {
			session.close_stream(stream_id, now);
		}
	}
}
