//! The canonical publisher/relay/subscriber scenarios, on virtual time.

use bytes::Bytes;

use quicr_sim::{Connection, LinkConfig, MediaConfig, MediaSink, MediaSource, Net};
use quicr_transport::cache::TrackCache;
use quicr_transport::consume::Consumer;
use quicr_transport::message::DatagramHeader;
use quicr_transport::{Config, Endpoint, TransferMode};

const URL: &str = "quicr://origin.example/video/1";

fn init_log() {
	let _ = env_logger::builder().is_test(true).try_init();
}

struct Triangle {
	net: Net,
	publisher: Endpoint,
	origin: Endpoint,
	subscriber: Endpoint,
	pub_conn: Connection,
	sub_conn: Connection,
}

fn triangle(origin_config: Config, pub_link: LinkConfig, sub_up: LinkConfig, sub_down: LinkConfig) -> Triangle {
	init_log();

	let publisher = Endpoint::new(Config::default().set_simulated_time());
	let origin = Endpoint::new(origin_config.set_simulated_time());
	let subscriber = Endpoint::new(Config::default().set_simulated_time());

	let mut net = Net::new();
	let pub_conn = net.connect(&publisher, &origin, pub_link);
	let sub_conn = net.connect_asymmetric(&subscriber, &origin, sub_up, sub_down);

	Triangle {
		net,
		publisher,
		origin,
		subscriber,
		pub_conn,
		sub_conn,
	}
}

/// Publish on schedule while pumping the network and draining the sink.
fn run_media(triangle: &mut Triangle, source: &mut MediaSource, sink: &mut MediaSink, interval: u64) -> u64 {
	let mut now = 0;
	loop {
		triangle.net.run_until(now);
		sink.poll();
		if !source.publish_next(now) {
			break;
		}
		now += interval;
	}
	now
}

#[test]
fn stream_triangle_delivers_every_object() {
	let config = MediaConfig {
		objects_per_group: 100,
		..MediaConfig::default()
	};

	let mut triangle = triangle(
		Config::default().enable_origin(false),
		LinkConfig::default(),
		LinkConfig::default(),
		LinkConfig::default(),
	);

	let producer = triangle.publisher.publish(URL).unwrap();
	triangle.pub_conn.client.post(URL, false).unwrap();

	let reader = triangle
		.sub_conn
		.client
		.subscribe(URL, TransferMode::Stream, 0)
		.unwrap();

	let mut source = MediaSource::new(producer, config.clone());
	let mut sink = MediaSink::new(reader);

	run_media(&mut triangle, &mut source, &mut sink, config.interval);
	triangle.net.run_until(12_000_000);
	sink.poll();

	assert_eq!(sink.nb_received(), 100);
	assert!(sink.skipped().is_empty());
	sink.verify(&config).unwrap();
	assert!(sink.finished());

	let cache = triangle.subscriber.track(URL).unwrap();
	assert_eq!(cache.final_point(), Some((0, 100)));

	// Both sides of the triangle wound their streams down cleanly.
	assert!(!triangle.pub_conn.client.has_streams());
	assert!(!triangle.pub_conn.server.has_streams());
	assert!(!triangle.sub_conn.client.has_streams());
	assert!(!triangle.sub_conn.server.has_streams());
}

#[test]
fn datagram_triangle_recovers_from_loss() {
	let config = MediaConfig::default();

	// One datagram in sixteen dies on the way to the subscriber.
	let mut triangle = triangle(
		Config::default().enable_origin(true),
		LinkConfig::default(),
		LinkConfig::default(),
		LinkConfig::default().with_loss_mask(0x7080),
	);

	let producer = triangle.publisher.publish(URL).unwrap();
	triangle.pub_conn.client.post(URL, true).unwrap();

	let reader = triangle
		.sub_conn
		.client
		.subscribe(URL, TransferMode::Datagram, 0)
		.unwrap();

	let mut source = MediaSource::new(producer, config.clone());
	let mut sink = MediaSink::new(reader);

	run_media(&mut triangle, &mut source, &mut sink, config.interval);
	triangle.net.run_until(12_000_000);
	sink.poll();

	// Every loss was repaired; nothing was skipped.
	assert_eq!(sink.nb_received(), 100);
	assert!(sink.skipped().is_empty());
	sink.verify(&config).unwrap();
	assert!(sink.finished());
}

#[test]
fn congestion_skips_only_droppable_objects() {
	let config = MediaConfig::default();

	let origin_config = Config::default()
		.enable_origin(true)
		.enable_congestion_control(true)
		.set_congestion_limits(0x82, Some(25));

	// A 10 kbit/s link toward the subscriber; media arrives faster than it
	// drains, so the origin falls behind and starts skipping.
	let mut triangle = triangle(
		origin_config,
		LinkConfig::default(),
		LinkConfig::default(),
		LinkConfig::default().with_bandwidth(10_000),
	);

	let producer = triangle.publisher.publish(URL).unwrap();
	triangle.pub_conn.client.post(URL, true).unwrap();

	let reader = triangle
		.sub_conn
		.client
		.subscribe(URL, TransferMode::Datagram, 0)
		.unwrap();

	let mut source = MediaSource::new(producer, config.clone());
	let mut sink = MediaSink::new(reader);

	run_media(&mut triangle, &mut source, &mut sink, config.interval);
	triangle.net.run_until(20_000_000);
	sink.poll();

	// Skipped objects still arrive as zero-length sentinels, so the object
	// sequence stays dense.
	assert_eq!(sink.nb_received(), 100);
	sink.verify(&config).unwrap();
	assert!(sink.finished());

	let skipped = sink.skipped();
	assert!(!skipped.is_empty(), "a 10 kbit/s link must force skips");
	assert!(skipped.len() <= 25, "drop budget exceeded: {}", skipped.len());
	for (_, object_id) in &skipped {
		assert!(
			quicr_sim::object_flags(*object_id) >= 0x82,
			"object {object_id} below the loss-class floor was dropped"
		);
	}
}

#[test]
fn mid_group_start_is_served_from_the_next_boundary() {
	let config = MediaConfig {
		nb_objects: 20,
		..MediaConfig::default()
	};

	let mut triangle = triangle(
		Config::default().enable_origin(false),
		LinkConfig::default(),
		LinkConfig::default(),
		LinkConfig::default(),
	);

	let producer = triangle.publisher.publish(URL).unwrap();
	let mut source = MediaSource::new(producer, config.clone());
	source.start_at(0, 12_345);

	triangle.pub_conn.client.post(URL, false).unwrap();

	let reader = triangle
		.sub_conn
		.client
		.subscribe(URL, TransferMode::Stream, 0)
		.unwrap();
	let mut sink = MediaSink::new(reader);

	run_media(&mut triangle, &mut source, &mut sink, config.interval);
	triangle.net.run_until(12_000_000);
	sink.poll();

	// Objects 12345..12349 of group 0 are never delivered: a subscriber
	// joining mid-group starts at the next group boundary.
	assert_eq!(sink.first_point(), (1, 0));
	let (group_id, object_id, _) = sink.received.first().expect("no objects received");
	assert_eq!((*group_id, *object_id), (1, 0));
	assert_eq!(sink.nb_received(), 15);
	sink.verify(&config).unwrap();
}

#[test]
fn realtime_cache_reclaims_after_subscriber_leaves() {
	// Ten seconds of media in groups of 30 frames.
	let config = MediaConfig {
		nb_objects: 300,
		objects_per_group: 30,
		..MediaConfig::default()
	};

	let origin_config = Config::default()
		.enable_origin(true)
		.set_real_time_cache()
		.set_cache_duration(5_000_000);

	let mut triangle = triangle(
		origin_config,
		LinkConfig::default(),
		LinkConfig::default(),
		LinkConfig::default(),
	);

	let producer = triangle.publisher.publish(URL).unwrap();
	triangle.pub_conn.client.post(URL, true).unwrap();

	let reader = triangle
		.sub_conn
		.client
		.subscribe(URL, TransferMode::Datagram, 0)
		.unwrap();

	let mut source = MediaSource::new(producer, config.clone());
	let mut sink = MediaSink::new(reader);

	let end = run_media(&mut triangle, &mut source, &mut sink, config.interval);
	triangle.net.run_until(end + 500_000);
	sink.poll();
	assert_eq!(triangle.origin.nb_tracks(), 1);

	// The subscriber goes away; nothing keeps the source alive.
	triangle.net.disconnect(&triangle.sub_conn);
	drop(sink);

	triangle.net.run_until(end + 10_000_000);
	assert_eq!(triangle.origin.nb_tracks(), 0);
	assert_eq!(triangle.publisher.nb_tracks(), 0);
}

#[test]
fn relay_pulls_from_origin_on_first_subscribe() {
	init_log();
	let config = MediaConfig::default();

	let publisher = Endpoint::new(Config::default().set_simulated_time());
	let origin = Endpoint::new(Config::default().enable_origin(false).set_simulated_time());
	let relay = Endpoint::new(
		Config::default()
			.enable_relay("origin.example", "origin.example:443", false)
			.set_simulated_time(),
	);
	let subscriber = Endpoint::new(Config::default().set_simulated_time());

	let mut net = Net::new();
	let pub_conn = net.connect(&publisher, &origin, LinkConfig::default());
	let up_conn = net.connect(&relay, &origin, LinkConfig::default());
	relay.set_upstream(up_conn.client.clone());
	let sub_conn = net.connect(&subscriber, &relay, LinkConfig::default());

	let producer = publisher.publish(URL).unwrap();
	pub_conn.client.post(URL, false).unwrap();

	let reader = sub_conn.client.subscribe(URL, TransferMode::Stream, 0).unwrap();

	let mut source = MediaSource::new(producer, config.clone());
	let mut sink = MediaSink::new(reader);

	let mut now = 0;
	loop {
		net.run_until(now);
		sink.poll();
		if !source.publish_next(now) {
			break;
		}
		now += config.interval;
	}
	net.run_until(now + 2_000_000);
	sink.poll();

	assert_eq!(sink.nb_received(), 100);
	sink.verify(&config).unwrap();
	assert!(sink.finished());

	// The relay cached the track on the way through.
	assert!(relay.track(URL).is_some());

	// Once the subscriber leaves, the relay drops its upstream feed and both
	// cache nodes reclaim the source.
	net.disconnect(&sub_conn);
	drop(sink);
	net.run_until(now + 40_000_000);
	assert_eq!(relay.nb_tracks(), 0);
	assert_eq!(origin.nb_tracks(), 0);
}

#[test]
fn frontier_stalls_at_group_boundary_until_count_confirmed() {
	init_log();

	fn header(group_id: u64, object_id: u64, nb_prev: u64) -> DatagramHeader {
		DatagramHeader {
			datagram_stream_id: 0,
			group_id,
			object_id,
			offset: 0,
			queue_delay: 0,
			flags: 0,
			nb_objects_previous_group: nb_prev,
			is_last_fragment: true,
		}
	}

	let cache = TrackCache::new(URL, false);
	let mut consumer = Consumer::new(cache.clone());

	// Group 0 objects 0..3 arrive in order.
	for object_id in 0..4 {
		consumer.on_datagram(&header(0, object_id, 0), Bytes::from_static(b"frame"), 10);
	}

	// Group 1 opens (claiming five objects in group 0) before group 0
	// object 4 ever shows up: the frontier must stall.
	consumer.on_datagram(&header(1, 0, 5), Bytes::from_static(b"opener"), 20);
	assert_eq!(cache.next_point(), (0, 4, 0));

	// The missing object completes and the frontier jumps across.
	consumer.on_datagram(&header(0, 4, 0), Bytes::from_static(b"late"), 30);
	assert_eq!(cache.next_point(), (1, 1, 0));
}
