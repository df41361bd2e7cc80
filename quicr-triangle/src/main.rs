use anyhow::Context;
use clap::Parser;

use quicr_sim::{LinkConfig, MediaConfig, MediaSink, MediaSource, Net};
use quicr_transport::{Config, Endpoint, TransferMode};

/// Run the canonical publisher/origin/subscriber triangle on virtual time.
#[derive(Parser, Clone)]
struct Cli {
	/// The URL being published and subscribed.
	#[arg(long, default_value = "quicr://origin.example/video/1")]
	url: String,

	/// Transfer mode: stream or datagram.
	#[arg(long, default_value = "datagram")]
	mode: String,

	/// Number of objects to publish.
	#[arg(long, default_value_t = 100)]
	objects: u64,

	/// Object payload size in bytes.
	#[arg(long, default_value_t = 47)]
	size: usize,

	/// Objects per group.
	#[arg(long, default_value_t = 10)]
	group: u64,

	/// Rotating 64-bit datagram loss mask on the subscriber link, in hex.
	#[arg(long, default_value = "0")]
	loss_mask: String,

	/// Subscriber link bandwidth in bits per second; 0 means unlimited.
	#[arg(long, default_value_t = 0)]
	bandwidth: u64,

	/// Let the origin skip backlogged objects.
	#[arg(long)]
	congestion: bool,

	/// Use the real-time eviction policy at the origin.
	#[arg(long)]
	real_time: bool,
}

fn main() -> anyhow::Result<()> {
	env_logger::init();

	let cli = Cli::parse();

	let use_datagrams = match cli.mode.as_str() {
		"stream" => false,
		"datagram" => true,
		other => anyhow::bail!("unknown mode: {other}"),
	};

	let loss_mask = u64::from_str_radix(cli.loss_mask.trim_start_matches("0x"), 16)
		.context("loss mask must be hex")?;

	let media = MediaConfig {
		object_size: cli.size,
		objects_per_group: cli.group,
		nb_objects: cli.objects,
		..MediaConfig::default()
	};

	let mut origin_config = Config::default()
		.enable_origin(use_datagrams)
		.enable_congestion_control(cli.congestion)
		.set_simulated_time();
	if cli.real_time {
		origin_config = origin_config.set_real_time_cache();
	}

	let publisher = Endpoint::new(Config::default().set_simulated_time());
	let origin = Endpoint::new(origin_config);
	let subscriber = Endpoint::new(Config::default().set_simulated_time());

	let mut net = Net::new();
	let pub_conn = net.connect(&publisher, &origin, LinkConfig::default());
	let sub_conn = net.connect_asymmetric(
		&subscriber,
		&origin,
		LinkConfig::default(),
		LinkConfig::default()
			.with_loss_mask(loss_mask)
			.with_bandwidth(cli.bandwidth),
	);

	let producer = publisher.publish(&cli.url).context("failed to publish")?;
	pub_conn
		.client
		.post(&cli.url, use_datagrams)
		.context("failed to post")?;

	let mode = if use_datagrams {
		TransferMode::Datagram
	} else {
		TransferMode::Stream
	};
	let reader = sub_conn
		.client
		.subscribe(&cli.url, mode, 0)
		.context("failed to subscribe")?;

	let mut source = MediaSource::new(producer, media.clone());
	let mut sink = MediaSink::new(reader);

	let mut now = 0;
	loop {
		net.run_until(now);
		sink.poll();
		if !source.publish_next(now) {
			break;
		}
		now += media.interval;
	}

	// Allow repeats and teardown to settle.
	net.run_until(now + 30_000_000);
	sink.poll();

	let skipped = sink.skipped();
	println!(
		"published {} objects, received {} ({} skipped) in {:.3}s simulated",
		cli.objects,
		sink.nb_received(),
		skipped.len(),
		net.now() as f64 / 1_000_000.0
	);

	sink.verify(&media).map_err(anyhow::Error::msg)?;

	if !sink.finished() {
		anyhow::bail!(
			"subscriber did not reach the end of the media: received {} of {}",
			sink.nb_received(),
			cli.objects
		);
	}

	Ok(())
}
