//! Tandem demo binary.
//!
//! Runs a render thread that owns all presentation state and a logic thread
//! (the main thread) that drives it frame by frame:
//! - vertex buffers are posted over and recycled back home
//! - each frame is presented with a blocking call
//! - shared counters are updated under an [`Exclusive`] lock

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tandem_pipe::{Endpoint, Exclusive, PipeConfig, Registry, Role, spawn_endpoint_thread};
use tracing::info;

/// Demo command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tandem-demo")]
#[command(about = "Logic/render threads exchanging work through message pipes")]
struct Args {
	/// Number of frames to render
	#[arg(short, long, default_value_t = 3)]
	frames: u32,

	/// Pipe configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[derive(Debug, Default)]
struct Stats {
	uploaded_bytes: usize,
	presented: u32,
}

thread_local! {
	/// Render-side state. Only tasks running on the render thread touch it.
	static SURFACE: RefCell<Surface> = RefCell::new(Surface::default());
	/// Logic-side buffer pool, refilled by cleanups routed back from render.
	static POOL: RefCell<Vec<Vec<f32>>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Default)]
struct Surface {
	clear_color: [f32; 3],
	vertices: usize,
	frame: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = match &args.config {
		Some(path) => PipeConfig::load(path)?,
		None => PipeConfig::default(),
	};
	info!(frames = args.frames, ?config, "starting tandem-demo");

	let registry = Registry::new();
	let stats = Arc::new(Exclusive::new(Stats::default()));
	let render = spawn_endpoint_thread(&registry, Role::Render.as_str(), move |endpoint: Endpoint| {
		endpoint.with_config(config).run_until_shutdown()
	})?;

	let logic = registry.endpoint(Role::Logic.as_str()).with_config(config);
	let to_render = registry.open(&logic, Role::Render.as_str())?;

	to_render.call(|| SURFACE.with(|surface| surface.borrow_mut().clear_color = [0.1, 0.1, 0.12]))?;

	for frame in 0..args.frames {
		let mut buffer = POOL.with(|pool| pool.borrow_mut().pop()).unwrap_or_default();
		buffer.clear();
		buffer.extend((0..(frame as usize + 1) * 3).map(|i| i as f32));

		let uploads = Arc::clone(&stats);
		to_render.post_with(
			buffer,
			move |vertices: &mut Vec<f32>| {
				SURFACE.with(|surface| surface.borrow_mut().vertices = vertices.len());
				uploads.lock().uploaded_bytes += std::mem::size_of_val(vertices.as_slice());
			},
			|vertices| POOL.with(|pool| pool.borrow_mut().push(vertices)),
		)?;

		let presents = Arc::clone(&stats);
		let presented = to_render.call(move || {
			let presented = SURFACE.with(|surface| {
				let mut surface = surface.borrow_mut();
				surface.frame += 1;
				tracing::debug!(frame = surface.frame, vertices = surface.vertices, color = ?surface.clear_color, "render.present");
				surface.frame
			});
			presents.lock().presented = presented;
			presented
		})?;

		tandem_pipe::local::post(move || info!(frame = presented, "frame presented"))?;
		tandem_pipe::local::drain()?;
		let report = logic.drain()?;
		tracing::trace!(?report, "logic.drain");
	}

	to_render.peer().map(|peer| peer.close()).transpose()?;
	let processed = render.join().map_err(|_| "render thread panicked")??;
	logic.drain()?;

	let stats = stats.lock_pumping(&logic)?;
	let pooled = POOL.with(|pool| pool.borrow().len());
	info!(processed, presented = stats.presented, uploaded_bytes = stats.uploaded_bytes, pooled, "tandem-demo finished");
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("tandem_pipe=trace,tandem_demo=debug,info")
		} else {
			EnvFilter::new("tandem_demo=info,warn")
		}
	});

	// TANDEM_LOG_DIR sends logs to a per-process file instead of stderr.
	if let Some(log_dir) = std::env::var("TANDEM_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("tandem-demo.{}.log", std::process::id()));
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_thread_names(true)
				.with_target(true);
			tracing_subscriber::registry().with(filter).with(file_layer).init();
			tracing::info!(path = ?log_path, "demo tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt().with_env_filter(filter).with_thread_names(true).init();
}
