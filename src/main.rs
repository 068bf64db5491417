//! Barcode Capture CLI
//!
//! Runs the scanner end to end against a synthetic camera and a marker
//! decoder, logging every scanner event and the final frame counters.

use barcode_capture::{
    capture::{CameraManager, Facing, FileConfig, MockCameraManager},
    geometry::{OutputSize, Rotation, ViewSize},
    metrics::ScannerSnapshot,
    pipeline::{DecodeMiss, Decoder},
    session::{BarcodeScanner, HeadlessSurface, ScannerEvent},
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

const MARKER: &[u8] = b"SYM:";
const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of synthetic frames to stream.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Frames per second for the synthetic camera.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Embed a readable symbol in every Nth frame.
    #[arg(long, default_value_t = 15)]
    symbol_every: u64,
    /// Lay the preview out in portrait.
    #[arg(long)]
    portrait: bool,
    /// Stream from a local webcam instead of the synthetic camera.
    #[cfg(feature = "camera")]
    #[arg(long)]
    native: bool,
    /// Serve Prometheus metrics on the configured port.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics: bool,
}

/// Decodes frames whose luma plane starts with `SYM:` followed by a
/// NUL-terminated payload.
struct MarkerDecoder;

impl Decoder for MarkerDecoder {
    fn decode(&mut self, luma: &[u8], _width: u32, _height: u32) -> Result<String, DecodeMiss> {
        let payload = luma.strip_prefix(MARKER).ok_or(DecodeMiss::NotFound)?;
        let end = payload
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeMiss::FormatInvalid)?;
        std::str::from_utf8(&payload[..end])
            .map(str::to_owned)
            .map_err(|_| DecodeMiss::FormatInvalid)
    }

    fn reset(&mut self) {}
}

fn synthetic_frame(sequence: u64, with_symbol: bool) -> Vec<u8> {
    let mut luma: Vec<u8> = (0..FRAME_WIDTH * FRAME_HEIGHT)
        .map(|i| ((i as u64 + sequence * 7) % 251) as u8)
        .collect();
    if with_symbol {
        let payload = format!("DEMO-{:04}", sequence);
        let symbol = [MARKER, payload.as_bytes(), &[0]].concat();
        luma[..symbol.len()].copy_from_slice(&symbol);
    }
    luma
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Barcode Capture v{}", barcode_capture::VERSION);

    let file_config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if args.fps == 0 {
        eprintln!("--fps must be at least 1");
        std::process::exit(1);
    }

    let mock = Arc::new(MockCameraManager::new().with_camera(
        "synthetic-0",
        Facing::Back,
        vec![
            OutputSize::new(1920, 1080),
            OutputSize::new(1280, 720),
            OutputSize::new(960, 540),
            OutputSize::new(640, 480),
        ],
    ));
    #[cfg(feature = "camera")]
    let manager: Arc<dyn CameraManager> = if args.native {
        info!("Using native camera backend");
        Arc::new(barcode_capture::capture::NativeCameraManager::new())
    } else {
        mock.clone()
    };
    #[cfg(not(feature = "camera"))]
    let manager: Arc<dyn CameraManager> = mock.clone();

    let viewport = if args.portrait {
        ViewSize::new(720, 1280)
    } else {
        ViewSize::new(1280, 720)
    };
    let surface = HeadlessSurface::new(viewport, Rotation::Deg0);

    let (mut scanner, events) = match BarcodeScanner::spawn(
        file_config.scanner.clone(),
        manager,
        Box::new(surface),
        MarkerDecoder,
    ) {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Failed to start scanner: {}", e);
            std::process::exit(1);
        }
    };

    let event_log = thread::spawn(move || {
        let mut results = 0u64;
        for event in events {
            match event {
                ScannerEvent::Result(text) => {
                    results += 1;
                    info!(symbol = %text, "Decoded");
                }
                ScannerEvent::Error(e) => error!(error = %e, "Scanner error"),
                other => info!(event = ?other, "Scanner event"),
            }
        }
        results
    });

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    #[cfg(feature = "metrics")]
    let metrics = if args.metrics {
        start_metrics_server(file_config.metrics.port)
    } else {
        None
    };

    scanner.start_preview();
    scanner.start_scanning();

    let interval = Duration::from_secs(1) / args.fps;
    info!(frames = args.frames, fps = args.fps, "Streaming frames");

    #[cfg(feature = "camera")]
    let synthetic = !args.native;
    #[cfg(not(feature = "camera"))]
    let synthetic = true;

    for sequence in 1..=args.frames {
        if !running.load(Ordering::SeqCst) {
            info!("Stopping early");
            break;
        }
        if synthetic {
            let with_symbol = args.symbol_every > 0 && sequence % args.symbol_every == 0;
            mock.emit_frame(synthetic_frame(sequence, with_symbol), FRAME_WIDTH, FRAME_HEIGHT);
        }

        #[cfg(feature = "metrics")]
        if let Some(state) = &metrics {
            state
                .blocking_read()
                .update(&ScannerSnapshot::from_scanner(&scanner));
        }

        thread::sleep(interval);
    }

    let snapshot = ScannerSnapshot::from_scanner(&scanner);
    scanner.stop_scanning();
    scanner.stop_preview();
    scanner.shutdown();
    drop(scanner);

    let results = event_log.join().unwrap_or_default();
    let c = snapshot.counters;
    info!(
        received = c.frames_received,
        admitted = c.frames_admitted,
        dropped_busy = c.frames_dropped_busy,
        dropped_idle = c.frames_dropped_idle,
        superseded = c.frames_superseded,
        misses = c.decode_misses,
        faults = c.decode_faults,
        "Frame counters"
    );
    info!("Done. {} symbols decoded", results);
}

#[cfg(feature = "metrics")]
fn start_metrics_server(
    port: u16,
) -> Option<Arc<tokio::sync::RwLock<barcode_capture::metrics::MetricsState>>> {
    use barcode_capture::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            return None;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();

    thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Failed to start metrics runtime");
                return;
            }
        };
        if let Err(e) = runtime.block_on(server.run()) {
            warn!(error = %e, "Metrics server stopped");
        }
    });
    Some(state)
}
