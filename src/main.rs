use chromatics::config::DecayConfig;
use chromatics::coordinator::Coordinator;
use chromatics::engine::{lock, shared, Engine};
use chromatics::sampler::Sampler;
use chromatics::simulator::{demo_sequence, Simulator};
use chromatics::types::*;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chromatics")]
#[command(about = "Decaying pitch-space energy field driven by piano performance")]
struct Cli {
    /// Decay constants (JSON). Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective decay constants to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Render sampling rate (Hz)
    #[arg(long, default_value_t = 60)]
    render_hz: u32,

    /// Times to play the demo performance
    #[arg(long, default_value_t = 1)]
    loops: u32,

    /// Keep rendering this long after the performance ends (ms)
    #[arg(long, default_value_t = 3000)]
    linger_ms: u64,

    /// Log every Nth published snapshot
    #[arg(long, default_value_t = 15)]
    log_every: u64,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match DecayConfig::load(path) {
            Some(c) => c,
            None => {
                error!("Could not use decay config {:?}", path);
                return ExitCode::FAILURE;
            }
        },
        None => DecayConfig::default(),
    };

    if let Some(path) = &cli.dump_config {
        return match config.save(path) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Failed to write {:?}: {}", path, e);
                ExitCode::FAILURE
            }
        };
    }

    info!("═══════════════════════════════════════════════");
    info!("  CHROMATICS v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  Sustain: {:.2}s dry, {:.1}s pedalled at A0",
        config.min_sustain, config.base_sustain
    );
    info!("  Reverb e-folding: {:.1}s", 1.0 / config.reverb_time_scale);
    info!("  Render: {} Hz", cli.render_hz);
    info!("═══════════════════════════════════════════════");

    let clock = Arc::new(TickClock::new(SessionClock::new(), config.tick_resolution));
    let engine = shared(Engine::new(config));
    let stop = Arc::new(AtomicBool::new(false));

    // Channel: simulator → coordinator
    let (event_tx, event_rx) = bounded::<MidiEvent>(4096);
    // Channel: sampler → snapshot log
    let (frame_tx, frame_rx) = bounded::<FieldSnapshot>(256);

    let spawned = (|| -> std::io::Result<Vec<thread::JoinHandle<()>>> {
        let mut handles = Vec::new();

        // ─── Snapshot log (stands in for a renderer) ──────────────────
        let every = cli.log_every.max(1);
        handles.push(thread::Builder::new().name("field-log".into()).spawn(move || {
            let mut count: u64 = 0;
            for snapshot in frame_rx.iter() {
                count += 1;
                if count % every == 0 {
                    info!("{}  display={}", snapshot, snapshot.display_center());
                }
            }
        })?);

        // ─── Sampler (render path) ────────────────────────────────────
        let sampler_engine = engine.clone();
        let sampler_clock = clock.clone();
        let sampler_stop = stop.clone();
        let render_hz = cli.render_hz;
        handles.push(thread::Builder::new().name("sampler".into()).spawn(move || {
            Sampler::new(sampler_engine, sampler_clock, vec![frame_tx], render_hz)
                .with_stop(sampler_stop)
                .run();
        })?);

        // ─── Coordinator (event path) ─────────────────────────────────
        let coord_engine = engine.clone();
        let coord_clock = clock.clone();
        handles.push(thread::Builder::new().name("coordinator".into()).spawn(move || {
            Coordinator::new(event_rx, coord_engine, coord_clock).run();
        })?);

        Ok(handles)
    })();

    let handles = match spawned {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to start worker threads: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // ─── Input source: the simulator plays on the main thread ───────
    info!("Starting simulator...");
    Simulator::new(event_tx).run(&demo_sequence(), cli.loops);

    // Let the last notes die away, then stop rendering.
    thread::sleep(Duration::from_millis(cli.linger_ms));
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        let _ = h.join();
    }

    let state = lock(&engine);
    info!(
        "Done: {} notes retired, {} still live, reverb |{:.4}|",
        state.retired_count(),
        state.len(),
        state.reverb_center().length()
    );
    ExitCode::SUCCESS
}
