use std::{
    f32::consts::TAU,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use clap::{Parser, Subcommand, ValueEnum};
use pulse_show_core::{
    AudioEngine, EffectLayer, EffectMode, FrameScheduler, Recorder, RecordingSettings,
    RenderCommand, Renderer, Show, ShowClock, ShowConfig, SpectrumInput, StateStore, TimeSource,
};
use tracing_subscriber::EnvFilter;

mod mic;

fn main() -> pulse_show_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_show(args),
        Commands::DefaultConfig { output } => write_default_config(&output),
    }
}

fn run_show(args: RunArgs) -> pulse_show_core::Result<()> {
    let config = match &args.config {
        Some(path) => ShowConfig::load(path)?,
        None => ShowConfig::default(),
    };
    tracing::info!(source = ?args.source, fps = args.fps, seed = args.seed, "starting show");

    let mut clock = ShowClock::start();
    if let Some(offset_ms) = args.time_offset_ms {
        clock.synchronise(&ShiftedLocalTime { offset_ms });
    }

    let store = match &args.state_file {
        Some(path) => StateStore::open(path),
        None => StateStore::in_memory(),
    };
    let mut show = Show::new(config.clone(), store, args.seed);

    let mut renderer = TraceRenderer::new(config.viewport.width, config.viewport.height, args.fps);
    if let Some((width, height)) = renderer.surface_size() {
        show.resize(width, height);
    }
    if let Some(mode) = args.effect {
        show.select_effect(mode, clock.frame_time());
    }
    if let Some(gain) = args.sensitivity {
        show.set_sensitivity(gain);
    }

    let mut recorder = match &args.record {
        Some(path) => Some(open_recorder(path, args.record_every)?),
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let stop = running.clone();
    if let Err(err) = ctrlc::set_handler(move || stop.store(false, Ordering::SeqCst)) {
        tracing::warn!(%err, "could not install the ctrl-c handler");
    }

    let mut synth = None;
    let mut microphone = None;
    let mut analyser = match args.source {
        Source::Demo => None,
        Source::Synth => {
            let engine = AudioEngine::new(config.analyser.clone())?;
            let handle = engine.start()?;
            synth = Some(spawn_synth(
                engine,
                config.analyser.sample_rate,
                args.bpm,
                running.clone(),
            ));
            Some(handle)
        }
        Source::Mic => match mic::open(&config.analyser) {
            Ok((stream, handle)) => {
                microphone = Some(stream);
                Some(handle)
            }
            Err(err) => {
                tracing::warn!(%err, "microphone unavailable, running the demo show");
                None
            }
        },
    };

    let mut scheduler = FrameScheduler::new(args.fps);
    while should_continue(&running, args.frames, scheduler.frames()) {
        let time = clock.frame_time();
        let input = match analyser.as_mut() {
            Some(handle) => handle.read(),
            None => SpectrumInput::Unavailable,
        };
        let command = show.tick(input, time);

        renderer.present(&command)?;
        record_frame(&mut recorder, &command);

        let wait_ms = scheduler.wait_ms(clock.frame_time().now);
        if wait_ms > 0.0 {
            thread::sleep(Duration::from_secs_f64(wait_ms / 1000.0));
        }
    }

    running.store(false, Ordering::SeqCst);
    drop(microphone);
    if let Some(synth) = synth {
        if synth.join().is_err() {
            tracing::warn!("synth thread panicked");
        }
    }
    if let Some(mut recorder) = recorder {
        recorder.stop()?;
        tracing::info!(frames = recorder.written(), "recording finished");
    }
    tracing::info!(frames = show.frames(), "show stopped");
    Ok(())
}

/// The loop runs until ctrl-c clears `running` or the frame limit is hit.
fn should_continue(running: &AtomicBool, limit: Option<u64>, frames: u64) -> bool {
    running.load(Ordering::SeqCst) && limit.map_or(true, |limit| frames < limit)
}

/// Writes one frame; a recorder that fails is flushed and closed for good.
fn record_frame<W: Write>(recorder: &mut Option<Recorder<W>>, command: &RenderCommand) {
    let Some(mut active) = recorder.take() else {
        return;
    };
    match active.present(command) {
        Ok(()) => *recorder = Some(active),
        Err(err) => {
            tracing::warn!(%err, "recording failed, closing recorder");
            if let Err(err) = active.stop() {
                tracing::warn!(%err, "could not flush the recording");
            }
        }
    }
}

fn write_default_config(output: &Path) -> pulse_show_core::Result<()> {
    tracing::info!(?output, "writing default configuration");
    ShowConfig::default().save(output)
}

fn open_recorder(path: &Path, every: u64) -> pulse_show_core::Result<Recorder<BufWriter<File>>> {
    let file = File::create(path)?;
    let mut recorder = Recorder::new(
        BufWriter::new(file),
        RecordingSettings { every, limit: None },
    );
    recorder.start()?;
    tracing::info!(?path, every, "recording frames");
    Ok(recorder)
}

/// Plays a four-on-the-floor kick over a quiet drone into the analyser
/// until `running` is cleared.
fn spawn_synth(
    engine: AudioEngine,
    sample_rate: u32,
    bpm: f32,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    const BLOCK: usize = 512;

    thread::spawn(move || {
        let rate = sample_rate.max(1) as f32;
        let beat_len = ((60.0 / bpm.clamp(20.0, 300.0)) * rate) as usize;
        let block_time = Duration::from_secs_f32(BLOCK as f32 / rate);
        let mut block = vec![0.0f32; BLOCK];
        let mut sample = 0usize;
        let mut kick_phase = 0.0f32;

        while running.load(Ordering::Relaxed) {
            for out in block.iter_mut() {
                let t = (sample % beat_len.max(1)) as f32 / rate;
                if t == 0.0 {
                    kick_phase = 0.0;
                }
                // Pitch drops from 150 Hz to 50 Hz over the first few ms.
                let freq = 50.0 + 100.0 * (-t * 30.0).exp();
                kick_phase = (kick_phase + freq / rate).fract();
                let kick = (kick_phase * TAU).sin() * (-t * 12.0).exp();
                let drone = (sample as f32 * 220.0 / rate * TAU).sin() * 0.02;
                *out = kick * 0.9 + drone;
                sample = sample.wrapping_add(1);
            }

            if let Err(err) = engine.push_samples(&block) {
                tracing::warn!(%err, "synth stopped");
                return;
            }
            thread::sleep(block_time);
        }
    })
}

/// Local wall clock shifted by a fixed amount, standing in for a remote
/// time server.
struct ShiftedLocalTime {
    offset_ms: f64,
}

impl TimeSource for ShiftedLocalTime {
    fn reference_ms(&self) -> pulse_show_core::Result<f64> {
        let local = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| pulse_show_core::ShowError::msg(err.to_string()))?;
        Ok(local.as_secs_f64() * 1000.0 + self.offset_ms)
    }
}

/// Renderer that paints nothing and logs a summary about once a second.
struct TraceRenderer {
    size: (f32, f32),
    every: u64,
    last: Option<RenderCommand>,
}

impl TraceRenderer {
    fn new(width: f32, height: f32, fps: u32) -> Self {
        Self {
            size: (width, height),
            every: u64::from(fps.max(1)),
            last: None,
        }
    }
}

impl Renderer for TraceRenderer {
    fn present(&mut self, frame: &RenderCommand) -> pulse_show_core::Result<()> {
        let switched = self
            .last
            .as_ref()
            .is_some_and(|last| last.effect != frame.effect);
        if switched {
            tracing::info!(effect = ?frame.effect, mode = %frame.mode, "effect changed");
        }

        if frame.frame % self.every == 0 {
            let layer = match &frame.layer {
                EffectLayer::Pulse { particles } => format!("{} particles", particles.len()),
                EffectLayer::Spectrum { bars } => format!("{} bars", bars.len()),
                EffectLayer::Heart(heart) => format!("heart {:.0}px", heart.size),
            };
            tracing::info!(
                frame = frame.frame,
                effect = ?frame.effect,
                live = frame.live,
                gain = format_args!("{:.2}", frame.gain),
                rhythm = ?frame.rhythm,
                brightness = format_args!("{:.2}", frame.features.brightness),
                %layer,
                "frame"
            );
        }
        tracing::trace!(frame = frame.frame, bass = frame.features.bass, mid = frame.features.mid);

        self.last = Some(frame.clone());
        Ok(())
    }

    fn surface_size(&self) -> Option<(f32, f32)> {
        Some(self.size)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive light show", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the show on the microphone, a synthesised beat or demo features.
    Run(RunArgs),
    /// Write the default configuration as JSON.
    DefaultConfig {
        /// Where to write the configuration file.
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Where the spectrum comes from.
    #[arg(long, value_enum, default_value_t = Source::Mic)]
    source: Source,
    /// Tempo of the synthesised kick drum.
    #[arg(long, default_value_t = 120.0)]
    bpm: f32,
    /// Stop after this many frames; runs until ctrl-c otherwise.
    #[arg(long)]
    frames: Option<u64>,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Effect mode: pulse, spectrum, heart or auto (also 0, 1, 2).
    #[arg(short, long)]
    effect: Option<EffectMode>,
    /// Pin the sensitivity gain instead of adapting it.
    #[arg(short, long)]
    sensitivity: Option<f32>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// File remembering the last selected effect mode.
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Seed for particle randomness.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
    /// Write every recorded frame as a JSON line to this file.
    #[arg(long)]
    record: Option<PathBuf>,
    /// Record one frame out of this many.
    #[arg(long, default_value_t = 1)]
    record_every: u64,
    /// Shift the synced clock, as if a time server reported this offset.
    #[arg(long, allow_hyphen_values = true)]
    time_offset_ms: Option<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Source {
    /// Default input device; falls back to the demo show without one.
    Mic,
    /// No analyser; the show runs on generated features.
    Demo,
    /// A synthesised kick drum fed through the analyser.
    Synth,
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn frame() -> RenderCommand {
        let mut show = Show::new(ShowConfig::default(), StateStore::in_memory(), 1);
        show.tick(SpectrumInput::Unavailable, Default::default())
    }

    #[test]
    fn failing_recorder_is_closed() {
        let mut recorder = Some(Recorder::new(BrokenPipe, RecordingSettings::default()));
        if let Some(recorder) = recorder.as_mut() {
            recorder.start().unwrap();
        }
        record_frame(&mut recorder, &frame());
        assert!(recorder.is_none());
    }

    #[test]
    fn working_recorder_is_kept() {
        let mut recorder = Some(Recorder::new(Vec::new(), RecordingSettings::default()));
        if let Some(recorder) = recorder.as_mut() {
            recorder.start().unwrap();
        }
        record_frame(&mut recorder, &frame());
        assert_eq!(recorder.map(|r| r.written()), Some(1));
    }

    #[test]
    fn loop_stops_on_ctrl_c_or_frame_limit() {
        let running = AtomicBool::new(true);
        assert!(should_continue(&running, None, 1_000_000));
        assert!(should_continue(&running, Some(10), 9));
        assert!(!should_continue(&running, Some(10), 10));

        running.store(false, Ordering::SeqCst);
        assert!(!should_continue(&running, None, 0));
    }

    #[test]
    fn microphone_is_the_default_source() {
        let cli = Cli::parse_from(["pulse-show", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(matches!(args.source, Source::Mic));
    }
}
