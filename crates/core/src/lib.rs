//! Core library for the Pulse Show visualiser.
//!
//! Audio snapshots go in and paint-ready frames come out. Each module owns
//! one stage of that pipeline (audio analysis, feature extraction, beat and
//! rhythm tracking, effect selection, particles and recording), and
//! [`Show`] wires them together behind a single per-frame `tick`.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod particles;
pub mod record;
pub mod render;
pub mod show;
pub mod store;
pub mod timeline;

pub use analysis::{BeatEvent, FrameFeatures, RhythmMode};
pub use audio::{AnalyserHandle, AudioEngine, SpectrumInput};
pub use config::ShowConfig;
pub use effects::{CycleStrategy, Effect, EffectLayer, EffectMode};
pub use error::{Result, ShowError};
pub use particles::{Particle, ParticleKind};
pub use record::{Recorder, RecordingSettings};
pub use render::{RenderCommand, Renderer};
pub use show::Show;
pub use store::StateStore;
pub use timeline::{FrameScheduler, FrameTime, ShowClock, TimeSource};
