use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{
    render::{RenderCommand, Renderer},
    Result,
};

/// Options for frame recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Keep one frame out of every `every` frames.
    pub every: u64,
    /// Stop after this many recorded frames.
    pub limit: Option<u64>,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            every: 1,
            limit: None,
        }
    }
}

/// Renderer that writes frames as JSON lines, for offline inspection and
/// for driving an external painter.
#[derive(Debug)]
pub struct Recorder<W: Write> {
    settings: RecordingSettings,
    out: W,
    is_recording: bool,
    written: u64,
}

impl<W: Write> Recorder<W> {
    pub fn new(out: W, settings: RecordingSettings) -> Self {
        Self {
            settings,
            out,
            is_recording: false,
            written: 0,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.is_recording = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.is_recording = false;
        self.out.flush()?;
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for Recorder<W> {
    fn present(&mut self, frame: &RenderCommand) -> Result<()> {
        if !self.is_recording || frame.frame % self.settings.every.max(1) != 0 {
            return Ok(());
        }
        serde_json::to_writer(&mut self.out, frame)?;
        self.out.write_all(b"\n")?;
        self.written += 1;

        if self.settings.limit.is_some_and(|limit| self.written >= limit) {
            tracing::info!(frames = self.written, "recording limit reached");
            self.stop()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{FrameFeatures, RhythmMode},
        effects::{Effect, EffectLayer, EffectMode},
        render::CentreText,
    };

    fn frame(index: u64) -> RenderCommand {
        RenderCommand {
            frame: index,
            time_ms: index as f64 * 16.0,
            features: FrameFeatures::default(),
            gain: 1.5,
            rhythm: RhythmMode::Smooth,
            mode: EffectMode::Auto,
            effect: Effect::Pulse,
            live: false,
            backdrop_alpha: 0.35,
            centre_text: CentreText {
                opacity: 0.5,
                scale: 1.0,
            },
            layer: EffectLayer::Pulse {
                particles: Vec::new(),
            },
        }
    }

    #[test]
    fn writes_every_nth_frame_as_json_lines() {
        let mut recorder = Recorder::new(
            Vec::new(),
            RecordingSettings {
                every: 2,
                limit: None,
            },
        );
        recorder.start().unwrap();
        for index in 0..6 {
            recorder.present(&frame(index)).unwrap();
        }
        recorder.stop().unwrap();

        let out = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: RenderCommand = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, frame(2));
    }

    #[test]
    fn stops_at_the_limit() {
        let mut recorder = Recorder::new(
            Vec::new(),
            RecordingSettings {
                every: 1,
                limit: Some(2),
            },
        );
        recorder.start().unwrap();
        for index in 0..5 {
            recorder.present(&frame(index)).unwrap();
        }
        assert!(!recorder.is_recording());
        assert_eq!(recorder.written(), 2);
    }

    #[test]
    fn idle_recorder_writes_nothing() {
        let mut recorder = Recorder::new(Vec::new(), RecordingSettings::default());
        recorder.present(&frame(0)).unwrap();
        assert!(recorder.into_inner().is_empty());
    }
}
