use std::{
    f32::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard, TryLockError},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AnalyserConfig, Result, ShowError};

/// What the frame loop got from the audio side this frame.
#[derive(Debug)]
pub enum SpectrumInput<'a> {
    /// Latest byte spectrum, possibly the same as last frame's.
    Live(&'a [u8]),
    /// No analyser is attached; the show runs on demo features.
    Unavailable,
    /// The analyser could not be read this frame.
    Fault(ShowError),
}

/// Byte frequency analyser: windowed FFT, temporal smoothing and a decibel
/// window mapped onto 0..=255 per bin.
pub struct FrequencyAnalyser {
    config: AnalyserConfig,
    samples: Vec<f32>,
    window: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    analysed: bool,
}

impl FrequencyAnalyser {
    pub fn new(config: AnalyserConfig) -> Result<Self> {
        let size = config.fft_size;
        if size < 2 || !size.is_power_of_two() {
            return Err(ShowError::InvalidInput("fft size must be a power of two"));
        }
        if config.max_db <= config.min_db {
            return Err(ShowError::InvalidInput("decibel window is empty"));
        }

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let bins = size / 2;
        Ok(Self {
            samples: vec![0.0; size],
            window: blackman_window(size),
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
            analysed: false,
            plan,
            config,
        })
    }

    /// Number of frequency bins in every snapshot.
    pub fn bin_count(&self) -> usize {
        self.bytes.len()
    }

    /// Latest snapshot, `None` until the first block has been analysed.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.analysed.then_some(self.bytes.as_slice())
    }

    /// Appends mono samples and refreshes the snapshot from the most recent
    /// `fft_size` of them.
    pub fn process_block(&mut self, block: &[f32]) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }

        let size = self.config.fft_size;
        self.samples.extend_from_slice(block);
        if self.samples.len() > size {
            let overflow = self.samples.len() - size;
            self.samples.drain(0..overflow);
        }

        for ((slot, sample), weight) in self.input.iter_mut().zip(&self.samples).zip(&self.window) {
            *slot = sample * weight;
        }
        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let tau = self.config.smoothing;
        let db_span = self.config.max_db - self.config.min_db;
        let norm = 1.0 / size as f32;
        for (index, bin) in self.spectrum.iter().take(self.smoothed.len()).enumerate() {
            let magnitude = bin.norm() * norm;
            let smoothed = tau * self.smoothed[index] + (1.0 - tau) * magnitude;
            self.smoothed[index] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - self.config.min_db) / db_span;
            self.bytes[index] = scaled.clamp(0.0, 255.0) as u8;
        }
        self.analysed = true;
        Ok(())
    }

    /// Clears samples and smoothing state.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.bytes.iter_mut().for_each(|b| *b = 0);
        self.analysed = false;
    }
}

impl fmt::Debug for FrequencyAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyAnalyser")
            .field("config", &self.config)
            .field("bins", &self.bytes.len())
            .field("analysed", &self.analysed)
            .finish()
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..len)
        .map(|i| {
            let x = i as f32 / len as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Audio side of the show. The capture thread pushes samples; the frame loop
/// reads snapshots through an [`AnalyserHandle`].
#[derive(Debug, Clone)]
pub struct AudioEngine {
    analyser: Arc<Mutex<FrequencyAnalyser>>,
}

impl AudioEngine {
    pub fn new(config: AnalyserConfig) -> Result<Self> {
        let analyser = FrequencyAnalyser::new(config)?;
        Ok(Self {
            analyser: Arc::new(Mutex::new(analyser)),
        })
    }

    /// Resets the analyser and returns a handle for the frame loop.
    pub fn start(&self) -> Result<AnalyserHandle> {
        self.lock_analyser()?.reset();
        Ok(AnalyserHandle::new(self.analyser.clone()))
    }

    /// Feeds a block of mono samples.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut analyser = self.lock_analyser()?;
        analyser.process_block(samples)
    }

    fn lock_analyser(&self) -> Result<MutexGuard<'_, FrequencyAnalyser>> {
        self.analyser
            .lock()
            .map_err(|_| ShowError::msg("frequency analyser has been poisoned"))
    }
}

/// Frame-loop side of the analyser. Reads never block: when the capture
/// thread holds the lock the previous snapshot is reused.
pub struct AnalyserHandle {
    shared: Arc<Mutex<FrequencyAnalyser>>,
    latest: Vec<u8>,
    has_data: bool,
}

impl AnalyserHandle {
    pub(crate) fn new(shared: Arc<Mutex<FrequencyAnalyser>>) -> Self {
        Self {
            shared,
            latest: Vec::new(),
            has_data: false,
        }
    }

    /// Returns the freshest snapshot available without waiting.
    pub fn read(&mut self) -> SpectrumInput<'_> {
        match self.shared.try_lock() {
            Ok(analyser) => {
                if let Some(bytes) = analyser.bytes() {
                    self.latest.clear();
                    self.latest.extend_from_slice(bytes);
                    self.has_data = true;
                }
            }
            Err(TryLockError::WouldBlock) => {}
            Err(TryLockError::Poisoned(_)) => {
                return SpectrumInput::Fault(ShowError::msg("frequency analyser has been poisoned"));
            }
        }

        if self.has_data {
            SpectrumInput::Live(&self.latest)
        } else {
            // Nothing analysed yet: an all-zero spectrum of the right size.
            SpectrumInput::Live(self.silence())
        }
    }

    fn silence(&mut self) -> &[u8] {
        if self.latest.is_empty() {
            if let Ok(analyser) = self.shared.try_lock() {
                self.latest = vec![0; analyser.bin_count()];
            }
        }
        &self.latest
    }
}

impl fmt::Debug for AnalyserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserHandle")
            .field("has_data", &self.has_data)
            .finish()
    }
}
