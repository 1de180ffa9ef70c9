use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample,
};
use pulse_show_core::{config::AnalyserConfig, AnalyserHandle, AudioEngine, Result, ShowError};

/// Live capture from the default input device. Dropping it stops the
/// stream and releases the device.
pub struct Microphone {
    _stream: cpal::Stream,
}

/// Opens the default input device and feeds it, downmixed to mono, into a
/// fresh analyser running at the device's sample rate.
pub fn open(config: &AnalyserConfig) -> Result<(Microphone, AnalyserHandle)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ShowError::msg("no default input device available"))?;
    let supported = device.default_input_config().map_err(device_error)?;
    tracing::info!(
        device = %device.name().unwrap_or_default(),
        sample_rate = supported.sample_rate().0,
        channels = supported.channels(),
        format = ?supported.sample_format(),
        "opening microphone"
    );

    let mut analyser = config.clone();
    analyser.sample_rate = supported.sample_rate().0;
    let engine = AudioEngine::new(analyser)?;
    let handle = engine.start()?;

    let stream_config: cpal::StreamConfig = supported.config();
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, engine)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, engine)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, engine)?,
        other => {
            return Err(ShowError::msg(format!(
                "unsupported input sample format {other:?}"
            )))
        }
    };
    stream.play().map_err(device_error)?;

    Ok((Microphone { _stream: stream }, handle))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: AudioEngine,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                downmix(data, channels, &mut mono);
                if let Err(err) = engine.push_samples(&mono) {
                    tracing::warn!(%err, "dropping microphone block");
                }
            },
            |err| tracing::warn!(%err, "microphone stream error"),
            None,
        )
        .map_err(device_error)
}

/// Averages interleaved frames of `channels` samples into `out`.
fn downmix<T>(data: &[T], channels: usize, out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    out.clear();
    out.extend(data.chunks_exact(channels).map(|frame| {
        frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / channels as f32
    }));
}

fn device_error(err: impl std::fmt::Display) -> ShowError {
    ShowError::msg(format!("audio device: {err}"))
}
