//! Device sink using cpal.
//!
//! The device callback pulls whole mixing cycles from the mixer and converts
//! them to the device sample type. Device buffers need not line up with
//! cycles; the unread tail of a cycle is kept for the next callback.

use crate::engine::Mixer;
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange,
};
use tracing::{debug, error, info};
use voxmix_core::{Error, MixerConfig, Result, SampleFormat as MixFormat};

/// An open output stream fed by a mixer.
pub struct AudioOutput {
    stream: Stream,
    device_name: String,
    sample_format: SampleFormat,
}

impl AudioOutput {
    /// Feed `mixer` to the default output device.
    pub fn open(mixer: &Mixer) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        Self::with_device(&device, mixer)
    }

    /// Feed `mixer` to a specific device, which must support the mixer's
    /// rate and channel count.
    pub fn with_device(device: &Device, mixer: &Mixer) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let spec = mixer.query_spec();

        let supported = pick_config(device, &spec)?;
        let sample_format = supported.sample_format();
        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: SampleRate(spec.frequency),
            buffer_size: cpal::BufferSize::Default,
        };

        debug!(
            "Output config: {} Hz, {} channels, {:?}",
            spec.frequency, spec.channels, sample_format
        );

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(device, &config, mixer.clone())?,
            SampleFormat::I16 => Self::build_stream::<i16>(device, &config, mixer.clone())?,
            SampleFormat::U16 => Self::build_stream::<u16>(device, &config, mixer.clone())?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        info!("Using audio output device: {device_name}");

        Ok(Self {
            stream,
            device_name,
            sample_format,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<i16>>(
        device: &Device,
        config: &StreamConfig,
        mixer: Mixer,
    ) -> Result<Stream> {
        let mut cycle = vec![0i16; mixer.query_spec().buffer_samples()];
        // Samples of `cycle` already handed to the device.
        let mut consumed = cycle.len();

        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut filled = 0;
                    while filled < data.len() {
                        if consumed == cycle.len() {
                            mixer.render(&mut cycle);
                            consumed = 0;
                        }
                        let n = (cycle.len() - consumed).min(data.len() - filled);
                        for (dst, &src) in data[filled..filled + n]
                            .iter_mut()
                            .zip(&cycle[consumed..consumed + n])
                        {
                            *dst = T::from_sample(src);
                        }
                        consumed += n;
                        filled += n;
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Sample type the device is fed.
    pub const fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /// Stop pulling from the mixer. Voices keep their positions.
    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {e}")))
    }

    pub fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to resume stream: {e}")))
    }
}

/// Choose a device configuration matching the mixer's rate and channel
/// count, preferring the sample type the mixer asks for.
fn pick_config(device: &Device, spec: &MixerConfig) -> Result<SupportedStreamConfigRange> {
    let rate = SampleRate(spec.frequency);
    let preferred = match spec.format {
        MixFormat::S16 => SampleFormat::I16,
        MixFormat::F32 => SampleFormat::F32,
    };

    let candidates: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to query output configs: {e}")))?
        .filter(|c| {
            c.channels() == spec.channels
                && c.min_sample_rate() <= rate
                && rate <= c.max_sample_rate()
                && matches!(
                    c.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                )
        })
        .collect();

    candidates
        .iter()
        .find(|c| c.sample_format() == preferred)
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| {
            Error::AudioOutput(format!(
                "Device does not support {} Hz with {} channels",
                spec.frequency, spec.channels
            ))
        })
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

/// Get the default output device name.
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // May fail without audio hardware; must not panic.
        let _ = list_output_devices();
        let _ = default_device_name();
    }
}
