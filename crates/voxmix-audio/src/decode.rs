//! Decoding through symphonia into the engine format.
//!
//! Packets are converted to interleaved f32, mapped to the engine's channel
//! count, resampled to the engine rate and finally clipped to 16-bit.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::chunk::Chunk;
use crate::decoder::Decoder;
use crate::resample::{f32_to_i16, remap_channels, Resampler};
use bytes::Bytes;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::{self, CodecType, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::{MetadataOptions, MetadataRevision, StandardTagKey},
    probe::Hint,
    units::Time,
};
use tracing::{debug, warn};
use voxmix_core::{Error, LoopPoints, MixerConfig, MusicTags, MusicType, Result};

/// Decoder for any container and codec symphonia can probe.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn codecs::Decoder>,
    track_id: u32,
    source_rate: u32,
    source_channels: usize,
    channels: usize,
    frequency: u32,
    resampler: Resampler,
    /// Last decoded packet as interleaved f32, reused between packets.
    sample_buf: Option<SampleBuffer<f32>>,
    /// Converted samples not yet handed out.
    pending: Vec<i16>,
    pending_pos: usize,
    /// Source frames to drop after a seek landed before the requested time.
    skip: u64,
    /// Position of the last seek in seconds.
    base: f64,
    /// Engine frames handed out since the last seek.
    emitted: u64,
    duration: Option<f64>,
    tags: MusicTags,
    loop_points: Option<LoopPoints>,
    music_type: MusicType,
    ended: bool,
}

impl SymphoniaDecoder {
    /// Probe `data`, using `extension` only as a hint; the content decides.
    pub fn from_bytes(data: Bytes, extension: Option<&str>, config: &MixerConfig) -> Result<Self> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(data)),
            MediaSourceStreamOptions::default(),
        );

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::Decoder(format!("Failed to probe format: {e}")))?;

        let mut tags = MusicTags::default();
        let mut loop_tags = LoopTags::default();
        if let Some(mut metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.skip_to_latest() {
                read_tags(revision, &mut tags, &mut loop_tags);
            }
        }

        let mut format = probed.format;
        if let Some(revision) = format.metadata().skip_to_latest() {
            read_tags(revision, &mut tags, &mut loop_tags);
        }

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decoder("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let params = &track.codec_params;
        let source_rate = params.sample_rate.unwrap_or(48000);
        let source_channels = params.channels.map_or(2, |c| c.count());
        let duration = params
            .time_base
            .zip(params.n_frames)
            .map(|(time_base, frames)| seconds(time_base.calc_time(frames)));

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::Decoder(format!("Failed to create decoder: {e}")))?;

        let music_type = extension
            .map(MusicType::from_extension)
            .filter(|t| *t != MusicType::None)
            .unwrap_or_else(|| type_for_codec(params.codec));

        let channels = usize::from(config.channels);
        let resampler = Resampler::new(source_rate, config.frequency, channels)?;

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}, type={:?}",
            track_id, source_rate, source_channels, music_type
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            source_rate,
            source_channels,
            channels,
            frequency: config.frequency,
            resampler,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            skip: 0,
            base: 0.0,
            emitted: 0,
            duration,
            tags,
            loop_points: loop_tags.resolve(source_rate),
            music_type,
            ended: false,
        })
    }

    /// Read a whole file and probe it.
    pub fn open(path: impl AsRef<Path>, config: &MixerConfig) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        debug!("Opening {} ({} bytes)", path.display(), data.len());
        Self::from_bytes(Bytes::from(data), extension, config)
    }

    pub const fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub const fn source_channels(&self) -> usize {
        self.source_channels
    }

    /// Decode the next packet of the selected track into `sample_buf`.
    /// `false` at end of stream.
    fn next_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => {
                    return Err(Error::Decoder(format!("Failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    copy_interleaved(&mut self.sample_buf, decoded);
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping packet): {e}");
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Stream parameters changed, resetting decoder");
                    self.decoder.reset();
                }
                Err(e) => return Err(Error::Decoder(format!("Decode failed: {e}"))),
            }
        }
    }

    /// Convert one more packet (or the resampler tail) into `pending`.
    fn refill(&mut self) -> Result<()> {
        let converted = if self.next_packet()? {
            let samples = self.sample_buf.as_ref().map_or(&[][..], SampleBuffer::samples);
            let mut start = 0;
            if self.skip > 0 && self.source_channels > 0 {
                let frames = (samples.len() / self.source_channels) as u64;
                let dropped = self.skip.min(frames);
                start = dropped as usize * self.source_channels;
                self.skip -= dropped;
            }
            let mapped = remap_channels(&samples[start..], self.source_channels, self.channels);
            self.resampler.process(&mapped)?
        } else {
            self.ended = true;
            self.resampler.flush()?
        };
        self.pending.clear();
        self.pending.extend(converted.into_iter().map(f32_to_i16));
        self.pending_pos = 0;
        Ok(())
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&mut self, buf: &mut [i16]) -> Result<usize> {
        let wanted = buf.len() - buf.len() % self.channels;
        let mut written = 0;
        while written < wanted {
            if self.pending_pos == self.pending.len() {
                if self.ended {
                    break;
                }
                self.refill()?;
                continue;
            }
            let n = (self.pending.len() - self.pending_pos).min(wanted - written);
            buf[written..written + n]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            written += n;
        }
        let frames = written / self.channels;
        self.emitted += frames as u64;
        Ok(frames)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidArgument(format!("seek to {seconds}s")));
        }

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decoder(format!("Seek failed: {e}")))?;

        self.decoder.reset();
        self.resampler.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.skip = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.base = seconds;
        self.emitted = 0;
        self.ended = false;
        Ok(())
    }

    fn position(&self) -> Option<f64> {
        Some(self.base + self.emitted as f64 / f64::from(self.frequency))
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn loop_points(&self) -> Option<LoopPoints> {
        self.loop_points
    }

    fn tags(&self) -> MusicTags {
        self.tags.clone()
    }

    fn music_type(&self) -> MusicType {
        self.music_type
    }
}

/// Decode a whole file into a chunk in the engine format.
pub fn load_chunk(path: impl AsRef<Path>, config: &MixerConfig) -> Result<Arc<Chunk>> {
    let decoder = SymphoniaDecoder::open(path, config)?;
    decode_all(decoder)
}

/// Decode an in-memory file into a chunk in the engine format.
pub fn load_chunk_from_bytes(
    data: Bytes,
    extension: Option<&str>,
    config: &MixerConfig,
) -> Result<Arc<Chunk>> {
    let decoder = SymphoniaDecoder::from_bytes(data, extension, config)?;
    decode_all(decoder)
}

fn decode_all(mut decoder: SymphoniaDecoder) -> Result<Arc<Chunk>> {
    let mut samples = Vec::new();
    let mut block = vec![0i16; 4096 * decoder.channels];
    loop {
        let frames = decoder.decode(&mut block)?;
        if frames == 0 {
            break;
        }
        samples.extend_from_slice(&block[..frames * decoder.channels]);
    }
    debug!("Decoded chunk: {} samples", samples.len());
    Ok(Chunk::from_samples(samples))
}

/// Loop markers found in comments, in source frames.
#[derive(Debug, Default)]
struct LoopTags {
    start: Option<u64>,
    end: Option<u64>,
    length: Option<u64>,
}

impl LoopTags {
    fn resolve(&self, rate: u32) -> Option<LoopPoints> {
        let start = self.start?;
        let end = self.end.or_else(|| self.length.map(|len| start + len))?;
        let rate = f64::from(rate);
        LoopPoints::new(start as f64 / rate, end as f64 / rate)
    }
}

fn read_tags(revision: &MetadataRevision, tags: &mut MusicTags, loops: &mut LoopTags) {
    for tag in revision.tags() {
        let value = tag.value.to_string();
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => tags.title = Some(value),
            Some(StandardTagKey::Artist) => tags.artist = Some(value),
            Some(StandardTagKey::Album) => tags.album = Some(value),
            Some(StandardTagKey::Copyright) => tags.copyright = Some(value),
            _ => match tag.key.to_ascii_uppercase().as_str() {
                "LOOPSTART" => loops.start = value.trim().parse().ok(),
                "LOOPEND" => loops.end = value.trim().parse().ok(),
                "LOOPLENGTH" => loops.length = value.trim().parse().ok(),
                _ => {}
            },
        }
    }
}

fn seconds(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}

fn type_for_codec(codec: CodecType) -> MusicType {
    if codec == codecs::CODEC_TYPE_FLAC {
        MusicType::Flac
    } else if codec == codecs::CODEC_TYPE_VORBIS {
        MusicType::Ogg
    } else if codec == codecs::CODEC_TYPE_MP3 {
        MusicType::Mp3
    } else if codec == codecs::CODEC_TYPE_OPUS {
        MusicType::Opus
    } else if [
        codecs::CODEC_TYPE_PCM_U8,
        codecs::CODEC_TYPE_PCM_S16LE,
        codecs::CODEC_TYPE_PCM_S24LE,
        codecs::CODEC_TYPE_PCM_S32LE,
        codecs::CODEC_TYPE_PCM_F32LE,
    ]
    .contains(&codec)
    {
        MusicType::Wav
    } else {
        MusicType::None
    }
}

/// Copy a decoded buffer of any sample format into `scratch` as interleaved
/// f32, growing it when a packet outgrows it.
fn copy_interleaved<'a>(
    scratch: &'a mut Option<SampleBuffer<f32>>,
    decoded: AudioBufferRef<'_>,
) -> &'a [f32] {
    let spec = *decoded.spec();
    let needed = decoded.capacity() * spec.channels.count();
    if scratch.as_ref().is_some_and(|buf| buf.capacity() < needed) {
        *scratch = None;
    }
    let buf = scratch.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
    buf.copy_interleaved_ref(decoded);
    buf.samples()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use symphonia::core::audio::{AudioBuffer, Channels, Signal, SignalSpec};

    /// 16-bit PCM WAV file in memory.
    fn wav(samples: &[i16], channels: u16, rate: u32) -> Bytes {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + samples.len() * 2);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        Bytes::from(out)
    }

    fn config(frequency: u32) -> MixerConfig {
        MixerConfig {
            frequency,
            channels: 2,
            ..MixerConfig::default()
        }
    }

    fn decode_to_end(decoder: &mut SymphoniaDecoder) -> Vec<i16> {
        let mut all = Vec::new();
        let mut block = vec![0i16; 512];
        loop {
            let frames = decoder.decode(&mut block).unwrap();
            if frames == 0 {
                return all;
            }
            all.extend_from_slice(&block[..frames * 2]);
        }
    }

    #[test]
    fn test_wav_mono_to_stereo() {
        let data = wav(&[8192; 441], 1, 44100);
        let mut decoder = SymphoniaDecoder::from_bytes(data, None, &config(44100)).unwrap();
        assert_eq!(decoder.source_channels(), 1);
        assert_eq!(decoder.music_type(), MusicType::Wav);

        let samples = decode_to_end(&mut decoder);
        assert_eq!(samples.len(), 882);
        assert!(samples.iter().all(|&s| (i32::from(s) - 8192).abs() <= 1));
        assert!((decoder.duration().unwrap() - 0.01).abs() < 1e-9);
        assert!((decoder.position().unwrap() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_wav_resampled_length() {
        let data = wav(&[0; 4410], 1, 22050);
        let mut decoder = SymphoniaDecoder::from_bytes(data, Some("wav"), &config(44100)).unwrap();
        let frames = decode_to_end(&mut decoder).len() / 2;
        assert!((8700..=8900).contains(&frames), "got {frames} frames");
    }

    #[test]
    fn test_seek_updates_position() {
        let data = wav(&[100; 4410], 1, 44100);
        let mut decoder = SymphoniaDecoder::from_bytes(data, None, &config(44100)).unwrap();
        decoder.seek(0.05).unwrap();
        assert!((decoder.position().unwrap() - 0.05).abs() < 1e-9);

        let frames = decode_to_end(&mut decoder).len() / 2;
        assert!(frames > 0 && frames <= 2205, "got {frames} frames");
        assert!(decoder.seek(-1.0).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = SymphoniaDecoder::from_bytes(
            Bytes::from_static(b"definitely not audio"),
            None,
            &config(44100),
        );
        assert!(matches!(result, Err(Error::Decoder(_))));
    }

    #[test]
    fn test_load_chunk_from_bytes() {
        let data = wav(&[1000, -1000, 1000, -1000], 2, 44100);
        let chunk = load_chunk_from_bytes(data, Some("wav"), &config(44100)).unwrap();
        assert_eq!(chunk.samples().len(), 4);
        assert!(chunk.is_allocated());
    }

    fn stereo_spec() -> SignalSpec {
        SignalSpec::new(44100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT)
    }

    #[test]
    fn test_unsigned_16_bit_converts() {
        let mut buf = AudioBuffer::<u16>::new(4, stereo_spec());
        buf.render_reserved(Some(2));
        buf.chan_mut(0).copy_from_slice(&[32768, u16::MAX]);
        buf.chan_mut(1).copy_from_slice(&[0, 32768]);

        let mut scratch = None;
        let samples = copy_interleaved(&mut scratch, AudioBufferRef::U16(Cow::Borrowed(&buf)));
        assert_eq!(samples.len(), 4);
        assert!(samples[0].abs() < 1e-4);
        assert!((samples[1] + 1.0).abs() < 1e-4);
        assert!((samples[2] - 1.0).abs() < 1e-3);
        assert!(samples[3].abs() < 1e-4);
    }

    #[test]
    fn test_signed_8_bit_converts() {
        let mut buf = AudioBuffer::<i8>::new(4, stereo_spec());
        buf.render_reserved(Some(3));
        buf.chan_mut(0).copy_from_slice(&[-128, 0, 64]);
        buf.chan_mut(1).copy_from_slice(&[0, -64, 0]);

        let mut scratch = None;
        let samples = copy_interleaved(&mut scratch, AudioBufferRef::S8(Cow::Borrowed(&buf)));
        assert_eq!(samples.len(), 6);
        assert!((samples[0] + 1.0).abs() < 1e-6);
        assert!((samples[3] + 0.5).abs() < 1e-6);
        assert!((samples[4] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_scratch_grows_for_larger_packets() {
        let mut scratch = None;
        let small = AudioBuffer::<i16>::new(2, stereo_spec());
        let mut large = AudioBuffer::<i16>::new(64, stereo_spec());
        large.render_reserved(Some(64));

        copy_interleaved(&mut scratch, AudioBufferRef::S16(Cow::Borrowed(&small)));
        let samples = copy_interleaved(&mut scratch, AudioBufferRef::S16(Cow::Borrowed(&large)));
        assert_eq!(samples.len(), 128);
    }

    #[test]
    fn test_loop_tags_resolve() {
        let tags = LoopTags {
            start: Some(44100),
            end: None,
            length: Some(88200),
        };
        let points = tags.resolve(44100).unwrap();
        assert!((points.start - 1.0).abs() < f64::EPSILON);
        assert!((points.end - 3.0).abs() < f64::EPSILON);
        assert!(LoopTags::default().resolve(44100).is_none());
    }
}
