//! Audio decoder using symphonia
//!
//! Decodes a live network stream or a seekable downloaded body to
//! interleaved stereo f32 PCM. Mono sources are duplicated to both channels; sources
//! with more than two channels keep the first two.

use crate::error::{Error, Result};
use std::io::Read;
use std::sync::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Output channel count of every decoder
pub const OUTPUT_CHANNELS: usize = 2;

/// Sample rate assumed when the container does not declare one
const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Adapts a plain `Read` (an HTTP body) to symphonia's `Send + Sync` bound
struct SyncReader<R>(Mutex<R>);

impl<R: Read + Send> Read for SyncReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .read(buf)
    }
}

/// Incremental decoder over one media source
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    n_frames: Option<u64>,
    time_base: Option<TimeBase>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl StreamDecoder {
    /// Decoder over a live, forward-only reader
    pub fn from_reader<R: Read + Send + 'static>(reader: R, mime_type: Option<&str>) -> Result<Self> {
        let source = ReadOnlySource::new(SyncReader(Mutex::new(reader)));
        Self::from_source(Box::new(source), mime_type)
    }

    /// Decoder over any media source; seekable sources support `seek`
    pub fn from_source(source: Box<dyn MediaSource>, mime_type: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(mime) = mime_type {
            hint.mime_type(mime);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe stream: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track in stream".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE);
        let n_frames = track.codec_params.n_frames;
        let time_base = track.codec_params.time_base;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Opened stream: codec={:?}, sample_rate={}, frames={:?}",
            track.codec_params.codec, sample_rate, n_frames
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            n_frames,
            time_base,
            sample_buf: None,
        })
    }

    /// Source sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Declared length, when the container carries one
    pub fn duration_ms(&self) -> Option<u64> {
        self.n_frames
            .map(|frames| frames * 1000 / u64::from(self.sample_rate.max(1)))
    }

    /// Jump to `position_ms`; returns the position actually reached
    ///
    /// Coarse: lands on the packet boundary at or before the target.
    pub fn seek(&mut self, position_ms: u64) -> Result<u64> {
        let time = Time::new(position_ms / 1000, (position_ms % 1000) as f64 / 1000.0);
        let seeked = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("Failed to seek to {} ms: {}", position_ms, e)))?;
        self.decoder.reset();

        let reached = match self.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(seeked.actual_ts);
                time.seconds * 1000 + (time.frac * 1000.0).round() as u64
            }
            None => seeked.actual_ts * 1000 / u64::from(self.sample_rate.max(1)),
        };
        debug!("Seeked to {} ms (asked for {} ms)", reached, position_ms);
        Ok(reached)
    }

    /// Decode the next packet; `None` at end of stream
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let channels = spec.channels.count();
                    let needed = decoded.capacity() * channels;

                    let too_small = self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < needed);
                    if too_small {
                        self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }

                    let Some(buf) = self.sample_buf.as_mut() else {
                        continue;
                    };
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(to_stereo(buf.samples(), channels)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(Error::Decode(format!("Decoder failed: {}", e))),
            }
        }
    }

}

/// Map interleaved samples with `channels` channels to interleaved stereo
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|s| [*s, *s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode_all(decoder: &mut StreamDecoder) -> Vec<f32> {
        let mut samples = Vec::new();
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            samples.extend_from_slice(&chunk);
        }
        samples
    }

    fn from_bytes(bytes: Vec<u8>) -> StreamDecoder {
        StreamDecoder::from_source(Box::new(Cursor::new(bytes)), Some("audio/wav")).unwrap()
    }

    /// 16-bit PCM WAV body with `frames` frames of a constant value
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let data_len = frames * u32::from(channels) * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * u32::from(channels) * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for _ in 0..frames * u32::from(channels) {
            out.extend_from_slice(&8192i16.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_to_stereo() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(to_stereo(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3), vec![0.1, 0.2, 0.4, 0.5]);
        assert!(to_stereo(&[], 0).is_empty());
    }

    #[test]
    fn test_decode_wav_from_bytes() {
        let mut decoder = from_bytes(wav_bytes(8000, 2, 4000));
        assert_eq!(decoder.sample_rate(), 8000);
        assert_eq!(decoder.duration_ms(), Some(500));

        let samples = decode_all(&mut decoder);
        assert_eq!(samples.len(), 4000 * OUTPUT_CHANNELS);
        assert!((samples[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_mono_reader_is_upmixed() {
        let body = Cursor::new(wav_bytes(8000, 1, 800));
        let mut decoder = StreamDecoder::from_reader(body, None).unwrap();
        let samples = decode_all(&mut decoder);
        assert_eq!(samples.len(), 800 * OUTPUT_CHANNELS);
    }

    #[test]
    fn test_seek_lands_at_or_before_target() {
        let mut decoder = from_bytes(wav_bytes(8000, 2, 8000));
        let reached = decoder.seek(600).unwrap();
        assert!(reached <= 600 && reached >= 400, "reached {} ms", reached);

        let remaining = decode_all(&mut decoder).len() / OUTPUT_CHANNELS;
        let expected = 8000 - (reached as usize * 8);
        assert!(remaining.abs_diff(expected) < 8, "{} frames left, expected {}", remaining, expected);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(StreamDecoder::from_source(Box::new(Cursor::new(vec![0u8; 64])), None).is_err());
    }
}
