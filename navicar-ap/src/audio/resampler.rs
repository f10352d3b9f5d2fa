//! Sample rate conversion using rubato
//!
//! Decoded audio arrives at the source rate and is converted to the output
//! device rate in fixed input chunks, so both live and downloaded streams
//! are converted as they are decoded.

use crate::audio::decoder::OUTPUT_CHANNELS;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use tracing::debug;

/// Input frames per rubato call
const CHUNK_FRAMES: usize = 1024;

/// Chunked converter for interleaved stereo samples
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    ratio: f64,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    /// Leading output frames that are resampler delay, not audio
    skip_frames: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    /// Pass-through when the rates match
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let ratio = f64::from(output_rate) / f64::from(input_rate.max(1));
        let inner = if input_rate == output_rate {
            None
        } else {
            Some(
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, CHUNK_FRAMES, OUTPUT_CHANNELS)
                    .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?,
            )
        };
        let skip_frames = inner.as_ref().map_or(0, |r| r.output_delay());
        if inner.is_some() {
            debug!("Resampling from {} Hz to {} Hz", input_rate, output_rate);
        }

        Ok(Self {
            inner,
            ratio,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES); OUTPUT_CHANNELS],
            skip_frames,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Feed interleaved samples; returns whatever output is complete
    pub fn push(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        for frame in interleaved.chunks_exact(OUTPUT_CHANNELS) {
            for (channel, sample) in self.pending.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        self.frames_in += (interleaved.len() / OUTPUT_CHANNELS) as u64;

        let mut output = Vec::new();
        loop {
            let needed = inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();
            let planar = inner
                .process(&chunk, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            interleave_into(&planar, &mut self.skip_frames, &mut output);
        }

        self.frames_out += (output.len() / OUTPUT_CHANNELS) as u64;
        Ok(output)
    }

    /// Drain buffered input and the resampler's delay line
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let mut output = Vec::new();
        if !self.pending[0].is_empty() {
            let planar = inner
                .process_partial(Some(self.pending.as_slice()), None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            interleave_into(&planar, &mut self.skip_frames, &mut output);
            self.pending.iter_mut().for_each(Vec::clear);
        }
        let tail = inner
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
        interleave_into(&tail, &mut self.skip_frames, &mut output);

        // The delay line pads with silence past the real end
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let allowed = expected.saturating_sub(self.frames_out) as usize;
        output.truncate(allowed * OUTPUT_CHANNELS);
        self.frames_out += (output.len() / OUTPUT_CHANNELS) as u64;
        Ok(output)
    }
}

/// Append planar frames to `out` interleaved, dropping `skip` leading frames
fn interleave_into(planar: &[Vec<f32>], skip: &mut usize, out: &mut Vec<f32>) {
    let Some(first) = planar.first() else {
        return;
    };
    let frames = first.len();
    let start = (*skip).min(frames);
    *skip -= start;

    out.reserve((frames - start) * planar.len());
    for frame_idx in start..frames {
        for channel in planar {
            out.push(channel[frame_idx]);
        }
    }
}
