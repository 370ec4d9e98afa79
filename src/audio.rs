//! Decoded audio accumulation and access.
//!
//! Frames decode into per-channel `i32` sample buffers. [`DecodedAudio`]
//! collects them across a whole stream in planar form and offers the
//! interleaved view consumers usually want. Samples stay at their native
//! bit depth, sign-extended into `i32` per the format's internal
//! representation.

use std::time::Duration;

use crate::error::{FlacError, FlacResult};
use crate::frame::Frame;

/// Planar decoded audio: one sample vector per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedAudio {
    channels: Vec<Vec<i32>>,
    bits_per_sample: u32,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Create an empty buffer for `n_channels` channels.
    pub fn new(n_channels: usize, bits_per_sample: u32, sample_rate: u32) -> Self {
        DecodedAudio {
            channels: vec![Vec::new(); n_channels],
            bits_per_sample,
            sample_rate,
        }
    }

    /// Wrap already-planar channel data.
    pub fn from_channels(channels: Vec<Vec<i32>>, bits_per_sample: u32, sample_rate: u32) -> Self {
        DecodedAudio {
            channels,
            bits_per_sample,
            sample_rate,
        }
    }

    /// Number of channels.
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native sample width in bits.
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration at the buffer's sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    /// One channel's samples.
    pub fn channel(&self, index: usize) -> Option<&[i32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// All channels in planar form.
    pub fn channels(&self) -> &[Vec<i32>] {
        &self.channels
    }

    /// Samples interleaved across channels, frame by frame.
    pub fn interleaved(&self) -> Vec<i32> {
        let len = self.len();
        let mut out = Vec::with_capacity(len * self.channels.len());
        for i in 0..len {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Append one decoded frame's samples. The frame's channel count must
    /// match the buffer's.
    pub fn push_frame(&mut self, frame: &Frame) -> FlacResult<()> {
        if frame.subframes.len() != self.channels.len() {
            return Err(FlacError::unsupported(format!(
                "frame with {} channels appended to a {}-channel buffer",
                frame.subframes.len(),
                self.channels.len()
            )));
        }
        for (channel, subframe) in self.channels.iter_mut().zip(&frame.subframes) {
            channel.extend_from_slice(&subframe.samples);
        }
        Ok(())
    }
}
