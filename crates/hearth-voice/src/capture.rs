//! Rolling audio capture buffer.
//!
//! A fixed-duration circular store of the most recent microphone samples,
//! written continuously by the capture pipeline and snapshot-exported by
//! identification, enrollment, and voice-print eligibility checks. Reads
//! copy; they never block or contend with writes beyond the lock itself.

use std::collections::VecDeque;

/// Sample rate the capture pipeline resamples to (16 kHz mono, 16-bit).
///
/// The identify and enroll collaborators reject anything else, so the
/// buffer is fixed to this rate rather than configurable.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Fixed-duration circular buffer of mono PCM samples.
#[derive(Debug)]
pub struct RollingCaptureBuffer {
    samples: VecDeque<i16>,
    capacity_samples: usize,
}

/// An immutable export of the buffer contents at a point in time.
///
/// Holds "the most recent N seconds of audio" for identification or
/// enrollment; not retained after use.
#[derive(Debug, Clone)]
pub struct AudioSnapshot {
    samples: Vec<i16>,
}

impl RollingCaptureBuffer {
    /// Creates a buffer holding up to `capacity_secs` seconds of audio.
    pub fn new(capacity_secs: u32) -> Self {
        let capacity_samples = capacity_secs as usize * CAPTURE_SAMPLE_RATE as usize;
        Self {
            samples: VecDeque::with_capacity(capacity_samples),
            capacity_samples,
        }
    }

    /// Appends a chunk of samples, evicting the oldest past capacity.
    pub fn write(&mut self, chunk: &[i16]) {
        if chunk.len() >= self.capacity_samples {
            // Chunk alone fills the window; keep only its tail.
            self.samples.clear();
            self.samples
                .extend(&chunk[chunk.len() - self.capacity_samples..]);
            return;
        }
        let overflow = (self.samples.len() + chunk.len()).saturating_sub(self.capacity_samples);
        if overflow > 0 {
            self.samples.drain(..overflow);
        }
        self.samples.extend(chunk);
    }

    /// Seconds of audio currently buffered.
    pub fn buffered_secs(&self) -> f64 {
        self.samples.len() as f64 / CAPTURE_SAMPLE_RATE as f64
    }

    /// Exports the full buffer contents.
    pub fn snapshot(&self) -> AudioSnapshot {
        AudioSnapshot {
            samples: self.samples.iter().copied().collect(),
        }
    }

    /// Exports at most the last `secs` seconds.
    pub fn snapshot_tail(&self, secs: u32) -> AudioSnapshot {
        let want = secs as usize * CAPTURE_SAMPLE_RATE as usize;
        let skip = self.samples.len().saturating_sub(want);
        AudioSnapshot {
            samples: self.samples.iter().skip(skip).copied().collect(),
        }
    }

    /// Drops all buffered audio. Called on teardown so no audio survives
    /// the session that captured it.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl AudioSnapshot {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / CAPTURE_SAMPLE_RATE as f64
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Encodes the snapshot as a 16 kHz mono 16-bit PCM WAV file.
    ///
    /// The identify/enroll collaborators check for the RIFF/WAVE magic
    /// before accepting a clip, so snapshots always ship with the header.
    pub fn to_wav(&self) -> Vec<u8> {
        let data_len = (self.samples.len() * 2) as u32;
        let byte_rate = CAPTURE_SAMPLE_RATE * 2; // mono, 2 bytes per sample
        let mut wav = Vec::with_capacity(44 + data_len as usize);

        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&CAPTURE_SAMPLE_RATE.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes()); // block align
        wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        for s in &self.samples {
            wav.extend_from_slice(&s.to_le_bytes());
        }
        wav
    }
}
