//! Finalised recordings.
//!
//! ## Format notes
//!
//! Captured audio is kept as 16-bit PCM WAV in memory. At 16kHz mono that
//! is ~31KiB per second, so the ten second default timeout stays well under
//! the upload limits of the intent service.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::Result;
use crate::session::SessionId;
use crate::source::AudioFormat;

/// How a capture came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// `stop()` was called
    Stopped,
    /// The capture timeout elapsed
    TimedOut,
    /// The device failed; the artifact holds what was captured before that
    Aborted,
}

/// Finalised audio of one recording session.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    id: SessionId,
    wav: Bytes,
    format: AudioFormat,
    samples: usize,
    duration: Duration,
    peak_db: f32,
    end: CaptureEnd,
}

impl RecordingArtifact {
    /// Finalise interleaved samples into a WAV artifact.
    pub fn from_samples(
        id: SessionId,
        format: AudioFormat,
        samples: &[i16],
        end: CaptureEnd,
    ) -> Result<Self> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut buffer = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        let mut writer = WavWriter::new(&mut buffer, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        // Writes the final chunk sizes into the header.
        writer.finalize()?;

        Ok(Self {
            id,
            wav: Bytes::from(buffer.into_inner()),
            format,
            samples: samples.len(),
            duration: format.duration_of(samples.len()),
            peak_db: db_fs(samples),
            end,
        })
    }

    /// Load a 16-bit PCM WAV file, e.g. one saved from an earlier session.
    pub fn from_wav(id: SessionId, wav: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(wav))?;
        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
            return Err(hound::Error::Unsupported.into());
        }
        let format = AudioFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        };
        let samples = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::from_samples(id, format, &samples, CaptureEnd::Stopped)
    }

    /// Session that produced this artifact.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Complete WAV file, header included.
    pub fn wav(&self) -> &Bytes {
        &self.wav
    }

    pub fn into_wav(self) -> Bytes {
        self.wav
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of interleaved samples captured.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Loudest sample in dBFS, `MIN_DB` for silence.
    pub fn peak_db(&self) -> f32 {
        self.peak_db
    }

    pub fn end(&self) -> CaptureEnd {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

pub const MIN_DB: f32 = -96.0;

/// Convert a slice of 16-bit samples to dBFS of the loudest sample.
pub fn db_fs(data: &[i16]) -> f32 {
    let max_sample = data
        .iter()
        .map(|&sample| f32::from(sample).abs() / f32::from(i16::MAX))
        .fold(0.0_f32, f32::max);

    if max_sample == 0.0 {
        return MIN_DB;
    }
    (20.0 * max_sample.log10()).clamp(MIN_DB, 0.0)
}

#[cfg(test)]
mod tests {
    use hound::WavReader;

    use super::*;

    #[test]
    fn test_encode_produces_readable_wav() {
        let samples: Vec<i16> = (0..16_000).map(|i| (i % 100) as i16).collect();
        let artifact = RecordingArtifact::from_samples(
            7,
            AudioFormat::default(),
            &samples,
            CaptureEnd::Stopped,
        )
        .unwrap();

        assert_eq!(artifact.id(), 7);
        assert_eq!(artifact.samples(), 16_000);
        assert_eq!(artifact.duration(), Duration::from_secs(1));

        let reader = WavReader::new(Cursor::new(artifact.wav().to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 16_000);
    }

    #[test]
    fn test_empty_recording_is_valid_wav() {
        let artifact =
            RecordingArtifact::from_samples(1, AudioFormat::default(), &[], CaptureEnd::Aborted)
                .unwrap();
        assert!(artifact.is_empty());
        assert_eq!(artifact.peak_db(), MIN_DB);
        assert!(WavReader::new(Cursor::new(artifact.into_wav().to_vec())).is_ok());
    }

    #[test]
    fn test_from_wav_reads_back_samples() {
        let format = AudioFormat {
            sample_rate: 8_000,
            channels: 2,
        };
        let original =
            RecordingArtifact::from_samples(3, format, &[100, -100, 200, -200], CaptureEnd::TimedOut)
                .unwrap();

        let loaded = RecordingArtifact::from_wav(4, original.wav()).unwrap();
        assert_eq!(loaded.id(), 4);
        assert_eq!(loaded.format(), format);
        assert_eq!(loaded.samples(), 4);
        assert_eq!(loaded.end(), CaptureEnd::Stopped);
        assert_eq!(loaded.wav(), original.wav());

        assert!(RecordingArtifact::from_wav(5, b"not a wav file").is_err());
    }

    #[test]
    fn test_db_fs() {
        assert_eq!(db_fs(&[0, 0, 0]), MIN_DB);
        assert!(db_fs(&[i16::MAX]).abs() < 1e-3);
        assert!((db_fs(&[i16::MAX / 2]) + 6.02).abs() < 0.1);
    }
}
