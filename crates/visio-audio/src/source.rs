//! Boundary to the microphone.

use std::time::Duration;

use crate::CaptureError;

/// Shape of the PCM samples a stream delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    /// 16kHz mono, what the intent service expects.
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

impl AudioFormat {
    /// Playback length of `samples` interleaved samples.
    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = samples as f64 / f64::from(self.channels.max(1));
        Duration::from_secs_f64(frames / f64::from(self.sample_rate.max(1)))
    }
}

/// Something that can be opened for capture.
///
/// `open` is called on the capture thread and the stream never leaves that
/// thread, so streams do not need to be `Send`.
pub trait AudioSource: Send + Sync + 'static {
    fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An open capture stream producing interleaved 16-bit PCM.
pub trait CaptureStream {
    fn format(&self) -> AudioFormat;

    /// Wait at most `wait` for the next chunk. `Ok(None)` means nothing
    /// arrived in time; an error means the device is gone.
    fn read_chunk(&mut self, wait: Duration) -> Result<Option<Vec<i16>>, CaptureError>;

    /// Release the device.
    fn close(self: Box<Self>);
}
