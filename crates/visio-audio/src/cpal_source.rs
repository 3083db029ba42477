//! Microphone capture through cpal.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use tracing::{error, info};

use crate::CaptureError;
use crate::source::{AudioFormat, AudioSource, CaptureStream};

/// Messages from the cpal callback thread to the capture thread.
enum StreamMessage {
    Chunk(Vec<i16>),
    Failed(String),
}

/// The default input device of the default host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSource;

impl CpalSource {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSource for CpalSource {
    fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;
        let config = device
            .default_input_config()
            .map_err(|_| CaptureError::NoInputDevice)?;

        info!(
            device_name = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            "Recording from device"
        );

        let format = AudioFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        let (tx, rx) = mpsc::channel();
        let err_tx = tx.clone();
        let err_fn = move |err: cpal::StreamError| {
            error!("an error occurred on stream: {}", err);
            err_tx.send(StreamMessage::Failed(err.to_string())).ok();
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::I8 => device.build_input_stream(
                &config.into(),
                move |data, _: &_| forward_input::<i8>(data, &tx),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data, _: &_| forward_input::<i16>(data, &tx),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I32 => device.build_input_stream(
                &config.into(),
                move |data, _: &_| forward_input::<i32>(data, &tx),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data, _: &_| forward_input::<f32>(data, &tx),
                err_fn,
                None,
            )?,
            sample_format => {
                return Err(CaptureError::SampleFormatNotSupported(format!(
                    "{:?}",
                    sample_format
                )));
            }
        };

        stream.play()?;

        Ok(Box::new(CpalStream {
            stream,
            rx,
            format,
        }))
    }
}

struct CpalStream {
    stream: cpal::Stream,
    rx: Receiver<StreamMessage>,
    format: AudioFormat,
}

impl CaptureStream for CpalStream {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_chunk(&mut self, wait: Duration) -> Result<Option<Vec<i16>>, CaptureError> {
        match self.rx.recv_timeout(wait) {
            Ok(StreamMessage::Chunk(chunk)) => Ok(Some(chunk)),
            Ok(StreamMessage::Failed(reason)) => Err(CaptureError::Device(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Device("input stream closed".to_string()))
            }
        }
    }

    fn close(self: Box<Self>) {
        // Pausing can fail on some backends; dropping the stream releases
        // the device regardless.
        self.stream.pause().ok();
    }
}

fn forward_input<T>(input: &[T], tx: &Sender<StreamMessage>)
where
    T: Sample,
    i16: FromSample<T>,
{
    let chunk: Vec<i16> = input.iter().map(|&sample| i16::from_sample(sample)).collect();
    tx.send(StreamMessage::Chunk(chunk)).ok();
}
