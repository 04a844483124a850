//! Keyframe extraction using FFmpeg

use crate::{pixel, Error, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::discard::Discard;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::{Packet, Rational};
use keyprint_core::{DecodedFrame, PixelFormat, Plane};
use keyprint_pipeline::FrameSource;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::OnceLock;

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

/// Initialize FFmpeg once per process
fn init_ffmpeg() -> Result<()> {
    let result = FFMPEG_INIT.get_or_init(|| {
        ffmpeg::init()?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(())
    });
    result.clone().map_err(Error::from)
}

/// Reads the keyframes of the first decodable video stream of a file.
///
/// The decoder is told to discard every non-keyframe, and packets from other
/// streams are skipped without decoding. Keyframes are numbered in the order
/// they come out of the decoder.
pub struct KeyframeReader {
    input: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    time_base: Rational,
    /// Normalizes pixel formats the converters do not understand to YUV420P
    scaler: Option<scaling::Context>,
    pending: VecDeque<DecodedFrame>,
    next_frame_number: u64,
    finished: bool,
}

impl KeyframeReader {
    /// Opens a media file and selects its video stream
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        init_ffmpeg()?;

        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Opening input file");

        let input = ffmpeg::format::input(&path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            format = input.format().name(),
            duration_us = input.duration(),
            bit_rate = input.bit_rate(),
            "Opened container"
        );

        // The first video stream with an installed decoder is the one analyzed
        let mut selected = None;
        for stream in input.streams() {
            let parameters = stream.parameters();
            tracing::debug!(
                stream = stream.index(),
                time_base = ?stream.time_base(),
                frame_rate = ?stream.rate(),
                start_time = stream.start_time(),
                duration = stream.duration(),
                medium = ?parameters.medium(),
                "Probed stream"
            );

            let Some(codec) = ffmpeg::decoder::find(parameters.id()) else {
                tracing::warn!(stream = stream.index(), "No codec found for stream");
                continue;
            };
            tracing::debug!(stream = stream.index(), codec = codec.name(), id = ?codec.id(), "Codec");

            if selected.is_none() && parameters.medium() == ffmpeg::media::Type::Video {
                selected = Some((stream.index(), stream.time_base(), parameters));
            }
        }

        let (video_stream_index, time_base, parameters) = selected.ok_or(Error::NoVideoStream)?;

        let context = ffmpeg::codec::context::Context::from_parameters(parameters)?;
        let mut decoder = context.decoder().video()?;
        decoder.skip_frame(Discard::NonKey);

        tracing::info!(
            stream = video_stream_index,
            width = decoder.width(),
            height = decoder.height(),
            format = ?decoder.format(),
            "Selected video stream"
        );

        Ok(Self {
            input,
            video_stream_index,
            decoder,
            time_base,
            scaler: None,
            pending: VecDeque::new(),
            next_frame_number: 0,
            finished: false,
        })
    }

    /// Gets the video width
    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    /// Gets the video height
    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// Gets the time base of the video stream
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Decodes until a keyframe is available or the stream ends
    pub fn read_keyframe(&mut self) -> Result<Option<DecodedFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.finished {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }
                    self.decoder.send_packet(&packet)?;
                    self.receive_frames()?;
                }
                Err(ffmpeg::Error::Eof) => {
                    // Flush so keyframes still buffered in the decoder are not lost
                    self.decoder.send_eof()?;
                    self.receive_frames()?;
                    self.finished = true;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read packet from stream");
                    return Err(e.into());
                }
            }
        }
    }

    fn receive_frames(&mut self) -> Result<()> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let frame = self.to_decoded_frame(&decoded)?;
                    self.pending.push_back(frame);
                }
                // More input needed, or fully flushed
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => return Ok(()),
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive a frame from the decoder");
                    return Err(e.into());
                }
            }
        }
    }

    fn to_decoded_frame(&mut self, decoded: &ffmpeg::frame::Video) -> Result<DecodedFrame> {
        let frame_number = self.next_frame_number;
        self.next_frame_number += 1;

        let timestamp = decoded
            .timestamp()
            .map_or(0.0, |pts| pts as f64 * f64::from(self.time_base));

        if let Some(format) = pixel::from_ffmpeg(decoded.format()) {
            return copy_planes(decoded, frame_number, timestamp, format);
        }

        let scaler = self.scaler_for(decoded)?;
        let mut normalized = ffmpeg::frame::Video::empty();
        scaler.run(decoded, &mut normalized)?;
        copy_planes(&normalized, frame_number, timestamp, PixelFormat::Yuv420p)
    }

    fn scaler_for(&mut self, decoded: &ffmpeg::frame::Video) -> Result<&mut scaling::Context> {
        let reusable = |scaler: &scaling::Context| {
            let input = scaler.input();
            input.format == decoded.format()
                && input.width == decoded.width()
                && input.height == decoded.height()
        };

        let scaler = match self.scaler.take() {
            Some(scaler) if reusable(&scaler) => scaler,
            _ => {
                tracing::debug!(format = ?decoded.format(), "Normalizing decoder output to YUV420P");
                scaling::Context::get(
                    decoded.format(),
                    decoded.width(),
                    decoded.height(),
                    Pixel::YUV420P,
                    decoded.width(),
                    decoded.height(),
                    scaling::Flags::BILINEAR,
                )?
            }
        };

        Ok(self.scaler.insert(scaler))
    }
}

impl FrameSource for KeyframeReader {
    type Error = Error;

    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn next_keyframe(&mut self) -> Result<Option<DecodedFrame>> {
        self.read_keyframe()
    }
}

/// Copies every plane of `frame`, keeping FFmpeg's row strides
fn copy_planes(
    frame: &ffmpeg::frame::Video,
    frame_number: u64,
    timestamp: f64,
    format: PixelFormat,
) -> Result<DecodedFrame> {
    let planes = (0..format.plane_count())
        .map(|index| Plane::new(frame.data(index).to_vec(), frame.stride(index)))
        .collect();

    Ok(DecodedFrame::new(
        frame_number,
        timestamp,
        frame.width(),
        frame.height(),
        format,
        planes,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let result = KeyframeReader::open("/nonexistent/keyprint-input.mp4");
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[test]
    fn test_open_non_media_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "definitely not a video").unwrap();

        assert!(KeyframeReader::open(&path).is_err());
    }
}
