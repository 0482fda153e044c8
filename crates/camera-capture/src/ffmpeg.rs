//! Video file source using FFmpeg.
//!
//! Frames are decoded in presentation order and converted to packed RGB24.

use ffmpeg_next as ffmpeg;
use tracing::{debug, info};

use crate::frame::{timestamp_for, VideoFrame};
use crate::source::{SourceInfo, VideoSource};
use crate::CameraError;

pub struct FfmpegSource {
    info: SourceInfo,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    produced: u64,
    eof_sent: bool,
    closed: bool,
}

// The FFmpeg contexts are only touched through `&mut self`.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(path: &str) -> Result<Self, CameraError> {
        ffmpeg::init().map_err(|e| CameraError::unavailable(path, e))?;
        let input = ffmpeg::format::input(&path).map_err(|e| CameraError::unavailable(path, e))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| CameraError::unavailable(path, "file has no video track"))?;
        let stream_index = stream.index();

        let rate = f64::from(stream.avg_frame_rate());
        let fps = (rate.is_finite() && rate > 0.0).then_some(rate);
        let frame_count = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| CameraError::unavailable(path, e))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| CameraError::unavailable(path, e))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| CameraError::unavailable(path, e))?;

        info!(
            "Video: {}x{} @ {:.1}fps",
            decoder.width(),
            decoder.height(),
            fps.unwrap_or(0.0)
        );

        Ok(Self {
            info: SourceInfo {
                path: path.to_string(),
                fps,
                frame_count,
                width: decoder.width(),
                height: decoder.height(),
            },
            input,
            stream_index,
            decoder,
            scaler,
            produced: 0,
            eof_sent: false,
            closed: false,
        })
    }

    fn take_decoded(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| CameraError::Decode(format!("scale frame to RGB: {e}")))?;
        let (pixels, width, height) = frame_to_pixels(&rgb)?;

        let sequence = self.produced;
        self.produced += 1;
        VideoFrame::new(
            pixels,
            width,
            height,
            timestamp_for(sequence, self.info.fps),
            sequence,
        )
        .map(Some)
    }
}

impl VideoSource for FfmpegSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.closed {
            return Ok(None);
        }
        if let Some(frame) = self.take_decoded()? {
            return Ok(Some(frame));
        }

        while let Some((stream, packet)) = self.input.packets().next() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CameraError::Decode(format!("send packet: {e}")))?;
            if let Some(frame) = self.take_decoded()? {
                return Ok(Some(frame));
            }
        }

        if !self.eof_sent {
            self.eof_sent = true;
            // Flush frames still buffered in the decoder
            let _ = self.decoder.send_eof();
        }
        self.take_decoded()
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Releasing video file {}", self.info.path);
            self.closed = true;
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32), CameraError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let line = data
            .get(start..start + row_bytes)
            .ok_or_else(|| CameraError::Decode("frame row is out of bounds".into()))?;
        pixels.extend_from_slice(line);
    }

    Ok((pixels, width, height))
}
