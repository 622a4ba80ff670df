use std::path::Path;

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::FrameSource;

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec) and
/// converts each one to packed RGB24.
pub struct FfmpegReader {
    video: Option<OpenVideo>,
    consumed: bool,
}

/// Demuxer, decoder and RGB converter for one opened file.
struct OpenVideo {
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: the reader is owned by one scan at a time and moved between
// threads only as a whole; ffmpeg's raw pointers are never shared.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            video: None,
            consumed: false,
        }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let input = ffmpeg_next::format::input(path)?;
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let (width, height) = (decoder.width(), decoder.height());

        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: stream.frames().max(0) as usize,
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened {}: {width}x{height} @ {fps:.2} fps",
            path.display()
        );

        self.video = Some(OpenVideo {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        });
        self.consumed = false;
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        if self.video.is_none() {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        }
        if self.consumed {
            return Box::new(std::iter::once(Err(
                "FfmpegReader: frames already read; reopen to rescan".into(),
            )));
        }
        self.consumed = true;

        match self.video.as_mut() {
            Some(video) => Box::new(FfmpegFrameIter {
                video,
                frame_index: 0,
                flushing: false,
                done: false,
            }),
            None => Box::new(std::iter::empty()),
        }
    }

    fn close(&mut self) {
        self.video = None;
        self.consumed = false;
    }
}

/// Decodes lazily so a long video is never buffered whole.
struct FfmpegFrameIter<'a> {
    video: &'a mut OpenVideo,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = VideoFrame::empty();
        self.video.decoder.receive_frame(&mut decoded).ok()?;

        let mut rgb = VideoFrame::empty();
        if let Err(e) = self.video.scaler.run(&decoded, &mut rgb) {
            return Some(Err(Box::new(e)));
        }
        let pixels = extract_rgb_pixels(&rgb, self.video.width, self.video.height);
        let frame = Frame::new(
            pixels,
            self.video.width,
            self.video.height,
            3,
            self.frame_index,
        );
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(result) = self.try_receive() {
            return Some(result);
        }
        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.video.input.packets().next() else {
                let _ = self.video.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video.stream_index {
                continue;
            }
            if let Err(e) = self.video.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }
            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Copies an RGB24 plane into a tightly packed buffer, dropping the row
/// padding ffmpeg may add (stride > width * 3).
fn extract_rgb_pixels(rgb: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
