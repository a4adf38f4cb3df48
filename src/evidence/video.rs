//! Container video frames through a gstreamer pipeline
//!
//! `uridecodebin -> videoconvert -> appsink(video/x-raw, RGB)`. The decodebin
//! pads appear at runtime, so the first video pad is linked from the
//! `pad-added` callback. Audio pads are left unlinked.

use super::media::{FrameSource, RgbFrame};
use crate::error::{HemlockError, HemlockResult};
use crate::logger::{LogLevel, LOGGER};
use gst::prelude::*;
use gst::MessageView;
use gst_video::VideoFrameExt;
use std::path::Path;

// How long to wait for the next decoded frame before giving up
const PULL_TIMEOUT_SECS: u64 = 30;

fn decode_err<E: std::fmt::Display>(path: &Path, e: E) -> HemlockError {
    HemlockError::MediaDecode(format!("{}: {}", path.display(), e))
}

pub struct ContainerFrames {
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    done: bool,
}

impl ContainerFrames {
    pub fn open<P: AsRef<Path>>(path: P) -> HemlockResult<Self> {
        let path = path.as_ref();

        gst::init().map_err(|e| decode_err(path, e))?;
        let absolute = std::fs::canonicalize(path)?;
        let uri = glib::filename_to_uri(&absolute, None).map_err(|e| decode_err(path, e))?;

        let pipeline = gst::Pipeline::new();
        let src = gst::ElementFactory::make("uridecodebin")
            .property("uri", uri.as_str())
            .build()
            .map_err(|e| decode_err(path, e))?;
        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| decode_err(path, e))?;
        let sink = gst_app::AppSink::builder()
            .caps(
                &gst_video::VideoCapsBuilder::new()
                    .format(gst_video::VideoFormat::Rgb)
                    .build(),
            )
            .sync(false)
            .drop(false)
            .max_buffers(1)
            .build();

        pipeline
            .add_many([&src, &convert, sink.upcast_ref()])
            .map_err(|e| decode_err(path, e))?;
        convert.link(&sink).map_err(|e| decode_err(path, e))?;

        let convert_weak = convert.downgrade();
        src.connect_pad_added(move |_, src_pad| {
            let Some(convert) = convert_weak.upgrade() else {
                return;
            };
            let is_video = src_pad
                .current_caps()
                .and_then(|caps| {
                    caps.structure(0)
                        .map(|s| s.name().starts_with("video/"))
                })
                .unwrap_or(false);
            if !is_video {
                return;
            }
            let Some(sink_pad) = convert.static_pad("sink") else {
                return;
            };
            if sink_pad.is_linked() {
                return;
            }
            if let Err(e) = src_pad.link(&sink_pad) {
                LOGGER.log(
                    LogLevel::Error,
                    &format!("Could not link decoded video pad: {:?}", e),
                    "video",
                );
            }
        });

        pipeline.set_state(gst::State::Playing).map_err(|e| decode_err(path, e))?;

        LOGGER.log(
            LogLevel::Debug,
            &format!("Opened container video {}", path.display()),
            "video",
        );

        Ok(Self {
            pipeline,
            sink,
            done: false,
        })
    }

    fn bus_error(&self) -> Option<HemlockError> {
        let bus = self.pipeline.bus()?;
        bus.pop_filtered(&[gst::MessageType::Error])
            .and_then(|msg| match msg.view() {
                MessageView::Error(e) => Some(HemlockError::MediaDecode(format!(
                    "{} ({})",
                    e.error(),
                    e.debug().map(|d| d.to_string()).unwrap_or_default()
                ))),
                _ => None,
            })
    }

    fn finish(&mut self) {
        self.done = true;
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

impl FrameSource for ContainerFrames {
    fn next_frame(&mut self) -> HemlockResult<Option<RgbFrame>> {
        if self.done {
            return Ok(None);
        }
        if let Some(error) = self.bus_error() {
            self.finish();
            return Err(error);
        }

        let Some(sample) = self
            .sink
            .try_pull_sample(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
        else {
            let error = self.bus_error();
            let eos = self.sink.is_eos();
            self.finish();
            return match error {
                Some(error) => Err(error),
                None if !eos => Err(HemlockError::MediaDecode(
                    "timed out waiting for a video frame".to_string(),
                )),
                None => Ok(None),
            };
        };

        sample_to_rgb(sample).map(Some)
    }
}

impl Drop for ContainerFrames {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Copy an RGB sample into packed rows, dropping any stride padding
fn sample_to_rgb(sample: gst::Sample) -> HemlockResult<RgbFrame> {
    let caps = sample
        .caps()
        .ok_or_else(|| HemlockError::MediaDecode("sample without caps".to_string()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| HemlockError::MediaDecode(e.to_string()))?;
    let buffer = sample
        .buffer_owned()
        .ok_or_else(|| HemlockError::MediaDecode("sample without buffer".to_string()))?;
    let frame = gst_video::VideoFrame::from_buffer_readable(buffer, &info)
        .map_err(|_| HemlockError::MediaDecode("failed to map video buffer".to_string()))?;

    let width = frame.width();
    let height = frame.height();
    let stride = frame.plane_stride()[0] as usize;
    let data = frame
        .plane_data(0)
        .map_err(|e| HemlockError::MediaDecode(e.to_string()))?;

    let row = width as usize * 3;
    let mut bytes = Vec::with_capacity(row * height as usize);
    for line in data.chunks(stride).take(height as usize) {
        bytes.extend_from_slice(&line[..row]);
    }

    Ok(RgbFrame {
        width,
        height,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Raw RGB in an AVI so the test only needs gstreamer's base and good plugins
    fn write_test_clip(path: &Path, frames: u32) {
        gst::init().unwrap();
        let description = format!(
            "videotestsrc num-buffers={} pattern=ball ! video/x-raw,format=RGB,width=16,height=8,framerate=5/1 ! avimux ! filesink location={}",
            frames,
            path.display()
        );
        let pipeline = gst::parse::launch(&description).unwrap();
        pipeline.set_state(gst::State::Playing).unwrap();
        let bus = pipeline.bus().unwrap();
        let msg = bus
            .timed_pop_filtered(
                gst::ClockTime::from_seconds(30),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            )
            .unwrap();
        assert!(matches!(msg.view(), MessageView::Eos(_)));
        pipeline.set_state(gst::State::Null).unwrap();
    }

    #[test]
    fn test_container_frames_decode_every_frame() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.avi");
        write_test_clip(&path, 4);

        let mut source = ContainerFrames::open(&path).unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 4);
        for frame in &frames {
            assert_eq!((frame.width, frame.height), (16, 8));
            assert_eq!(frame.bytes.len(), 16 * 8 * 3);
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_container_garbage_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.mp4");
        std::fs::write(&path, b"not a movie").unwrap();

        let result = ContainerFrames::open(&path).and_then(|mut source| source.next_frame());
        assert!(matches!(result, Err(HemlockError::MediaDecode(_))));
    }
}
