//! Media decoding
//!
//! Stills decode to an RGB8 buffer. Videos are read as a sequence of RGB8
//! frames through a [`FrameSource`]. Animated GIF and APNG decode with the
//! `image` crate; container formats (mp4, mov, webm, ...) go through
//! gstreamer and need the `gstreamer` feature.

use crate::error::{HemlockError, HemlockResult};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];
const ANIMATION_EXTENSIONS: &[&str] = &["gif", "apng"];
const CONTAINER_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv", "avi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Route by file extension (case-insensitive)
    pub fn from_path<P: AsRef<Path>>(path: P) -> HemlockResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                HemlockError::UnsupportedMedia(format!("no file extension: {}", path.display()))
            })?;

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(MediaKind::Image)
        } else if ANIMATION_EXTENSIONS.contains(&ext.as_str())
            || CONTAINER_EXTENSIONS.contains(&ext.as_str())
        {
            Ok(MediaKind::Video)
        } else {
            Err(HemlockError::UnsupportedMedia(format!(
                "unrecognized extension '.{}'",
                ext
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a still image, dropping any alpha channel
pub fn load_image<P: AsRef<Path>>(path: P) -> HemlockResult<RgbImage> {
    let path = path.as_ref();
    let img = image::open(path)
        .map_err(|e| HemlockError::MediaDecode(format!("{}: {}", path.display(), e)))?;
    Ok(img.to_rgb8())
}

/// One decoded video frame as packed RGB8 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl AsRef<[u8]> for RgbFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// A source of frames in decode order
pub trait FrameSource {
    fn next_frame(&mut self) -> HemlockResult<Option<RgbFrame>>;
}

/// Frames of an animated GIF or APNG file
pub struct AnimatedFrames {
    frames: Frames<'static>,
}

impl AnimatedFrames {
    pub fn open<P: AsRef<Path>>(path: P) -> HemlockResult<Self> {
        let path = path.as_ref();
        let decode_err = |e: image::ImageError| {
            HemlockError::MediaDecode(format!("{}: {}", path.display(), e))
        };

        let reader = BufReader::new(File::open(path)?);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let frames = match ext.as_str() {
            "gif" => GifDecoder::new(reader).map_err(decode_err)?.into_frames(),
            "apng" | "png" => PngDecoder::new(reader)
                .map_err(decode_err)?
                .apng()
                .map_err(decode_err)?
                .into_frames(),
            other => {
                return Err(HemlockError::UnsupportedMedia(format!(
                    "no frame decoder for '.{}'",
                    other
                )))
            }
        };

        Ok(Self { frames })
    }
}

impl FrameSource for AnimatedFrames {
    fn next_frame(&mut self) -> HemlockResult<Option<RgbFrame>> {
        match self.frames.next() {
            None => Ok(None),
            Some(Err(e)) => Err(HemlockError::MediaDecode(e.to_string())),
            Some(Ok(frame)) => {
                let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
                Ok(Some(RgbFrame {
                    width: rgb.width(),
                    height: rgb.height(),
                    bytes: rgb.into_raw(),
                }))
            }
        }
    }
}

/// Open the frame source matching the container of a video path
pub fn open_frames<P: AsRef<Path>>(path: P) -> HemlockResult<Box<dyn FrameSource>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if CONTAINER_EXTENSIONS.contains(&ext.as_str()) {
        open_container(path)
    } else {
        Ok(Box::new(AnimatedFrames::open(path)?))
    }
}

#[cfg(feature = "gstreamer")]
fn open_container(path: &Path) -> HemlockResult<Box<dyn FrameSource>> {
    Ok(Box::new(super::video::ContainerFrames::open(path)?))
}

#[cfg(not(feature = "gstreamer"))]
fn open_container(path: &Path) -> HemlockResult<Box<dyn FrameSource>> {
    Err(HemlockError::UnsupportedMedia(format!(
        "{}: container video requires the `gstreamer` feature",
        path.display()
    )))
}
