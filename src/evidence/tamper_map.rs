//! Forensic overlay of mismatched image blocks

use super::block_hash::BlockRect;
use crate::error::{HemlockError, HemlockResult};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const BORDER_PX: u32 = 2;
const ORIGINAL_WEIGHT: f32 = 0.6;
const RED_WEIGHT: f32 = 0.4;

/// Copy of `pixels` with every block in `blocks` tinted red and outlined.
///
/// Pixels outside the listed blocks are left untouched.
pub fn render_tamper_map(pixels: &RgbImage, blocks: &[BlockRect]) -> RgbImage {
    let mut map = pixels.clone();
    for rect in blocks {
        tint_block(&mut map, rect);
        outline_block(&mut map, rect);
    }
    map
}

fn tint_block(map: &mut RgbImage, rect: &BlockRect) {
    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            let px = map.get_pixel_mut(x, y);
            for (channel, red) in px.0.iter_mut().zip(RED.0) {
                *channel = (*channel as f32 * ORIGINAL_WEIGHT + red as f32 * RED_WEIGHT) as u8;
            }
        }
    }
}

fn outline_block(map: &mut RgbImage, rect: &BlockRect) {
    let border_w = BORDER_PX.min(rect.width());
    let border_h = BORDER_PX.min(rect.height());

    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            let on_edge = x < rect.x0 + border_w
                || x >= rect.x1 - border_w
                || y < rect.y0 + border_h
                || y >= rect.y1 - border_h;
            if on_edge {
                map.put_pixel(x, y, RED);
            }
        }
    }
}

/// Write `map` as `tamper_map-<uuid>.png` under `dir` and return its path
pub fn save_tamper_map<P: AsRef<Path>>(map: &RgbImage, dir: P) -> HemlockResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("tamper_map-{}.png", Uuid::new_v4()));
    map.save(&path).map_err(|e| {
        HemlockError::StorageSaveFailed(format!("tamper map {}: {}", path.display(), e))
    })?;
    Ok(path)
}
