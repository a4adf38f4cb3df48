//! Spatial block hashing for still images
//!
//! An image is cut into a `rows x cols` grid by [`partition`] and every block
//! is digested independently, so a mismatch can be traced back to a region.
//! Signing and verification must both go through [`partition`]: any other
//! rounding rule produces digests that never agree.

use super::hash::ContentDigest;
use crate::error::{HemlockError, HemlockResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const CHANNELS: usize = 3;

/// Block grid, serialized as `[rows, cols]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct GridSize {
    pub rows: u32,
    pub cols: u32,
}

impl GridSize {
    pub const fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn block_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<[u32; 2]> for GridSize {
    fn from([rows, cols]: [u32; 2]) -> Self {
        Self { rows, cols }
    }
}

impl From<GridSize> for [u32; 2] {
    fn from(grid: GridSize) -> Self {
        [grid.rows, grid.cols]
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

impl FromStr for GridSize {
    type Err = HemlockError;

    /// Parses `"RxC"`, e.g. `"4x4"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rows, cols) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| HemlockError::ConfigError(format!("grid '{}' is not RxC", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| HemlockError::ConfigError(format!("grid '{}': {}", s, e)))
        };
        Ok(Self::new(parse(rows)?, parse(cols)?))
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)` of one grid block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRect {
    pub index: usize,
    pub row: u32,
    pub col: u32,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BlockRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Deterministically split `width x height` into `rows * cols` blocks.
///
/// Blocks are `height / rows` by `width / cols` pixels (integer division) and
/// come back in row-major order, so block `(r, c)` sits at index
/// `r * cols + c`. The last row and the last column stretch to the image edge
/// and absorb the division remainder.
pub fn partition(width: u32, height: u32, rows: u32, cols: u32) -> HemlockResult<Vec<BlockRect>> {
    if rows == 0 || cols == 0 {
        return Err(HemlockError::InvalidGrid {
            rows,
            cols,
            reason: "grid dimensions must be non-zero".to_string(),
        });
    }

    let block_h = height / rows;
    let block_w = width / cols;
    let mut blocks = Vec::with_capacity(rows as usize * cols as usize);

    for r in 0..rows {
        let y0 = r * block_h;
        let y1 = if r == rows - 1 { height } else { (r + 1) * block_h };
        for c in 0..cols {
            let x0 = c * block_w;
            let x1 = if c == cols - 1 { width } else { (c + 1) * block_w };
            blocks.push(BlockRect {
                index: (r * cols + c) as usize,
                row: r,
                col: c,
                x0,
                y0,
                x1,
                y1,
            });
        }
    }

    Ok(blocks)
}

/// Reject grids that would leave empty blocks on an image of this size
pub fn validate_grid(width: u32, height: u32, grid: GridSize) -> HemlockResult<()> {
    if grid.rows == 0 || grid.cols == 0 {
        return Err(HemlockError::InvalidGrid {
            rows: grid.rows,
            cols: grid.cols,
            reason: "grid dimensions must be non-zero".to_string(),
        });
    }
    if grid.rows > height || grid.cols > width {
        return Err(HemlockError::InvalidGrid {
            rows: grid.rows,
            cols: grid.cols,
            reason: format!("grid does not fit a {}x{} image", width, height),
        });
    }
    Ok(())
}

/// SHA-256 over the block's RGB bytes, read row by row with channels interleaved
pub fn hash_block(pixels: &RgbImage, rect: &BlockRect) -> ContentDigest {
    let stride = pixels.width() as usize * CHANNELS;
    let raw = pixels.as_raw();
    let mut hasher = Sha256::new();

    for y in rect.y0..rect.y1 {
        let row_start = y as usize * stride;
        let start = row_start + rect.x0 as usize * CHANNELS;
        let end = row_start + rect.x1 as usize * CHANNELS;
        hasher.update(&raw[start..end]);
    }

    ContentDigest::from_bytes(hasher.finalize().into())
}

/// Digest every block of `pixels`, indexed `r * cols + c`
pub fn hash_image(pixels: &RgbImage, grid: GridSize) -> HemlockResult<Vec<ContentDigest>> {
    let blocks = partition(pixels.width(), pixels.height(), grid.rows, grid.cols)?;
    Ok(blocks.iter().map(|rect| hash_block(pixels, rect)).collect())
}
