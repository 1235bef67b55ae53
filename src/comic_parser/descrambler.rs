//! 4×4 拼图还原。
//!
//! 打乱表 `permutation[pos]` 给出目标格 `pos` 应取的源格编号；格子按列优先编号
//! （行 = `idx % 4`，列 = `idx / 4`）。主区域宽度向下取整到 4 的倍数，右侧余下的
//! 竖条从未被打乱，原样复制。

use thiserror::Error;

use super::raster::RasterBuffer;

pub const GRID: u32 = 4;
pub const BLOCK_COUNT: usize = (GRID * GRID) as usize;
/// 声明尺寸最多允许为实际解码尺寸的几倍。
pub const MAX_DECLARED_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrambleFormatError {
    #[error("expected 16 entries, got {0}")]
    WrongLength(usize),
    #[error("entry #{position} = {value} is outside 0..16")]
    OutOfRange { position: usize, value: i64 },
    #[error("block {value} appears more than once")]
    Duplicate { value: i64 },
}

#[derive(Debug, Error)]
pub enum DescrambleError {
    #[error(transparent)]
    Decode(#[from] image::ImageError),
    #[error("declared size {width}x{height} does not fit decoded image {decoded_width}x{decoded_height}")]
    DeclaredSize {
        width: u32,
        height: u32,
        decoded_width: u32,
        decoded_height: u32,
    },
}

/// 经过校验的 16 格排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permutation([u8; BLOCK_COUNT]);

impl Permutation {
    pub fn new(values: &[i64]) -> Result<Self, ScrambleFormatError> {
        if values.len() != BLOCK_COUNT {
            return Err(ScrambleFormatError::WrongLength(values.len()));
        }
        let mut table = [0u8; BLOCK_COUNT];
        let mut seen = [false; BLOCK_COUNT];
        for (position, &value) in values.iter().enumerate() {
            if !(0..BLOCK_COUNT as i64).contains(&value) {
                return Err(ScrambleFormatError::OutOfRange { position, value });
            }
            let idx = value as usize;
            if seen[idx] {
                return Err(ScrambleFormatError::Duplicate { value });
            }
            seen[idx] = true;
            table[position] = idx as u8;
        }
        Ok(Self(table))
    }

    #[cfg(test)]
    pub fn identity() -> Self {
        let mut table = [0u8; BLOCK_COUNT];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self(table)
    }

    /// 目标格 `pos` 的源格编号。
    pub fn source_of(&self, pos: usize) -> usize {
        self.0[pos] as usize
    }
}

/// 由声明尺寸推出的分块几何。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub main_width: u32,
    pub block_width: u32,
    pub block_height: u32,
}

impl BlockLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let main_width = width / GRID * GRID;
        Self {
            main_width,
            block_width: main_width / GRID,
            block_height: height / GRID,
        }
    }

    /// 第 `idx` 格左上角坐标（列优先）。
    pub fn origin(&self, idx: usize) -> (u32, u32) {
        let idx = idx as u32;
        let row = idx % GRID;
        let col = idx / GRID;
        (col * self.block_width, row * self.block_height)
    }
}

/// 在已解码的源图上还原，输出尺寸严格为 `(width, height)`。
pub fn descramble_raster(
    source: &RasterBuffer,
    permutation: &Permutation,
    width: u32,
    height: u32,
) -> RasterBuffer {
    let layout = BlockLayout::new(width, height);
    let block = (layout.block_width, layout.block_height);
    let mut out = RasterBuffer::new(width, height);

    for pos in 0..BLOCK_COUNT {
        let src_origin = layout.origin(permutation.source_of(pos));
        let dst_origin = layout.origin(pos);
        out.copy_rect(source, src_origin, block, dst_origin);
    }

    if width > layout.main_width {
        out.copy_rect(
            source,
            (layout.main_width, 0),
            (width - layout.main_width, height),
            (layout.main_width, 0),
        );
    }

    out
}

/// 清单里的宽高来自服务端：不能为 0，也不能超过解码尺寸的 [`MAX_DECLARED_SCALE`] 倍。
pub fn check_declared_size(
    (decoded_width, decoded_height): (u32, u32),
    width: u32,
    height: u32,
) -> Result<(), DescrambleError> {
    let exceeds = |declared: u32, decoded: u32| {
        decoded
            .checked_mul(MAX_DECLARED_SCALE)
            .is_none_or(|limit| declared > limit)
    };
    let too_large = exceeds(width, decoded_width) || exceeds(height, decoded_height);
    if width == 0 || height == 0 || too_large {
        return Err(DescrambleError::DeclaredSize {
            width,
            height,
            decoded_width,
            decoded_height,
        });
    }
    Ok(())
}

/// 解码 `encoded`，校验声明尺寸后还原。
pub fn descramble(
    encoded: &[u8],
    permutation: &Permutation,
    width: u32,
    height: u32,
) -> Result<RasterBuffer, DescrambleError> {
    let source = RasterBuffer::decode(encoded)?;
    check_declared_size(source.dimensions(), width, height)?;
    Ok(descramble_raster(&source, permutation, width, height))
}
