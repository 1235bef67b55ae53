//! 右开本拼页：同一组两页里，先出现的一页放右侧。

use thiserror::Error;

use super::raster::RasterBuffer;
use crate::download::models::Mode;

/// 双页宽度的拼页结果。
pub type SpreadBuffer = RasterBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("spread width 2 x {0} overflows u32")]
pub struct SpreadTooWide(pub u32);

/// `left` 画在 `[0, std_width)`，`right` 画在 `[std_width, 2·std_width)`；
/// 缺失的一侧是纯白。尺寸不一致的页面缩放到标准页尺寸。
pub fn combine(
    left: Option<&RasterBuffer>,
    right: Option<&RasterBuffer>,
    std_width: u32,
    std_height: u32,
) -> Result<SpreadBuffer, SpreadTooWide> {
    let spread_width = std_width.checked_mul(2).ok_or(SpreadTooWide(std_width))?;
    let mut spread = RasterBuffer::blank(spread_width, std_height);
    let size = (std_width, std_height);
    if let Some(page) = left {
        spread.draw_scaled(page, (0, 0), size);
    }
    if let Some(page) = right {
        spread.draw_scaled(page, (std_width, 0), size);
    }
    Ok(spread)
}

/// 按模式把页面序列拼成跨页序列。
///
/// 标准页尺寸取第一页。函数消耗 `pages`，返回前源页全部释放。
pub fn compose_right_to_left(
    pages: Vec<RasterBuffer>,
    mode: Mode,
) -> Result<Vec<SpreadBuffer>, SpreadTooWide> {
    if mode == Mode::NoCompose || pages.is_empty() {
        return Ok(pages);
    }
    let (std_w, std_h) = pages[0].dimensions();
    let mut spreads = Vec::with_capacity(pages.len() / 2 + 1);

    let remaining: &[RasterBuffer] = match mode {
        Mode::RightOpenCover if pages.len() >= 2 => {
            spreads.push(combine(Some(&pages[1]), Some(&pages[0]), std_w, std_h)?);
            &pages[2..]
        }
        Mode::RightOpenCover => {
            spreads.push(combine(None, Some(&pages[0]), std_w, std_h)?);
            &[]
        }
        _ => {
            spreads.push(combine(Some(&pages[0]), None, std_w, std_h)?);
            &pages[1..]
        }
    };

    for pair in remaining.chunks(2) {
        let right = &pair[0];
        let left = pair.get(1);
        spreads.push(combine(left, Some(right), std_w, std_h)?);
    }

    drop(pages);
    Ok(spreads)
}
