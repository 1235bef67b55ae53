//! 与显示无关的位图缓冲：尺寸 + RGB 像素，解码/编码是显式的边界操作。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const CHANNELS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    pixels: RgbImage,
}

impl RasterBuffer {
    /// 全黑缓冲（对应透明画布被 JPEG 压平后的颜色）。
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbImage::new(width, height),
        }
    }

    /// 纯白缓冲，用于拼页时的空白侧。
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, WHITE),
        }
    }

    #[cfg(test)]
    pub fn from_image(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// 按内容嗅探格式解码（jpeg/png/webp）。
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self {
            pixels: img.into_rgb8(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    #[cfg(test)]
    pub fn as_image(&self) -> &RgbImage {
        &self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels.get_pixel(x, y).0
    }

    /// 把 `src` 中 `(sx, sy, w, h)` 的矩形原样复制到本缓冲的 `(dx, dy)`。
    ///
    /// 超出任一方边界的部分被裁掉，不做缩放。
    pub fn copy_rect(
        &mut self,
        src: &RasterBuffer,
        (sx, sy): (u32, u32),
        (w, h): (u32, u32),
        (dx, dy): (u32, u32),
    ) {
        let (sw, sh) = src.dimensions();
        let (dw, dh) = self.dimensions();
        if sx >= sw || sy >= sh || dx >= dw || dy >= dh {
            return;
        }
        let w = w.min(sw - sx).min(dw - dx) as usize;
        let h = h.min(sh - sy).min(dh - dy) as usize;
        if w == 0 || h == 0 {
            return;
        }

        let row_bytes = w * CHANNELS;
        let src_stride = sw as usize * CHANNELS;
        let dst_stride = dw as usize * CHANNELS;
        let src_raw = src.pixels.as_raw();
        let dst_raw: &mut [u8] = &mut self.pixels;
        for row in 0..h {
            let s = (sy as usize + row) * src_stride + sx as usize * CHANNELS;
            let d = (dy as usize + row) * dst_stride + dx as usize * CHANNELS;
            dst_raw[d..d + row_bytes].copy_from_slice(&src_raw[s..s + row_bytes]);
        }
    }

    /// 整张画到 `(dx, dy)`，尺寸不同则先双线性缩放到 `(w, h)`。
    pub fn draw_scaled(&mut self, src: &RasterBuffer, (dx, dy): (u32, u32), (w, h): (u32, u32)) {
        if src.dimensions() == (w, h) {
            self.copy_rect(src, (0, 0), (w, h), (dx, dy));
        } else {
            let scaled = RasterBuffer {
                pixels: image::imageops::resize(&src.pixels, w, h, FilterType::Triangle),
            };
            self.copy_rect(&scaled, (0, 0), (w, h), (dx, dy));
        }
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Cursor::new(Vec::new());
        let q = quality.clamp(1, 100);
        let mut encoder = JpegEncoder::new_with_quality(&mut out, q);
        encoder.encode(
            &self.pixels,
            self.pixels.width(),
            self.pixels.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(out.into_inner())
    }
}
