// SPDX-License-Identifier: GPL-3.0-only
//! Pixel conversion utilities for 4-byte RGBA/BGRA frames
//!
//! Everything here operates on tightly packed rows unless noted otherwise.
//! Pixel-sized views are taken with `bytemuck` so per-pixel operations work
//! on `[u8; 4]` instead of manual index arithmetic.

use super::types::PixelLayout;

type Pixel = [u8; 4];

fn pixels_mut(buf: &mut [u8]) -> &mut [Pixel] {
    let whole = buf.len() - buf.len() % 4;
    bytemuck::cast_slice_mut(&mut buf[..whole])
}

fn pixels(buf: &[u8]) -> &[Pixel] {
    let whole = buf.len() - buf.len() % 4;
    bytemuck::cast_slice(&buf[..whole])
}

/// Copy `height` rows of `row_bytes` each out of a padded buffer into `out`
///
/// `out` is resized to exactly `row_bytes * height`; its allocation is reused.
pub fn pack_rows_into(src: &[u8], stride: usize, row_bytes: usize, height: usize, out: &mut Vec<u8>) {
    out.resize(row_bytes * height, 0);
    if stride == row_bytes {
        out.copy_from_slice(&src[..row_bytes * height]);
        return;
    }
    for (row, dst) in out.chunks_exact_mut(row_bytes).enumerate() {
        let start = row * stride;
        dst.copy_from_slice(&src[start..start + row_bytes]);
    }
}

/// Mirror a packed frame around its vertical axis, in place
pub fn mirror_horizontal(buf: &mut [u8], width: u32) {
    let width = width as usize;
    if width < 2 {
        return;
    }
    for row in pixels_mut(buf).chunks_exact_mut(width) {
        row.reverse();
    }
}

/// Swap the R and B channels in place (RGBA <-> BGRA)
pub fn swap_red_blue(buf: &mut [u8]) {
    for px in pixels_mut(buf) {
        px.swap(0, 2);
    }
}

/// Drop the alpha channel, producing RGB in R, G, B order
pub fn to_rgb(buf: &[u8], layout: PixelLayout) -> Vec<u8> {
    let src = pixels(buf);
    let mut rgb = Vec::with_capacity(src.len() * 3);
    match layout {
        PixelLayout::Rgba => {
            for px in src {
                rgb.extend_from_slice(&px[..3]);
            }
        }
        PixelLayout::Bgra => {
            for px in src {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
    }
    rgb
}

/// Convert a packed frame to planar I420 (BT.601, studio range)
///
/// Odd widths/heights are handled by rounding the chroma planes up.
pub fn to_i420(buf: &[u8], width: u32, height: u32, layout: PixelLayout) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut out = vec![0u8; w * h + 2 * cw * ch];
    let (y_plane, chroma) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);
    let src = pixels(buf);

    let rgb_at = |x: usize, y: usize| -> (f32, f32, f32) {
        let px = src[y * w + x];
        match layout {
            PixelLayout::Rgba => (px[0] as f32, px[1] as f32, px[2] as f32),
            PixelLayout::Bgra => (px[2] as f32, px[1] as f32, px[0] as f32),
        }
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = rgb_at(x, y);
            y_plane[y * w + x] = (16.0 + 0.257 * r + 0.504 * g + 0.098 * b).clamp(0.0, 255.0) as u8;
        }
    }

    for cy in 0..ch {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0.0, 0.0, 0.0, 0.0);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (x, y) = (cx * 2 + dx, cy * 2 + dy);
                if x < w && y < h {
                    let (pr, pg, pb) = rgb_at(x, y);
                    r += pr;
                    g += pg;
                    b += pb;
                    n += 1.0;
                }
            }
            let (r, g, b) = (r / n, g / n, b / n);
            u_plane[cy * cw + cx] = (128.0 - 0.148 * r - 0.291 * g + 0.439 * b).clamp(0.0, 255.0) as u8;
            v_plane[cy * cw + cx] = (128.0 + 0.439 * r - 0.368 * g - 0.071 * b).clamp(0.0, 255.0) as u8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows_strips_padding() {
        // 2x2 RGBA with 4 bytes of padding per row
        let src = [
            1, 1, 1, 1, 2, 2, 2, 2, 0, 0, 0, 0, //
            3, 3, 3, 3, 4, 4, 4, 4, 0, 0, 0, 0,
        ];
        let mut out = Vec::new();
        pack_rows_into(&src, 12, 8, 2, &mut out);
        assert_eq!(out, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn test_pack_rows_reuses_buffer() {
        let src = vec![7u8; 16];
        let mut out = vec![0u8; 64];
        pack_rows_into(&src, 8, 8, 2, &mut out);
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_mirror_horizontal() {
        let mut buf = vec![
            1, 0, 0, 255, 2, 0, 0, 255, 3, 0, 0, 255, //
            4, 0, 0, 255, 5, 0, 0, 255, 6, 0, 0, 255,
        ];
        mirror_horizontal(&mut buf, 3);
        let firsts: Vec<u8> = buf.chunks(4).map(|p| p[0]).collect();
        assert_eq!(firsts, [3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_swap_red_blue() {
        let mut buf = vec![10, 20, 30, 40];
        swap_red_blue(&mut buf);
        assert_eq!(buf, [30, 20, 10, 40]);
    }

    #[test]
    fn test_to_rgb_from_bgra() {
        assert_eq!(to_rgb(&[30, 20, 10, 255], PixelLayout::Bgra), [10, 20, 30]);
        assert_eq!(to_rgb(&[10, 20, 30, 255], PixelLayout::Rgba), [10, 20, 30]);
    }

    #[test]
    fn test_to_i420_sizes_and_gray() {
        let gray = vec![128u8; 3 * 3 * 4];
        let out = to_i420(&gray, 3, 3, PixelLayout::Rgba);
        assert_eq!(out.len(), 9 + 2 * 4);
        // neutral gray has no chroma
        assert!(out[9..].iter().all(|&c| (127..=129).contains(&c)));
    }
}
