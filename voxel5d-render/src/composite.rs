//! Blending of per-channel index buffers into one ARGB image.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use rayon::prelude::*;
use voxel5d_core::{ColorLut, Error, Result};

/// Opaque black, the starting value of every composited pixel.
pub const OPAQUE_BLACK: u32 = 0xFF00_0000;

/// How a channel's colours enter the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverlayMode {
    /// Saturating per-component addition.
    #[default]
    Sum,
    /// Per-component product normalised by 256, acting as a colour mask.
    Multiply,
}

/// One channel's contribution: display indices, colour table and blend mode.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub indices: &'a [u32],
    pub lut: &'a ColorLut,
    pub mode: OverlayMode,
}

impl<'a> Layer<'a> {
    /// Create a layer.
    #[must_use]
    pub fn new(indices: &'a [u32], lut: &'a ColorLut, mode: OverlayMode) -> Self {
        Self { indices, lut, mode }
    }
}

#[inline]
fn unpack(argb: u32) -> [u32; 3] {
    [(argb >> 16) & 0xFF, (argb >> 8) & 0xFF, argb & 0xFF]
}

#[inline]
fn pack(rgb: [u32; 3]) -> u32 {
    OPAQUE_BLACK | (rgb[0] << 16) | (rgb[1] << 8) | rgb[2]
}

#[inline]
fn blend(pixel: u32, color: [u8; 3], mode: OverlayMode) -> u32 {
    let current = unpack(pixel);
    let mut out = [0u32; 3];
    for c in 0..3 {
        let col = u32::from(color[c]);
        out[c] = match mode {
            OverlayMode::Sum => (current[c] + col).min(255),
            OverlayMode::Multiply => (current[c] * col) >> 8,
        };
    }
    pack(out)
}

/// Blend `layers` into a `width x height` ARGB buffer.
///
/// The buffer starts opaque black. All `Sum` layers are added first, then all
/// `Multiply` layers are applied as masks. Every index, including 0, is looked
/// up in its layer's table.
///
/// # Errors
/// Returns [`Error::ConfigError`] when a layer's buffer does not hold `width * height` indices.
pub fn composite(width: usize, height: usize, layers: &[Layer<'_>]) -> Result<Vec<u32>> {
    let n = width * height;
    if let Some(bad) = layers.iter().find(|l| l.indices.len() != n) {
        return Err(Error::ConfigError(format!(
            "layer holds {} pixels, image needs {n}",
            bad.indices.len()
        )));
    }
    let mut out = vec![OPAQUE_BLACK; n];
    if width == 0 {
        return Ok(out);
    }
    let ordered: Vec<&Layer<'_>> = layers
        .iter()
        .filter(|l| l.mode == OverlayMode::Sum)
        .chain(layers.iter().filter(|l| l.mode == OverlayMode::Multiply))
        .collect();

    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, pixels)| {
            let start = row * width;
            for layer in &ordered {
                let indices = &layer.indices[start..start + width];
                for (px, &index) in pixels.iter_mut().zip(indices) {
                    let color = layer.lut.color_of(index as usize);
                    *px = blend(*px, color, layer.mode);
                }
            }
        });
    Ok(out)
}

/// Convert an ARGB buffer to packed RGB bytes (as used by PPM output).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_rgb_bytes(argb: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(argb.len() * 3);
    for &px in argb {
        let [r, g, b] = unpack(px);
        bytes.extend_from_slice(&[r as u8, g as u8, b as u8]);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel5d_core::{ColorModel, ColormapRegistry};

    #[test]
    fn test_single_sum_layer_is_identity() {
        let lut = ColorLut::new(ColorModel::Rainbow, 0.0, 255.0);
        let indices: Vec<u32> = (0..256).collect();
        let out = composite(16, 16, &[Layer::new(&indices, &lut, OverlayMode::Sum)]).unwrap();
        for (i, px) in out.iter().enumerate() {
            assert_eq!(*px, OPAQUE_BLACK | lut.packed(i));
        }
    }

    #[test]
    fn test_sum_saturates_per_component() {
        let red = ColorLut::new(ColorModel::Red, 0.0, 255.0);
        let gray = ColorLut::new(ColorModel::Gray, 0.0, 255.0);
        let a = vec![255u32; 4];
        let b = vec![128u32; 4];
        let out = composite(
            2,
            2,
            &[
                Layer::new(&a, &red, OverlayMode::Sum),
                Layer::new(&b, &gray, OverlayMode::Sum),
            ],
        )
        .unwrap();
        let [_, g, bl] = gray.color_of(128);
        assert_eq!(out[0], pack([255, u32::from(g), u32::from(bl)]));
    }

    #[test]
    fn test_multiply_masks_after_sums() {
        let gray = ColorLut::new(ColorModel::Gray, 0.0, 255.0);
        let white = vec![255u32; 2];
        let zero = vec![0u32; 2];
        // mask listed first still applies after the sum layer
        let out = composite(
            2,
            1,
            &[
                Layer::new(&zero, &gray, OverlayMode::Multiply),
                Layer::new(&white, &gray, OverlayMode::Sum),
            ],
        )
        .unwrap();
        assert_eq!(out, vec![OPAQUE_BLACK; 2]);

        let out = composite(
            2,
            1,
            &[
                Layer::new(&white, &gray, OverlayMode::Sum),
                Layer::new(&white, &gray, OverlayMode::Multiply),
            ],
        )
        .unwrap();
        assert_eq!(out[0], pack([254, 254, 254]));
    }

    #[test]
    fn test_index_zero_uses_underflow_colour() {
        let mut lut = ColorLut::new(ColorModel::Gray, 0.0, 255.0);
        lut.set_show_over_under(true, &ColormapRegistry::default());
        let zero = vec![0u32; 1];
        let out = composite(1, 1, &[Layer::new(&zero, &lut, OverlayMode::Sum)]).unwrap();
        assert_eq!(out[0], OPAQUE_BLACK | 0x0000FF);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let lut = ColorLut::default();
        let short = vec![0u32; 3];
        assert!(composite(2, 2, &[Layer::new(&short, &lut, OverlayMode::Sum)]).is_err());
    }

    #[test]
    fn test_rgb_bytes() {
        assert_eq!(to_rgb_bytes(&[0xFF12_3456]), vec![0x12, 0x34, 0x56]);
    }
}
