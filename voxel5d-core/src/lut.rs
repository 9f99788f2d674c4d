//! Colour lookup tables and the user colormap registry.
//!
//! A channel's display mapping is the composition of two windows:
//! 1. the calibrated data window (`full_remap`), which sets the volume's
//!    raw-to-index scaling and requires recomputing slices and projections;
//! 2. the table sub-window (`adjust_window`), which only re-stretches the
//!    colour table over `[low_index, high_index]`.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{f64_to_u8, usize_to_f64};

/// Number of entries in every colour table.
pub const TABLE_SIZE: usize = 256;

/// Number of built-in colour models.
pub const BUILTIN_MODELS: usize = 13;

/// Colour shown at index 0 when over/underflow display is enabled.
pub const UNDERFLOW_COLOR: [u8; 3] = [0, 0, 255];

/// Colour shown at the last index when over/underflow display is enabled.
pub const OVERFLOW_COLOR: [u8; 3] = [255, 0, 0];

/// Colour model of a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColorModel {
    #[default]
    Gray,
    Red,
    Green,
    Blue,
    Violet,
    /// Red, then green, then blue, each ramping over one third.
    GlowRed,
    /// Green, then red, then blue.
    GlowGreen,
    /// Blue, then green, then red.
    GlowBlue,
    /// Blue, then red, then green.
    GlowViolet,
    /// Green, then blue, then red.
    GlowCyan,
    /// Three phase-shifted triangle waves.
    Rainbow,
    /// Deterministic per-index random colours.
    Random,
    /// Blue, green, red in three hard-edged bands.
    Bands,
    /// Entry of the session's [`ColormapRegistry`].
    User(usize),
}

impl ColorModel {
    /// Built-in models in index order.
    pub const BUILTIN: [ColorModel; BUILTIN_MODELS] = [
        ColorModel::Gray,
        ColorModel::Red,
        ColorModel::Green,
        ColorModel::Blue,
        ColorModel::Violet,
        ColorModel::GlowRed,
        ColorModel::GlowGreen,
        ColorModel::GlowBlue,
        ColorModel::GlowViolet,
        ColorModel::GlowCyan,
        ColorModel::Rainbow,
        ColorModel::Random,
        ColorModel::Bands,
    ];

    /// Model for a global index (built-ins first, then user tables).
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        if index < BUILTIN_MODELS {
            Self::BUILTIN[index]
        } else {
            ColorModel::User(index - BUILTIN_MODELS)
        }
    }

    /// Global index of this model.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            ColorModel::User(i) => BUILTIN_MODELS + i,
            builtin => Self::BUILTIN
                .iter()
                .position(|m| *m == builtin)
                .unwrap_or(0),
        }
    }

    /// Index 0 of these families is always black.
    #[must_use]
    fn black_at_zero(self) -> bool {
        matches!(
            self,
            ColorModel::Rainbow | ColorModel::Random | ColorModel::Bands
        )
    }

    /// Analytic colour at normalised position `t` in [0, 1].
    fn builtin_color(self, t: f64, index: usize) -> [f64; 3] {
        let glow = |order: [usize; 3]| {
            let mut rgb = [0.0; 3];
            for (third, &channel) in order.iter().enumerate() {
                rgb[channel] = (3.0 * t - usize_to_f64(third)).clamp(0.0, 1.0);
            }
            rgb
        };
        match self {
            ColorModel::Gray | ColorModel::User(_) => [t, t, t],
            ColorModel::Red => [t, 0.0, 0.0],
            ColorModel::Green => [0.0, t, 0.0],
            ColorModel::Blue => [0.0, 0.0, t],
            ColorModel::Violet => [t, 0.0, t],
            ColorModel::GlowRed => glow([0, 1, 2]),
            ColorModel::GlowGreen => glow([1, 0, 2]),
            ColorModel::GlowBlue => glow([2, 1, 0]),
            ColorModel::GlowViolet => glow([2, 0, 1]),
            ColorModel::GlowCyan => glow([1, 2, 0]),
            ColorModel::Rainbow => {
                let tri = |phase: f64| (1.5 - (4.0 * t - phase).abs()).clamp(0.0, 1.0);
                [tri(3.0), tri(2.0), tri(1.0)]
            }
            ColorModel::Random => {
                let bits = splitmix64(index as u64);
                [
                    f64::from((bits >> 16) as u8) / 255.0,
                    f64::from((bits >> 8) as u8) / 255.0,
                    f64::from(bits as u8) / 255.0,
                ]
            }
            ColorModel::Bands => {
                if t < 1.0 / 3.0 {
                    [0.0, 0.0, 1.0]
                } else if t < 2.0 / 3.0 {
                    [0.0, 1.0, 0.0]
                } else {
                    [1.0, 0.0, 0.0]
                }
            }
        }
    }
}

impl std::fmt::Display for ColorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorModel::Gray => write!(f, "Gray"),
            ColorModel::Red => write!(f, "Red"),
            ColorModel::Green => write!(f, "Green"),
            ColorModel::Blue => write!(f, "Blue"),
            ColorModel::Violet => write!(f, "Violet"),
            ColorModel::GlowRed => write!(f, "Glow Red"),
            ColorModel::GlowGreen => write!(f, "Glow Green"),
            ColorModel::GlowBlue => write!(f, "Glow Blue"),
            ColorModel::GlowViolet => write!(f, "Glow Violet"),
            ColorModel::GlowCyan => write!(f, "Glow Cyan"),
            ColorModel::Rainbow => write!(f, "Rainbow"),
            ColorModel::Random => write!(f, "Random"),
            ColorModel::Bands => write!(f, "Bands"),
            ColorModel::User(i) => write!(f, "User {i}"),
        }
    }
}

/// Seed-0 splitmix64 step keyed by the table index.
#[allow(clippy::unreadable_literal)]
fn splitmix64(index: u64) -> u64 {
    let mut z = index.wrapping_add(1).wrapping_mul(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// A user-supplied colour table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserTable {
    pub name: String,
    pub red: Vec<u8>,
    pub green: Vec<u8>,
    pub blue: Vec<u8>,
}

/// Append-only registry of user colour tables, owned by a display session.
#[derive(Debug, Clone, Default)]
pub struct ColormapRegistry {
    tables: Vec<UserTable>,
}

impl ColormapRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table and return its model.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] unless all three channels hold `TABLE_SIZE` entries.
    pub fn register(&mut self, table: UserTable) -> Result<ColorModel> {
        if table.red.len() != TABLE_SIZE
            || table.green.len() != TABLE_SIZE
            || table.blue.len() != TABLE_SIZE
        {
            return Err(Error::ConfigError(format!(
                "colour table '{}' must have {TABLE_SIZE} entries per channel",
                table.name
            )));
        }
        log::info!("registered colour table '{}'", table.name);
        self.tables.push(table);
        Ok(ColorModel::User(self.tables.len() - 1))
    }

    /// User table by registry index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&UserTable> {
        self.tables.get(index)
    }

    /// Number of user tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no user table was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of selectable models (built-ins plus user tables).
    #[must_use]
    pub fn model_count(&self) -> usize {
        BUILTIN_MODELS + self.tables.len()
    }
}

/// Per-channel colour lookup table with its thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorLut {
    model: ColorModel,
    low_index: f64,
    high_index: f64,
    invert: bool,
    log_scale: bool,
    show_over_under: bool,
    data_min: f64,
    data_max: f64,
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
}

impl Default for ColorLut {
    fn default() -> Self {
        Self::new(ColorModel::Gray, 0.0, 255.0)
    }
}

impl ColorLut {
    /// Create a table over the calibrated data window `[data_min, data_max]`.
    ///
    /// User models are rendered as gray until [`ColorLut::compute_table`] is
    /// called with the registry.
    #[must_use]
    pub fn new(model: ColorModel, data_min: f64, data_max: f64) -> Self {
        let mut lut = Self {
            model,
            low_index: 0.0,
            high_index: usize_to_f64(TABLE_SIZE - 1),
            invert: false,
            log_scale: false,
            show_over_under: false,
            data_min,
            data_max,
            red: vec![0; TABLE_SIZE],
            green: vec![0; TABLE_SIZE],
            blue: vec![0; TABLE_SIZE],
        };
        lut.compute_table(&ColormapRegistry::default());
        lut
    }

    /// Colour model.
    #[must_use]
    pub fn model(&self) -> ColorModel {
        self.model
    }

    /// Select a colour model and rebuild the table.
    pub fn set_model(&mut self, model: ColorModel, registry: &ColormapRegistry) {
        self.model = model;
        self.compute_table(registry);
    }

    /// Set the invert flag and rebuild the table.
    pub fn set_invert(&mut self, invert: bool, registry: &ColormapRegistry) {
        self.invert = invert;
        self.compute_table(registry);
    }

    /// Set logarithmic scaling and rebuild the table.
    pub fn set_log_scale(&mut self, log_scale: bool, registry: &ColormapRegistry) {
        self.log_scale = log_scale;
        self.compute_table(registry);
    }

    /// Enable the fixed under/overflow colours and rebuild the table.
    pub fn set_show_over_under(&mut self, show: bool, registry: &ColormapRegistry) {
        self.show_over_under = show;
        self.compute_table(registry);
    }

    /// Invert flag.
    #[must_use]
    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Log-scale flag.
    #[must_use]
    pub fn log_scale(&self) -> bool {
        self.log_scale
    }

    /// Over/underflow flag.
    #[must_use]
    pub fn show_over_under(&self) -> bool {
        self.show_over_under
    }

    /// Calibrated data window.
    #[must_use]
    pub fn data_window(&self) -> (f64, f64) {
        (self.data_min, self.data_max)
    }

    /// Table sub-window in index units.
    #[must_use]
    pub fn table_window(&self) -> (f64, f64) {
        (self.low_index, self.high_index)
    }

    /// Recompute the R/G/B arrays from the model, sub-window and flags.
    pub fn compute_table(&mut self, registry: &ColormapRegistry) {
        let n = TABLE_SIZE;
        let gain = usize_to_f64(n);
        let top = usize_to_f64(n - 1);
        let user = match self.model {
            ColorModel::User(i) => registry.get(i),
            _ => None,
        };
        for i in 0..n {
            let fi = usize_to_f64(i);
            let width = self.high_index - self.low_index;
            let mut t = if width > 0.0 {
                ((fi - self.low_index) / width).clamp(0.0, 1.0)
            } else if fi >= self.low_index {
                1.0
            } else {
                0.0
            };
            if self.log_scale {
                t = (gain * t + 1.0).ln() / (gain + 1.0).ln();
            }
            let mut rgb = if let Some(table) = user {
                let j = crate::util::f64_to_index_clamped((t * top).round(), n);
                [table.red[j], table.green[j], table.blue[j]]
            } else {
                let entry = crate::util::f64_to_index_clamped((t * top).round(), n);
                self.model
                    .builtin_color(t, entry)
                    .map(|c| f64_to_u8(c * 255.0))
            };
            if i == 0 && self.model.black_at_zero() {
                rgb = [0, 0, 0];
            }
            if self.invert {
                rgb = rgb.map(|c| 255 - c);
            }
            self.red[i] = rgb[0];
            self.green[i] = rgb[1];
            self.blue[i] = rgb[2];
        }
        if self.show_over_under {
            self.write_entry(0, UNDERFLOW_COLOR);
            self.write_entry(n - 1, OVERFLOW_COLOR);
        }
    }

    fn write_entry(&mut self, index: usize, rgb: [u8; 3]) {
        self.red[index] = rgb[0];
        self.green[index] = rgb[1];
        self.blue[index] = rgb[2];
    }

    /// Cheap threshold change: stretch the table over a fraction of the index range.
    ///
    /// Fractions are clamped into [0, 1] and swapped if reversed.
    pub fn adjust_window(&mut self, low_frac: f64, high_frac: f64, registry: &ColormapRegistry) {
        let top = usize_to_f64(TABLE_SIZE - 1);
        let (a, b) = (low_frac.clamp(0.0, 1.0), high_frac.clamp(0.0, 1.0));
        self.low_index = a.min(b) * top;
        self.high_index = a.max(b) * top;
        self.compute_table(registry);
    }

    /// Expensive threshold change: remap the calibrated data window and reset
    /// the table sub-window to the full range.
    ///
    /// The owner must push the new window into the volume (see
    /// [`ColorLut::raw_window`]) and recompute that channel's slices.
    pub fn full_remap(&mut self, min: f64, max: f64, registry: &ColormapRegistry) {
        self.data_min = min;
        self.data_max = max;
        self.low_index = 0.0;
        self.high_index = usize_to_f64(TABLE_SIZE - 1);
        self.compute_table(registry);
    }

    /// Data window converted to raw units with the given calibration.
    #[must_use]
    pub fn raw_window(&self, calibration: &crate::volume::Calibration) -> (f64, f64) {
        (
            calibration.uncalibrate(self.data_min),
            calibration.uncalibrate(self.data_max),
        )
    }

    /// Calibrated thresholds actually in effect (data window composed with the sub-window).
    #[must_use]
    pub fn effective_thresholds(&self) -> (f64, f64) {
        let per_index = (self.data_max - self.data_min) / usize_to_f64(TABLE_SIZE);
        (
            self.data_min + self.low_index * per_index,
            self.data_min + self.high_index * per_index,
        )
    }

    /// RGB colour of a table entry; indices beyond the table are clamped.
    #[must_use]
    #[inline]
    pub fn color_of(&self, index: usize) -> [u8; 3] {
        let i = index.min(TABLE_SIZE - 1);
        [self.red[i], self.green[i], self.blue[i]]
    }

    /// Packed `0xRRGGBB` colour of a table entry.
    #[must_use]
    #[inline]
    pub fn packed(&self, index: usize) -> u32 {
        let [r, g, b] = self.color_of(index);
        (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lut(model: ColorModel) -> ColorLut {
        ColorLut::new(model, 0.0, 255.0)
    }

    #[test]
    fn test_gray_ramp() {
        let l = lut(ColorModel::Gray);
        assert_eq!(l.color_of(0), [0, 0, 0]);
        assert_eq!(l.color_of(255), [255, 255, 255]);
        assert_eq!(l.color_of(1000), [255, 255, 255]);
        let mid = l.color_of(128)[0];
        assert!(mid > 120 && mid < 136);
    }

    #[test]
    fn test_pure_channels() {
        assert_eq!(lut(ColorModel::Red).color_of(255), [255, 0, 0]);
        assert_eq!(lut(ColorModel::Green).color_of(255), [0, 255, 0]);
        assert_eq!(lut(ColorModel::Blue).color_of(255), [0, 0, 255]);
        assert_eq!(lut(ColorModel::Violet).color_of(255), [255, 0, 255]);
    }

    #[test]
    fn test_glow_thirds() {
        let l = lut(ColorModel::GlowRed);
        // first third: only red rises
        let early = l.color_of(60);
        assert!(early[0] > 0 && early[1] == 0 && early[2] == 0);
        assert_eq!(l.color_of(255), [255, 255, 255]);
    }

    #[test]
    fn test_black_at_zero_families() {
        for model in [ColorModel::Rainbow, ColorModel::Random, ColorModel::Bands] {
            assert_eq!(lut(model).color_of(0), [0, 0, 0]);
        }
    }

    #[test]
    fn test_random_is_deterministic() {
        assert_eq!(lut(ColorModel::Random), lut(ColorModel::Random));
    }

    #[test]
    fn test_invert_and_over_under_precedence() {
        let mut l = lut(ColorModel::Gray);
        let registry = ColormapRegistry::new();
        l.set_invert(true, &registry);
        assert_eq!(l.color_of(0), [255, 255, 255]);
        l.set_show_over_under(true, &registry);
        l.set_log_scale(true, &registry);
        assert_eq!(l.color_of(0), UNDERFLOW_COLOR);
        assert_eq!(l.color_of(TABLE_SIZE - 1), OVERFLOW_COLOR);
    }

    #[test]
    fn test_log_scale_brightens_low_end() {
        let mut l = lut(ColorModel::Gray);
        let linear = l.color_of(16)[0];
        l.set_log_scale(true, &ColormapRegistry::new());
        assert!(l.color_of(16)[0] > linear);
        assert_eq!(l.color_of(255), [255, 255, 255]);
    }

    #[test]
    fn test_adjust_window_vs_full_remap() {
        let registry = ColormapRegistry::new();
        let mut l = ColorLut::new(ColorModel::Gray, 0.0, 512.0);
        l.adjust_window(0.25, 0.5, &registry);
        assert_eq!(l.color_of(60), [0, 0, 0]);
        assert_eq!(l.color_of(200), [255, 255, 255]);
        let (lo, hi) = l.effective_thresholds();
        assert!((lo - 0.25 * 255.0 * 2.0).abs() < 1e-9);
        assert!((hi - 0.5 * 255.0 * 2.0).abs() < 1e-9);
        l.full_remap(10.0, 20.0, &registry);
        assert_eq!(l.table_window(), (0.0, 255.0));
        assert_eq!(l.data_window(), (10.0, 20.0));
    }

    #[test]
    fn test_registry() {
        let mut registry = ColormapRegistry::new();
        let bad = UserTable {
            name: "short".into(),
            red: vec![0; 3],
            green: vec![0; 3],
            blue: vec![0; 3],
        };
        assert!(registry.register(bad).is_err());
        let table = UserTable {
            name: "green ramp".into(),
            red: vec![0; TABLE_SIZE],
            green: (0..=255).collect(),
            blue: vec![7; TABLE_SIZE],
        };
        let model = registry.register(table).unwrap();
        assert_eq!(model, ColorModel::User(0));
        assert_eq!(model.index(), BUILTIN_MODELS);
        assert_eq!(ColorModel::from_index(BUILTIN_MODELS), model);
        assert_eq!(registry.model_count(), BUILTIN_MODELS + 1);
        let mut l = lut(ColorModel::Gray);
        l.set_model(model, &registry);
        assert_eq!(l.color_of(255), [0, 255, 7]);
    }

    #[test]
    fn test_model_index_roundtrip() {
        for i in 0..BUILTIN_MODELS {
            assert_eq!(ColorModel::from_index(i).index(), i);
        }
    }
}
