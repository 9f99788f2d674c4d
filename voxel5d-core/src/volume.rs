//! Typed dense 3D voxel volumes.
//!
//! A [`VoxelVolume`] owns one contiguous buffer of a single [`ValueKind`]
//! together with its calibration, registration offset and display window.
//! Storage is indexed `[z, y, x]` (x fastest), matching the flattened
//! `x + sx * (y + sy * z)` layout.
//!
//! Coordinates handed to the hot-path getters (`get_raw`, `get_calibrated`,
//! `get_display_index`) must be validated with [`VoxelVolume::within_bounds`]
//! first; the `*_clamped` and `*_at_offset` variants never fail.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::many_single_char_names,
    clippy::similar_names
)]

use ndarray::Array3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::kind::{ComplexMode, ValueKind};
use crate::lut::TABLE_SIZE;
use crate::roi::Roi;
use crate::util::{clamp_coord, f64_to_index_clamped, round_to_i64, usize_to_i64};

/// Result of dividing by a zero voxel with a non-zero numerator.
pub const DIVISION_SENTINEL: f64 = 1e32;

/// Typed voxel storage.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    U8(Array3<u8>),
    U16(Array3<u16>),
    I32(Array3<i32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
    /// `[re, im]` pairs.
    Complex64(Array3<[f32; 2]>),
}

impl VoxelData {
    /// Storage kind of this buffer.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            VoxelData::U8(_) => ValueKind::U8,
            VoxelData::U16(_) => ValueKind::U16,
            VoxelData::I32(_) => ValueKind::I32,
            VoxelData::F32(_) => ValueKind::F32,
            VoxelData::F64(_) => ValueKind::F64,
            VoxelData::Complex64(_) => ValueKind::Complex64,
        }
    }

    /// Shape as `[sx, sy, sz]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        let dim = match self {
            VoxelData::U8(a) => a.dim(),
            VoxelData::U16(a) => a.dim(),
            VoxelData::I32(a) => a.dim(),
            VoxelData::F32(a) => a.dim(),
            VoxelData::F64(a) => a.dim(),
            VoxelData::Complex64(a) => a.dim(),
        };
        [dim.2, dim.1, dim.0]
    }

    fn zeros(kind: ValueKind, shape: [usize; 3]) -> Result<Self> {
        Ok(match kind {
            ValueKind::U8 => VoxelData::U8(alloc(shape, 0u8)?),
            ValueKind::U16 => VoxelData::U16(alloc(shape, 0u16)?),
            ValueKind::I32 => VoxelData::I32(alloc(shape, 0i32)?),
            ValueKind::F32 => VoxelData::F32(alloc(shape, 0f32)?),
            ValueKind::F64 => VoxelData::F64(alloc(shape, 0f64)?),
            ValueKind::Complex64 => VoxelData::Complex64(alloc(shape, [0f32; 2])?),
        })
    }
}

/// Element types that can back a [`VoxelVolume`].
pub trait Voxel: Copy + Send + Sync + 'static {
    /// Storage kind for this element type.
    const KIND: ValueKind;

    /// Wrap a typed array into [`VoxelData`].
    fn into_data(data: Array3<Self>) -> VoxelData;
}

macro_rules! impl_voxel {
    ($t:ty, $variant:ident) => {
        impl Voxel for $t {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_data(data: Array3<Self>) -> VoxelData {
                VoxelData::$variant(data)
            }
        }
    };
}

impl_voxel!(u8, U8);
impl_voxel!(u16, U16);
impl_voxel!(i32, I32);
impl_voxel!(f32, F32);
impl_voxel!(f64, F64);
impl_voxel!([f32; 2], Complex64);

fn voxel_count(shape: [usize; 3]) -> Result<usize> {
    let n = shape
        .iter()
        .try_fold(1usize, |acc, &s| acc.checked_mul(s))
        .ok_or(Error::InvalidShape(shape))?;
    if n == 0 {
        return Err(Error::InvalidShape(shape));
    }
    Ok(n)
}

fn alloc<T: Clone>(shape: [usize; 3], fill: T) -> Result<Array3<T>> {
    let n = voxel_count(shape)?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(n)
        .map_err(|_| Error::ResourceExhausted {
            bytes: n.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buffer.resize(n, fill);
    Array3::from_shape_vec((shape[2], shape[1], shape[0]), buffer)
        .map_err(|_| Error::InvalidShape(shape))
}

/// Affine calibration of the five axes and of the voxel values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Calibration {
    /// Per-axis scale (X, Y, Z, Channel, Time).
    pub scales: [f64; 5],
    /// Per-axis offset (X, Y, Z, Channel, Time).
    pub offsets: [f64; 5],
    /// Raw to calibrated value scale.
    pub value_scale: f64,
    /// Raw to calibrated value offset.
    pub value_offset: f64,
    pub axis_names: [String; 5],
    pub axis_units: [String; 5],
    pub value_name: String,
    pub value_unit: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scales: [1.0; 5],
            offsets: [0.0; 5],
            value_scale: 1.0,
            value_offset: 0.0,
            axis_names: ["X", "Y", "Z", "Channel", "Time"].map(String::from),
            axis_units: ["pixels", "pixels", "pixels", "channel", "frame"].map(String::from),
            value_name: "intensity".to_string(),
            value_unit: "a.u.".to_string(),
        }
    }
}

impl Calibration {
    /// Set the scale and offset of one axis.
    #[must_use]
    pub fn with_axis(mut self, axis: usize, scale: f64, offset: f64) -> Self {
        if axis < 5 {
            self.scales[axis] = scale;
            self.offsets[axis] = offset;
        }
        self
    }

    /// Set the value scale and offset.
    #[must_use]
    pub fn with_value(mut self, scale: f64, offset: f64) -> Self {
        self.value_scale = scale;
        self.value_offset = offset;
        self
    }

    /// Set the value name and unit.
    #[must_use]
    pub fn with_value_label(mut self, name: &str, unit: &str) -> Self {
        self.value_name = name.to_string();
        self.value_unit = unit.to_string();
        self
    }

    /// Raw value to calibrated value.
    #[must_use]
    #[inline]
    pub fn calibrate(&self, raw: f64) -> f64 {
        raw * self.value_scale + self.value_offset
    }

    /// Calibrated value back to raw. A zero value scale maps to the offset-free value.
    #[must_use]
    #[inline]
    pub fn uncalibrate(&self, value: f64) -> f64 {
        if self.value_scale == 0.0 {
            value - self.value_offset
        } else {
            (value - self.value_offset) / self.value_scale
        }
    }

    /// Voxel coordinate along `axis` to world units.
    #[must_use]
    #[inline]
    pub fn to_world(&self, axis: usize, coord: f64) -> f64 {
        coord * self.scales[axis] + self.offsets[axis]
    }
}

/// Raw to display-index mapping: `clamp((raw - low) * scale, 0, levels - 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisplayWindow {
    /// Raw value mapped to index 0.
    pub low: f64,
    /// Index units per raw unit.
    pub scale: f64,
    /// Number of table entries.
    pub levels: usize,
}

impl Default for DisplayWindow {
    fn default() -> Self {
        Self::from_range(0.0, 255.0, TABLE_SIZE)
    }
}

impl DisplayWindow {
    /// Window spanning `[low, high]` raw units over `levels` indices.
    ///
    /// A zero-width window maps everything to index 0.
    #[must_use]
    pub fn from_range(low: f64, high: f64, levels: usize) -> Self {
        let width = high - low;
        let scale = if width == 0.0 || !width.is_finite() {
            0.0
        } else {
            crate::util::usize_to_f64(levels) / width
        };
        Self { low, scale, levels }
    }

    /// Upper raw value of the window.
    #[must_use]
    pub fn high(&self) -> f64 {
        if self.scale == 0.0 {
            self.low
        } else {
            self.low + crate::util::usize_to_f64(self.levels) / self.scale
        }
    }

    /// Display index of a raw value.
    #[must_use]
    #[inline]
    pub fn index(&self, raw: f64) -> usize {
        f64_to_index_clamped((raw - self.low) * self.scale, self.levels)
    }
}

/// Elementwise arithmetic operation between two volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    /// Apply to two calibrated values.
    ///
    /// Division defines `0 / 0 = 0` and `x / 0 = DIVISION_SENTINEL`.
    #[must_use]
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => {
                if b != 0.0 {
                    a / b
                } else if a == 0.0 {
                    0.0
                } else {
                    DIVISION_SENTINEL
                }
            }
        }
    }
}

/// Gaussian variance for a full width at half maximum: `(fwhm/2)^2 / ln 2`.
fn gaussian_sigma2(fwhm: f64) -> f64 {
    (fwhm / 2.0) * (fwhm / 2.0) / std::f64::consts::LN_2
}

#[inline]
fn gaussian_weight(r2: f64, sigma2: f64) -> f64 {
    if sigma2 > 0.0 {
        (-r2 / sigma2).exp()
    } else if r2 == 0.0 {
        1.0
    } else {
        0.0
    }
}

/// A typed dense 3D volume with calibration and registration offset.
#[derive(Debug, Clone)]
pub struct VoxelVolume {
    shape: [usize; 3],
    data: VoxelData,
    calibration: Calibration,
    display_offset: [i64; 3],
    window: DisplayWindow,
    complex_mode: ComplexMode,
    min_raw: f64,
    max_raw: f64,
}

impl VoxelVolume {
    /// Allocate a zero-filled volume.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] for empty shapes and
    /// [`Error::ResourceExhausted`] when the buffer cannot be allocated.
    pub fn new(kind: ValueKind, shape: [usize; 3]) -> Result<Self> {
        let data = VoxelData::zeros(kind, shape)?;
        Ok(Self::with_data(shape, data))
    }

    /// Wrap a flat buffer in `x + sx * (y + sy * z)` order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] if the buffer length does not match the shape.
    pub fn from_vec<T: Voxel>(shape: [usize; 3], values: Vec<T>) -> Result<Self> {
        let n = voxel_count(shape)?;
        if values.len() != n {
            return Err(Error::InvalidShape(shape));
        }
        let array = Array3::from_shape_vec((shape[2], shape[1], shape[0]), values)
            .map_err(|_| Error::InvalidShape(shape))?;
        let mut volume = Self::with_data(shape, T::into_data(array));
        volume.recompute_min_max();
        Ok(volume)
    }

    fn with_data(shape: [usize; 3], data: VoxelData) -> Self {
        let kind = data.kind();
        Self {
            shape,
            data,
            calibration: Calibration::default(),
            display_offset: [0; 3],
            window: DisplayWindow::from_range(0.0, kind.default_window_max(), TABLE_SIZE),
            complex_mode: ComplexMode::default(),
            min_raw: 0.0,
            max_raw: 0.0,
        }
    }

    /// Allocate an empty volume of the same kind, shape, calibration and window.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] when the buffer cannot be allocated.
    pub fn empty_like(&self) -> Result<Self> {
        let mut volume = Self::new(self.kind(), self.shape)?;
        volume.calibration = self.calibration.clone();
        volume.window = self.window;
        volume.complex_mode = self.complex_mode;
        Ok(volume)
    }

    /// Shape as `[sx, sy, sz]`.
    #[must_use]
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// Volumes always hold at least one voxel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Storage kind.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.data.kind()
    }

    /// Typed storage.
    #[must_use]
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    /// Calibration.
    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Replace the calibration.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Mutable calibration.
    pub fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    /// Registration shift applied at read time.
    #[must_use]
    #[inline]
    pub fn display_offset(&self) -> [i64; 3] {
        self.display_offset
    }

    /// Set the registration shift. Storage is never resampled.
    pub fn set_display_offset(&mut self, offset: [i64; 3]) {
        self.display_offset = offset;
    }

    /// Display window.
    #[must_use]
    #[inline]
    pub fn window(&self) -> &DisplayWindow {
        &self.window
    }

    /// Set the display window to `[low, high]` raw units over `levels` indices.
    pub fn set_display_window(&mut self, low: f64, high: f64, levels: usize) {
        self.window = DisplayWindow::from_range(low, high, levels);
    }

    /// Complex read mode.
    #[must_use]
    pub fn complex_mode(&self) -> ComplexMode {
        self.complex_mode
    }

    /// Select which scalar complex storage reports.
    pub fn set_complex_mode(&mut self, mode: ComplexMode) {
        self.complex_mode = mode;
    }

    /// Whether `(x, y, z)` addresses a voxel.
    #[must_use]
    #[inline]
    pub fn within_bounds(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && x < usize_to_i64(self.shape[0])
            && y < usize_to_i64(self.shape[1])
            && z < usize_to_i64(self.shape[2])
    }

    /// Raw value at an in-bounds voxel.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    #[must_use]
    #[inline]
    pub fn get_raw(&self, x: usize, y: usize, z: usize) -> f64 {
        let idx = [z, y, x];
        match &self.data {
            VoxelData::U8(a) => f64::from(a[idx]),
            VoxelData::U16(a) => f64::from(a[idx]),
            VoxelData::I32(a) => f64::from(a[idx]),
            VoxelData::F32(a) => f64::from(a[idx]),
            VoxelData::F64(a) => a[idx],
            VoxelData::Complex64(a) => {
                let [re, im] = a[idx];
                self.complex_mode.select(re, im)
            }
        }
    }

    /// Store a raw value, clamped into the kind's range.
    ///
    /// Complex storage receives the value as its real part.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    #[inline]
    pub fn set_raw(&mut self, x: usize, y: usize, z: usize, value: f64) {
        let idx = [z, y, x];
        let v = self.kind().clamp(value);
        match &mut self.data {
            VoxelData::U8(a) => a[idx] = v as u8,
            VoxelData::U16(a) => a[idx] = v as u16,
            VoxelData::I32(a) => a[idx] = v as i32,
            VoxelData::F32(a) => a[idx] = v as f32,
            VoxelData::F64(a) => a[idx] = v,
            VoxelData::Complex64(a) => a[idx] = [v as f32, 0.0],
        }
    }

    /// Store a complex pair.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] for non-complex storage.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    pub fn set_complex(&mut self, x: usize, y: usize, z: usize, re: f32, im: f32) -> Result<()> {
        match &mut self.data {
            VoxelData::Complex64(a) => {
                a[[z, y, x]] = [re, im];
                Ok(())
            }
            other => Err(Error::UnsupportedConversion {
                kind: other.kind(),
                operation: "store complex value",
            }),
        }
    }

    /// Raw value with each coordinate clamped to the nearest valid voxel.
    #[must_use]
    #[inline]
    pub fn get_raw_clamped(&self, x: i64, y: i64, z: i64) -> f64 {
        self.get_raw(
            clamp_coord(x, self.shape[0]),
            clamp_coord(y, self.shape[1]),
            clamp_coord(z, self.shape[2]),
        )
    }

    /// Calibrated value `raw * value_scale + value_offset`.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    #[must_use]
    #[inline]
    pub fn get_calibrated(&self, x: usize, y: usize, z: usize) -> f64 {
        self.calibration.calibrate(self.get_raw(x, y, z))
    }

    /// Display index of an in-bounds voxel.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    #[must_use]
    #[inline]
    pub fn get_display_index(&self, x: usize, y: usize, z: usize) -> usize {
        self.window.index(self.get_raw(x, y, z))
    }

    /// Position inside this volume of a voxel addressed in a frame registered
    /// with `reference_offset`.
    #[must_use]
    #[inline]
    pub fn registered(&self, x: i64, y: i64, z: i64, reference_offset: [i64; 3]) -> [i64; 3] {
        [
            x - self.display_offset[0] + reference_offset[0],
            y - self.display_offset[1] + reference_offset[1],
            z - self.display_offset[2] + reference_offset[2],
        ]
    }

    /// Calibrated value at `(coord - own offset + reference offset)`, clamped to bounds.
    #[must_use]
    pub fn value_at_offset(&self, x: i64, y: i64, z: i64, reference_offset: [i64; 3]) -> f64 {
        let [px, py, pz] = self.registered(x, y, z, reference_offset);
        self.calibration.calibrate(self.get_raw_clamped(px, py, pz))
    }

    /// Display index at a registered position, `None` outside the volume.
    #[must_use]
    #[inline]
    pub fn display_index_at_offset(
        &self,
        x: i64,
        y: i64,
        z: i64,
        reference_offset: [i64; 3],
    ) -> Option<usize> {
        let [px, py, pz] = self.registered(x, y, z, reference_offset);
        if self.within_bounds(px, py, pz) {
            Some(self.get_display_index(px as usize, py as usize, pz as usize))
        } else {
            None
        }
    }

    /// Cached minimum raw value.
    #[must_use]
    pub fn min_raw(&self) -> f64 {
        self.min_raw
    }

    /// Cached maximum raw value.
    #[must_use]
    pub fn max_raw(&self) -> f64 {
        self.max_raw
    }

    /// Calibrated `(min, max)` from the cache, ordered even for negative value scales.
    #[must_use]
    pub fn calibrated_range(&self) -> (f64, f64) {
        let a = self.calibration.calibrate(self.min_raw);
        let b = self.calibration.calibrate(self.max_raw);
        (a.min(b), a.max(b))
    }

    /// Rescan the buffer and refresh the cached raw min/max.
    pub fn recompute_min_max(&mut self) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        self.for_each_voxel(|_, _, _, v| {
            lo = lo.min(v);
            hi = hi.max(v);
        });
        self.min_raw = lo;
        self.max_raw = hi;
    }

    /// Visit every voxel in storage order with its raw value.
    pub fn for_each_voxel<F: FnMut(usize, usize, usize, f64)>(&self, mut f: F) {
        let [sx, sy, sz] = self.shape;
        for z in 0..sz {
            for y in 0..sy {
                for x in 0..sx {
                    f(x, y, z, self.get_raw(x, y, z));
                }
            }
        }
    }

    /// Elementwise calibrated arithmetic against a same-shape volume.
    ///
    /// The result is written back through the inverse calibration and
    /// clamped into the storage kind.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] for differing shapes and
    /// [`Error::UnsupportedConversion`] for complex storage.
    pub fn combine(&mut self, other: &VoxelVolume, op: ArithOp) -> Result<()> {
        if other.shape != self.shape {
            return Err(Error::ShapeMismatch {
                expected: self.shape,
                found: other.shape,
            });
        }
        if self.kind() == ValueKind::Complex64 {
            return Err(Error::UnsupportedConversion {
                kind: ValueKind::Complex64,
                operation: "elementwise arithmetic",
            });
        }
        let [sx, sy, sz] = self.shape;
        for z in 0..sz {
            for y in 0..sy {
                for x in 0..sx {
                    let a = self.get_calibrated(x, y, z);
                    let b = other.get_calibrated(x, y, z);
                    let raw = self.calibration.uncalibrate(op.apply(a, b));
                    self.set_raw(x, y, z, raw);
                }
            }
        }
        self.recompute_min_max();
        Ok(())
    }

    /// `self += other` on calibrated values.
    ///
    /// # Errors
    /// See [`VoxelVolume::combine`].
    pub fn add(&mut self, other: &VoxelVolume) -> Result<()> {
        self.combine(other, ArithOp::Add)
    }

    /// `self -= other` on calibrated values.
    ///
    /// # Errors
    /// See [`VoxelVolume::combine`].
    pub fn sub(&mut self, other: &VoxelVolume) -> Result<()> {
        self.combine(other, ArithOp::Sub)
    }

    /// `self *= other` on calibrated values.
    ///
    /// # Errors
    /// See [`VoxelVolume::combine`].
    pub fn mul(&mut self, other: &VoxelVolume) -> Result<()> {
        self.combine(other, ArithOp::Mul)
    }

    /// `self /= other` on calibrated values, never producing NaN or Inf.
    ///
    /// # Errors
    /// See [`VoxelVolume::combine`].
    pub fn div(&mut self, other: &VoxelVolume) -> Result<()> {
        self.combine(other, ArithOp::Div)
    }

    /// Clipped box `[lo, hi]` of half-widths around the rounded `center`.
    #[must_use]
    pub fn clipped_box(&self, center: [f64; 3], half_widths: [usize; 3]) -> ([usize; 3], [usize; 3]) {
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for d in 0..3 {
            let c = round_to_i64(center[d]);
            let h = usize_to_i64(half_widths[d]);
            lo[d] = clamp_coord(c - h, self.shape[d]);
            hi[d] = clamp_coord(c + h, self.shape[d]);
        }
        (lo, hi)
    }

    /// Normalisation `1 / sum(exp(-r^2 / sigma^2))` of a Gaussian over the search box.
    #[must_use]
    pub fn int_max_scale(half_widths: [usize; 3], fwhm: f64) -> f64 {
        let sigma2 = gaussian_sigma2(fwhm);
        let [hx, hy, hz] = half_widths.map(usize_to_i64);
        let mut sum = 0.0;
        for dz in -hz..=hz {
            for dy in -hy..=hy {
                for dx in -hx..=hx {
                    let r2 = (dx * dx + dy * dy + dz * dz) as f64;
                    sum += gaussian_weight(r2, sigma2);
                }
            }
        }
        if sum > 0.0 {
            1.0 / sum
        } else {
            1.0
        }
    }

    /// Subtract one isotropic Gaussian spot centred at `center`.
    ///
    /// The background is the minimum raw value of the box. The amplitude is
    /// chosen so that the subtracted profile carries `integral - background * voxels`,
    /// with `integral` in raw units. Returns the amplitude used.
    pub fn subtract_gaussian(
        &mut self,
        center: [f64; 3],
        integral: f64,
        half_widths: [usize; 3],
        fwhm: f64,
    ) -> f64 {
        let (lo, hi) = self.clipped_box(center, half_widths);
        let sigma2 = gaussian_sigma2(fwhm);
        let mut background = f64::INFINITY;
        let mut voxels = 0usize;
        let mut weights = 0.0;
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    background = background.min(self.get_raw(x, y, z));
                    voxels += 1;
                    weights += gaussian_weight(r2_to(center, x, y, z), sigma2);
                }
            }
        }
        if voxels == 0 || weights <= 0.0 {
            return 0.0;
        }
        let amplitude = (integral - background * voxels as f64) / weights;
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let w = gaussian_weight(r2_to(center, x, y, z), sigma2);
                    let v = self.get_raw(x, y, z) - amplitude * w;
                    self.set_raw(x, y, z, v);
                }
            }
        }
        log::debug!(
            "subtracted gaussian at {center:?}: amplitude {amplitude:.3}, background {background:.3}"
        );
        self.recompute_min_max();
        amplitude
    }

    /// Largest calibrated value over in-ROI, gated-in voxels.
    ///
    /// The ROI is tested in the registered frame (`position + display offset`).
    #[must_use]
    pub fn roi_maximum(&self, roi: &Roi, gate: &Gate<'_>) -> Option<f64> {
        self.roi_fold(roi, gate, f64::max)
    }

    /// Smallest calibrated value over in-ROI, gated-in voxels.
    #[must_use]
    pub fn roi_minimum(&self, roi: &Roi, gate: &Gate<'_>) -> Option<f64> {
        self.roi_fold(roi, gate, f64::min)
    }

    fn roi_fold(&self, roi: &Roi, gate: &Gate<'_>, pick: fn(f64, f64) -> f64) -> Option<f64> {
        let mut best: Option<f64> = None;
        self.for_each_admitted(roi, gate, |x, y, z| {
            let v = self.get_calibrated(x, y, z);
            best = Some(best.map_or(v, |b| pick(b, v)));
        });
        best
    }

    /// Visit every voxel that lies in the ROI (registered frame) and passes the gate.
    pub fn for_each_admitted<F: FnMut(usize, usize, usize)>(
        &self,
        roi: &Roi,
        gate: &Gate<'_>,
        mut f: F,
    ) {
        let [ox, oy, oz] = self.display_offset;
        let [sx, sy, sz] = self.shape;
        for z in 0..sz {
            for y in 0..sy {
                for x in 0..sx {
                    let (xi, yi, zi) = (usize_to_i64(x), usize_to_i64(y), usize_to_i64(z));
                    if roi.in_range(xi + ox, yi + oy, zi + oz)
                        && gate.admits(xi, yi, zi, self.display_offset)
                    {
                        f(x, y, z);
                    }
                }
            }
        }
    }

    /// Derive a U8 mask: 1 where in ROI, gated in and `low <= calibrated <= high`.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] when the mask cannot be allocated.
    pub fn threshold_mask(&self, roi: &Roi, gate: &Gate<'_>, low: f64, high: f64) -> Result<Self> {
        let mut mask = VoxelVolume::new(ValueKind::U8, self.shape)?;
        let mut calibration = self.calibration.clone().with_value(1.0, 0.0);
        calibration.value_name = "mask".to_string();
        mask.set_calibration(calibration);
        mask.set_display_offset(self.display_offset);
        mask.set_display_window(0.0, 1.0, TABLE_SIZE);
        self.for_each_admitted(roi, gate, |x, y, z| {
            let v = self.get_calibrated(x, y, z);
            if v >= low && v <= high {
                mask.set_raw(x, y, z, 1.0);
            }
        });
        mask.recompute_min_max();
        Ok(mask)
    }

    /// Float-cast copy keeping calibration, offset and window.
    ///
    /// Complex volumes are reduced through the current read mode.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] when the copy cannot be allocated.
    pub fn to_f32(&self) -> Result<Self> {
        let mut out = VoxelVolume::new(ValueKind::F32, self.shape)?;
        self.for_each_voxel(|x, y, z, v| out.set_raw(x, y, z, v));
        out.calibration = self.calibration.clone();
        out.display_offset = self.display_offset;
        out.window = self.window;
        out.recompute_min_max();
        Ok(out)
    }
}

#[inline]
fn r2_to(center: [f64; 3], x: usize, y: usize, z: usize) -> f64 {
    let dx = x as f64 - center[0];
    let dy = y as f64 - center[1];
    let dz = z as f64 - center[2];
    dx * dx + dy * dy + dz * dz
}
