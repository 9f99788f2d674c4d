//! Display state for a whole volume set.
//!
//! [`DisplaySession`] keeps one [`ChannelDisplay`] per channel next to the
//! [`VolumeSet`] and the session's [`ColormapRegistry`], and keeps them in step
//! when channels or time points are created or deleted.

use std::borrow::Cow;

use voxel5d_core::{
    ArithOp, ColorLut, ColorModel, ColormapRegistry, Error, Result, Roi, UserTable, VolumeSet,
    VoxelVolume, TABLE_SIZE,
};

use crate::composite::{composite, Layer, OverlayMode};
use crate::projector::{ProjectionConfig, ProjectionMode, ProjectionStats, SliceProjector};

/// Colour table, blend mode and projector caches of one channel.
#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    lut: ColorLut,
    overlay: OverlayMode,
    visible: bool,
    projectors: [SliceProjector; 3],
}

impl ChannelDisplay {
    fn for_volume(volume: &VoxelVolume, config: ProjectionConfig) -> Result<Self> {
        let window = volume.window();
        let calibration = volume.calibration();
        let a = calibration.calibrate(window.low);
        let b = calibration.calibrate(window.high());
        Ok(Self {
            lut: ColorLut::new(ColorModel::Gray, a.min(b), a.max(b)),
            overlay: OverlayMode::Sum,
            visible: true,
            projectors: [
                SliceProjector::new(0, config)?,
                SliceProjector::new(1, config)?,
                SliceProjector::new(2, config)?,
            ],
        })
    }

    fn with_lut_of(other: &ChannelDisplay, config: ProjectionConfig) -> Result<Self> {
        Ok(Self {
            lut: other.lut.clone(),
            overlay: other.overlay,
            visible: true,
            projectors: [
                SliceProjector::new(0, config)?,
                SliceProjector::new(1, config)?,
                SliceProjector::new(2, config)?,
            ],
        })
    }

    /// Colour table.
    #[must_use]
    pub fn lut(&self) -> &ColorLut {
        &self.lut
    }

    /// Blend mode in composites.
    #[must_use]
    pub fn overlay(&self) -> OverlayMode {
        self.overlay
    }

    /// Whether the channel takes part in composites.
    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Projector cache for a viewing axis.
    #[must_use]
    pub fn projector(&self, axis: usize) -> Option<&SliceProjector> {
        self.projectors.get(axis)
    }

    fn invalidate(&mut self) {
        for p in &mut self.projectors {
            p.invalidate();
        }
    }
}

fn display_mut(channels: &mut [ChannelDisplay], channel: usize) -> Result<&mut ChannelDisplay> {
    let count = channels.len();
    channels.get_mut(channel).ok_or(Error::ChannelIndex {
        index: channel,
        count,
    })
}

fn projector_mut(
    channels: &mut [ChannelDisplay],
    channel: usize,
    axis: usize,
) -> Result<&mut SliceProjector> {
    display_mut(channels, channel)?
        .projectors
        .get_mut(axis)
        .ok_or_else(|| Error::ConfigError(format!("viewing axis {axis} out of range")))
}

/// A volume set with its per-channel display state and colormap registry.
#[derive(Debug, Clone)]
pub struct DisplaySession {
    volumes: VolumeSet,
    channels: Vec<ChannelDisplay>,
    registry: ColormapRegistry,
    roi: Roi,
    config: ProjectionConfig,
}

impl DisplaySession {
    /// Wrap a volume set; every channel starts gray over its volume's display window.
    ///
    /// # Errors
    /// Propagates projector construction errors.
    pub fn new(volumes: VolumeSet, config: ProjectionConfig) -> Result<Self> {
        let channels = (0..volumes.channels())
            .map(|c| {
                let volume = volumes.volume(c, volumes.active_time())?;
                ChannelDisplay::for_volume(volume, config)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            volumes,
            channels,
            registry: ColormapRegistry::default(),
            roi: Roi::Unconstrained,
            config,
        })
    }

    /// The volume set.
    #[must_use]
    pub fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    /// Mutable volume set; every cached buffer is invalidated.
    pub fn volumes_mut(&mut self) -> &mut VolumeSet {
        self.invalidate_all();
        &mut self.volumes
    }

    /// Display state of a channel.
    #[must_use]
    pub fn channel(&self, channel: usize) -> Option<&ChannelDisplay> {
        self.channels.get(channel)
    }

    /// The session's colormap registry.
    #[must_use]
    pub fn registry(&self) -> &ColormapRegistry {
        &self.registry
    }

    /// Append a user colour table; returns its model.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] when the table has the wrong length.
    pub fn register_colormap(&mut self, table: UserTable) -> Result<ColorModel> {
        self.registry.register(table)
    }

    /// Current ROI.
    #[must_use]
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// Replace the ROI and invalidate every projection.
    pub fn set_roi(&mut self, roi: Roi) {
        self.roi = roi;
        self.invalidate_all();
    }

    /// Projection settings.
    #[must_use]
    pub fn projection_config(&self) -> ProjectionConfig {
        self.config
    }

    /// Switch every projector between MIP and average.
    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.config.mode = mode;
        for ch in &mut self.channels {
            for p in &mut ch.projectors {
                p.set_mode(mode);
            }
        }
    }

    /// Drop every cached buffer.
    pub fn invalidate_all(&mut self) {
        for ch in &mut self.channels {
            ch.invalidate();
        }
    }

    /// Set the active time point; caches are dropped when it changes.
    pub fn set_active_time(&mut self, time: usize) {
        let before = self.volumes.active_time();
        self.volumes.set_active_time(time);
        if self.volumes.active_time() != before {
            self.invalidate_all();
        }
    }

    /// Set the active channel; other channels are registered against it.
    pub fn set_active_channel(&mut self, channel: usize) {
        let before = self.volumes.active_channel();
        self.volumes.set_active_channel(channel);
        if self.volumes.active_channel() != before {
            self.invalidate_all();
        }
    }

    /// Select a colour model for a channel.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel and
    /// [`Error::ConfigError`] for an unregistered user model.
    pub fn set_colormap(&mut self, channel: usize, model: ColorModel) -> Result<()> {
        if model.index() >= self.registry.model_count() {
            return Err(Error::ConfigError(format!("unknown colour model {model}")));
        }
        let ch = display_mut(&mut self.channels, channel)?;
        ch.lut.set_model(model, &self.registry);
        ch.invalidate();
        Ok(())
    }

    /// Set a channel's blend mode and visibility in composites.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel.
    pub fn set_overlay(&mut self, channel: usize, mode: OverlayMode, visible: bool) -> Result<()> {
        let ch = display_mut(&mut self.channels, channel)?;
        ch.overlay = mode;
        ch.visible = visible;
        Ok(())
    }

    /// Cheap threshold change: move the table sub-window of a channel.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel.
    pub fn adjust_window(&mut self, channel: usize, low_frac: f64, high_frac: f64) -> Result<()> {
        let ch = display_mut(&mut self.channels, channel)?;
        ch.lut.adjust_window(low_frac, high_frac, &self.registry);
        ch.invalidate();
        Ok(())
    }

    /// Expensive threshold change: remap a channel's calibrated window and push
    /// it into the display windows of that channel's volumes at every time.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel.
    pub fn full_remap(&mut self, channel: usize, min: f64, max: f64) -> Result<()> {
        let ch = display_mut(&mut self.channels, channel)?;
        ch.lut.full_remap(min, max, &self.registry);
        ch.invalidate();
        let lut = ch.lut.clone();
        for t in 0..self.volumes.times() {
            let volume = self.volumes.volume_mut(channel, t)?;
            let (a, b) = lut.raw_window(volume.calibration());
            volume.set_display_window(a.min(b), a.max(b), TABLE_SIZE);
        }
        log::debug!("channel {channel} remapped to [{min}, {max}]");
        Ok(())
    }

    /// Remap a channel's window to the calibrated min/max inside the ROI at the
    /// active time. Returns the new window, or `None` when the ROI is empty.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel.
    pub fn auto_window_to_roi(&mut self, channel: usize) -> Result<Option<(f64, f64)>> {
        let time = self.volumes.active_time();
        let volume = self.volumes.volume(channel, time)?;
        let gate = self.volumes.gate_volume(time);
        let lo = volume.roi_minimum(&self.roi, &gate);
        let hi = volume.roi_maximum(&self.roi, &gate);
        match (lo, hi) {
            (Some(lo), Some(hi)) => {
                self.full_remap(channel, lo, hi)?;
                Ok(Some((lo, hi)))
            }
            _ => Ok(None),
        }
    }

    /// Clone a channel (see [`VolumeSet::clone_channel`]); the new channel
    /// inherits the source's colour table.
    ///
    /// # Errors
    /// Propagates allocation and index errors; the session is unchanged then.
    pub fn clone_channel(&mut self, source: usize) -> Result<usize> {
        let display = ChannelDisplay::with_lut_of(display_mut(&mut self.channels, source)?, self.config)?;
        let index = self.volumes.clone_channel(source)?;
        self.channels.push(display);
        self.invalidate_all();
        Ok(index)
    }

    /// Append a zero-filled channel.
    ///
    /// # Errors
    /// Propagates allocation errors.
    pub fn push_channel(
        &mut self,
        kind: voxel5d_core::ValueKind,
        calibration: &voxel5d_core::Calibration,
    ) -> Result<usize> {
        let index = self.volumes.push_channel(kind, calibration)?;
        let volume = self.volumes.volume(index, 0)?;
        let display = ChannelDisplay::for_volume(volume, self.config)?;
        self.channels.push(display);
        Ok(index)
    }

    /// Delete a channel together with its display state.
    ///
    /// # Errors
    /// Returns [`Error::LastChannel`] when only one channel remains.
    pub fn delete_channel(&mut self, channel: usize) -> Result<()> {
        self.volumes.delete_channel(channel)?;
        self.channels.remove(channel);
        self.invalidate_all();
        Ok(())
    }

    /// Append a time point and make it active.
    ///
    /// # Errors
    /// Propagates allocation errors.
    pub fn generate_new_timepoint(&mut self) -> Result<usize> {
        let t = self.volumes.generate_new_timepoint()?;
        self.invalidate_all();
        Ok(t)
    }

    /// Combine the active channel with its partner channel.
    ///
    /// # Errors
    /// Propagates arithmetic errors.
    pub fn combine_active(&mut self, op: ArithOp) -> Result<()> {
        self.volumes.combine_active(op)?;
        let channel = self.volumes.active_channel();
        for t in 0..self.volumes.times() {
            self.volumes.volume_mut(channel, t)?.recompute_min_max();
        }
        self.invalidate_all();
        Ok(())
    }

    /// Slice of `channel` at `index` along `axis`, registered to the active channel.
    ///
    /// # Errors
    /// Returns index errors for a missing channel, axis or slice.
    pub fn slice(&mut self, channel: usize, axis: usize, index: usize) -> Result<&[u32]> {
        let time = self.volumes.active_time();
        let reference = self.volumes.active_volume().display_offset();
        let volume = self.volumes.volume(channel, time)?;
        let gate = self.volumes.gate_volume(time);
        let projector = projector_mut(&mut self.channels, channel, axis)?;
        projector.extract_slice(volume, &gate, index, reference)
    }

    /// Project `channel` along `axis` under the session ROI and gate.
    ///
    /// # Errors
    /// Returns index errors for a missing channel or axis.
    pub fn project(&mut self, channel: usize, axis: usize) -> Result<ProjectionStats> {
        let time = self.volumes.active_time();
        let volume = self.volumes.volume(channel, time)?;
        let gate = self.volumes.gate_volume(time);
        let projector = projector_mut(&mut self.channels, channel, axis)?;
        Ok(projector.compute_projection(volume, &self.roi, &gate))
    }

    /// Composite the slices of every visible channel at `index` along `axis`.
    ///
    /// # Errors
    /// Returns index errors for a bad axis or slice.
    pub fn composite_slice(&mut self, axis: usize, index: usize) -> Result<Vec<u32>> {
        for c in self.visible_channels() {
            self.slice(c, axis, index)?;
        }
        self.blend(axis)
    }

    /// Composite the projections of every visible channel along `axis`.
    ///
    /// # Errors
    /// Returns index errors for a bad axis.
    pub fn composite_projection(&mut self, axis: usize) -> Result<Vec<u32>> {
        for c in self.visible_channels() {
            self.project(c, axis)?;
        }
        self.blend(axis)
    }

    fn visible_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.visible)
            .map(|(c, _)| c)
            .collect()
    }

    fn blend(&self, axis: usize) -> Result<Vec<u32>> {
        let (ua, va) = voxel5d_core::plane_axes(axis);
        let shape = self.volumes.shape();
        let (width, height) = (shape[ua], shape[va]);
        let time = self.volumes.active_time();
        let reference = self.volumes.active_volume().display_offset();

        // slices are registered on extraction, projections only here
        let mut buffers = Vec::new();
        for (c, ch) in self.channels.iter().enumerate().filter(|(_, ch)| ch.visible) {
            let projector = &ch.projectors[axis];
            let buffer = if projector.is_projection() {
                let own = self.volumes.volume(c, time)?.display_offset();
                let shift = (own[ua] - reference[ua], own[va] - reference[va]);
                registered(projector.buffer(), width, height, shift)
            } else {
                Cow::Borrowed(projector.buffer())
            };
            buffers.push((buffer, ch));
        }
        let layers: Vec<Layer<'_>> = buffers
            .iter()
            .map(|(buffer, ch)| Layer::new(buffer, &ch.lut, ch.overlay))
            .collect();
        composite(width, height, &layers)
    }
}

fn shifted(pos: usize, delta: i64, len: usize) -> Option<usize> {
    let source = i64::try_from(pos).ok()? - delta;
    usize::try_from(source).ok().filter(|&s| s < len)
}

/// Move a `width x height` index buffer by `(du, dv)` pixels. Pixels whose
/// source lies outside the buffer read index 0.
fn registered(buffer: &[u32], width: usize, height: usize, (du, dv): (i64, i64)) -> Cow<'_, [u32]> {
    if (du, dv) == (0, 0) || buffer.len() != width * height {
        return Cow::Borrowed(buffer);
    }
    let mut out = vec![0; buffer.len()];
    for v in 0..height {
        let Some(sv) = shifted(v, dv, height) else {
            continue;
        };
        for u in 0..width {
            if let Some(su) = shifted(u, du, width) {
                out[u + width * v] = buffer[su + width * sv];
            }
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel5d_core::{ColorSlot, ValueKind};

    fn session() -> DisplaySession {
        let mut v = VoxelVolume::new(ValueKind::U8, [4, 4, 4]).unwrap();
        v.set_raw(2, 2, 2, 200.0);
        v.recompute_min_max();
        DisplaySession::new(VolumeSet::new(v), ProjectionConfig::default()).unwrap()
    }

    #[test]
    fn test_registered_shift_fills_with_zero() {
        let buffer: Vec<u32> = (1..=6).collect();
        let moved = registered(&buffer, 3, 2, (1, 0));
        assert_eq!(moved.as_ref(), &[0, 1, 2, 0, 4, 5]);
        let moved = registered(&buffer, 3, 2, (-1, 1));
        assert_eq!(moved.as_ref(), &[0, 0, 0, 2, 3, 0]);
        assert!(matches!(registered(&buffer, 3, 2, (0, 0)), Cow::Borrowed(_)));
    }

    #[test]
    fn test_clone_and_delete_keep_displays_in_step() {
        let mut s = session();
        s.clone_channel(0).unwrap();
        s.clone_channel(0).unwrap();
        assert!(s.channel(2).is_some());
        s.delete_channel(1).unwrap();
        assert!(s.channel(2).is_none());
        assert_eq!(s.volumes().color_channel(ColorSlot::Blue), Some(1));
    }

    #[test]
    fn test_full_remap_updates_volume_window() {
        let mut s = session();
        s.full_remap(0, 0.0, 200.0).unwrap();
        let w = *s.volumes().volume(0, 0).unwrap().window();
        assert!((w.low).abs() < f64::EPSILON);
        assert!((w.high() - 200.0).abs() < 1e-9);
        let slice = s.slice(0, 2, 2).unwrap();
        assert_eq!(slice[2 + 4 * 2], 255);
    }

    #[test]
    fn test_auto_window_to_roi() {
        let mut s = session();
        let window = s.auto_window_to_roi(0).unwrap();
        assert_eq!(window, Some((0.0, 200.0)));
        s.set_roi(Roi::Box {
            min: [9, 9, 9],
            max: [9, 9, 9],
        });
        assert_eq!(s.auto_window_to_roi(0).unwrap(), None);
    }

    #[test]
    fn test_window_change_invalidates_projector() {
        let mut s = session();
        s.project(0, 2).unwrap();
        assert!(s.channel(0).unwrap().projector(2).unwrap().is_projection());
        s.adjust_window(0, 0.1, 0.9).unwrap();
        assert!(!s.channel(0).unwrap().projector(2).unwrap().is_valid());
    }

    #[test]
    fn test_unknown_user_colormap_rejected() {
        let mut s = session();
        assert!(s.set_colormap(0, ColorModel::User(0)).is_err());
        let model = s
            .register_colormap(UserTable {
                name: "ramp".into(),
                red: vec![1; TABLE_SIZE],
                green: vec![2; TABLE_SIZE],
                blue: vec![3; TABLE_SIZE],
            })
            .unwrap();
        s.set_colormap(0, model).unwrap();
        assert_eq!(s.channel(0).unwrap().lut().color_of(7), [1, 2, 3]);
    }
}
