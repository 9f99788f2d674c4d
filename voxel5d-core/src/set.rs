//! Time x channel collections of voxel volumes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::kind::ValueKind;
use crate::roi::Roi;
use crate::volume::{ArithOp, Calibration, VoxelVolume};

/// One of the three display colour slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColorSlot {
    Red,
    Green,
    Blue,
}

impl ColorSlot {
    /// All slots in RGB order.
    pub const ALL: [ColorSlot; 3] = [ColorSlot::Red, ColorSlot::Green, ColorSlot::Blue];

    #[inline]
    fn index(self) -> usize {
        match self {
            ColorSlot::Red => 0,
            ColorSlot::Green => 1,
            ColorSlot::Blue => 2,
        }
    }
}

/// Remap a channel reference after `deleted` was removed.
///
/// References to the deleted channel become `None`; higher ones shift down by one.
#[must_use]
#[inline]
pub fn remap_after_delete(reference: usize, deleted: usize) -> Option<usize> {
    match reference.cmp(&deleted) {
        std::cmp::Ordering::Less => Some(reference),
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(reference - 1),
    }
}

/// `C` channels x `T` time points of volumes sharing one shape.
#[derive(Debug, Clone)]
pub struct VolumeSet {
    /// Indexed `[time][channel]`.
    times: Vec<Vec<VoxelVolume>>,
    shape: [usize; 3],
    active_channel: usize,
    active_time: usize,
    gate_channel: usize,
    gate_enabled: bool,
    colors: [Option<usize>; 3],
}

impl VolumeSet {
    /// A set holding one channel at one time point.
    #[must_use]
    pub fn new(volume: VoxelVolume) -> Self {
        let shape = volume.shape();
        Self {
            times: vec![vec![volume]],
            shape,
            active_channel: 0,
            active_time: 0,
            gate_channel: 0,
            gate_enabled: false,
            colors: [None; 3],
        }
    }

    /// Build from `[time][channel]` volumes.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for empty or ragged input and
    /// [`Error::ShapeMismatch`] when shapes differ.
    pub fn from_volumes(times: Vec<Vec<VoxelVolume>>) -> Result<Self> {
        let channels = times.first().map_or(0, Vec::len);
        if channels == 0 {
            return Err(Error::ConfigError("volume set needs at least one volume".into()));
        }
        let shape = times[0][0].shape();
        for row in &times {
            if row.len() != channels {
                return Err(Error::ConfigError(format!(
                    "every time point needs {channels} channel(s), found {}",
                    row.len()
                )));
            }
            for v in row {
                if v.shape() != shape {
                    return Err(Error::ShapeMismatch {
                        expected: shape,
                        found: v.shape(),
                    });
                }
            }
        }
        Ok(Self {
            times,
            shape,
            active_channel: 0,
            active_time: 0,
            gate_channel: 0,
            gate_enabled: false,
            colors: [None; 3],
        })
    }

    /// Shared shape `[sx, sy, sz]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.times[0].len()
    }

    /// Number of time points.
    #[must_use]
    pub fn times(&self) -> usize {
        self.times.len()
    }

    /// Five-dimensional size `[sx, sy, sz, channels, times]`.
    #[must_use]
    pub fn sizes(&self) -> [usize; 5] {
        [
            self.shape[0],
            self.shape[1],
            self.shape[2],
            self.channels(),
            self.times(),
        ]
    }

    fn check(&self, channel: usize, time: usize) -> Result<()> {
        if time >= self.times() {
            return Err(Error::TimeIndex {
                index: time,
                count: self.times(),
            });
        }
        if channel >= self.channels() {
            return Err(Error::ChannelIndex {
                index: channel,
                count: self.channels(),
            });
        }
        Ok(())
    }

    /// Volume at `(channel, time)`.
    ///
    /// # Errors
    /// Returns an index error for a missing slot.
    pub fn volume(&self, channel: usize, time: usize) -> Result<&VoxelVolume> {
        self.check(channel, time)?;
        Ok(&self.times[time][channel])
    }

    /// Mutable volume at `(channel, time)`.
    ///
    /// # Errors
    /// Returns an index error for a missing slot.
    pub fn volume_mut(&mut self, channel: usize, time: usize) -> Result<&mut VoxelVolume> {
        self.check(channel, time)?;
        Ok(&mut self.times[time][channel])
    }

    /// Volume under the active cursor.
    #[must_use]
    pub fn active_volume(&self) -> &VoxelVolume {
        &self.times[self.active_time][self.active_channel]
    }

    /// Mutable volume under the active cursor.
    pub fn active_volume_mut(&mut self) -> &mut VoxelVolume {
        &mut self.times[self.active_time][self.active_channel]
    }

    /// Active channel.
    #[must_use]
    pub fn active_channel(&self) -> usize {
        self.active_channel
    }

    /// Active time point.
    #[must_use]
    pub fn active_time(&self) -> usize {
        self.active_time
    }

    /// Set the active channel, clamped into range.
    pub fn set_active_channel(&mut self, channel: usize) {
        self.active_channel = channel.min(self.channels() - 1);
    }

    /// Set the active time point, clamped into range.
    pub fn set_active_time(&mut self, time: usize) {
        self.active_time = time.min(self.times() - 1);
    }

    /// Step the active channel cyclically.
    pub fn advance_channel(&mut self, delta: i64) {
        self.active_channel = cycle(self.active_channel, delta, self.channels());
    }

    /// Step the active time point cyclically.
    pub fn advance_time(&mut self, delta: i64) {
        self.active_time = cycle(self.active_time, delta, self.times());
    }

    /// Gate channel index.
    #[must_use]
    pub fn gate_channel(&self) -> usize {
        self.gate_channel
    }

    /// Whether gating is enabled.
    #[must_use]
    pub fn gate_enabled(&self) -> bool {
        self.gate_enabled
    }

    /// Select the gate channel and enable or disable gating.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel.
    pub fn set_gate(&mut self, channel: usize, enabled: bool) -> Result<()> {
        self.check(channel, 0)?;
        self.gate_channel = channel;
        self.gate_enabled = enabled;
        Ok(())
    }

    /// Gate for a time point: the gate channel's volume, or an open gate when disabled.
    #[must_use]
    pub fn gate_volume(&self, time: usize) -> Gate<'_> {
        if self.gate_enabled {
            self.times
                .get(time)
                .and_then(|row| row.get(self.gate_channel))
                .map_or(Gate::Open, Gate::Volume)
        } else {
            Gate::Open
        }
    }

    /// Whether a voxel of a volume registered with `reference_offset` passes the gate.
    #[must_use]
    pub fn is_gated_in(&self, time: usize, x: i64, y: i64, z: i64, reference_offset: [i64; 3]) -> bool {
        self.gate_volume(time).admits(x, y, z, reference_offset)
    }

    /// Channel shown in a colour slot.
    #[must_use]
    pub fn color_channel(&self, slot: ColorSlot) -> Option<usize> {
        self.colors[slot.index()]
    }

    /// All three colour assignments in RGB order.
    #[must_use]
    pub fn colors(&self) -> [Option<usize>; 3] {
        self.colors
    }

    /// Show `channel` in a colour slot.
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing channel.
    pub fn assign_color(&mut self, slot: ColorSlot, channel: usize) -> Result<()> {
        self.check(channel, 0)?;
        self.colors[slot.index()] = Some(channel);
        Ok(())
    }

    /// Remove the channel from a colour slot.
    pub fn clear_color(&mut self, slot: ColorSlot) {
        self.colors[slot.index()] = None;
    }

    /// Append a new empty channel with the kind, shape and calibration of `source`
    /// at every time point, and make it active.
    ///
    /// While the set holds at most three channels the new channel is assigned
    /// the next colour slot (the first channel becoming red).
    ///
    /// # Errors
    /// Returns [`Error::ChannelIndex`] for a missing source and
    /// [`Error::ResourceExhausted`] if any allocation fails; the set is unchanged then.
    pub fn clone_channel(&mut self, source: usize) -> Result<usize> {
        self.check(source, 0)?;
        let fresh = self
            .times
            .iter()
            .map(|row| row[source].empty_like())
            .collect::<Result<Vec<_>>>()?;
        let index = self.append_channel(fresh);
        if index == 1 && self.colors[0].is_none() {
            self.colors[0] = Some(0);
        }
        if index < 3 && self.colors[index].is_none() {
            self.colors[index] = Some(index);
        }
        log::info!("cloned channel {source} into channel {index}");
        Ok(index)
    }

    /// Append a zero-filled channel of `kind` at every time point.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] if any allocation fails; the set is unchanged then.
    pub fn push_channel(&mut self, kind: ValueKind, calibration: &Calibration) -> Result<usize> {
        let mut fresh = Vec::with_capacity(self.times());
        for _ in 0..self.times() {
            let mut v = VoxelVolume::new(kind, self.shape)?;
            v.set_calibration(calibration.clone());
            fresh.push(v);
        }
        let index = self.append_channel(fresh);
        log::info!("added {kind} channel {index}");
        Ok(index)
    }

    fn append_channel(&mut self, fresh: Vec<VoxelVolume>) -> usize {
        for (row, v) in self.times.iter_mut().zip(fresh) {
            row.push(v);
        }
        self.active_channel = self.channels() - 1;
        self.active_channel
    }

    /// Delete a channel at every time point.
    ///
    /// Colour slots, the gate and the active cursor that reference higher
    /// channels shift down by one; references to the deleted channel are
    /// cleared (a deleted gate channel disables gating).
    ///
    /// # Errors
    /// Returns [`Error::LastChannel`] if only one channel remains and
    /// [`Error::ChannelIndex`] for a missing channel.
    pub fn delete_channel(&mut self, channel: usize) -> Result<()> {
        if self.channels() < 2 {
            return Err(Error::LastChannel);
        }
        self.check(channel, 0)?;
        for row in &mut self.times {
            row.remove(channel);
        }
        for slot in &mut self.colors {
            *slot = slot.and_then(|c| remap_after_delete(c, channel));
        }
        if let Some(gate) = remap_after_delete(self.gate_channel, channel) {
            self.gate_channel = gate;
        } else {
            self.gate_channel = 0;
            self.gate_enabled = false;
        }
        self.active_channel = remap_after_delete(self.active_channel, channel)
            .unwrap_or(channel)
            .min(self.channels() - 1);
        log::info!("deleted channel {channel}, {} remaining", self.channels());
        Ok(())
    }

    /// Append one time point holding an empty volume per channel, and make it active.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] if any allocation fails; the set is unchanged then.
    pub fn generate_new_timepoint(&mut self) -> Result<usize> {
        let last = &self.times[self.times.len() - 1];
        let fresh = last
            .iter()
            .map(VoxelVolume::empty_like)
            .collect::<Result<Vec<_>>>()?;
        self.times.push(fresh);
        self.active_time = self.times.len() - 1;
        log::info!("generated time point {}", self.active_time);
        Ok(self.active_time)
    }

    /// Channel used as the second operand of [`VolumeSet::combine_active`]:
    /// the gate channel when gating is enabled, otherwise the last channel.
    #[must_use]
    pub fn partner_channel(&self) -> usize {
        if self.gate_enabled {
            self.gate_channel
        } else {
            self.channels() - 1
        }
    }

    /// Apply `active = active op partner` at every time point.
    ///
    /// # Errors
    /// Propagates arithmetic errors from [`VoxelVolume::combine`].
    pub fn combine_active(&mut self, op: ArithOp) -> Result<()> {
        let active = self.active_channel;
        let partner = self.partner_channel();
        for row in &mut self.times {
            if active == partner {
                let copy = row[partner].clone();
                row[active].combine(&copy, op)?;
            } else {
                let (target, other) = pair_mut(row, active, partner);
                target.combine(other, op)?;
            }
        }
        Ok(())
    }

    /// Mean calibrated value of the active volume over the ROI and gate.
    #[must_use]
    pub fn roi_mean(&self, roi: &Roi) -> Option<f64> {
        let volume = self.active_volume();
        let gate = self.gate_volume(self.active_time);
        let mut sum = 0.0;
        let mut n = 0usize;
        volume.for_each_admitted(roi, &gate, |x, y, z| {
            sum += volume.get_calibrated(x, y, z);
            n += 1;
        });
        (n > 0).then(|| sum / crate::util::usize_to_f64(n))
    }

    /// Shift the active channel's value offset so that the ROI mean becomes zero.
    ///
    /// Returns the subtracted mean, or `None` when the ROI is empty.
    pub fn adjust_offset_to_roi_mean(&mut self, roi: &Roi) -> Option<f64> {
        let mean = self.roi_mean(roi)?;
        let channel = self.active_channel;
        for row in &mut self.times {
            row[channel].calibration_mut().value_offset -= mean;
        }
        Some(mean)
    }

    /// Set the registration shift of one volume.
    ///
    /// # Errors
    /// Returns an index error for a missing slot.
    pub fn set_display_offset(&mut self, channel: usize, time: usize, offset: [i64; 3]) -> Result<()> {
        self.volume_mut(channel, time)?.set_display_offset(offset);
        Ok(())
    }

    /// Reset every registration shift to zero.
    pub fn reset_display_offsets(&mut self) {
        for row in &mut self.times {
            for v in row {
                v.set_display_offset([0; 3]);
            }
        }
    }

    /// Iterate over `(channel, time, volume)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &VoxelVolume)> {
        self.times
            .iter()
            .enumerate()
            .flat_map(|(t, row)| row.iter().enumerate().map(move |(c, v)| (c, t, v)))
    }
}

fn cycle(current: usize, delta: i64, len: usize) -> usize {
    let len_i = crate::util::usize_to_i64(len);
    let next = (crate::util::usize_to_i64(current) + delta).rem_euclid(len_i);
    usize::try_from(next).unwrap_or(0)
}

fn pair_mut(row: &mut [VoxelVolume], a: usize, b: usize) -> (&mut VoxelVolume, &VoxelVolume) {
    if a < b {
        let (left, right) = row.split_at_mut(b);
        (&mut left[a], &right[0])
    } else {
        let (left, right) = row.split_at_mut(a);
        (&mut right[0], &left[b])
    }
}
