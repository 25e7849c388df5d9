//! Scratch audio buffers for block rendering.
//!
//! A [`BlockBuffers`] is a single flat allocation holding one block-sized
//! region per node output ("unit"). It is sized when a snapshot is committed,
//! on the control context, so rendering never allocates.
//!
//! While a node renders, the pool is split around its own output units:
//! [`Inputs`] gives read access to every other unit and [`Outputs`] gives
//! write access to the node's own units.

/// Maximum channel count for resources, render outputs, and channel parameters.
pub const MAX_CHANNELS: usize = 32;

/// Flat pool of per-output scratch regions, each `block_size` samples long.
#[derive(Debug)]
pub struct BlockBuffers {
    data: Vec<f32>,
    block_size: usize,
    units: usize,
}

impl BlockBuffers {
    /// Creates a zeroed pool of `units` regions of `block_size` samples.
    pub fn new(units: usize, block_size: usize) -> Self {
        Self {
            data: vec![0.0; units * block_size],
            block_size,
            units,
        }
    }

    /// Returns the number of output regions.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Returns the length of each region.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the first `frames` samples of a region.
    ///
    /// # Panics
    ///
    /// Panics if `unit >= units()` or `frames > block_size()`.
    #[inline]
    pub fn unit(&self, unit: usize, frames: usize) -> &[f32] {
        let start = unit * self.block_size;
        &self.data[start..start + frames]
    }

    /// Clears all regions to zero.
    pub fn clear_all(&mut self) {
        self.data.fill(0.0);
    }

    /// Splits the pool around the units `[first, first + count)`.
    ///
    /// Returns read access to every other unit and write access to the
    /// selected ones, each truncated to `frames`.
    pub fn split<'a>(
        &'a mut self,
        first: usize,
        count: usize,
        frames: usize,
        refs: &'a [usize],
    ) -> (Inputs<'a>, Outputs<'a>) {
        let stride = self.block_size;
        let (lo, rest) = self.data.split_at_mut(first * stride);
        let (own, hi) = rest.split_at_mut(count * stride);
        let inputs = Inputs {
            lo,
            hi,
            hi_start: (first + count) * stride,
            stride,
            frames,
            refs,
        };
        let outputs = Outputs {
            data: own,
            stride,
            frames,
        };
        (inputs, outputs)
    }

    /// Read-only view over the whole pool.
    pub fn inputs<'a>(&'a self, frames: usize, refs: &'a [usize]) -> Inputs<'a> {
        Inputs {
            lo: &self.data,
            hi: &[],
            hi_start: self.data.len(),
            stride: self.block_size,
            frames,
            refs,
        }
    }
}

/// Read access to a node's upstream signals.
#[derive(Debug, Clone, Copy)]
pub struct Inputs<'a> {
    lo: &'a [f32],
    hi: &'a [f32],
    hi_start: usize,
    stride: usize,
    frames: usize,
    refs: &'a [usize],
}

impl<'a> Inputs<'a> {
    /// An input set with no connections.
    pub fn empty() -> Self {
        Self {
            lo: &[],
            hi: &[],
            hi_start: 0,
            stride: 0,
            frames: 0,
            refs: &[],
        }
    }

    /// Number of connected inputs.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns true if the node has no inputs.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Returns input `index`, or `None` if it is out of range or reads the
    /// node's own output (a feedback edge through a delay element).
    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a [f32]> {
        let unit = *self.refs.get(index)?;
        let start = unit * self.stride;
        let end = start + self.frames;
        if end <= self.lo.len() {
            Some(&self.lo[start..end])
        } else if start >= self.hi_start {
            let offset = start - self.hi_start;
            self.hi.get(offset..offset + self.frames)
        } else {
            None
        }
    }

    /// Returns sample `frame` of input `index`, or 0.0 when unavailable.
    #[inline]
    pub fn sample(&self, index: usize, frame: usize) -> f32 {
        self.get(index)
            .and_then(|input| input.get(frame).copied())
            .unwrap_or(0.0)
    }

    /// Iterates over the available inputs.
    pub fn iter(&self) -> impl Iterator<Item = &'a [f32]> + '_ {
        (0..self.refs.len()).filter_map(|i| self.get(i))
    }
}

/// Write access to a node's own output regions.
#[derive(Debug)]
pub struct Outputs<'a> {
    data: &'a mut [f32],
    stride: usize,
    frames: usize,
}

impl Outputs<'_> {
    /// Number of output channels.
    pub fn len(&self) -> usize {
        self.data.len().checked_div(self.stride).unwrap_or(0)
    }

    /// Returns true if the node has no outputs.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of frames in the current block.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Returns output channel `index`, truncated to the block length.
    #[inline]
    pub fn channel(&mut self, index: usize) -> &mut [f32] {
        let start = index * self.stride;
        self.data.get_mut(start..start + self.frames).unwrap_or(&mut [])
    }

    /// Zeroes every output channel.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Returns true if every sample of the block is finite.
    pub fn is_finite(&self) -> bool {
        (0..self.len()).all(|ch| {
            let start = ch * self.stride;
            self.data[start..start + self.frames]
                .iter()
                .all(|s| s.is_finite())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_own_units() {
        let mut pool = BlockBuffers::new(4, 8);
        // Units 0 and 3 feed the node owning units 1..3.
        let refs = [0usize, 3, 1];
        {
            let (_, mut out) = pool.split(0, 1, 8, &[]);
            out.channel(0).fill(1.0);
        }
        {
            let (_, mut out) = pool.split(3, 1, 8, &[]);
            out.channel(0).fill(3.0);
        }
        let (inputs, mut outputs) = pool.split(1, 2, 4, &refs);
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs.get(0), Some(&[1.0; 4][..]));
        assert_eq!(inputs.get(1), Some(&[3.0; 4][..]));
        assert_eq!(inputs.get(2), None, "own unit is not readable");
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.channel(1).len(), 4);
        outputs.channel(1).fill(2.0);
        assert_eq!(pool.unit(2, 8), &[2.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn whole_pool_view_reads_everything() {
        let mut pool = BlockBuffers::new(2, 4);
        {
            let (_, mut out) = pool.split(1, 1, 4, &[]);
            out.channel(0).fill(0.5);
        }
        let refs = [1usize];
        let inputs = pool.inputs(4, &refs);
        assert_eq!(inputs.sample(0, 3), 0.5);
        assert_eq!(inputs.sample(1, 0), 0.0);
    }

    #[test]
    fn finite_check_sees_nan() {
        let mut pool = BlockBuffers::new(1, 4);
        let (_, mut out) = pool.split(0, 1, 4, &[]);
        assert!(out.is_finite());
        out.channel(0)[2] = f32::NAN;
        assert!(!out.is_finite());
        out.silence();
        assert!(out.is_finite());
    }
}
