//! Frame storage and sequence access.

use ndarray::{ArrayD, ArrayViewD, Axis, CowArray, IxDyn};

use crate::error::{Error, Result};

/// One time point of a sequence: an N-dimensional intensity array.
pub type Frame = ArrayD<f32>;

/// Frame returned by a [`FrameSequence`]: borrowed when the data is resident,
/// owned when it had to be loaded.
pub type FrameRef<'a> = CowArray<'a, f32, IxDyn>;

/// Random access to the frames of a sequence.
///
/// Implementations may load frames lazily; registration only ever reads them.
pub trait FrameSequence: Sync {
    fn len(&self) -> usize;

    fn frame(&self, index: usize) -> Result<FrameRef<'_>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameSequence for [Frame] {
    fn len(&self) -> usize {
        <[Frame]>::len(self)
    }

    fn frame(&self, index: usize) -> Result<FrameRef<'_>> {
        self.get(index)
            .map(|frame| CowArray::from(frame.view()))
            .ok_or(Error::FrameIndex {
                index,
                length: <[Frame]>::len(self),
            })
    }
}

impl FrameSequence for Vec<Frame> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn frame(&self, index: usize) -> Result<FrameRef<'_>> {
        self.as_slice().frame(index)
    }
}

/// Frames obtained by slicing a volume along one axis, e.g. the time axis of a
/// `(t, z, y, x)` stack.
#[derive(Debug, Clone)]
pub struct AxisFrames<'a> {
    volume: ArrayViewD<'a, f32>,
    axis: Axis,
}

impl<'a> AxisFrames<'a> {
    pub fn new(volume: ArrayViewD<'a, f32>, axis: Axis) -> Result<Self> {
        if axis.index() >= volume.ndim() {
            return Err(Error::InvalidConfig(format!(
                "sequence axis {} out of range for a {}-dimensional volume",
                axis.index(),
                volume.ndim()
            )));
        }
        if volume.ndim() < 2 {
            return Err(Error::InvalidConfig(
                "a sequence volume needs at least one spatial axis besides the sequence axis"
                    .to_string(),
            ));
        }
        Ok(Self { volume, axis })
    }

    #[inline]
    pub fn axis(&self) -> Axis {
        self.axis
    }
}

impl FrameSequence for AxisFrames<'_> {
    fn len(&self) -> usize {
        self.volume.len_of(self.axis)
    }

    fn frame(&self, index: usize) -> Result<FrameRef<'_>> {
        let length = self.len();
        if index >= length {
            return Err(Error::FrameIndex { index, length });
        }
        Ok(CowArray::from(self.volume.index_axis(self.axis, index)))
    }
}
