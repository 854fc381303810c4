use crate::{AudioBuffer, AudioSegment, StoreError};

pub mod scratch;

pub trait SegmentStore {
    /// Places the samples of unit `index` on scratch storage.
    fn put(
        &mut self,
        index: usize,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<AudioSegment, StoreError>;

    /// All held segments, ascending by index.
    fn list(&self) -> Vec<AudioSegment>;

    fn load(&self, segment: &AudioSegment) -> Result<AudioBuffer, StoreError>;

    /// Removes every held segment. Calling it again is a no-op.
    fn delete_all(&mut self) -> Result<(), StoreError>;
}

impl<T: SegmentStore + ?Sized> SegmentStore for &mut T {
    fn put(
        &mut self,
        index: usize,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<AudioSegment, StoreError> {
        (**self).put(index, samples, sample_rate)
    }

    fn list(&self) -> Vec<AudioSegment> {
        (**self).list()
    }

    fn load(&self, segment: &AudioSegment) -> Result<AudioBuffer, StoreError> {
        (**self).load(segment)
    }

    fn delete_all(&mut self) -> Result<(), StoreError> {
        (**self).delete_all()
    }
}
