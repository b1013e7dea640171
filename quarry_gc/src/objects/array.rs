//! Managed array with inline element storage.

use std::ops::{Index, IndexMut};

use crate::context;
use crate::heap::ALIGN;
use crate::refs::GcRef;
use crate::trace::{Trace, Tracer};

/// A fixed-length managed array: length word followed by the elements,
/// all in one heap allocation.
///
/// With `T = GcRef<U>` this is an array of managed references — its
/// `Trace` impl visits every slot, so the referenced objects survive
/// collection as long as the array does. With scalar `T` it is a plain
/// data array.
#[repr(C)]
pub struct GcArray<T: Trace> {
    len: usize,
    data: [T; 0],
}

impl<T: Trace + Default> GcArray<T> {
    /// Allocate an array of `len` default-initialized elements (null
    /// references, zero scalars) in the current thread's collector.
    ///
    /// # Panics
    ///
    /// Panics if no collector is bound to the current thread.
    pub fn new(len: usize) -> GcRef<GcArray<T>> {
        // Elements follow the length word directly; anything needing more
        // alignment than the heap provides cannot be stored inline.
        assert!(std::mem::align_of::<T>() <= ALIGN);

        let r = unsafe { context::alloc_uninit::<GcArray<T>>(len * std::mem::size_of::<T>()) };
        if r.is_null() {
            return r;
        }
        let ptr = r.as_ptr();
        unsafe {
            (*ptr).len = len;
            let base = (*ptr).data.as_mut_ptr();
            for i in 0..len {
                base.add(i).write(T::default());
            }
        }
        r
    }
}

impl<T: Trace> GcArray<T> {
    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// View the elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.data.as_mut_ptr(), self.len) }
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Trace> Index<usize> for GcArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T: Trace> IndexMut<usize> for GcArray<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

/// Safety: visits every element, so reference elements are traced.
unsafe impl<T: Trace> Trace for GcArray<T> {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        for item in self.as_mut_slice() {
            item.trace(tracer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::copying::CopyingCollector;
    use crate::collector::marksweep::MarkSweepCollector;
    use crate::config::GcConfig;
    use crate::context::alloc;
    use crate::refs::Rooted;

    #[test]
    fn test_new_is_default_initialized() {
        let _gc = MarkSweepCollector::new(GcConfig::default());

        let scalars = GcArray::<u64>::new(4);
        assert_eq!(scalars.len(), 4);
        assert_eq!(scalars.as_slice(), &[0, 0, 0, 0]);

        let refs = GcArray::<GcRef<u64>>::new(4);
        assert!(refs.iter().all(|r| r.is_null()));
    }

    #[test]
    fn test_index_get_set() {
        let _gc = MarkSweepCollector::new(GcConfig::default());

        let mut arr = GcArray::<u64>::new(3);
        arr[0] = 10;
        arr[2] = 30;
        assert_eq!(arr[0], 10);
        assert_eq!(arr[1], 0);
        assert_eq!(arr[2], 30);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_panics() {
        let _gc = MarkSweepCollector::new(GcConfig::default());

        let arr = GcArray::<u64>::new(2);
        let _ = arr[2];
    }

    #[test]
    fn test_reference_elements_survive_relocation() {
        let gc = CopyingCollector::new(GcConfig {
            segment_size: 16 * 1024,
            ..Default::default()
        });

        let mut root = Rooted::new(GcArray::<GcRef<u64>>::new(8));
        for i in 0..8 {
            root[i] = alloc(i as u64 * 100);
        }

        gc.collect();

        for i in 0..8 {
            assert_eq!(*root[i], i as u64 * 100);
        }
    }
}
