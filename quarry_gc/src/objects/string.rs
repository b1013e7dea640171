//! Managed string with inline storage.

use crate::context;
use crate::refs::GcRef;
use crate::trace::{Trace, Tracer};

/// An immutable managed string: length word followed by the bytes, all in
/// one heap allocation.
#[repr(C)]
pub struct GcStr {
    len: usize,
    data: [u8; 0],
}

impl GcStr {
    /// Allocate a managed copy of `s` in the current thread's collector.
    ///
    /// # Panics
    ///
    /// Panics if no collector is bound to the current thread.
    pub fn new(s: &str) -> GcRef<GcStr> {
        let r = unsafe { context::alloc_uninit::<GcStr>(s.len()) };
        if r.is_null() {
            return r;
        }
        let ptr = r.as_ptr();
        unsafe {
            (*ptr).len = s.len();
            std::ptr::copy_nonoverlapping(s.as_ptr(), (*ptr).data.as_mut_ptr(), s.len());
        }
        r
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the string is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// View as `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        // Only constructed from &str, so the bytes are valid UTF-8.
        unsafe { std::str::from_utf8_unchecked(self.as_bytes()) }
    }
}

/// Safety: holds no managed references.
unsafe impl Trace for GcStr {
    #[inline]
    fn trace(&mut self, _tracer: &mut dyn Tracer) {}
}

impl PartialEq<str> for GcStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq for GcStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::fmt::Display for GcStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for GcStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::copying::CopyingCollector;
    use crate::collector::marksweep::MarkSweepCollector;
    use crate::config::GcConfig;
    use crate::refs::Rooted;

    #[test]
    fn test_roundtrip() {
        let _gc = MarkSweepCollector::new(GcConfig::default());

        let s = GcStr::new("Node 42");
        assert_eq!(s.len(), 7);
        assert_eq!(s.as_str(), "Node 42");
        assert!(*s == *"Node 42");
    }

    #[test]
    fn test_empty_string() {
        let _gc = MarkSweepCollector::new(GcConfig::default());

        let s = GcStr::new("");
        assert!(s.is_empty());
        assert_eq!(s.as_str(), "");
    }

    #[test]
    fn test_survives_relocation() {
        let gc = CopyingCollector::new(GcConfig {
            segment_size: 16 * 1024,
            ..Default::default()
        });

        let root = Rooted::new(GcStr::new("relocate me"));
        let before = root.as_ptr();

        gc.collect();

        assert_ne!(root.as_ptr(), before);
        assert_eq!(root.as_str(), "relocate me");
    }
}
