// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface and frame-source identification.
//!
//! [`SurfaceId`] names a producer of compositor frames tracked by the
//! [`DisplayScheduler`](crate::display::DisplayScheduler). [`SourceId`] tags
//! every [`FrameSignal`](crate::signal::FrameSignal) with the source that
//! produced it. Both are opaque to the core.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

/// Identifies a surface that submits frames to the display.
///
/// Embedders assign surface IDs. Core code compares and orders them but never
/// interprets the value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SurfaceId(pub u32);

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceId({})", self.0)
    }
}

/// Identifies the frame source that produced a signal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourceId(pub u32);

static NEXT_SOURCE_ID: AtomicU32 = AtomicU32::new(1);

impl SourceId {
    /// Allocates a process-unique source id.
    ///
    /// Id `0` is never returned, so it can be used for hand-built signals.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_are_distinct_and_nonzero() {
        let a = SourceId::next();
        let b = SourceId::next();
        assert_ne!(a, b);
        assert_ne!(a, SourceId(0));
        assert_ne!(b, SourceId(0));
    }

    #[test]
    fn debug_formatting() {
        assert_eq!(alloc::format!("{:?}", SurfaceId(7)), "SurfaceId(7)");
        assert_eq!(alloc::format!("{:?}", SourceId(3)), "SourceId(3)");
    }
}
