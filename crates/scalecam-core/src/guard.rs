//! Hardware guard for releasing a sample source on drop.
//!
//! The sampling loop can end through a fatal sensor error, a store error
//! bubbling up, cancellation or a panic. In every case the sensor must be
//! handed back, so release is tied to `Drop`.

use std::ops::{Deref, DerefMut};

use tracing::info;

use crate::source::SampleSource;

/// A guard that releases its [`SampleSource`] when dropped.
///
/// # Example
///
/// ```
/// use scalecam_core::{HardwareGuard, MockSource};
///
/// let source = MockSource::new(vec![1, 2, 3]);
/// let released = source.released_flag();
/// {
///     let _guard = HardwareGuard::new(Box::new(source));
/// }
/// assert!(released.load(std::sync::atomic::Ordering::SeqCst));
/// ```
pub struct HardwareGuard {
    source: Option<Box<dyn SampleSource>>,
    released: Released,
}

impl HardwareGuard {
    /// Take charge of releasing `source`.
    pub fn new(source: Box<dyn SampleSource>) -> Self {
        Self {
            source: Some(source),
            released: Released,
        }
    }

    /// Take ownership of the source, preventing automatic release.
    pub fn into_inner(mut self) -> Option<Box<dyn SampleSource>> {
        self.source.take()
    }

    /// Release the source now rather than at drop.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            info!("Releasing sample source {}", source.name());
            source.release();
        }
    }

    /// Whether the source is still held.
    pub fn is_held(&self) -> bool {
        self.source.is_some()
    }
}

impl std::fmt::Debug for HardwareGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareGuard")
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

/// Source used after release: every read fails.
struct Released;

#[async_trait::async_trait]
impl SampleSource for Released {
    fn name(&self) -> &str {
        "released"
    }

    async fn read(&mut self) -> crate::Result<i64> {
        Err(crate::Error::hardware("sample source already released"))
    }
}

impl Deref for HardwareGuard {
    type Target = dyn SampleSource;

    fn deref(&self) -> &Self::Target {
        match &self.source {
            Some(source) => source.as_ref(),
            None => &self.released,
        }
    }
}

impl DerefMut for HardwareGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.source {
            Some(source) => source.as_mut(),
            None => &mut self.released,
        }
    }
}

impl Drop for HardwareGuard {
    fn drop(&mut self) {
        self.release();
    }
}
