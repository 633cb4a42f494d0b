use std::sync::Arc;

use crate::adapter::AdapterDescriptor;
use crate::error::CaptureResult;
use crate::frame::Frame;
use crate::region::Region;

/// Produces frames for one capture target. Implementations own all the
/// GPU-side resources for the target (duplication session, staging
/// surface) and are driven from a single capture thread.
pub(crate) trait CaptureSource: Send {
    /// Poll the target for a new frame.
    ///
    /// `Ok(None)` means nothing changed since the last grab (the common,
    /// expected outcome of an empty poll). `Err(CaptureError::AccessLost)`
    /// means the duplication hand-off was invalidated; the caller should
    /// [`reset`](Self::reset) and keep going. Any other error is fatal to
    /// the capture loop.
    ///
    /// When `region` does not cover the full output, the returned frame
    /// is cropped to it (an owned pixel copy, not a view).
    fn grab(&mut self, region: &Region) -> CaptureResult<Option<Frame>>;

    /// Recreate the duplication hand-off against the same device and
    /// output after an access loss.
    fn reset(&mut self) -> CaptureResult<()>;
}

/// Platform seam between the service and the GPU capture machinery.
/// Exactly one concrete implementation exists per target platform; tests
/// substitute mocks.
pub(crate) trait CaptureBackend: Send + Sync {
    /// Enumerate all adapters and their attached outputs. Adapters with
    /// zero outputs are included; callers filter them when picking a
    /// capture target.
    fn enumerate_adapters(&self) -> CaptureResult<Vec<AdapterDescriptor>>;

    /// Build a capture source for the given adapter/output pair,
    /// creating (or reusing) the per-adapter device.
    fn create_source(
        &self,
        adapter_index: u32,
        output_index: u32,
    ) -> CaptureResult<Box<dyn CaptureSource>>;
}

pub(crate) fn default_backend() -> CaptureResult<Arc<dyn CaptureBackend>> {
    crate::platform::build_backend()
}
