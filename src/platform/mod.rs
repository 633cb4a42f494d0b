use std::sync::Arc;

use crate::backend::CaptureBackend;
#[cfg(not(target_os = "windows"))]
use crate::backend::CaptureSource;
#[cfg(not(target_os = "windows"))]
use crate::adapter::AdapterDescriptor;
#[cfg(not(target_os = "windows"))]
use crate::error::{CaptureError, CaptureResult};

#[cfg(target_os = "windows")]
pub(crate) mod windows;

#[cfg(not(target_os = "windows"))]
fn unsupported_error() -> CaptureError {
    CaptureError::Discovery(anyhow::anyhow!(
        "desktop duplication capture is only supported on Windows"
    ))
}

#[cfg(not(target_os = "windows"))]
struct UnsupportedBackend;

#[cfg(not(target_os = "windows"))]
impl CaptureBackend for UnsupportedBackend {
    fn enumerate_adapters(&self) -> CaptureResult<Vec<AdapterDescriptor>> {
        Err(unsupported_error())
    }

    fn create_source(
        &self,
        _adapter_index: u32,
        _output_index: u32,
    ) -> CaptureResult<Box<dyn CaptureSource>> {
        Err(unsupported_error())
    }
}

#[cfg(target_os = "windows")]
pub(crate) fn build_backend() -> crate::error::CaptureResult<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(windows::WindowsBackend::new()))
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn build_backend() -> crate::error::CaptureResult<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(UnsupportedBackend))
}
