use std::sync::Arc;

use anyhow::Context;
use windows::Win32::Graphics::Dxgi::IDXGIOutput;

use crate::backend::CaptureSource;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;
use crate::region::Region;

use super::com::CoInitGuard;
use super::device::Device;
use super::duplication::{AcquireStatus, DuplicationSession};
use super::staging::StagingSurface;

/// DXGI duplication source for one output. Owns the duplication session
/// and the staging surface; the device is shared per adapter.
pub(crate) struct DxgiCaptureSource {
    /// Initialized lazily on the capture thread; COM init is per-thread
    /// and grabs never run on the thread that built the source.
    com: Option<CoInitGuard>,
    device: Arc<Device>,
    output: IDXGIOutput,
    session: DuplicationSession,
    staging: StagingSurface,
}

impl DxgiCaptureSource {
    pub(crate) fn new(
        device: Arc<Device>,
        output: IDXGIOutput,
        output_width: u32,
        output_height: u32,
    ) -> CaptureResult<Self> {
        let session = DuplicationSession::new(&output, device.d3d_device())?;
        let staging = StagingSurface::new(device.d3d_device(), output_width, output_height)?;
        Ok(Self {
            com: None,
            device,
            output,
            session,
            staging,
        })
    }

    fn ensure_com(&mut self) -> CaptureResult<()> {
        if self.com.is_none() {
            let guard = CoInitGuard::init_multithreaded()
                .context("failed to initialize COM on the capture thread")
                .map_err(CaptureError::Platform)?;
            self.com = Some(guard);
        }
        Ok(())
    }
}

impl CaptureSource for DxgiCaptureSource {
    fn grab(&mut self, region: &Region) -> CaptureResult<Option<Frame>> {
        self.ensure_com()?;

        let texture = match self.session.try_acquire(0)? {
            AcquireStatus::Acquired(texture) => texture,
            AcquireStatus::NoNewFrame => return Ok(None),
            AcquireStatus::Lost => return Err(CaptureError::AccessLost),
        };

        let context = self.device.immediate_context();
        // Copy off the desktop texture and give the frame straight back;
        // DXGI stalls other consumers while we hold it.
        let copied = self.staging.receive(context, &texture);
        self.session.release()?;
        copied?;

        let (width, height) = self.staging.dimensions();
        let data = {
            let mapped = self.staging.map_for_read(context)?;
            mapped.read_bgra()?
        };
        let frame = Frame::from_bgra8(width, height, data)?;

        if region.covers_output(width, height) {
            Ok(Some(frame))
        } else {
            Ok(Some(frame.crop(region)?))
        }
    }

    fn reset(&mut self) -> CaptureResult<()> {
        self.session = DuplicationSession::new(&self.output, self.device.d3d_device())?;

        // Access loss often means a mode change; resize the staging
        // surface if the output no longer matches it.
        let desc = unsafe { self.output.GetDesc() }
            .context("IDXGIOutput::GetDesc failed after session recreation")
            .map_err(CaptureError::Platform)?;
        let coords = desc.DesktopCoordinates;
        let width = (coords.right - coords.left).max(0) as u32;
        let height = (coords.bottom - coords.top).max(0) as u32;
        if (width, height) != self.staging.dimensions() {
            self.staging = StagingSurface::new(self.device.d3d_device(), width, height)?;
        }
        Ok(())
    }
}
