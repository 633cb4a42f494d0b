use anyhow::Context;
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11Texture2D};
use windows::Win32::Graphics::Dxgi::{
    DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO, IDXGIOutput,
    IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource,
};
use windows::core::Interface;

use crate::error::{CaptureError, CaptureResult};

/// Outcome of one acquisition attempt.
pub(crate) enum AcquireStatus {
    /// The desktop presented a new frame; the GPU texture is valid until
    /// [`DuplicationSession::release`] is called.
    Acquired(ID3D11Texture2D),
    /// Nothing changed within the timeout. Not an error.
    NoNewFrame,
    /// The duplication hand-off was invalidated (mode change, fullscreen
    /// transition, desktop switch). The session must be recreated.
    Lost,
}

/// One `IDXGIOutputDuplication` hand-off for a single output.
///
/// At most one frame is held at a time; the acquire/release budget is
/// tracked here so a dropped session never leaks a held frame.
pub(crate) struct DuplicationSession {
    duplication: IDXGIOutputDuplication,
    frame_held: bool,
}

impl DuplicationSession {
    pub(crate) fn new(output: &IDXGIOutput, device: &ID3D11Device) -> CaptureResult<Self> {
        let output1: IDXGIOutput1 = output
            .cast()
            .context("failed to query IDXGIOutput1")
            .map_err(CaptureError::Duplication)?;
        let duplication = unsafe { output1.DuplicateOutput(device) }
            .context("DuplicateOutput failed")
            .map_err(CaptureError::Duplication)?;
        Ok(Self {
            duplication,
            frame_held: false,
        })
    }

    /// Poll for the next presented frame, waiting at most `timeout_ms`.
    pub(crate) fn try_acquire(&mut self, timeout_ms: u32) -> CaptureResult<AcquireStatus> {
        debug_assert!(!self.frame_held, "acquire called with a frame still held");

        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let acquired =
            unsafe { self.duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) };
        if let Err(error) = acquired {
            if error.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(AcquireStatus::NoNewFrame);
            }
            if error.code() == DXGI_ERROR_ACCESS_LOST {
                return Ok(AcquireStatus::Lost);
            }
            return Err(CaptureError::Duplication(
                anyhow::Error::from(error).context("AcquireNextFrame failed"),
            ));
        }
        self.frame_held = true;

        let Some(resource) = resource else {
            self.release()?;
            return Ok(AcquireStatus::NoNewFrame);
        };

        let texture: ID3D11Texture2D = match resource.cast() {
            Ok(texture) => texture,
            Err(error) => {
                // Give the frame back before surfacing the failure.
                let _ = self.release();
                return Err(CaptureError::Duplication(
                    anyhow::Error::from(error)
                        .context("failed to cast acquired IDXGIResource to ID3D11Texture2D"),
                ));
            }
        };
        Ok(AcquireStatus::Acquired(texture))
    }

    /// Return the held frame to DXGI. Must be called after every
    /// successful acquire before the next one.
    pub(crate) fn release(&mut self) -> CaptureResult<()> {
        if !self.frame_held {
            return Ok(());
        }
        self.frame_held = false;
        if let Err(error) = unsafe { self.duplication.ReleaseFrame() } {
            if error.code() == DXGI_ERROR_ACCESS_LOST {
                return Err(CaptureError::AccessLost);
            }
            return Err(CaptureError::Duplication(
                anyhow::Error::from(error).context("ReleaseFrame failed"),
            ));
        }
        Ok(())
    }
}

impl Drop for DuplicationSession {
    fn drop(&mut self) {
        if self.frame_held {
            unsafe { self.duplication.ReleaseFrame() }.ok();
        }
    }
}
