use anyhow::Context;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_STAGING, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::core::Interface;

use crate::error::{CaptureError, CaptureResult};
use crate::frame::BYTES_PER_PIXEL;

/// A CPU-readable staging texture sized to the output, reused across
/// frames so capture does not allocate GPU memory per grab.
pub(crate) struct StagingSurface {
    texture: ID3D11Resource,
    width: u32,
    height: u32,
}

impl StagingSurface {
    pub(crate) fn new(device: &ID3D11Device, width: u32, height: u32) -> CaptureResult<Self> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: Default::default(),
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: Default::default(),
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .context("failed to create staging texture")
            .map_err(CaptureError::Platform)?;
        let texture = texture
            .context("CreateTexture2D did not return a staging texture")
            .map_err(CaptureError::Platform)?
            .cast::<ID3D11Resource>()
            .context("failed to cast staging texture to ID3D11Resource")
            .map_err(CaptureError::Platform)?;

        Ok(Self {
            texture,
            width,
            height,
        })
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// GPU-side copy of the acquired desktop texture into this surface.
    /// The source must be released back to DXGI promptly after this; the
    /// copy is what decouples us from the acquire/release budget.
    pub(crate) fn receive(
        &self,
        context: &ID3D11DeviceContext,
        source: &ID3D11Texture2D,
    ) -> CaptureResult<()> {
        let source: ID3D11Resource = source
            .cast()
            .context("failed to cast desktop texture to ID3D11Resource")
            .map_err(CaptureError::Platform)?;
        unsafe {
            context.CopyResource(&self.texture, &source);
        }
        Ok(())
    }

    /// Map the surface for CPU reads. The mapping is held for the
    /// shortest possible time; unmapping happens on drop.
    pub(crate) fn map_for_read<'a>(
        &'a self,
        context: &'a ID3D11DeviceContext,
    ) -> CaptureResult<MappedSurface<'a>> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { context.Map(&self.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .context("failed to map staging texture")
            .map_err(CaptureError::Platform)?;
        Ok(MappedSurface {
            context,
            resource: &self.texture,
            mapped,
            width: self.width,
            height: self.height,
        })
    }
}

pub(crate) struct MappedSurface<'a> {
    context: &'a ID3D11DeviceContext,
    resource: &'a ID3D11Resource,
    mapped: D3D11_MAPPED_SUBRESOURCE,
    width: u32,
    height: u32,
}

impl MappedSurface<'_> {
    /// Copy the mapped pixels into a tightly packed BGRA buffer,
    /// discarding the driver's row padding.
    pub(crate) fn read_bgra(&self) -> CaptureResult<Vec<u8>> {
        let width = self.width as usize;
        let height = self.height as usize;
        let row_len = width
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or_else(|| CaptureError::Platform(anyhow::anyhow!("output row size overflow")))?;
        let pitch = self.mapped.RowPitch as usize;
        if pitch < row_len {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "mapped row pitch {pitch} smaller than row size {row_len}"
            )));
        }

        let mut data = Vec::with_capacity(row_len * height);
        let base = self.mapped.pData as *const u8;
        for y in 0..height {
            let row = unsafe { std::slice::from_raw_parts(base.add(y * pitch), row_len) };
            data.extend_from_slice(row);
        }
        Ok(data)
    }
}

impl Drop for MappedSurface<'_> {
    fn drop(&mut self) {
        unsafe {
            self.context.Unmap(self.resource, 0);
        }
    }
}
