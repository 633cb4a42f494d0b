use anyhow::Context;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_11_0,
    D3D_FEATURE_LEVEL_11_1,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_SDK_VERSION, D3D11CreateDevice, ID3D11Device,
    ID3D11DeviceContext,
};
use windows::Win32::Graphics::Dxgi::IDXGIAdapter;

/// A D3D11 device bound to one adapter, shared by every capture source on
/// that adapter. The immediate context is only ever driven from one
/// capture thread at a time.
pub(crate) struct Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

impl Device {
    pub(crate) fn new(adapter: &IDXGIAdapter) -> crate::error::CaptureResult<Self> {
        create(adapter).map_err(crate::error::CaptureError::DeviceCreation)
    }

    pub(crate) fn d3d_device(&self) -> &ID3D11Device {
        &self.device
    }

    pub(crate) fn immediate_context(&self) -> &ID3D11DeviceContext {
        &self.context
    }
}

fn create(adapter: &IDXGIAdapter) -> anyhow::Result<Device> {
    // Older runtimes reject an array containing 11.1 outright with
    // E_INVALIDARG, so retry with the level removed rather than failing.
    let with_11_1 = [
        D3D_FEATURE_LEVEL_11_1,
        D3D_FEATURE_LEVEL_11_0,
        D3D_FEATURE_LEVEL_10_1,
    ];
    let without_11_1 = [D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_1];

    match create_with_levels(adapter, &with_11_1) {
        Ok(device) => Ok(device),
        Err(_) => create_with_levels(adapter, &without_11_1)
            .context("D3D11CreateDevice failed on the requested adapter"),
    }
}

fn create_with_levels(
    adapter: &IDXGIAdapter,
    feature_levels: &[D3D_FEATURE_LEVEL],
) -> anyhow::Result<Device> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            adapter,
            D3D_DRIVER_TYPE_UNKNOWN,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .context("D3D11CreateDevice failed")?;

    let device = device.context("D3D11CreateDevice did not return a device")?;
    let context = context.context("D3D11CreateDevice did not return a device context")?;
    Ok(Device { device, context })
}
