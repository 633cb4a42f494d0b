use anyhow::Context;
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, DXGI_ERROR_NOT_FOUND, IDXGIAdapter, IDXGIFactory1, IDXGIOutput,
};
use windows::core::Interface;

use crate::adapter::{AdapterDescriptor, DesktopRect, OutputDescriptor};
use crate::error::{CaptureError, CaptureResult};

/// An enumerated output together with the live DXGI interfaces needed to
/// duplicate it.
pub(crate) struct ResolvedTarget {
    pub adapter: IDXGIAdapter,
    pub output: IDXGIOutput,
    pub desktop_rect: DesktopRect,
}

/// Walk every adapter on the system and every desktop-attached output on
/// each adapter. Adapters without outputs (compute-only, detached) are
/// still listed; their output vector is simply empty.
pub(crate) fn enumerate() -> CaptureResult<Vec<AdapterDescriptor>> {
    let mut adapters = Vec::new();
    walk(|adapter| adapters.push(adapter.descriptor))?;
    Ok(adapters)
}

/// Re-enumerate and pick out one output, keeping its DXGI interfaces.
/// Indices refer to enumeration order, the same order [`enumerate`]
/// reports.
pub(crate) fn resolve(adapter_index: u32, output_index: u32) -> CaptureResult<ResolvedTarget> {
    let mut found = None;
    walk(|adapter| {
        if adapter.descriptor.index != adapter_index {
            return;
        }
        if let Some((output, desc)) = adapter
            .outputs
            .into_iter()
            .zip(adapter.descriptor.outputs)
            .find(|(_, desc)| desc.index == output_index)
        {
            found = Some(ResolvedTarget {
                adapter: adapter.interface,
                output,
                desktop_rect: desc.desktop_rect,
            });
        }
    })?;

    found.ok_or_else(|| {
        CaptureError::InvalidTarget(format!(
            "no desktop output {output_index} on adapter {adapter_index}"
        ))
    })
}

struct WalkedAdapter {
    interface: IDXGIAdapter,
    descriptor: AdapterDescriptor,
    /// Parallel to `descriptor.outputs`.
    outputs: Vec<IDXGIOutput>,
}

fn walk(mut visit: impl FnMut(WalkedAdapter)) -> CaptureResult<()> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }
        .context("CreateDXGIFactory1 failed")
        .map_err(CaptureError::Discovery)?;

    let mut adapter_idx = 0u32;
    loop {
        let adapter1 = match unsafe { factory.EnumAdapters1(adapter_idx) } {
            Ok(a) => a,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => {
                return Err(CaptureError::Discovery(
                    anyhow::Error::from(e).context(format!("EnumAdapters1({adapter_idx}) failed")),
                ));
            }
        };
        let adapter_desc = unsafe { adapter1.GetDesc1() }
            .context("IDXGIAdapter1::GetDesc1 failed")
            .map_err(CaptureError::Discovery)?;
        let description = utf16z_to_string(&adapter_desc.Description);

        let adapter: IDXGIAdapter = adapter1
            .cast()
            .context("failed to cast IDXGIAdapter1 to IDXGIAdapter")
            .map_err(CaptureError::Discovery)?;

        let mut outputs = Vec::new();
        let mut output_descs = Vec::new();
        let mut output_idx = 0u32;
        loop {
            let output = match unsafe { adapter.EnumOutputs(output_idx) } {
                Ok(o) => o,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => {
                    return Err(CaptureError::Discovery(anyhow::Error::from(e).context(
                        format!("EnumOutputs({output_idx}) on adapter {adapter_idx} failed"),
                    )));
                }
            };

            let desc = unsafe { output.GetDesc() }
                .context("IDXGIOutput::GetDesc failed")
                .map_err(CaptureError::Discovery)?;

            // Only desktop-attached outputs can be duplicated; detached
            // ones are skipped and do not consume an index.
            if desc.AttachedToDesktop.as_bool() {
                let coords = desc.DesktopCoordinates;
                output_descs.push(OutputDescriptor {
                    index: output_descs.len() as u32,
                    name: utf16z_to_string(&desc.DeviceName),
                    desktop_rect: DesktopRect {
                        left: coords.left,
                        top: coords.top,
                        width: (coords.right - coords.left).max(0) as u32,
                        height: (coords.bottom - coords.top).max(0) as u32,
                    },
                });
                outputs.push(output);
            }

            output_idx += 1;
        }

        visit(WalkedAdapter {
            interface: adapter,
            descriptor: AdapterDescriptor {
                index: adapter_idx,
                description,
                dedicated_video_memory: adapter_desc.DedicatedVideoMemory as u64,
                outputs: output_descs,
            },
            outputs,
        });

        adapter_idx += 1;
    }

    Ok(())
}

fn utf16z_to_string(input: &[u16]) -> String {
    let len = input.iter().position(|&ch| ch == 0).unwrap_or(input.len());
    String::from_utf16_lossy(&input[..len])
}
