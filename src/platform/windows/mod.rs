use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::adapter::AdapterDescriptor;
use crate::backend::{CaptureBackend, CaptureSource};
use crate::error::CaptureResult;

mod com;
mod device;
mod duplication;
mod registry;
mod source;
mod staging;

use device::Device;
use source::DxgiCaptureSource;

/// DXGI desktop-duplication backend. Devices are created on demand and
/// cached per adapter, so repeated start/stop cycles on the same adapter
/// reuse one D3D11 device.
pub(crate) struct WindowsBackend {
    devices: Mutex<HashMap<u32, Arc<Device>>>,
}

impl WindowsBackend {
    pub(crate) fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    fn lock_devices(&self) -> MutexGuard<'_, HashMap<u32, Arc<Device>>> {
        match self.devices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CaptureBackend for WindowsBackend {
    fn enumerate_adapters(&self) -> CaptureResult<Vec<AdapterDescriptor>> {
        registry::enumerate()
    }

    fn create_source(
        &self,
        adapter_index: u32,
        output_index: u32,
    ) -> CaptureResult<Box<dyn CaptureSource>> {
        let resolved = registry::resolve(adapter_index, output_index)?;

        let device = {
            let mut devices = self.lock_devices();
            match devices.get(&adapter_index) {
                Some(device) => Arc::clone(device),
                None => {
                    let device = Arc::new(Device::new(&resolved.adapter)?);
                    debug!(adapter = adapter_index, "d3d11 device created");
                    devices.insert(adapter_index, Arc::clone(&device));
                    device
                }
            }
        };

        let source = DxgiCaptureSource::new(
            device,
            resolved.output,
            resolved.desktop_rect.width,
            resolved.desktop_rect.height,
        )?;
        Ok(Box::new(source))
    }
}
