use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::adapter::AdapterDescriptor;
use crate::backend::{self, CaptureBackend};
use crate::camera::Camera;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};

/// Process-wide capture façade: discovers adapters and outputs once,
/// lazily, and hands out started [`Camera`]s by (adapter, output) index.
///
/// At most one camera is active at a time; starting a second while one is
/// running is an error, never an implicit replacement. Dropping the
/// service stops any active camera, so no capture thread outlives it.
pub struct CaptureService {
    backend: Arc<dyn CaptureBackend>,
    state: Mutex<ServiceState>,
}

#[derive(Default)]
struct ServiceState {
    /// `Some` once discovery has run; discovery happens exactly once for
    /// the service's lifetime.
    adapters: Option<Vec<AdapterDescriptor>>,
    current: Option<Arc<Camera>>,
}

impl CaptureService {
    /// Service over the platform's capture backend. Fails off-Windows or
    /// when the display-duplication capability is absent.
    pub fn new() -> CaptureResult<Self> {
        Ok(Self::with_backend(backend::default_backend()?))
    }

    pub(crate) fn with_backend(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// All adapters and their outputs, enumerated on first call and
    /// cached for the service lifetime.
    pub fn adapters(&self) -> CaptureResult<Vec<AdapterDescriptor>> {
        let mut state = self.lock_state();
        Ok(self.discovered(&mut state)?.to_vec())
    }

    /// Validate the target, build (or reuse) the device for its adapter,
    /// start a camera on it, and return the running camera handle.
    pub fn start(&self, config: &CaptureConfig) -> CaptureResult<Arc<Camera>> {
        let mut state = self.lock_state();
        if state.current.is_some() {
            return Err(CaptureError::CameraActive);
        }

        let adapters = self.discovered(&mut state)?;
        let adapter = adapters
            .iter()
            .find(|a| a.index == config.adapter_index)
            .ok_or_else(|| {
                CaptureError::InvalidTarget(format!(
                    "adapter index {} out of range ({} adapters)",
                    config.adapter_index,
                    adapters.len()
                ))
            })?;
        let output = adapter.output(config.output_index).ok_or_else(|| {
            CaptureError::InvalidTarget(format!(
                "output index {} out of range for adapter {} ({} outputs)",
                config.output_index,
                adapter.description,
                adapter.outputs.len()
            ))
        })?;
        let output_rect = output.desktop_rect;

        let source = self
            .backend
            .create_source(config.adapter_index, config.output_index)?;
        let camera = Arc::new(Camera::new(
            source,
            output_rect,
            config.region,
            config.cache_capacity,
        )?);
        camera.start_capture(config.target_fps, None)?;
        debug!(
            adapter = config.adapter_index,
            output = config.output_index,
            "camera started"
        );

        state.current = Some(Arc::clone(&camera));
        Ok(camera)
    }

    /// Stop and discard the current camera.
    pub fn stop(&self) -> CaptureResult<()> {
        let camera = self
            .lock_state()
            .current
            .take()
            .ok_or(CaptureError::NotCapturing)?;
        stop_if_running(&camera);
        Ok(())
    }

    /// The currently active camera, if any.
    pub fn current_camera(&self) -> Option<Arc<Camera>> {
        self.lock_state().current.clone()
    }

    fn discovered<'a>(
        &self,
        state: &'a mut MutexGuard<'_, ServiceState>,
    ) -> CaptureResult<&'a [AdapterDescriptor]> {
        if state.adapters.is_none() {
            let adapters = self.backend.enumerate_adapters()?;
            debug!(count = adapters.len(), "adapters discovered");
            state.adapters = Some(adapters);
        }
        Ok(state.adapters.as_deref().unwrap_or_default())
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        if let Some(camera) = self.lock_state().current.take() {
            stop_if_running(&camera);
        }
    }
}

fn stop_if_running(camera: &Camera) {
    // The capture loop may already have died fatally; stopping an idle
    // camera is the caller's misuse but not ours here.
    let _ = camera.stop_capture();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DesktopRect, OutputDescriptor};
    use crate::backend::CaptureSource;
    use crate::frame::Frame;
    use crate::region::Region;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSource {
        width: u32,
        height: u32,
    }

    impl CaptureSource for MockSource {
        fn grab(&mut self, region: &Region) -> CaptureResult<Option<Frame>> {
            let (w, h) = if region.covers_output(self.width, self.height) {
                (self.width, self.height)
            } else {
                (region.width(), region.height())
            };
            let frame = Frame::from_bgra8(w, h, vec![0u8; (w * h) as usize * 4])?;
            Ok(Some(frame))
        }

        fn reset(&mut self) -> CaptureResult<()> {
            Ok(())
        }
    }

    struct MockBackend {
        enumerations: AtomicUsize,
        sources_created: AtomicUsize,
    }

    impl MockBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                enumerations: AtomicUsize::new(0),
                sources_created: AtomicUsize::new(0),
            })
        }

        fn descriptors() -> Vec<AdapterDescriptor> {
            vec![
                AdapterDescriptor {
                    index: 0,
                    description: "Mock GPU".into(),
                    dedicated_video_memory: 1 << 30,
                    outputs: vec![OutputDescriptor {
                        index: 0,
                        name: r"\\.\DISPLAY1".into(),
                        desktop_rect: DesktopRect {
                            left: 0,
                            top: 0,
                            width: 64,
                            height: 48,
                        },
                    }],
                },
                // A headless adapter: enumerated, but not a valid target.
                AdapterDescriptor {
                    index: 1,
                    description: "Mock Compute Adapter".into(),
                    dedicated_video_memory: 0,
                    outputs: vec![],
                },
            ]
        }
    }

    impl CaptureBackend for MockBackend {
        fn enumerate_adapters(&self) -> CaptureResult<Vec<AdapterDescriptor>> {
            self.enumerations.fetch_add(1, Ordering::SeqCst);
            Ok(Self::descriptors())
        }

        fn create_source(
            &self,
            adapter_index: u32,
            output_index: u32,
        ) -> CaptureResult<Box<dyn CaptureSource>> {
            let adapters = Self::descriptors();
            let output = adapters
                .iter()
                .find(|a| a.index == adapter_index)
                .and_then(|a| a.output(output_index))
                .ok_or_else(|| CaptureError::InvalidTarget("no such output".into()))?;
            self.sources_created.fetch_add(1, Ordering::SeqCst);
            let (width, height) = output.resolution();
            Ok(Box::new(MockSource { width, height }))
        }
    }

    #[test]
    fn discovery_runs_exactly_once() {
        let backend = MockBackend::new();
        let service = CaptureService::with_backend(backend.clone());
        let first = service.adapters().unwrap();
        let second = service.adapters().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(backend.enumerations.load(Ordering::SeqCst), 1);

        // Starting reuses the cached discovery too.
        let _camera = service.start(&CaptureConfig::default()).unwrap();
        assert_eq!(backend.enumerations.load(Ordering::SeqCst), 1);
        service.stop().unwrap();
    }

    #[test]
    fn out_of_range_indices_are_invalid_targets() {
        let service = CaptureService::with_backend(MockBackend::new());
        let bad_adapter = CaptureConfig {
            adapter_index: 5,
            ..Default::default()
        };
        assert!(matches!(
            service.start(&bad_adapter),
            Err(CaptureError::InvalidTarget(_))
        ));

        let bad_output = CaptureConfig {
            output_index: 3,
            ..Default::default()
        };
        assert!(matches!(
            service.start(&bad_output),
            Err(CaptureError::InvalidTarget(_))
        ));

        // The headless adapter exists but has no outputs.
        let headless = CaptureConfig {
            adapter_index: 1,
            ..Default::default()
        };
        assert!(matches!(
            service.start(&headless),
            Err(CaptureError::InvalidTarget(_))
        ));
    }

    #[test]
    fn a_second_start_while_active_is_an_error_not_a_replacement() {
        let backend = MockBackend::new();
        let service = CaptureService::with_backend(backend.clone());
        let camera = service.start(&CaptureConfig::default()).unwrap();
        assert!(matches!(
            service.start(&CaptureConfig::default()),
            Err(CaptureError::CameraActive)
        ));
        assert_eq!(backend.sources_created.load(Ordering::SeqCst), 1);
        assert!(camera.is_capturing());

        service.stop().unwrap();
        assert!(!camera.is_capturing());
        let _again = service.start(&CaptureConfig::default()).unwrap();
        service.stop().unwrap();
    }

    #[test]
    fn stop_without_an_active_camera_is_reported() {
        let service = CaptureService::with_backend(MockBackend::new());
        assert!(matches!(service.stop(), Err(CaptureError::NotCapturing)));
    }

    #[test]
    fn started_camera_delivers_frames_cropped_to_the_region() {
        let service = CaptureService::with_backend(MockBackend::new());
        let config = CaptureConfig {
            region: Some(Region::new(4, 4, 20, 36).unwrap()),
            target_fps: 1000,
            ..Default::default()
        };
        let camera = service.start(&config).unwrap();
        let frame = camera
            .latest_frame_timeout(std::time::Duration::from_secs(5))
            .expect("frames arrive");
        assert_eq!(frame.dimensions(), (16, 32));
        service.stop().unwrap();
    }

    #[test]
    fn dropping_the_service_stops_the_active_camera() {
        let service = CaptureService::with_backend(MockBackend::new());
        let camera = service.start(&CaptureConfig::default()).unwrap();
        assert!(camera.is_capturing());
        drop(service);
        assert!(!camera.is_capturing());
    }
}
