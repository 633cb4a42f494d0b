use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::adapter::DesktopRect;
use crate::backend::CaptureSource;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::Frame;
use crate::frame_cache::FrameCache;
use crate::region::Region;

/// Orchestrates one capture target: a capture source (duplication session
/// plus staging surface), a frame cache, and a paced background thread
/// that feeds the cache.
///
/// All GPU work happens on the capture thread; consumer threads only read
/// from the cache. The camera itself is shareable (`&self` methods with
/// internal locking) so a service can hand out `Arc<Camera>` handles.
pub struct Camera {
    output_rect: DesktopRect,
    default_region: Region,
    cache: Arc<FrameCache>,
    stop: Arc<StopSignal>,
    failure: Arc<Mutex<Option<CaptureError>>>,
    worker: Mutex<Worker>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CameraState {
    Idle,
    Capturing,
    Stopping,
}

struct Worker {
    state: CameraState,
    /// Returns the source when the loop exits so the camera can restart.
    thread: Option<JoinHandle<Box<dyn CaptureSource>>>,
    /// Present while Idle; moved into the capture thread while Capturing.
    source: Option<Box<dyn CaptureSource>>,
}

impl Camera {
    pub(crate) fn new(
        source: Box<dyn CaptureSource>,
        output_rect: DesktopRect,
        region: Option<Region>,
        cache_capacity: usize,
    ) -> CaptureResult<Self> {
        let default_region = validate_region(region, &output_rect)?;
        Ok(Self {
            output_rect,
            default_region,
            cache: Arc::new(FrameCache::new(cache_capacity)),
            stop: Arc::new(StopSignal::new()),
            failure: Arc::new(Mutex::new(None)),
            worker: Mutex::new(Worker {
                state: CameraState::Idle,
                thread: None,
                source: Some(source),
            }),
        })
    }

    /// Desktop rectangle of the output this camera is bound to.
    pub fn output_rect(&self) -> DesktopRect {
        self.output_rect
    }

    /// Spawn the capture thread, paced to `target_fps` (clamped to at
    /// least 1) and pinned to `region` (defaults to the region given at
    /// construction, which itself defaults to the full output).
    ///
    /// Starting an already-capturing camera is a reported error. A fatal
    /// failure from a previous capture run is surfaced here, once, before
    /// anything is started.
    pub fn start_capture(&self, target_fps: u32, region: Option<Region>) -> CaptureResult<()> {
        let mut worker = self.lock_worker();
        self.reap_finished(&mut worker);
        if worker.state != CameraState::Idle {
            return Err(CaptureError::AlreadyCapturing);
        }
        if let Some(failure) = take_failure_slot(&self.failure) {
            return Err(failure);
        }

        let region = match region {
            Some(region) => validate_region(Some(region), &self.output_rect)?,
            None => self.default_region,
        };
        let period = Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1)));

        let Some(mut source) = worker.source.take() else {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "capture source was lost by an earlier failure; rebuild the camera"
            )));
        };
        let cache = Arc::clone(&self.cache);
        let stop = Arc::clone(&self.stop);
        let failure = Arc::clone(&self.failure);

        stop.clear();
        let thread = std::thread::Builder::new()
            .name("deskcam-capture".to_string())
            .spawn(move || {
                capture_loop(source.as_mut(), region, period, &cache, &stop, &failure);
                source
            })
            .map_err(|e| {
                CaptureError::Platform(anyhow::anyhow!("failed to spawn capture thread: {e}"))
            });

        match thread {
            Ok(handle) => {
                worker.thread = Some(handle);
                worker.state = CameraState::Capturing;
                debug!(fps = target_fps, "capture started");
                Ok(())
            }
            Err(e) => {
                // The failed spawn dropped its closure and the source
                // inside it; the camera cannot be restarted.
                worker.state = CameraState::Idle;
                Err(e)
            }
        }
    }

    /// Signal the capture thread to exit, join it, and clear the cache so
    /// a later start never serves frames from this run. The thread is
    /// guaranteed to have fully exited when this returns: no frame can be
    /// pushed afterwards.
    ///
    /// Stopping an idle camera is a reported error.
    pub fn stop_capture(&self) -> CaptureResult<()> {
        let mut worker = self.lock_worker();
        self.reap_finished(&mut worker);
        if worker.state != CameraState::Capturing {
            return Err(CaptureError::NotCapturing);
        }
        worker.state = CameraState::Stopping;
        self.stop.set();
        self.join_thread(&mut worker);
        self.cache.clear();
        debug!("capture stopped");
        Ok(())
    }

    /// Whether the capture thread is currently running.
    pub fn is_capturing(&self) -> bool {
        let mut worker = self.lock_worker();
        self.reap_finished(&mut worker);
        worker.state == CameraState::Capturing
    }

    /// The most recent frame, blocking until at least one has been
    /// captured. Consumers polling faster than the capture rate wait
    /// here instead of spinning.
    pub fn latest_frame(&self) -> Arc<Frame> {
        self.cache.wait_latest()
    }

    /// Blocking variant with a deadline; `None` when no frame arrived in
    /// time.
    pub fn latest_frame_timeout(&self, timeout: Duration) -> Option<Arc<Frame>> {
        self.cache.wait_latest_timeout(timeout)
    }

    /// Non-blocking peek at the most recent frame, for consumers that
    /// must never stall (e.g. a render loop). `None` until the first
    /// frame of the current capture run arrives.
    pub fn try_latest_frame(&self) -> Option<Arc<Frame>> {
        self.cache.latest()
    }

    /// Take the fatal error that terminated the capture loop, if any.
    /// The error is reported exactly once: through here or through the
    /// next `start_capture`, whichever comes first.
    pub fn take_failure(&self) -> Option<CaptureError> {
        take_failure_slot(&self.failure)
    }

    /// The cache backing `latest_frame`; exposed for staleness checks
    /// via its sequence counter.
    pub fn frame_cache(&self) -> &FrameCache {
        &self.cache
    }

    fn lock_worker(&self) -> MutexGuard<'_, Worker> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// If the capture thread exited on its own (fatal loop error), join
    /// it and return the camera to Idle so the stored failure can be
    /// surfaced instead of a misleading `AlreadyCapturing`.
    fn reap_finished(&self, worker: &mut Worker) {
        if worker.state == CameraState::Capturing
            && worker.thread.as_ref().is_some_and(|t| t.is_finished())
        {
            self.join_thread(worker);
        }
    }

    fn join_thread(&self, worker: &mut Worker) {
        if let Some(thread) = worker.thread.take() {
            match thread.join() {
                Ok(source) => worker.source = Some(source),
                Err(_) => {
                    // The loop panicked and the source is gone; the
                    // camera cannot be restarted.
                    store_failure(
                        &self.failure,
                        CaptureError::Platform(anyhow::anyhow!("capture thread panicked")),
                    );
                }
            }
        }
        worker.state = CameraState::Idle;
    }

}

fn validate_region(region: Option<Region>, output_rect: &DesktopRect) -> CaptureResult<Region> {
    let (width, height) = (output_rect.width, output_rect.height);
    match region {
        Some(region) if !region.fits_within(width, height) => {
            Err(CaptureError::InvalidRegion(format!(
                "region {{{}, {}, {}, {}}} exceeds the {}x{} output",
                region.left, region.top, region.right, region.bottom, width, height
            )))
        }
        Some(region) => Ok(region),
        None => Ok(Region::full_output(width, height)),
    }
}

fn take_failure_slot(slot: &Mutex<Option<CaptureError>>) -> Option<CaptureError> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

fn store_failure(slot: &Mutex<Option<CaptureError>>, failure: CaptureError) {
    let mut guard = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    // Keep the first failure; it is the root cause.
    guard.get_or_insert(failure);
}

/// The paced producer loop: wait for the next tick, poll the source,
/// publish. Transient access loss is absorbed by recreating the
/// duplication session; anything else stops the loop and records the
/// failure for the camera's owner.
fn capture_loop(
    source: &mut dyn CaptureSource,
    region: Region,
    period: Duration,
    cache: &FrameCache,
    stop: &StopSignal,
    failure: &Mutex<Option<CaptureError>>,
) {
    let mut next_tick = Instant::now();
    loop {
        let now = Instant::now();
        let wait = next_tick.saturating_duration_since(now);
        if stop.wait_timeout(wait) {
            break;
        }
        // Ticks are never queued: a late tick reschedules from now
        // instead of bursting to catch up.
        next_tick = (next_tick + period).max(Instant::now());

        match source.grab(&region) {
            Ok(Some(frame)) => cache.push(frame),
            Ok(None) => {}
            Err(err) if err.is_transient() => {
                debug!("duplication access lost; recreating the session");
                if let Err(reset_err) = source.reset() {
                    error!(error = %reset_err, "failed to recreate duplication session");
                    store_failure(failure, reset_err);
                    break;
                }
            }
            Err(err) => {
                error!(error = %err, "capture failed fatally");
                store_failure(failure, err);
                break;
            }
        }
    }
}

/// A one-shot, resettable signal: set wakes every paced wait immediately,
/// so a stop request interrupts the capture thread within one pacing
/// interval.
struct StopSignal {
    set: Mutex<bool>,
    trigger: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            set: Mutex::new(false),
            trigger: Condvar::new(),
        }
    }

    fn set(&self) {
        let mut set = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *set = true;
        drop(set);
        self.trigger.notify_all();
    }

    fn clear(&self) {
        let mut set = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *set = false;
    }

    /// Wait up to `timeout` for the signal. Returns whether it is set.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if *set {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            set = match self.trigger.wait_timeout(set, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OUTPUT: DesktopRect = DesktopRect {
        left: 0,
        top: 0,
        width: 64,
        height: 48,
    };

    #[derive(Clone, Copy)]
    enum Step {
        Frame,
        Empty,
        Lost,
        Fatal,
    }

    /// Scripted capture source: plays back a fixed sequence of grab
    /// outcomes, then produces frames forever.
    struct ScriptedSource {
        script: Arc<Mutex<VecDeque<Step>>>,
        resets: Arc<AtomicUsize>,
        reset_fails: bool,
        regions: Arc<Mutex<Vec<Region>>>,
    }

    impl ScriptedSource {
        fn boxed(
            steps: Vec<Step>,
            resets: &Arc<AtomicUsize>,
            reset_fails: bool,
            regions: &Arc<Mutex<Vec<Region>>>,
        ) -> Box<dyn CaptureSource> {
            Box::new(Self {
                script: Arc::new(Mutex::new(steps.into())),
                resets: Arc::clone(resets),
                reset_fails,
                regions: Arc::clone(regions),
            })
        }

        fn make_frame(region: &Region) -> Frame {
            let len = (region.width() * region.height()) as usize * 4;
            Frame::from_bgra8(region.width(), region.height(), vec![0u8; len]).unwrap()
        }
    }

    impl CaptureSource for ScriptedSource {
        fn grab(&mut self, region: &Region) -> CaptureResult<Option<Frame>> {
            self.regions.lock().unwrap().push(*region);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Frame);
            match step {
                Step::Frame => Ok(Some(Self::make_frame(region))),
                Step::Empty => Ok(None),
                Step::Lost => Err(CaptureError::AccessLost),
                Step::Fatal => Err(CaptureError::Duplication(anyhow::anyhow!(
                    "scripted fatal failure"
                ))),
            }
        }

        fn reset(&mut self) -> CaptureResult<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.reset_fails {
                Err(CaptureError::Duplication(anyhow::anyhow!(
                    "scripted reset failure"
                )))
            } else {
                Ok(())
            }
        }
    }

    fn camera_with(steps: Vec<Step>, reset_fails: bool) -> (Camera, Arc<AtomicUsize>) {
        let resets = Arc::new(AtomicUsize::new(0));
        let regions = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource::boxed(steps, &resets, reset_fails, &regions);
        let camera = Camera::new(source, OUTPUT, None, 16).unwrap();
        (camera, resets)
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn rejects_region_outside_the_output() {
        let resets = Arc::new(AtomicUsize::new(0));
        let regions = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource::boxed(vec![], &resets, false, &regions);
        let oversized = Region::new(0, 0, 100, 100).unwrap();
        assert!(matches!(
            Camera::new(source, OUTPUT, Some(oversized), 16),
            Err(CaptureError::InvalidRegion(_))
        ));
    }

    #[test]
    fn starting_twice_is_a_reported_misuse() {
        let (camera, _) = camera_with(vec![], false);
        camera.start_capture(500, None).unwrap();
        assert!(matches!(
            camera.start_capture(500, None),
            Err(CaptureError::AlreadyCapturing)
        ));
        camera.stop_capture().unwrap();
    }

    #[test]
    fn stopping_an_idle_camera_is_a_reported_misuse() {
        let (camera, _) = camera_with(vec![], false);
        assert!(matches!(
            camera.stop_capture(),
            Err(CaptureError::NotCapturing)
        ));
    }

    #[test]
    fn delivers_frames_and_blocks_consumers_until_the_first_one() {
        let (camera, _) = camera_with(vec![Step::Empty, Step::Empty], false);
        camera.start_capture(500, None).unwrap();
        let frame = camera
            .latest_frame_timeout(Duration::from_secs(5))
            .expect("a frame should arrive");
        assert_eq!(frame.dimensions(), (OUTPUT.width, OUTPUT.height));
        camera.stop_capture().unwrap();
    }

    #[test]
    fn no_frame_is_pushed_after_stop_returns() {
        let (camera, _) = camera_with(vec![], false);
        camera.start_capture(1000, None).unwrap();
        wait_until(|| camera.frame_cache().sequence() > 0);
        camera.stop_capture().unwrap();

        let sequence_at_stop = camera.frame_cache().sequence();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(camera.frame_cache().sequence(), sequence_at_stop);
        assert!(camera.try_latest_frame().is_none(), "cache is cleared");
    }

    #[test]
    fn start_stop_cycles_leave_the_camera_reusable() {
        let (camera, _) = camera_with(vec![], false);
        for _ in 0..3 {
            camera.start_capture(1000, None).unwrap();
            assert!(camera.is_capturing());
            camera
                .latest_frame_timeout(Duration::from_secs(5))
                .expect("each run delivers frames");
            camera.stop_capture().unwrap();
            assert!(!camera.is_capturing());
            // No frames carried over from the previous run.
            assert!(camera.try_latest_frame().is_none());
        }
    }

    #[test]
    fn access_loss_is_recovered_by_recreating_the_session() {
        let (camera, resets) = camera_with(vec![Step::Lost], false);
        camera.start_capture(1000, None).unwrap();
        let frame = camera
            .latest_frame_timeout(Duration::from_secs(5))
            .expect("capture resumes after recreation");
        assert!(frame.sequence() >= 1);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(camera.is_capturing());
        camera.stop_capture().unwrap();
        assert!(camera.take_failure().is_none());
    }

    #[test]
    fn failed_recreation_kills_the_loop_and_surfaces_one_fatal_error() {
        let (camera, resets) = camera_with(vec![Step::Lost], true);
        camera.start_capture(1000, None).unwrap();
        wait_until(|| !camera.is_capturing());
        assert_eq!(resets.load(Ordering::SeqCst), 1);

        // Surfaced exactly once, at the next start attempt...
        assert!(matches!(
            camera.start_capture(1000, None),
            Err(CaptureError::Duplication(_))
        ));
        // ...and not again.
        assert!(camera.take_failure().is_none());
        camera.start_capture(1000, None).unwrap();
        camera.stop_capture().unwrap();
    }

    #[test]
    fn fatal_grab_error_is_observable_via_take_failure() {
        let (camera, _) = camera_with(vec![Step::Fatal], false);
        camera.start_capture(1000, None).unwrap();
        wait_until(|| !camera.is_capturing());
        assert!(matches!(
            camera.take_failure(),
            Some(CaptureError::Duplication(_))
        ));
        assert!(camera.take_failure().is_none());
    }

    #[test]
    fn capture_region_is_forwarded_to_the_source() {
        let resets = Arc::new(AtomicUsize::new(0));
        let regions = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource::boxed(vec![], &resets, false, &regions);
        let camera = Camera::new(source, OUTPUT, None, 16).unwrap();

        let sub = Region::new(8, 8, 24, 40).unwrap();
        camera.start_capture(1000, Some(sub)).unwrap();
        let frame = camera
            .latest_frame_timeout(Duration::from_secs(5))
            .expect("cropped frames arrive");
        camera.stop_capture().unwrap();

        assert_eq!(frame.dimensions(), (sub.width(), sub.height()));
        let seen = regions.lock().unwrap();
        assert!(seen.iter().all(|r| *r == sub));
    }

    #[test]
    fn stop_unblocks_a_paced_wait_promptly() {
        let (camera, _) = camera_with(vec![], false);
        // 1 fps: the loop spends almost all its time in the paced wait.
        camera.start_capture(1, None).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let begun = Instant::now();
        camera.stop_capture().unwrap();
        assert!(begun.elapsed() < Duration::from_secs(1));
    }
}
