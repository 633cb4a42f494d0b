use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::frame::Frame;

/// Bounded, thread-safe holder of recently captured frames, newest first.
///
/// One producer (the capture thread) pushes; any number of consumers read
/// the most recent frame. Frames are immutable behind `Arc` and the head
/// swap happens under the mutex, so a reader can never observe a partially
/// written frame. Pushing never blocks: at capacity the oldest entry is
/// evicted.
pub struct FrameCache {
    state: Mutex<CacheState>,
    available: Condvar,
    capacity: usize,
}

struct CacheState {
    frames: VecDeque<Arc<Frame>>,
    /// Total frames ever pushed. Doubles as the sequence stamp for the
    /// next frame (first published frame gets sequence 1).
    pushed: u64,
}

impl FrameCache {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                frames: VecDeque::with_capacity(capacity),
                pushed: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a frame at the head, evicting the oldest entry when full.
    /// O(1); never blocks; wakes all blocked readers.
    pub fn push(&self, mut frame: Frame) {
        let mut state = self.lock();
        state.pushed += 1;
        frame.sequence = state.pushed;
        if state.frames.len() == self.capacity {
            state.frames.pop_back();
        }
        state.frames.push_front(Arc::new(frame));
        drop(state);
        self.available.notify_all();
    }

    /// The most recently pushed frame, or `None` if nothing has been
    /// pushed yet. Never blocks.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.lock().frames.front().cloned()
    }

    /// Block until at least one frame is available, then return the
    /// newest one. Re-checks on every wake so spurious wake-ups never
    /// return an empty result.
    pub fn wait_latest(&self) -> Arc<Frame> {
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.frames.front() {
                return Arc::clone(frame);
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like [`wait_latest`](Self::wait_latest) but gives up after
    /// `timeout`, returning `None` when no frame arrived in time.
    pub fn wait_latest_timeout(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.frames.front() {
                return Some(Arc::clone(frame));
            }
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            let (guard, _) = match self.available.wait_timeout(state, remaining) {
                Ok(result) => result,
                Err(poisoned) => poisoned.into_inner(),
            };
            state = guard;
        }
    }

    /// Snapshot of the retained frames, newest first.
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.lock().frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of frames ever pushed (not just retained). The last
    /// pushed frame carries this value as its sequence number.
    pub fn sequence(&self) -> u64 {
        self.lock().pushed
    }

    /// Drop all retained frames. The sequence counter is not reset, so
    /// consumers holding old frames can still detect staleness.
    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A poisoned cache mutex means a reader panicked mid-snapshot;
        // the state itself is still consistent.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
