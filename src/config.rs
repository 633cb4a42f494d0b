use crate::region::Region;

/// Plain-value configuration for starting a capture. The settings layer
/// that produces these values (files, CLI, UI) lives outside this crate.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Adapter to capture from, by enumeration order.
    pub adapter_index: u32,
    /// Output on that adapter, by enumeration order.
    pub output_index: u32,
    /// Crop region in output-local pixel coordinates. `None` captures
    /// the full output.
    pub region: Option<Region>,
    /// Target capture rate. The capture thread paces to this; actual
    /// delivery depends on how often the desktop presents new frames.
    pub target_fps: u32,
    /// Capacity of the frame cache backing `latest_frame`.
    pub cache_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            output_index: 0,
            region: None,
            target_fps: 60,
            cache_capacity: 16,
        }
    }
}
