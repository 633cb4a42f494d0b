use std::fmt;

/// Desktop-coordinate rectangle of a physical display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DesktopRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// One display output attached to an adapter. Immutable once enumerated.
#[derive(Clone, Debug)]
pub struct OutputDescriptor {
    /// Position of this output within its adapter's enumeration order.
    pub index: u32,
    /// Device name as reported by the driver (e.g. `\\.\DISPLAY1`).
    pub name: String,
    pub desktop_rect: DesktopRect,
}

impl OutputDescriptor {
    pub fn resolution(&self) -> (u32, u32) {
        (self.desktop_rect.width, self.desktop_rect.height)
    }
}

impl fmt::Display for OutputDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{})",
            self.name, self.desktop_rect.width, self.desktop_rect.height
        )
    }
}

/// One GPU adapter and the outputs attached to it. Immutable once
/// enumerated; lives for the process duration inside the service's
/// discovery cache.
#[derive(Clone, Debug)]
pub struct AdapterDescriptor {
    /// Position of this adapter within the platform enumeration order.
    pub index: u32,
    /// Human-readable adapter description (e.g. the GPU model name).
    pub description: String,
    /// Dedicated video memory in bytes.
    pub dedicated_video_memory: u64,
    /// Outputs attached to this adapter. May be empty (e.g. a compute-only
    /// or indirect adapter); such adapters are not valid capture targets.
    pub outputs: Vec<OutputDescriptor>,
}

impl AdapterDescriptor {
    pub fn output(&self, index: u32) -> Option<&OutputDescriptor> {
        self.outputs.get(index as usize)
    }
}

impl fmt::Display for AdapterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} output{})",
            self.description,
            self.outputs.len(),
            if self.outputs.len() == 1 { "" } else { "s" }
        )
    }
}
