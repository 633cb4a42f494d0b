//! GPU desktop capture built on DXGI desktop duplication.
//!
//! A [`CaptureService`] enumerates the system's graphics adapters and
//! their outputs, then starts a [`Camera`] on one output. The camera runs
//! a paced capture thread that copies each presented desktop frame
//! through a GPU staging texture into CPU memory and publishes it to a
//! bounded [`FrameCache`]; consumers read the newest frame without ever
//! blocking the producer.
//!
//! ```no_run
//! use deskcam::{CaptureConfig, CaptureService};
//!
//! # fn main() -> Result<(), deskcam::CaptureError> {
//! let service = CaptureService::new()?;
//! let camera = service.start(&CaptureConfig::default())?;
//! let frame = camera.latest_frame();
//! println!("{}x{}", frame.width(), frame.height());
//! service.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub(crate) mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_cache;
mod platform;
pub mod region;
pub mod service;

pub use adapter::{AdapterDescriptor, DesktopRect, OutputDescriptor};
pub use camera::Camera;
pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureErrorClass, CaptureResult};
pub use frame::Frame;
pub use frame_cache::FrameCache;
pub use region::Region;
pub use service::CaptureService;
