use std::fmt;

#[derive(Debug)]
pub enum CaptureError {
    /// The platform enumeration API could not be reached at all
    /// (e.g. no graphics driver). Surfaced once at discovery time,
    /// never per-frame.
    Discovery(anyhow::Error),

    /// The adapter rejected every acceptable D3D feature level.
    DeviceCreation(anyhow::Error),

    /// Establishing or driving the output duplication failed in a way
    /// that recreation cannot fix.
    Duplication(anyhow::Error),

    InvalidTarget(String),

    InvalidRegion(String),

    /// The duplication hand-off was invalidated (display mode change,
    /// power transition, GPU context loss). The session must be
    /// recreated before capture can continue.
    AccessLost,

    AlreadyCapturing,

    NotCapturing,

    /// A camera is already active on this service; stop it first.
    CameraActive,

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureErrorClass {
    InvalidInput,
    Misuse,
    Transient,
    Fatal,
}

impl CaptureError {
    pub fn class(&self) -> CaptureErrorClass {
        match self {
            Self::InvalidTarget(_) | Self::InvalidRegion(_) => CaptureErrorClass::InvalidInput,
            Self::AlreadyCapturing | Self::NotCapturing | Self::CameraActive => {
                CaptureErrorClass::Misuse
            }
            Self::AccessLost => CaptureErrorClass::Transient,
            Self::Discovery(_)
            | Self::DeviceCreation(_)
            | Self::Duplication(_)
            | Self::Platform(_) => CaptureErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.class(), CaptureErrorClass::Transient)
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery(inner) => write!(f, "adapter discovery failed: {inner}"),
            Self::DeviceCreation(inner) => write!(f, "device creation failed: {inner}"),
            Self::Duplication(inner) => write!(f, "output duplication failed: {inner}"),
            Self::InvalidTarget(message) => write!(f, "invalid capture target: {message}"),
            Self::InvalidRegion(message) => write!(f, "invalid capture region: {message}"),
            Self::AccessLost => write!(f, "duplication access lost"),
            Self::AlreadyCapturing => write!(f, "camera is already capturing"),
            Self::NotCapturing => write!(f, "camera is not capturing"),
            Self::CameraActive => {
                write!(
                    f,
                    "a camera is already active; stop it before starting another"
                )
            }
            Self::Platform(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Discovery(inner)
            | Self::DeviceCreation(inner)
            | Self::Duplication(inner)
            | Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;
