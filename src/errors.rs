use std::fmt;

/// Error kinds. SV-local kinds never escape the owning Tracker/Decoder —
/// they surface as a `ReceiverEvent::Error` and the SV slot is retried.
#[derive(Debug, Clone)]
pub enum ReceiverError {
    ConfigInvalid(String),
    SampleSourceExhausted,
    SampleSourceOverrun,
    AcquisitionFailed { sv_id: u8 },
    LockLost { sv_id: u8 },
    ParityFailure { sv_id: u8 },
    EphemerisInconsistent { sv_id: u8, reason: String },
    GeometrySingular,
    InternalInvariant(String),
}

impl ReceiverError {
    /// SV-local errors are non-fatal and never tear down the pipeline.
    pub fn is_sv_local(&self) -> bool {
        matches!(
            self,
            ReceiverError::AcquisitionFailed { .. }
                | ReceiverError::LockLost { .. }
                | ReceiverError::ParityFailure { .. }
                | ReceiverError::EphemerisInconsistent { .. }
        )
    }

    /// Process exit code to use when driven as a CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReceiverError::ConfigInvalid(_) => 2,
            ReceiverError::SampleSourceExhausted => 3,
            ReceiverError::InternalInvariant(_) => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for ReceiverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverError::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            ReceiverError::SampleSourceExhausted => {
                write!(f, "sample source exhausted before any fix")
            }
            ReceiverError::SampleSourceOverrun => write!(f, "sample ring buffer overrun"),
            ReceiverError::AcquisitionFailed { sv_id } => {
                write!(f, "sv {sv_id}: acquisition failed")
            }
            ReceiverError::LockLost { sv_id } => write!(f, "sv {sv_id}: tracking lock lost"),
            ReceiverError::ParityFailure { sv_id } => write!(f, "sv {sv_id}: word parity failure"),
            ReceiverError::EphemerisInconsistent { sv_id, reason } => {
                write!(f, "sv {sv_id}: ephemeris rejected: {reason}")
            }
            ReceiverError::GeometrySingular => {
                write!(f, "position solve skipped: geometry matrix near-singular")
            }
            ReceiverError::InternalInvariant(msg) => write!(f, "internal invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for ReceiverError {}
