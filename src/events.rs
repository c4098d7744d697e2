use crate::errors::ReceiverError;
use crate::solver::PvtSolution;

/// Pipeline stage an event/error originated in, for user-visible reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquisition,
    Tracking,
    BitSync,
    FrameSync,
    Solver,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Acquisition => "acquisition",
            Stage::Tracking => "tracking",
            Stage::BitSync => "bit-sync",
            Stage::FrameSync => "frame-sync",
            Stage::Solver => "solver",
        };
        write!(f, "{s}")
    }
}

/// The observable event stream. A dashboard is one possible consumer of this
/// channel; the CLI binary is another.
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    Acquired {
        sv_id: u8,
        doppler_hz: f64,
        code_phase_samples: f64,
        t_rx_sample_index: u64,
    },
    Locked {
        sv_id: u8,
        cn0_db: f64,
        t_rx_sample_index: u64,
    },
    Unlocked {
        sv_id: u8,
        t_rx_sample_index: u64,
    },
    BitSync {
        sv_id: u8,
        bit_boundary_phase: usize,
        t_rx_sample_index: u64,
    },
    FrameSync {
        sv_id: u8,
        inverted: bool,
        t_rx_sample_index: u64,
    },
    Subframe {
        sv_id: u8,
        subframe_id: u8,
        tow: u32,
        t_rx_sample_index: u64,
    },
    Ephemeris {
        sv_id: u8,
        iode: u32,
        t_rx_sample_index: u64,
    },
    Fix(PvtSolution),
    Overrun {
        dropped_samples: u64,
    },
    Error {
        sv_id: Option<u8>,
        stage: Stage,
        error: ReceiverError,
    },
}

impl ReceiverEvent {
    pub fn error(sv_id: Option<u8>, stage: Stage, error: ReceiverError) -> Self {
        ReceiverEvent::Error {
            sv_id,
            stage,
            error,
        }
    }
}
