//! Orchestrator: owns the world model, ingests samples, dispatches
//! acquisition/tracking/decode work per SV, and schedules the position
//! solver.
//!
//! Grounded on the teacher's `Receiver` (`fetch_samples_msec`,
//! `par_iter_mut` dispatch across per-SV channels, `compute_fix` gating),
//! generalized with an explicit bounded SV slot table (§9: "replace with a
//! fixed-size array of per-SV records indexed by SV ID") and the typed
//! event stream in `events.rs` instead of `log::warn!` call sites.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;

use gnss_rs::constellation::Constellation;
use gnss_rs::sv::SV;
use rayon::prelude::*;

use crate::acquisition;
use crate::almanac::Almanac;
use crate::bitsync::BitSync;
use crate::config::ReceiverConfig;
use crate::constants::{CODE_PERIOD_SEC, NUM_GPS_SATS, SECS_PER_WEEK, SPEED_OF_LIGHT};
use crate::ephemeris::Ephemeris;
use crate::errors::ReceiverError;
use crate::events::{ReceiverEvent, Stage};
use crate::frame::FrameSync;
use crate::iono::IonoUtcParams;
use crate::solver::{Measurement, PositionSolver};
use crate::tracker::{TrackState, Tracker};
use crate::types::{Sample, SampleWindow};

/// A source of baseband samples, read sequentially starting at sample 0.
/// `recording::IQRecording` and (behind `live-capture`) `device`/`network`
/// implement this for the CLI; tests implement it directly over an
/// in-memory buffer.
pub trait SampleSource {
    fn read(&mut self, off_samples: usize, num_samples: usize) -> Result<Vec<Sample>, ReceiverError>;
}

/// Per-SV state for an occupied tracking slot: everything downstream of a
/// successful acquisition for one SV.
struct SvSlot {
    sv_id: u8,
    tracker: Tracker,
    bit_sync: BitSync,
    frame_sync: FrameSync,
    ephemeris: Ephemeris,
    almanac: Almanac,
    iono: Option<IonoUtcParams>,
    /// Most recent subframe HOW TOW (seconds-of-week of the *next*
    /// subframe) and the rx sample index at which that subframe's trailing
    /// edge was observed — together these reconstruct transmit time.
    last_tow_sec: Option<f64>,
    last_tow_t_rx_sample_index: Option<u64>,
}

impl SvSlot {
    fn new(sv_id: u8, acq: &crate::types::AcquisitionResult, fs: f64, cfg: &ReceiverConfig) -> Self {
        Self {
            sv_id,
            tracker: Tracker::new(acq, fs, cfg.tracker),
            bit_sync: BitSync::new(),
            frame_sync: FrameSync::new(sv_id),
            ephemeris: Ephemeris::new(sv_id),
            almanac: Almanac::new(sv_id),
            iono: None,
            last_tow_sec: None,
            last_tow_t_rx_sample_index: None,
        }
    }

    /// Reconstructed GPS transmit time (seconds-of-week) for `t_rx_sample_index`,
    /// extrapolated forward from the last decoded HOW word.
    fn transmit_time_sec(&self, t_rx_sample_index: u64, sample_rate_hz: f64) -> Option<f64> {
        let tow = self.last_tow_sec?;
        let anchor = self.last_tow_t_rx_sample_index?;
        let elapsed = (t_rx_sample_index as f64 - anchor as f64) / sample_rate_hz;
        Some(tow + elapsed)
    }
}

/// Bounded history of raw samples, supplying the 2-code and
/// `non_coherent_blocks_msec`-code windows the tracker/acquirer need.
struct SampleRing {
    samples: VecDeque<Sample>,
    samples_per_code: usize,
    capacity_codes: usize,
    next_sample_index: u64,
}

impl SampleRing {
    fn new(samples_per_code: usize, capacity_codes: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(samples_per_code * capacity_codes),
            samples_per_code,
            capacity_codes,
            next_sample_index: 0,
        }
    }

    /// Appends one 1 ms block and drops the oldest block(s) beyond capacity.
    /// Returns `true` if the ring had to drop unconsumed samples (an
    /// overrun).
    fn push_block(&mut self, block: Vec<Sample>) -> bool {
        assert_eq!(block.len(), self.samples_per_code);
        self.samples.extend(block);
        self.next_sample_index += self.samples_per_code as u64;

        let max_len = self.samples_per_code * self.capacity_codes;
        let mut overrun = false;
        while self.samples.len() > max_len {
            self.samples.pop_front();
            overrun = true;
        }
        overrun
    }

    /// The last `num_codes` code periods as a contiguous slice, most recent
    /// last; `None` until that much history has accumulated.
    fn last_codes(&self, num_codes: usize) -> Option<Vec<Sample>> {
        let need = self.samples_per_code * num_codes;
        if self.samples.len() < need {
            return None;
        }
        let skip = self.samples.len() - need;
        Some(self.samples.iter().skip(skip).copied().collect())
    }

    /// Absolute sample index of the start of the most recently pushed block.
    fn current_epoch_start_index(&self) -> u64 {
        self.next_sample_index - self.samples_per_code as u64
    }
}

/// Drives sample ingestion and dispatches acquisition/tracking/decode work
/// for every SV slot. Construct with `Receiver::new`, then call
/// `process_block` once per incoming 1 ms sample block (or `run` to drive a
/// `SampleSource` to exhaustion).
pub struct Receiver {
    cfg: ReceiverConfig,
    samples_per_code: usize,
    ring: SampleRing,
    slots: Vec<Option<SvSlot>>,
    next_acquisition_candidate: usize,
    have_fix: bool,
    solver: PositionSolver,
    last_fix_sample_index: Option<u64>,
    events_tx: Sender<ReceiverEvent>,
}

impl Receiver {
    pub fn new(cfg: ReceiverConfig, events_tx: Sender<ReceiverEvent>) -> Result<Self, ReceiverError> {
        cfg.validate()?;
        let samples_per_code = (cfg.sample_rate_hz * CODE_PERIOD_SEC).round() as usize;
        let max_slots = cfg.max_concurrent_tracked_svs;
        let ring_capacity_codes = cfg.acquisition.non_coherent_blocks_msec.max(2) + 1;

        Ok(Self {
            ring: SampleRing::new(samples_per_code, ring_capacity_codes),
            slots: (0..max_slots).map(|_| None).collect(),
            next_acquisition_candidate: 0,
            have_fix: false,
            solver: PositionSolver::new(),
            last_fix_sample_index: None,
            samples_per_code,
            cfg,
            events_tx,
        })
    }

    fn emit(&self, event: ReceiverEvent) {
        let _ = self.events_tx.send(event);
    }

    fn free_slot_index(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    fn is_tracked(&self, sv_id: u8) -> bool {
        self.slots.iter().flatten().any(|s| s.sv_id == sv_id)
    }

    fn next_candidate_sv(&mut self) -> Option<u8> {
        for _ in 0..NUM_GPS_SATS {
            let sv_id = (self.next_acquisition_candidate % NUM_GPS_SATS) as u8 + 1;
            self.next_acquisition_candidate += 1;
            if !self.is_tracked(sv_id) {
                return Some(sv_id);
            }
        }
        None
    }

    /// Feeds one 1 ms block of raw samples (`samples_per_code` long) into
    /// the pipeline: runs acquisition on a free slot's candidate SV if
    /// enough history exists, advances every tracking slot by one code
    /// epoch, and triggers the solver if due.
    pub fn process_block(&mut self, block: Vec<Sample>) {
        if self.ring.push_block(block) {
            self.emit(ReceiverEvent::Overrun {
                dropped_samples: self.samples_per_code as u64,
            });
        }

        self.try_acquire_one();
        self.advance_trackers();
        self.maybe_solve();
    }

    fn try_acquire_one(&mut self) {
        let Some(free_idx) = self.free_slot_index() else {
            return;
        };
        let Some(window) = self
            .ring
            .last_codes(self.cfg.acquisition.non_coherent_blocks_msec)
        else {
            return;
        };
        let Some(sv_id) = self.next_candidate_sv() else {
            return;
        };

        let start_index = self.ring.current_epoch_start_index()
            - (self.cfg.acquisition.non_coherent_blocks_msec as u64 - 1) * self.samples_per_code as u64;
        let sample_window = SampleWindow {
            samples: window,
            sample_rate_hz: self.cfg.sample_rate_hz,
            start_sample_index: start_index,
        };

        match acquisition::try_acquire(
            sv_id,
            &sample_window,
            &self.cfg.acquisition,
            !self.have_fix,
        ) {
            Some(result) => {
                self.emit(ReceiverEvent::Acquired {
                    sv_id,
                    doppler_hz: result.doppler_hz,
                    code_phase_samples: result.code_phase_samples,
                    t_rx_sample_index: result.acquired_at_sample_index,
                });
                self.slots[free_idx] = Some(SvSlot::new(
                    sv_id,
                    &result,
                    self.cfg.sample_rate_hz,
                    &self.cfg,
                ));
            }
            None => {
                self.emit(ReceiverEvent::error(
                    Some(sv_id),
                    Stage::Acquisition,
                    ReceiverError::AcquisitionFailed { sv_id },
                ));
            }
        }
    }

    fn advance_trackers(&mut self) {
        let Some(window) = self.ring.last_codes(2) else {
            return;
        };
        let t_rx_sample_index = self.ring.current_epoch_start_index();

        let outputs: Vec<(usize, crate::types::PromptSample, TrackState, bool, f64)> = self
            .slots
            .par_iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let slot = slot.as_mut()?;
                let was_locked = slot.tracker.state() == TrackState::Locked;
                let prompt = slot.tracker.process_epoch(&window, t_rx_sample_index);
                let now_locked = slot.tracker.state() == TrackState::Locked;
                Some((idx, prompt, slot.tracker.state(), was_locked != now_locked, slot.tracker.cn0_db()))
            })
            .collect();

        for (idx, prompt, state, transitioned, cn0_db) in outputs {
            let sv_id = self.slots[idx].as_ref().unwrap().sv_id;

            if transitioned {
                match state {
                    TrackState::Locked => self.emit(ReceiverEvent::Locked {
                        sv_id,
                        cn0_db,
                        t_rx_sample_index,
                    }),
                    TrackState::Unlocked => self.emit(ReceiverEvent::Unlocked {
                        sv_id,
                        t_rx_sample_index,
                    }),
                    _ => {}
                }
            }

            if state == TrackState::Locked {
                self.process_prompt(idx, sv_id, &prompt, t_rx_sample_index);
            }

            if self.slots[idx].as_ref().unwrap().tracker.is_dead() {
                self.emit(ReceiverEvent::error(
                    Some(sv_id),
                    Stage::Tracking,
                    ReceiverError::LockLost { sv_id },
                ));
                self.slots[idx] = None;
            }
        }
    }

    fn process_prompt(
        &mut self,
        idx: usize,
        sv_id: u8,
        prompt: &crate::types::PromptSample,
        t_rx_sample_index: u64,
    ) {
        let bit_sync_was_synced = self.slots[idx].as_ref().unwrap().bit_sync.is_synced();
        let nav_bit = self.slots[idx]
            .as_mut()
            .unwrap()
            .bit_sync
            .process_prompt(sv_id, prompt);

        if !bit_sync_was_synced {
            if let Some(phase) = self.slots[idx].as_ref().unwrap().bit_sync.bit_boundary_phase() {
                self.emit(ReceiverEvent::BitSync {
                    sv_id,
                    bit_boundary_phase: phase,
                    t_rx_sample_index,
                });
            }
        }

        let Some(nav_bit) = nav_bit else {
            return;
        };

        let subframe = self.slots[idx]
            .as_mut()
            .unwrap()
            .frame_sync
            .process_bit(&nav_bit);
        let Some(subframe) = subframe else {
            return;
        };

        self.emit(ReceiverEvent::FrameSync {
            sv_id,
            inverted: false,
            t_rx_sample_index: subframe.t_rx_start_sample_index,
        });
        self.emit(ReceiverEvent::Subframe {
            sv_id,
            subframe_id: subframe.subframe_id,
            tow: subframe.tow,
            t_rx_sample_index: subframe.t_rx_start_sample_index,
        });

        let slot = self.slots[idx].as_mut().unwrap();
        slot.last_tow_sec = Some(subframe.tow as f64);
        slot.last_tow_t_rx_sample_index = Some(subframe.t_rx_start_sample_index);

        match subframe.subframe_id {
            1 => slot.ephemeris.decode_subframe1(&subframe.bits),
            2 => slot.ephemeris.decode_subframe2(&subframe.bits),
            3 => {
                slot.ephemeris.decode_subframe3(&subframe.bits);
                if slot.ephemeris.is_consistent() {
                    self.emit(ReceiverEvent::Ephemeris {
                        sv_id,
                        iode: slot.ephemeris.iode_subframe2.unwrap_or_default(),
                        t_rx_sample_index: subframe.t_rx_start_sample_index,
                    });
                } else {
                    self.emit(ReceiverEvent::error(
                        Some(sv_id),
                        Stage::FrameSync,
                        ReceiverError::EphemerisInconsistent {
                            sv_id,
                            reason: "subframe 2/3 IODE mismatch".to_string(),
                        },
                    ));
                }
            }
            4 => {
                if crate::iono::is_iono_utc_page(&subframe.bits) {
                    slot.iono = Some(IonoUtcParams::decode(&subframe.bits));
                } else {
                    slot.almanac.decode(&subframe.bits);
                }
            }
            5 => slot.almanac.decode(&subframe.bits),
            _ => {}
        }
    }

    /// Triggers the solver if at least 4 SVs have consistent ephemerides and
    /// known transmit time, and at least 1 s has passed since the last fix.
    fn maybe_solve(&mut self) {
        let t_rx_common = self.ring.current_epoch_start_index();
        if let Some(last) = self.last_fix_sample_index {
            let elapsed_sec = (t_rx_common - last) as f64 / self.cfg.sample_rate_hz;
            if elapsed_sec < 1.0 {
                return;
            }
        }

        let mut candidates = Vec::new();
        for slot in self.slots.iter().flatten() {
            if slot.tracker.state() != TrackState::Locked || !slot.ephemeris.is_consistent() {
                continue;
            }
            if let Some(t_tx_sec) = slot.transmit_time_sec(t_rx_common, self.cfg.sample_rate_hz) {
                candidates.push((slot.sv_id, t_tx_sec, slot.ephemeris));
            }
        }

        if candidates.len() < 4 {
            return;
        }

        // A shared receiver-clock reading for every SV's pseudorange: each
        // SV's transmit time is reconstructed independently (via its own
        // decoded TOW and tracking history), but the solver needs one common
        // "now" to differentia them against. The nominal L1 transit time
        // anchors that reference near its true value; any remaining offset
        // (oscillator drift, the arbitrary nominal constant itself) is
        // absorbed by the solved clock-bias term, not the position.
        const NOMINAL_TRANSIT_TIME_SEC: f64 = 0.075;
        let t_rx_common_sec = candidates
            .iter()
            .map(|&(_, t_tx, _)| t_tx)
            .fold(f64::MIN, f64::max)
            + NOMINAL_TRANSIT_TIME_SEC;

        let mut measurements = Vec::new();
        let mut ephs = Vec::new();
        for (sv_id, t_tx_sec, eph) in candidates {
            let pseudorange_m = SPEED_OF_LIGHT * (t_rx_common_sec - t_tx_sec);
            if pseudorange_m <= 0.0 {
                continue;
            }
            measurements.push(Measurement {
                sv_id,
                pseudorange_m,
                t_tx_sec: t_tx_sec.rem_euclid(SECS_PER_WEEK as f64),
            });
            ephs.push(eph);
        }

        if measurements.len() < 4 {
            return;
        }

        self.last_fix_sample_index = Some(t_rx_common);
        match self.solver.solve(&measurements, &ephs, t_rx_common) {
            Ok(solution) => {
                self.have_fix = true;
                self.emit(ReceiverEvent::Fix(solution));
            }
            Err(e) => {
                self.emit(ReceiverEvent::error(None, Stage::Solver, e));
            }
        }
    }

    /// Drives `source` to exhaustion (or the first internal-invariant
    /// error), feeding one `samples_per_code`-sample block per call.
    pub fn run(&mut self, source: &mut dyn SampleSource) -> Result<(), ReceiverError> {
        let mut off_samples = 0usize;
        loop {
            let block = match source.read(off_samples, self.samples_per_code) {
                Ok(b) => b,
                Err(_) => return Err(ReceiverError::SampleSourceExhausted),
            };
            off_samples += self.samples_per_code;
            self.process_block(block);
        }
    }

    pub fn tracked_svs(&self) -> Vec<u8> {
        self.slots.iter().flatten().map(|s| s.sv_id).collect()
    }

    pub fn has_fix(&self) -> bool {
        self.have_fix
    }
}

/// Convenience: resolve a PRN to a `gnss_rs::sv::SV` for display/logging.
pub fn gps_sv(prn: u8) -> SV {
    SV::new(Constellation::GPS, prn)
}
