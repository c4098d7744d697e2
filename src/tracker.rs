//! Carrier (Costas PLL) and code (early-prompt-late DLL) tracking loops for a
//! single acquired SV, plus the lock-state machine that decides whether the
//! loops are trustworthy enough to feed bit sync and frame decode.
//!
//! Grounded on the frequency-pull-in / phase-lock / DLL / CN0 update split in
//! the teacher's `channel.rs`, generalized from its hardcoded loop gains to
//! configurable bandwidth/damping parameters and from its three-state
//! idle/acquisition/tracking machine to the four explicit states below.

use std::collections::VecDeque;

use rustfft::num_complex::Complex64;

use crate::code::GoldCode;
use crate::config::TrackerConfig;
use crate::constants::{CODE_PERIOD_SEC, L1_HZ, PI, PRN_CODE_LEN};
use crate::types::{AcquisitionResult, PromptSample, Sample};

/// Number of prompt epochs (1 ms each) kept for the lock detector and for
/// downstream bit-sync/frame consumers that want recent history.
const HISTORY_LEN: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Just handed off from acquisition; no tracking samples processed yet.
    Acquired,
    /// Coarse FLL frequency pull-in running; not yet evaluated for lock.
    PullIn,
    /// Carrier and code loops converged; safe to use for bit sync/decode.
    Locked,
    /// Lock test statistic has dropped below threshold; within grace period
    /// before the channel is considered dead.
    Unlocked,
}

/// Second-order Costas PLL loop filter (proportional + integrator), mapped
/// from noise bandwidth/damping via the standard `Bn = (wn/2)(zeta +
/// 1/(4*zeta))` relation.
struct CarrierLoopFilter {
    omega_n: f64,
    damping: f64,
    integrator: f64,
    prev_err_cycles: f64,
}

impl CarrierLoopFilter {
    fn new(bandwidth_hz: f64, damping: f64) -> Self {
        let omega_n = 2.0 * bandwidth_hz / (damping + 1.0 / (4.0 * damping));
        Self {
            omega_n,
            damping,
            integrator: 0.0,
            prev_err_cycles: 0.0,
        }
    }

    /// `err_cycles` is the phase discriminator output in cycles (not
    /// radians); returns a Doppler frequency correction in Hz.
    fn update(&mut self, err_cycles: f64, dt_sec: f64) -> f64 {
        let c1 = 2.0 * self.damping;
        self.integrator += self.omega_n * self.omega_n * err_cycles * dt_sec;
        let correction =
            c1 * self.omega_n * (err_cycles - self.prev_err_cycles) + self.integrator;
        self.prev_err_cycles = err_cycles;
        correction
    }
}

/// First-order DLL loop filter (proportional only), `wn = 4*Bn`.
struct CodeLoopFilter {
    gain: f64,
}

impl CodeLoopFilter {
    fn new(bandwidth_hz: f64) -> Self {
        Self {
            gain: 4.0 * bandwidth_hz,
        }
    }

    fn update(&self, err_chips: f64, dt_sec: f64) -> f64 {
        self.gain * err_chips * dt_sec
    }
}

/// Carrier wipe-off with an explicit running phase offset (cycles), distinct
/// from `util::doppler_shift`'s absolute-time form: the tracker accumulates
/// phase continuously across epochs rather than re-deriving it from an
/// absolute timestamp each call.
fn mix_with_phase(samples: &mut [Sample], freq_hz: f64, phase_cycles: f64, sample_rate_hz: f64) {
    for (n, s) in samples.iter_mut().enumerate() {
        let phase = -2.0 * PI * (freq_hz * n as f64 / sample_rate_hz + phase_cycles);
        let rot = Complex64::new(phase.cos(), phase.sin());
        *s *= rot;
    }
}

/// One SV's carrier/code tracking state and loop filters.
pub struct Tracker {
    sv_id: u8,
    sample_rate_hz: f64,
    samples_per_code: usize,
    correlator_spacing_samples: usize,
    neutral_offset_samples: usize,
    prn_code: std::sync::Arc<Vec<Sample>>,

    cfg: TrackerConfig,
    state: TrackState,

    doppler_hz: f64,
    code_off_sec: f64,
    adr: f64,
    phi: f64,

    carrier_filter: CarrierLoopFilter,
    code_filter: CodeLoopFilter,

    sum_corr_e: f64,
    sum_corr_l: f64,
    dll_accum_epochs: u64,

    sum_corr_p_power: f64,
    sum_corr_n_power: f64,
    cn0_accum_epochs: u64,
    cn0_db: f64,

    num_tracking_epochs: u64,
    unlocked_epochs: u64,

    prompt_history: VecDeque<PromptSample>,
}

impl Tracker {
    pub fn new(acq: &AcquisitionResult, sample_rate_hz: f64, cfg: TrackerConfig) -> Self {
        let samples_per_code = (sample_rate_hz * CODE_PERIOD_SEC).round() as usize;
        let correlator_spacing_samples =
            ((0.5 * CODE_PERIOD_SEC * sample_rate_hz / PRN_CODE_LEN as f64) as usize).max(1);
        let neutral_offset_samples = (samples_per_code / 4).max(correlator_spacing_samples + 1);

        Self {
            sv_id: acq.sv_id,
            sample_rate_hz,
            samples_per_code,
            correlator_spacing_samples,
            neutral_offset_samples,
            prn_code: GoldCode::upsampled(acq.sv_id, sample_rate_hz),

            carrier_filter: CarrierLoopFilter::new(cfg.pll_bandwidth_hz, cfg.pll_damping),
            code_filter: CodeLoopFilter::new(cfg.dll_bandwidth_hz),
            cfg,
            state: TrackState::Acquired,

            doppler_hz: acq.doppler_hz,
            code_off_sec: acq.code_phase_samples / sample_rate_hz,
            adr: 0.0,
            phi: 0.0,

            sum_corr_e: 0.0,
            sum_corr_l: 0.0,
            dll_accum_epochs: 0,

            sum_corr_p_power: 0.0,
            sum_corr_n_power: 0.0,
            cn0_accum_epochs: 0,
            cn0_db: 0.0,

            num_tracking_epochs: 0,
            unlocked_epochs: 0,

            prompt_history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn sv_id(&self) -> u8 {
        self.sv_id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn doppler_hz(&self) -> f64 {
        self.doppler_hz
    }

    pub fn cn0_db(&self) -> f64 {
        self.cn0_db
    }

    pub fn code_phase_samples(&self) -> f64 {
        (self.code_off_sec * self.sample_rate_hz).rem_euclid(self.samples_per_code as f64)
    }

    pub fn prompt_history(&self) -> &VecDeque<PromptSample> {
        &self.prompt_history
    }

    /// True once tracking has been `Unlocked` continuously for longer than
    /// the configured grace period; the orchestrator should free this SV's
    /// slot and report `ReceiverError::LockLost`.
    pub fn is_dead(&self) -> bool {
        self.state == TrackState::Unlocked
            && self.unlocked_epochs as u64 >= self.cfg.unlock_grace_msec
    }

    fn advance_phase_and_code(&mut self) -> i32 {
        let tau = CODE_PERIOD_SEC;
        self.adr += self.doppler_hz * tau;
        self.code_off_sec -= self.doppler_hz / L1_HZ * tau;

        let code_off =
            (self.code_off_sec * self.sample_rate_hz + 0.5).rem_euclid(self.samples_per_code as f64);
        let code_idx = code_off as i32;
        self.phi = self.adr + self.doppler_hz * code_idx as f64 / self.sample_rate_hz;
        code_idx
    }

    /// Mixes the aligned window down to baseband and correlates against the
    /// early/prompt/late/neutral code replicas. `iq_window` must be exactly
    /// `2*samples_per_code` samples, with the current epoch's nominal start
    /// at its midpoint; `code_idx` may be negative, reaching back into the
    /// first half (mirrors the teacher's `compute_correlation`).
    fn compute_correlation(
        &self,
        iq_window: &[Sample],
        code_idx: i32,
    ) -> (Complex64, Complex64, Complex64, Complex64) {
        let n = self.samples_per_code as i32;
        assert_eq!(iq_window.len(), 2 * self.samples_per_code);
        assert!(-n < code_idx && code_idx < n);

        let lo = if code_idx >= 0 { code_idx } else { n + code_idx } as usize;
        let hi = lo + self.samples_per_code;

        let mut signal: Vec<Sample> = iq_window[lo..hi].to_vec();
        mix_with_phase(&mut signal, self.doppler_hz, self.phi, self.sample_rate_hz);

        let pos = self.correlator_spacing_samples;
        let mut corr_prompt = Complex64::default();
        for j in 0..signal.len() {
            corr_prompt += signal[j] * self.prn_code[j].conj();
        }
        corr_prompt /= signal.len() as f64;

        let mut corr_early = Complex64::default();
        for j in 0..signal.len() - pos {
            corr_early += signal[j] * self.prn_code[pos + j].conj();
        }
        corr_early /= (signal.len() - pos) as f64;

        let mut corr_late = Complex64::default();
        for j in 0..signal.len() - pos {
            corr_late += signal[pos + j] * self.prn_code[j].conj();
        }
        corr_late /= (signal.len() - pos) as f64;

        let npos = self.neutral_offset_samples;
        let mut corr_neutral = Complex64::default();
        for j in 0..signal.len() - npos {
            corr_neutral += signal[j] * self.prn_code[npos + j].conj();
        }
        corr_neutral /= (signal.len() - npos) as f64;

        (corr_prompt, corr_early, corr_late, corr_neutral)
    }

    fn run_fll(&mut self) {
        if self.prompt_history.len() < 2 {
            return;
        }
        let len = self.prompt_history.len();
        let c1 = &self.prompt_history[len - 1];
        let c2 = &self.prompt_history[len - 2];
        let dot = c1.i_prompt * c2.i_prompt + c1.q_prompt * c2.q_prompt;
        let cross = c1.i_prompt * c2.q_prompt - c1.q_prompt * c2.i_prompt;
        if dot == 0.0 {
            return;
        }
        let err_cycles = (cross / dot).atan() / (2.0 * PI);
        let wide_bandwidth_hz = self.cfg.pll_bandwidth_hz * 2.0;
        self.doppler_hz -= wide_bandwidth_hz / 0.25 * err_cycles;
    }

    fn run_pll(&mut self, c_p: Complex64) {
        if c_p.re == 0.0 {
            return;
        }
        let err_cycles = (c_p.im / c_p.re).atan() / (2.0 * PI);
        self.doppler_hz += self.carrier_filter.update(err_cycles, CODE_PERIOD_SEC);
    }

    fn run_dll(&mut self, c_e: Complex64, c_l: Complex64) {
        self.sum_corr_e += c_e.norm();
        self.sum_corr_l += c_l.norm();
        self.dll_accum_epochs += 1;

        const DLL_AVERAGING_EPOCHS: u64 = 10;
        if self.dll_accum_epochs >= DLL_AVERAGING_EPOCHS {
            let e = self.sum_corr_e;
            let l = self.sum_corr_l;
            if e + l > 0.0 {
                let err_chips = (e - l) / (e + l);
                self.code_off_sec -=
                    self.code_filter.update(err_chips, CODE_PERIOD_SEC * self.dll_accum_epochs as f64);
            }
            self.sum_corr_e = 0.0;
            self.sum_corr_l = 0.0;
            self.dll_accum_epochs = 0;
        }
    }

    fn update_cn0(&mut self, c_p: Complex64, c_n: Complex64) {
        self.sum_corr_p_power += c_p.norm_sqr();
        self.sum_corr_n_power += c_n.norm_sqr();
        self.cn0_accum_epochs += 1;

        const CN0_AVERAGING_EPOCHS: u64 = 1_000;
        if self.cn0_accum_epochs >= CN0_AVERAGING_EPOCHS && self.sum_corr_n_power > 0.0 {
            let cn0 = 10.0 * (self.sum_corr_p_power / self.sum_corr_n_power / CODE_PERIOD_SEC).log10();
            self.cn0_db += 0.5 * (cn0 - self.cn0_db);
            self.sum_corr_p_power = 0.0;
            self.sum_corr_n_power = 0.0;
            self.cn0_accum_epochs = 0;
        }
    }

    /// Narrowband/wideband power ratio carrier-lock test statistic over the
    /// last `lock_window_msec` prompt epochs; `None` if not enough history
    /// has accumulated yet.
    fn lock_test_statistic(&self) -> Option<f64> {
        let window = self.cfg.lock_window_msec as usize;
        if self.prompt_history.len() < window {
            return None;
        }
        let recent = self.prompt_history.iter().rev().take(window);
        let (mut sum_i, mut sum_q, mut wideband) = (0.0, 0.0, 0.0);
        for p in recent {
            sum_i += p.i_prompt;
            sum_q += p.q_prompt;
            wideband += p.magnitude_sq();
        }
        if wideband == 0.0 {
            return None;
        }
        let narrowband = sum_i * sum_i + sum_q * sum_q;
        Some(narrowband / wideband)
    }

    fn update_lock_state(&mut self) {
        let Some(stat) = self.lock_test_statistic() else {
            return;
        };
        let locked_now = stat >= self.cfg.lock_threshold;

        match self.state {
            TrackState::PullIn if locked_now => {
                self.state = TrackState::Locked;
                self.unlocked_epochs = 0;
            }
            TrackState::PullIn => {
                self.state = TrackState::Unlocked;
                self.unlocked_epochs += 1;
            }
            TrackState::Locked if !locked_now => {
                self.state = TrackState::Unlocked;
                self.unlocked_epochs = 1;
            }
            TrackState::Unlocked if locked_now => {
                self.state = TrackState::Locked;
                self.unlocked_epochs = 0;
            }
            TrackState::Unlocked => {
                self.unlocked_epochs += 1;
            }
            TrackState::Locked | TrackState::Acquired => {}
        }
    }

    /// Processes one 1 ms code epoch. `iq_window` is `2*samples_per_code`
    /// samples; `t_rx_sample_index` is the absolute sample index of the
    /// start of the current (second-half) epoch.
    pub fn process_epoch(&mut self, iq_window: &[Sample], t_rx_sample_index: u64) -> PromptSample {
        if self.state == TrackState::Acquired {
            self.state = TrackState::PullIn;
        }

        let code_idx = self.advance_phase_and_code();
        let (c_p, c_e, c_l, c_n) = self.compute_correlation(iq_window, code_idx);

        let prompt = PromptSample {
            sv_id: self.sv_id,
            t_rx_sample_index,
            i_prompt: c_p.re,
            q_prompt: c_p.im,
        };
        self.prompt_history.push_back(prompt);
        if self.prompt_history.len() > HISTORY_LEN {
            self.prompt_history.pop_front();
        }

        let pull_in_done = self.num_tracking_epochs >= self.cfg.pull_in_msec;
        if !pull_in_done {
            self.run_fll();
        } else {
            self.run_pll(c_p);
        }
        self.run_dll(c_e, c_l);
        self.update_cn0(c_p, c_n);

        if pull_in_done {
            self.update_lock_state();
        }

        self.num_tracking_epochs += 1;
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::GoldCode;
    use rustfft::num_complex::Complex64;

    /// Builds `msec` 1 ms epochs worth of a perfectly aligned (zero Doppler
    /// residual, zero code-phase residual) synthetic signal for `sv_id`, as
    /// `2*samples_per_code`-sample windows ready for `process_epoch`.
    fn synth_epochs(sv_id: u8, fs: f64, msec: usize) -> Vec<Vec<Sample>> {
        let chips = GoldCode::chips(sv_id);
        let n = (fs * CODE_PERIOD_SEC).round() as usize;
        let total = n * (msec + 1);
        let mut samples = Vec::with_capacity(total);
        for i in 0..total {
            let chip_idx = (i % n) * chips.len() / n;
            samples.push(Complex64::new(chips[chip_idx] as f64, 0.0));
        }
        (0..msec)
            .map(|k| samples[k * n..(k + 2) * n].to_vec())
            .collect()
    }

    fn synthetic_acquisition(sv_id: u8) -> AcquisitionResult {
        AcquisitionResult {
            sv_id,
            doppler_hz: 0.0,
            code_phase_samples: 0.0,
            peak_snr_db: 20.0,
            acquired_at_sample_index: 0,
        }
    }

    #[test]
    fn pll_discriminator_is_zero_when_aligned() {
        let c_p = Complex64::new(1.0, 0.0);
        assert_eq!((c_p.im / c_p.re).atan(), 0.0);
    }

    #[test]
    fn carrier_loop_filter_pushes_toward_zero_error() {
        let mut f = CarrierLoopFilter::new(10.0, 0.707);
        let correction = f.update(0.1, CODE_PERIOD_SEC);
        // a positive phase error should produce a nonzero corrective term.
        assert_ne!(correction, 0.0);
    }

    #[test]
    fn tracker_reaches_locked_state_on_matched_signal() {
        let fs = 2.046e6;
        let sv_id = 3;
        let acq = synthetic_acquisition(sv_id);
        let mut tracker = Tracker::new(&acq, fs, TrackerConfig::default());

        let n = (fs * CODE_PERIOD_SEC).round() as usize;
        let epochs = synth_epochs(sv_id, fs, 1500);
        for (k, window) in epochs.iter().enumerate() {
            tracker.process_epoch(window, (k * n) as u64);
        }

        assert_eq!(tracker.state(), TrackState::Locked);
        assert!(!tracker.is_dead());
    }

    #[test]
    fn fresh_tracker_starts_in_acquired_state() {
        let acq = synthetic_acquisition(7);
        let tracker = Tracker::new(&acq, 2.046e6, TrackerConfig::default());
        assert_eq!(tracker.state(), TrackState::Acquired);
    }
}
