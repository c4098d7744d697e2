//! Coarse Doppler + code-phase search.
//!
//! `try_acquire` is a pure function of the sample window handed to it: the
//! orchestrator decides which SV to try and supplies a non-overlapping
//! window, and a failed search simply means "ask again later with a fresh
//! window" — there's no persistent state to roll back.

use rustfft::FftPlanner;

use crate::code::GoldCode;
use crate::config::AcquisitionConfig;
use crate::types::{AcquisitionResult, GnssCorrelationParam, SampleWindow};
use crate::util::{calc_correlation, doppler_shift, get_max_with_idx};

/// Non-coherent cross-correlation power for SV `sv_id` at a single Doppler
/// bin, accumulated over `num_blocks_msec` 1 ms blocks. Returns the
/// per-code-phase power spectrum.
fn accumulate_doppler_bin(
    planner: &mut FftPlanner<f64>,
    sample_window: &SampleWindow,
    sv_id: u8,
    doppler_hz: f64,
    num_blocks_msec: usize,
) -> Vec<f64> {
    let samples_per_msec = (sample_window.sample_rate_hz * 1e-3).round() as usize;
    let reference_fft = GoldCode::upsampled_fft(sv_id, sample_window.sample_rate_hz);
    assert_eq!(reference_fft.len(), samples_per_msec);

    let mut power = vec![0f64; samples_per_msec];
    for block in 0..num_blocks_msec {
        let lo = block * samples_per_msec;
        let hi = lo + samples_per_msec;
        let mut block_samples = sample_window.samples[lo..hi].to_vec();

        let t0 = lo as f64 / sample_window.sample_rate_hz;
        doppler_shift(doppler_hz, t0, &mut block_samples, sample_window.sample_rate_hz);

        let corr = calc_correlation(planner, &block_samples, &reference_fft);
        for (p, c) in power.iter_mut().zip(corr.iter()) {
            *p += c.norm_sqr();
        }
    }
    power
}

/// Tries to acquire `sv_id` over `sample_window`, a flat sweep over the
/// configured Doppler range at `doppler_step_hz` steps.
///
/// `cold_start` selects the wider +-10 kHz search range when no fix exists
/// yet to accommodate receiver oscillator offset.
pub fn try_acquire(
    sv_id: u8,
    sample_window: &SampleWindow,
    cfg: &AcquisitionConfig,
    cold_start: bool,
) -> Option<AcquisitionResult> {
    let samples_per_msec = (sample_window.sample_rate_hz * 1e-3).round() as usize;
    let needed = samples_per_msec * cfg.non_coherent_blocks_msec;
    assert!(
        sample_window.samples.len() >= needed,
        "acquisition window too short: have {}, need {}",
        sample_window.samples.len(),
        needed
    );

    let range_hz = if cold_start {
        cfg.doppler_range_cold_hz
    } else {
        cfg.doppler_range_hz
    };

    let mut planner = FftPlanner::new();
    let mut best = GnssCorrelationParam::default();
    let mut best_bin_idx = 0usize;
    // peak correlation power for each Doppler bin searched, in bin order.
    let mut bin_peaks: Vec<f64> = vec![];

    let num_bins = (2.0 * range_hz / cfg.doppler_step_hz).round() as i64 + 1;
    for i in 0..num_bins {
        let doppler_hz = -range_hz + i as f64 * cfg.doppler_step_hz;
        let power = accumulate_doppler_bin(
            &mut planner,
            sample_window,
            sv_id,
            doppler_hz,
            cfg.non_coherent_blocks_msec,
        );
        let (phase_idx, peak) = get_max_with_idx(&power);
        bin_peaks.push(peak);

        if peak > best.corr_power {
            best.corr_power = peak;
            best.doppler_hz = doppler_hz;
            best.code_phase_samples = phase_idx;
            best_bin_idx = bin_peaks.len() - 1;
        }
    }

    if bin_peaks.is_empty() {
        return None;
    }

    // peak power over second-highest power among the other Doppler bins searched.
    let second_peak = bin_peaks
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != best_bin_idx)
        .map(|(_, &p)| p)
        .fold(0f64, f64::max)
        .max(1e-12);
    let ratio = best.corr_power / second_peak;
    best.peak_snr_db = 10.0 * ratio.log10();

    if ratio >= cfg.threshold_ratio {
        Some(AcquisitionResult {
            sv_id,
            doppler_hz: best.doppler_hz,
            code_phase_samples: best.code_phase_samples as f64,
            peak_snr_db: best.peak_snr_db,
            acquired_at_sample_index: sample_window.start_sample_index,
        })
    } else {
        None
    }
}
