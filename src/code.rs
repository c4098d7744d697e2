//! C/A PRN code generation and resampling.
//!
//! Produces the length-1023 +-1 chip sequence for a given SV via the G2-delay
//! form of the Gold code (one maximal-length shift register delayed by a
//! per-SV tap offset rather than summed with a second, differently-tapped
//! register — the same construction as the classic two-LFSR form in
//! `gold_code.rs`, up to an overall polarity flip; cross-checked against it
//! in `tests::matches_gold_code_reference_up_to_polarity`). Results are
//! cached: the Acquirer and Tracker both ask for the same SV's code on every
//! call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::constants::PRN_CODE_LEN;
use crate::types::Sample;
use crate::util::fft_forward;

/// G2 delay, in chips, for PRN 1..=32 (ICD-200 table 3-Ia).
const G2_DELAY: [usize; 32] = [
    5, 6, 7, 8, 17, 18, 139, 140, 141, 251, 252, 254, 255, 256, 257, 258, 469, 470, 471, 472, 473,
    474, 509, 512, 513, 514, 515, 516, 859, 860, 861, 862,
];

fn gen_l1ca_code(prn: u8) -> Vec<i8> {
    let mut g1 = [0i8; PRN_CODE_LEN];
    let mut g2 = [0i8; PRN_CODE_LEN];
    let mut r1 = [-1i8; 10];
    let mut r2 = [-1i8; 10];

    for i in 0..PRN_CODE_LEN {
        g1[i] = r1[9];
        g2[i] = r2[9];
        let c1 = r1[2] * r1[9];
        let c2 = r2[1] * r2[2] * r2[5] * r2[7] * r2[8] * r2[9];
        r1.rotate_right(1);
        r2.rotate_right(1);
        r1[0] = c1;
        r2[0] = c2;
    }

    let delay = G2_DELAY[(prn - 1) as usize];
    let mut j = PRN_CODE_LEN - delay;
    let mut g = Vec::with_capacity(PRN_CODE_LEN);
    for i in 0..PRN_CODE_LEN {
        g.push(-g1[i] * g2[j % PRN_CODE_LEN]);
        j += 1;
    }
    g
}

/// Upsamples a +-1 chip sequence (chipped at 1.023 Mchip/s) to `sample_rate_hz`
/// via nearest-neighbor chip repetition, producing `round(sample_rate_hz *
/// 1ms)` complex samples (imaginary part zero).
pub fn upsample_to_rate(chips: &[i8], sample_rate_hz: f64) -> Vec<Sample> {
    let n = (sample_rate_hz * crate::constants::CODE_PERIOD_SEC).round() as usize;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let chip_idx = (i * chips.len()) / n;
        out.push(Complex64::new(chips[chip_idx] as f64, 0.0));
    }
    out
}

struct CacheEntry {
    chips: Arc<Vec<i8>>,
    upsampled: HashMap<u64, Arc<Vec<Sample>>>,
    upsampled_fft: HashMap<u64, Arc<Vec<Sample>>>,
}

static CACHE: Lazy<Mutex<HashMap<u8, CacheEntry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn rate_key(sample_rate_hz: f64) -> u64 {
    sample_rate_hz.round() as u64
}

/// Generator/cache for per-SV C/A codes and their resampled/FFT'd forms.
pub struct GoldCode;

impl GoldCode {
    /// Raw +-1 chip sequence for `prn` (1..=32), length 1023.
    pub fn chips(prn: u8) -> Arc<Vec<i8>> {
        let mut cache = CACHE.lock().unwrap();
        let entry = cache.entry(prn).or_insert_with(|| CacheEntry {
            chips: Arc::new(gen_l1ca_code(prn)),
            upsampled: HashMap::new(),
            upsampled_fft: HashMap::new(),
        });
        entry.chips.clone()
    }

    /// Resampled to `sample_rate_hz`, one 1 ms code period worth of samples.
    pub fn upsampled(prn: u8, sample_rate_hz: f64) -> Arc<Vec<Sample>> {
        let chips = Self::chips(prn);
        let mut cache = CACHE.lock().unwrap();
        let entry = cache.get_mut(&prn).expect("chips() populates the cache");
        let key = rate_key(sample_rate_hz);
        entry
            .upsampled
            .entry(key)
            .or_insert_with(|| Arc::new(upsample_to_rate(&chips, sample_rate_hz)))
            .clone()
    }

    /// FFT of the resampled code, used as the reference spectrum for circular
    /// correlation in the Acquirer/Tracker.
    pub fn upsampled_fft(prn: u8, sample_rate_hz: f64) -> Arc<Vec<Sample>> {
        let upsampled = Self::upsampled(prn, sample_rate_hz);
        let mut cache = CACHE.lock().unwrap();
        let entry = cache.get_mut(&prn).expect("chips() populates the cache");
        let key = rate_key(sample_rate_hz);
        entry
            .upsampled_fft
            .entry(key)
            .or_insert_with(|| {
                let mut planner = FftPlanner::new();
                Arc::new(fft_forward(&mut planner, &upsampled))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ICD-200 table 3-I first 10 chips for a sample of SVs.
    #[test]
    fn first_ten_chips_match_icd200() {
        let expected: &[(u8, [i8; 10])] = &[
            (1, [1, 1, 1, 1, 1, 1, 1, 1, 1, 1]),
            (2, [1, 1, 1, 1, 1, -1, -1, -1, -1, -1]),
            (10, [1, -1, -1, -1, 1, -1, 1, 1, -1, -1]),
        ];
        for &(prn, want) in expected {
            let chips = gen_l1ca_code(prn);
            assert_eq!(&chips[0..10], &want, "prn {prn}");
        }
    }

    #[test]
    fn autocorrelation_invariant() {
        for prn in 1..=32u8 {
            let chips = gen_l1ca_code(prn);
            let n = chips.len() as i64;
            let zero_lag: i64 = chips.iter().map(|&c| c as i64 * c as i64).sum();
            assert_eq!(zero_lag, n);

            for lag in [1usize, 17, 512, 1000] {
                let mut acc: i64 = 0;
                for i in 0..chips.len() {
                    acc += chips[i] as i64 * chips[(i + lag) % chips.len()] as i64;
                }
                assert!(acc.unsigned_abs() <= 65, "prn {prn} lag {lag} corr {acc}");
            }
        }
    }

    /// `code.rs`'s G2-delay construction and `gold_code.rs`'s two-LFSR
    /// construction are two different derivations of the same Gold code
    /// family; they agree up to an overall sign (0 <-> +1 here, 0 <-> -1
    /// there).
    #[test]
    fn matches_gold_code_reference_up_to_polarity() {
        for prn in 1..=32u8 {
            let ours = gen_l1ca_code(prn);
            let reference = crate::gold_code::gen_code(prn as usize);
            for (i, (&a, &b)) in ours.iter().zip(reference.iter()).enumerate() {
                let b_pm1: i8 = if b == 0 { 1 } else { -1 };
                assert_eq!(a, -b_pm1, "prn {prn} chip {i}");
            }
        }
    }

    #[test]
    fn chips_are_cached_by_identity() {
        let a = GoldCode::chips(7);
        let b = GoldCode::chips(7);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn upsampled_length_matches_sample_rate() {
        let up = GoldCode::upsampled(5, 2.046e6);
        assert_eq!(up.len(), 2046);
    }
}
