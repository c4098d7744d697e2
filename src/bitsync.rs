//! 50 Hz navigation-bit recovery from the 1 kHz prompt correlator stream.
//!
//! Bit boundary phase is found by histogramming *where* (mod 20 ms) the
//! prompt sign flips: once locked, the carrier/code loops make every true
//! data-bit edge a sign transition in `i_prompt`, so the transition count at
//! the correct phase dominates the other 19 candidate phases. This is an
//! explicit alternative to a running-mean symbol-sync approach (same goal,
//! implemented standalone here so it can be tested independently of the
//! rest of the navigation pipeline).

use crate::types::{NavBit, PromptSample};

const BIT_PERIOD_MSEC: usize = crate::constants::BIT_PERIOD_MSEC;
const DETECTION_WINDOW_MSEC: u64 = 1_000;
const HISTOGRAM_RATIO_THRESHOLD: f64 = 2.0;

pub struct BitSync {
    histogram: [u32; BIT_PERIOD_MSEC],
    epoch_count: u64,
    prev_sign: Option<bool>,
    bit_boundary_phase: Option<usize>,

    accum: f64,
    accum_count: usize,
    window_start_sample_index: u64,
}

impl Default for BitSync {
    fn default() -> Self {
        Self::new()
    }
}

impl BitSync {
    pub fn new() -> Self {
        Self {
            histogram: [0; BIT_PERIOD_MSEC],
            epoch_count: 0,
            prev_sign: None,
            bit_boundary_phase: None,
            accum: 0.0,
            accum_count: 0,
            window_start_sample_index: 0,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.bit_boundary_phase.is_some()
    }

    pub fn bit_boundary_phase(&self) -> Option<usize> {
        self.bit_boundary_phase
    }

    fn accumulate_histogram(&mut self, prompt: &PromptSample) {
        let sign = prompt.i_prompt >= 0.0;
        if let Some(prev) = self.prev_sign {
            if prev != sign {
                let idx = (self.epoch_count % BIT_PERIOD_MSEC as u64) as usize;
                self.histogram[idx] += 1;
            }
        }
        self.prev_sign = Some(sign);
    }

    fn try_detect(&mut self) {
        if self.epoch_count < DETECTION_WINDOW_MSEC {
            return;
        }
        let total: u32 = self.histogram.iter().sum();
        if total == 0 {
            return;
        }
        let (max_idx, &max_count) = self
            .histogram
            .iter()
            .enumerate()
            .max_by_key(|&(_, &c)| c)
            .unwrap();
        let rest_sum: u32 = total - max_count;
        let rest_mean = rest_sum as f64 / (BIT_PERIOD_MSEC - 1) as f64;
        if max_count as f64 / rest_mean.max(1e-9) >= HISTOGRAM_RATIO_THRESHOLD {
            self.bit_boundary_phase = Some(max_idx);
        }
    }

    /// Feeds one 1 ms prompt epoch. Returns a completed `NavBit` once the
    /// boundary phase is known and a 20 ms symbol window has closed.
    pub fn process_prompt(&mut self, sv_id: u8, prompt: &PromptSample) -> Option<NavBit> {
        let phase = match self.bit_boundary_phase {
            None => {
                self.accumulate_histogram(prompt);
                self.epoch_count += 1;
                self.try_detect();
                return None;
            }
            Some(p) => p,
        };

        if self.accum_count == 0 {
            self.window_start_sample_index = prompt.t_rx_sample_index;
        }
        self.accum += prompt.i_prompt;
        self.accum_count += 1;
        self.epoch_count += 1;

        if self.epoch_count % BIT_PERIOD_MSEC as u64 == phase as u64 {
            let bit_value = if self.accum >= 0.0 { 1 } else { 0 };
            let nav_bit = NavBit {
                sv_id,
                bit_value,
                t_rx_start_sample_index: self.window_start_sample_index,
            };
            self.accum = 0.0;
            self.accum_count = 0;
            return Some(nav_bit);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds 1 kHz prompt samples for a known 50 Hz `+-1` bit sequence with
    /// boundary phase `phase`, `bits.len()` bits long.
    fn synth_prompts(sv_id: u8, bits: &[i8], phase: usize) -> Vec<PromptSample> {
        let mut out = Vec::with_capacity(bits.len() * BIT_PERIOD_MSEC);
        let mut t: u64 = 0;
        // leading padding so the first full window starts at index `phase`.
        for _ in 0..phase {
            out.push(PromptSample {
                sv_id,
                t_rx_sample_index: t,
                i_prompt: bits[0] as f64,
                q_prompt: 0.0,
            });
            t += 1;
        }
        for &b in bits {
            for _ in 0..BIT_PERIOD_MSEC {
                out.push(PromptSample {
                    sv_id,
                    t_rx_sample_index: t,
                    i_prompt: b as f64,
                    q_prompt: 0.0,
                });
                t += 1;
            }
        }
        out
    }

    #[test]
    fn detects_known_bit_boundary_phase() {
        let bits: Vec<i8> = (0..80)
            .map(|i| if i % 3 == 0 { -1 } else { 1 })
            .collect();
        let phase = 7;
        let prompts = synth_prompts(9, &bits, phase);

        let mut sync = BitSync::new();
        for p in &prompts {
            sync.process_prompt(9, p);
        }
        assert!(sync.is_synced());
        assert_eq!(sync.bit_boundary_phase(), Some(phase));
    }

    #[test]
    fn recovers_bit_sequence_once_synced() {
        let bits: Vec<i8> = vec![1, -1, 1, 1, -1, -1, 1, -1, 1, 1];
        let repeated: Vec<i8> = bits
            .iter()
            .cycle()
            .take(bits.len() * 6)
            .cloned()
            .collect();
        let phase = 3;
        let prompts = synth_prompts(12, &repeated, phase);

        let mut sync = BitSync::new();
        let mut recovered = Vec::new();
        for p in &prompts {
            if let Some(bit) = sync.process_prompt(12, p) {
                recovered.push(bit.bit_value);
            }
        }

        assert!(sync.is_synced());
        let expected: Vec<u8> = repeated.iter().map(|&b| if b >= 0 { 1 } else { 0 }).collect();
        // bits recovered after sync matches the tail of the expected sequence.
        assert!(recovered.len() >= 10);
        let tail = &expected[expected.len() - recovered.len()..];
        assert_eq!(&recovered[..], tail);
    }
}
