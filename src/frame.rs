//! 50 Hz navigation-bit stream to framed, parity-checked 300-bit subframes.
//!
//! Keeps a rolling window of the most recent bits and, once the window is
//! full, tests whether its first 8 bits form the telemetry-word preamble
//! (`10001011`) either directly or bit-inverted (GPS LNAV carries an
//! arbitrary 180-degree carrier ambiguity that the Costas PLL can't
//! resolve, so frames arrive polarity-flipped about half the time). Word
//! parity (Hamming-derived, with the D29*/D30* navigation-message fold) is
//! the deciding check: a preamble match with failing parity is an alias and
//! is discarded, matching the GPS word-parity algorithm.

use std::collections::VecDeque;

use crate::constants::{BITS_PER_SUBFRAME, BITS_PER_WORD, PREAMBLE, SUBFRAMES_PER_FRAME, WORDS_PER_SUBFRAME};
use crate::types::NavBit;
use crate::util::{bmatch_n, bmatch_r, getbitu, xor_bits};

/// Parity mask table, one entry per word (d1..d30), derived from the
/// ICD-200 parity-bit generator polynomials.
const PARITY_MASK: [u32; 6] = [
    0x2EC7CD2, 0x1763E69, 0x2BB1F34, 0x15D8F9A, 0x1AEC7CD, 0x22DEA27,
];

/// A parity-verified, de-inverted 300-bit subframe ready for
/// `ephemeris`/`almanac` field extraction.
#[derive(Debug, Clone)]
pub struct Subframe {
    pub sv_id: u8,
    pub subframe_id: u8,
    pub tow: u32,
    pub bits: [u8; BITS_PER_SUBFRAME],
    pub t_rx_start_sample_index: u64,
}

/// True if `syms` (300 0/1 bits, MSB-first per word) satisfies the GPS
/// word-parity check with the D29*/D30* fold applied word by word.
fn check_parity(syms: &[u8; BITS_PER_SUBFRAME]) -> bool {
    let mut data: u32 = 0;
    for i in 0..WORDS_PER_SUBFRAME {
        for j in 0..BITS_PER_WORD {
            data = (data << 1) | syms[i * BITS_PER_WORD + j] as u32;
        }
        if data & (1 << 30) != 0 {
            data ^= 0x3FFFFFC0;
        }
        for (j, &mask) in PARITY_MASK.iter().enumerate() {
            let v0 = (data >> 6) & mask;
            let v1 = ((data >> (5 - j)) & 1) as u8;
            if xor_bits(v0) != v1 {
                return false;
            }
        }
    }
    true
}

/// Accumulates a 50 Hz bit stream for one SV and emits parity-verified
/// subframes as their trailing edge passes.
pub struct FrameSync {
    sv_id: u8,
    window: VecDeque<(u8, u64)>,
}

impl FrameSync {
    pub fn new(sv_id: u8) -> Self {
        Self {
            sv_id,
            window: VecDeque::with_capacity(BITS_PER_SUBFRAME + 8),
        }
    }

    /// Feeds one navigation bit. Returns a `Subframe` each time a
    /// parity-verified 300-bit window completes.
    pub fn process_bit(&mut self, bit: &NavBit) -> Option<Subframe> {
        self.window
            .push_back((bit.bit_value, bit.t_rx_start_sample_index));
        if self.window.len() > BITS_PER_SUBFRAME {
            self.window.pop_front();
        }
        if self.window.len() < BITS_PER_SUBFRAME {
            return None;
        }

        let raw: Vec<u8> = self.window.iter().map(|&(b, _)| b).collect();
        let normal = &raw[0..8];
        let inverted_matches = bmatch_r(&PREAMBLE, normal);
        let normal_matches = bmatch_n(&PREAMBLE, normal);
        if !normal_matches && !inverted_matches {
            return None;
        }

        let mut buf = [0u8; BITS_PER_SUBFRAME];
        if normal_matches {
            buf.copy_from_slice(&raw);
        } else {
            for (dst, &src) in buf.iter_mut().zip(raw.iter()) {
                *dst = 1 - src;
            }
        }

        if !check_parity(&buf) {
            return None;
        }

        let subframe_id = getbitu(&buf, 49, 3) as u8;
        debug_assert!(
            (1..=SUBFRAMES_PER_FRAME as u8).contains(&subframe_id),
            "subframe_id={subframe_id} out of range"
        );
        let tow = getbitu(&buf, 30, 17) * 6;
        let start = self.window.front().map(|&(_, idx)| idx).unwrap_or(0);
        self.window.clear();
        Some(Subframe {
            sv_id: self.sv_id,
            subframe_id,
            tow,
            bits: buf,
            t_rx_start_sample_index: start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a syntactically valid, parity-passing 300-bit subframe with
    /// the given subframe id in bits 49..52 and arbitrary payload bits.
    fn build_valid_subframe(subframe_id: u8) -> [u8; BITS_PER_SUBFRAME] {
        let mut buf = [0u8; BITS_PER_SUBFRAME];
        for i in 0..8 {
            buf[i] = PREAMBLE[i];
        }
        for i in 0..3 {
            buf[49 + i] = (subframe_id >> (2 - i)) & 1;
        }
        // Recompute the 6 parity bits of each word so check_parity accepts
        // the synthesized payload: parity bits sit at positions 24..30 of
        // each 30-bit word (d25..d30, here zero-filled and then derived).
        let mut data: u32 = 0;
        let data_bits_per_word = BITS_PER_WORD - PARITY_MASK.len();
        for w in 0..WORDS_PER_SUBFRAME {
            for j in 0..data_bits_per_word {
                data = (data << 1) | buf[w * BITS_PER_WORD + j] as u32;
            }
            // shift placeholder parity bits in as zero, recompute from mask
            data <<= 6;
            if data & (1 << 30) != 0 {
                data ^= 0x3FFFFFC0;
            }
            for (j, &mask) in PARITY_MASK.iter().enumerate() {
                let v0 = (data >> 6) & mask;
                let bit = xor_bits(v0);
                buf[w * BITS_PER_WORD + data_bits_per_word + j] = bit;
                data = (data & !(1 << (5 - j))) | ((bit as u32) << (5 - j));
            }
        }
        buf
    }

    fn feed(sync: &mut FrameSync, bits: &[u8], t0: u64) -> Option<Subframe> {
        let mut out = None;
        for (i, &b) in bits.iter().enumerate() {
            let nav_bit = NavBit {
                sv_id: sync.sv_id,
                bit_value: b,
                t_rx_start_sample_index: t0 + i as u64,
            };
            if let Some(s) = sync.process_bit(&nav_bit) {
                out = Some(s);
            }
        }
        out
    }

    #[test]
    fn emits_subframe_on_valid_preamble_and_parity() {
        let buf = build_valid_subframe(2);
        assert!(check_parity(&buf));
        let mut sync = FrameSync::new(4);
        let result = feed(&mut sync, &buf, 0);
        let sf = result.expect("expected a decoded subframe");
        assert_eq!(sf.subframe_id, 2);
        assert_eq!(sf.sv_id, 4);
    }

    #[test]
    fn emits_subframe_on_polarity_inverted_stream() {
        let buf = build_valid_subframe(3);
        let inverted: Vec<u8> = buf.iter().map(|&b| 1 - b).collect();
        let mut sync = FrameSync::new(4);
        let result = feed(&mut sync, &inverted, 0);
        let sf = result.expect("expected a decoded subframe from inverted stream");
        assert_eq!(sf.subframe_id, 3);
    }

    #[test]
    fn rejects_preamble_match_with_bad_parity() {
        let mut buf = build_valid_subframe(1);
        buf[24] ^= 1; // corrupt a parity bit of the first word
        let mut sync = FrameSync::new(1);
        assert!(feed(&mut sync, &buf, 0).is_none());
    }

    #[test]
    fn ignores_non_preamble_noise() {
        let noise = vec![0u8, 1, 0, 1, 0, 1, 1, 1, 0, 0];
        let repeated: Vec<u8> = noise
            .iter()
            .cycle()
            .take(BITS_PER_SUBFRAME)
            .copied()
            .collect();
        let mut sync = FrameSync::new(2);
        assert!(feed(&mut sync, &repeated, 0).is_none());
    }
}
