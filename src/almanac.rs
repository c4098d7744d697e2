//! Subframe 4/5 almanac decode. Almanac doesn't feed the position solver
//! (only current ephemeris does), so unlike `ephemeris.rs` this keeps the
//! ICD-200 unsigned-field reads verbatim even for conventionally-signed
//! quantities (`omg_dot`, `m0`, `omg`, `omg0`) — callers that need signed
//! orbit angles should prefer `Ephemeris` instead.

use serde::{Deserialize, Serialize};

use crate::constants::{P2_11, P2_19, P2_20, P2_21, P2_23, P2_38, SC2RAD};
use crate::util::{getbitu, getbitu2};

#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Almanac {
    pub sv_id: u8,
    pub svh: u32,

    pub a: f64,
    pub ecc: f64,
    pub omg0: f64,
    pub omg: f64,
    pub m0: f64,
    pub omg_dot: f64,
    pub delta_i: f64,
    pub week: u32,
    pub toas: u32,
    pub f0: f64,
    pub f1: f64,
}

impl Almanac {
    pub fn new(sv_id: u8) -> Self {
        Self {
            sv_id,
            ..Default::default()
        }
    }

    pub fn decode(&mut self, buf: &[u8]) {
        self.ecc = getbitu(buf, 68, 16) as f64 * P2_21;
        self.toas = getbitu(buf, 90, 8) * 4096;
        self.delta_i = getbitu(buf, 98, 16) as f64 * P2_19 * SC2RAD;

        self.omg_dot = getbitu(buf, 120, 16) as f64 * P2_38 * SC2RAD;
        self.svh = getbitu(buf, 136, 8);
        let sqrt_a = getbitu(buf, 150, 24) as f64 * P2_11;
        self.a = sqrt_a * sqrt_a;
        self.omg0 = getbitu(buf, 180, 24) as f64 * P2_23 * SC2RAD;
        self.omg = getbitu(buf, 210, 24) as f64 * P2_23 * SC2RAD;
        self.m0 = getbitu(buf, 240, 24) as f64 * P2_23 * SC2RAD;
        self.f0 = getbitu2(buf, 270, 8, 289, 3) as f64 * P2_20;
        self.f1 = getbitu(buf, 278, 11) as f64 * P2_38;

        log::debug!(
            "sv {}: almanac ecc={:.6} toas={} a={:.1} svh={}",
            self.sv_id,
            self.ecc,
            self.toas,
            self.a,
            self.svh
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_eccentricity_and_health() {
        let mut buf = [0u8; 300];
        for i in 0..16 {
            buf[68 + i] = ((0x1234u32 >> (15 - i)) & 1) as u8;
        }
        for i in 0..8 {
            buf[136 + i] = ((0x3Fu32 >> (7 - i)) & 1) as u8;
        }
        let mut alm = Almanac::new(3);
        alm.decode(&buf);
        assert!((alm.ecc - 0x1234 as f64 * P2_21).abs() < 1e-12);
        assert_eq!(alm.svh, 0x3F);
    }
}
