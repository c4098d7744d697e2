//! Subframe 1/2/3 LNAV decode into a broadcast `Ephemeris`.
//!
//! Bit offsets and ICD-200 two's-power scale factors kept near-verbatim; the
//! `Epoch`-typed fields of the original decoder are replaced with plain
//! `week`/seconds-of-week integers since this crate doesn't carry a
//! `gnss_rtk`-style time type.

use serde::{Deserialize, Serialize};

use crate::constants::{P2_5, P2_19, P2_29, P2_31, P2_33, P2_43, P2_55, SC2RAD};
use crate::util::{getbits, getbits2, getbitu, getbitu2};

/// Broadcast ephemeris for one SV, assembled incrementally as subframes
/// 1/2/3 arrive. `iode_subframe2`/`iode_subframe3` are kept distinct so
/// callers can verify both subframes describe the same orbit update before
/// trusting the assembled set (`is_consistent`).
///
/// Serializable so a receiver can persist the last-known ephemeris set
/// across restarts and reload it without waiting out a fresh 30-second
/// subframe cycle.
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ephemeris {
    pub sv_id: u8,
    pub tow: u32,

    pub iode_subframe2: Option<u32>,
    pub iode_subframe3: Option<u32>,
    pub iodc: u32,
    pub sva: u32,
    pub svh: u32,
    pub week: u32,
    pub code: u32,
    pub flag: u32,
    pub tgd: f64,
    pub f0: f64,
    pub f1: f64,
    pub f2: f64,
    pub omg: f64,
    pub omg0: f64,
    pub omg_dot: f64,
    pub cic: f64,
    pub cis: f64,
    pub crc: f64,
    pub crs: f64,
    pub cuc: f64,
    pub cus: f64,
    pub i_dot: f64,
    pub i0: f64,
    pub m0: f64,
    pub a: f64,
    pub ecc: f64,
    pub deln: f64,
    pub toc: u32,
    pub toe: u32,
    pub fit: u32,

    has_subframe1: bool,
    has_subframe2: bool,
    has_subframe3: bool,
}

impl Ephemeris {
    pub fn new(sv_id: u8) -> Self {
        Self {
            sv_id,
            ..Default::default()
        }
    }

    /// True once subframes 1, 2 and 3 have all been decoded and subframes 2
    /// and 3 agree on IODE (guards against mixing two different upload
    /// epochs' orbit parameters).
    pub fn is_consistent(&self) -> bool {
        self.has_subframe1
            && self.has_subframe2
            && self.has_subframe3
            && self.iode_subframe2.is_some()
            && self.iode_subframe2 == self.iode_subframe3
    }

    /// Serializes to the JSON form persisted between receiver restarts.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restores an `Ephemeris` previously produced by `to_json`.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn decode_subframe1(&mut self, buf: &[u8]) {
        self.tow = getbitu(buf, 30, 17) * 6;
        self.week = getbitu(buf, 60, 10) + 2048;
        self.code = getbitu(buf, 70, 2);
        self.sva = getbitu(buf, 72, 4);
        self.svh = getbitu(buf, 76, 6);

        self.iodc = getbitu2(buf, 82, 2, 210, 8);
        self.flag = getbitu(buf, 90, 1);
        self.tgd = getbits(buf, 196, 8) as f64 * P2_31;
        self.toc = getbitu(buf, 218, 16) * 16;
        self.f2 = getbits(buf, 240, 8) as f64 * P2_55;
        self.f1 = getbits(buf, 248, 16) as f64 * P2_43;
        self.f0 = getbits(buf, 270, 22) as f64 * P2_31;

        self.has_subframe1 = true;
        log::debug!(
            "sv {}: subframe-1 week={} svh={} tgd={:+e} toc={} f0={:+e} f1={:+e} f2={:+e}",
            self.sv_id,
            self.week,
            self.svh,
            self.tgd,
            self.toc,
            self.f0,
            self.f1,
            self.f2
        );
    }

    pub fn decode_subframe2(&mut self, buf: &[u8]) {
        self.tow = getbitu(buf, 30, 17) * 6;
        let iode = getbitu(buf, 60, 8);
        self.crs = getbits(buf, 68, 16) as f64 * P2_5;
        self.deln = getbits(buf, 90, 16) as f64 * P2_43 * SC2RAD;
        self.m0 = getbits2(buf, 106, 8, 120, 24) as f64 * P2_31 * SC2RAD;
        self.cuc = getbits(buf, 150, 16) as f64 * P2_29;
        self.ecc = getbitu2(buf, 166, 8, 180, 24) as f64 * P2_33;
        self.cus = getbits(buf, 210, 16) as f64 * P2_29;
        let sqrt_a = getbitu2(buf, 226, 8, 240, 24) as f64 * P2_19;
        self.toe = getbitu(buf, 270, 16) * 16;
        self.fit = getbitu(buf, 286, 1);
        self.a = sqrt_a * sqrt_a;

        self.iode_subframe2 = Some(iode);
        self.has_subframe2 = true;
        log::debug!(
            "sv {}: subframe-2 a={:.1} iode={} ecc={:.6} m0={:.6} toe={}",
            self.sv_id,
            self.a,
            iode,
            self.ecc,
            self.m0,
            self.toe,
        );
    }

    pub fn decode_subframe3(&mut self, buf: &[u8]) {
        self.tow = getbitu(buf, 30, 17) * 6;
        self.cic = getbits(buf, 60, 16) as f64 * P2_29;
        self.omg0 = getbits2(buf, 76, 8, 90, 24) as f64 * P2_31 * SC2RAD;
        self.cis = getbits(buf, 120, 16) as f64 * P2_29;
        self.i0 = getbits2(buf, 136, 8, 150, 24) as f64 * P2_31 * SC2RAD;
        self.crc = getbits(buf, 180, 16) as f64 * P2_5;
        self.omg = getbits2(buf, 196, 8, 210, 24) as f64 * P2_31 * SC2RAD;
        self.omg_dot = getbits(buf, 240, 24) as f64 * P2_43 * SC2RAD;
        let iode = getbitu(buf, 270, 8);
        self.i_dot = getbits(buf, 278, 14) as f64 * P2_43 * SC2RAD;

        self.iode_subframe3 = Some(iode);
        self.has_subframe3 = true;
        log::debug!(
            "sv {}: subframe-3 omg0={:.6} omg={:.6} i0={:.6} iode={}",
            self.sv_id,
            self.omg0,
            self.omg,
            self.i0,
            iode,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Packs `fields` (bit offset, bit length, value) into a 300-bit 0/1
    /// buffer for feeding straight into the decoders under test.
    fn build_subframe(fields: &[(usize, usize, u32)]) -> [u8; 300] {
        let mut buf = [0u8; 300];
        for &(pos, len, value) in fields {
            for i in 0..len {
                let bit = ((value >> (len - 1 - i)) & 1) as u8;
                buf[pos + i] = bit;
            }
        }
        buf
    }

    #[test]
    fn decodes_subframe1_week_and_clock_terms() {
        let buf = build_subframe(&[
            (60, 10, 2200 - 2048),
            (76, 6, 0),
            (218, 16, 100),
            (270, 22, 0x100),
        ]);
        let mut eph = Ephemeris::new(5);
        eph.decode_subframe1(&buf);
        assert_eq!(eph.week, 2200);
        assert_eq!(eph.svh, 0);
        assert_eq!(eph.toc, 1600);
        assert!(eph.has_subframe1);
    }

    #[test]
    fn subframe2_and_3_iode_consistency_check() {
        let buf1 = build_subframe(&[(60, 10, 0)]);
        let buf2 = build_subframe(&[(60, 8, 42), (270, 16, 1000)]);
        let buf3 = build_subframe(&[(270, 8, 42)]);

        let mut eph = Ephemeris::new(11);
        eph.decode_subframe1(&buf1);
        eph.decode_subframe2(&buf2);
        assert!(!eph.is_consistent());
        eph.decode_subframe3(&buf3);
        assert!(eph.is_consistent());
        assert_eq!(eph.toe, 16000);
    }

    #[test]
    fn mismatched_iode_is_not_consistent() {
        let buf1 = build_subframe(&[]);
        let buf2 = build_subframe(&[(60, 8, 42)]);
        let buf3 = build_subframe(&[(270, 8, 43)]);

        let mut eph = Ephemeris::new(11);
        eph.decode_subframe1(&buf1);
        eph.decode_subframe2(&buf2);
        eph.decode_subframe3(&buf3);
        assert!(!eph.is_consistent());
    }

    /// serde_json round-trips `f64` exactly (it formats with enough digits to
    /// reconstruct the same bit pattern), so persisting and reloading an
    /// `Ephemeris` must yield bit-identical parameter values, not merely
    /// close ones.
    #[test]
    fn json_round_trip_is_bit_identical() {
        let buf1 = build_subframe(&[
            (60, 10, 2200 - 2048),
            (76, 6, 3),
            (196, 8, 0x5A),
            (218, 16, 100),
            (240, 8, 0x12),
            (248, 16, 0x34),
            (270, 22, 0x1_ABCD),
        ]);
        let buf2 = build_subframe(&[
            (60, 8, 42),
            (68, 16, 0x2222),
            (90, 16, 0x1111),
            (106, 8, 0x5),
            (120, 24, 0xABCDEF),
            (150, 16, 0x3333),
            (166, 8, 0x7),
            (180, 24, 0x654321),
            (210, 16, 0x4444),
            (226, 8, 0x9),
            (240, 24, 0xFEDCBA),
            (270, 16, 1000),
        ]);
        let buf3 = build_subframe(&[(270, 8, 42)]);

        let mut eph = Ephemeris::new(17);
        eph.decode_subframe1(&buf1);
        eph.decode_subframe2(&buf2);
        eph.decode_subframe3(&buf3);
        assert!(eph.is_consistent());

        let json = eph.to_json().expect("serialize");
        let round_tripped = Ephemeris::from_json(&json).expect("deserialize");

        assert_eq!(round_tripped, eph);
        assert_eq!(round_tripped.f0.to_bits(), eph.f0.to_bits());
        assert_eq!(round_tripped.a.to_bits(), eph.a.to_bits());
        assert_eq!(round_tripped.ecc.to_bits(), eph.ecc.to_bits());
        assert_eq!(round_tripped.omg_dot.to_bits(), eph.omg_dot.to_bits());
    }
}
