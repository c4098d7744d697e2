//! Klobuchar ionospheric model parameters and UTC offset, broadcast on
//! subframe 4 page 18. Optional per spec (§1 Non-goals allow skipping
//! ionospheric modeling beyond these broadcast parameters); decoded here
//! because the bits are free once a receiver is already decoding subframe 4.

use serde::{Deserialize, Serialize};

use crate::constants::{P2_24, P2_29};
use crate::util::{getbits, getbitu};

/// `data_id`/page-number field shared by subframe 4 and 5 words 3-10,
/// bits 60..68 of the subframe (2-bit data ID + 6-bit SV/page ID).
pub fn page_id(buf: &[u8]) -> u32 {
    getbitu(buf, 62, 6)
}

/// True if a subframe-4 page is page 18 (ionosphere/UTC), identified by the
/// SV ID field taking the reserved value 56 in that slot.
pub fn is_iono_utc_page(buf: &[u8]) -> bool {
    page_id(buf) == 56
}

/// Klobuchar 8-coefficient ionospheric model, plus the UTC/leap-second
/// parameters broadcast on the same page.
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IonoUtcParams {
    pub alpha: [f64; 4],
    pub beta: [f64; 4],
    pub a0: f64,
    pub a1: f64,
    pub leap_seconds: i32,
}

impl IonoUtcParams {
    /// Decodes subframe 4 page 18. Caller must have already verified
    /// `is_iono_utc_page`.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            alpha: [
                getbits(buf, 68, 8) as f64 * P2_29 * 4.0,
                getbits(buf, 76, 8) as f64 * P2_29 * 1024.0,
                getbits(buf, 84, 8) as f64 * P2_24 * 1024.0,
                getbits(buf, 92, 8) as f64 * P2_24 * 65_536.0,
            ],
            beta: [
                getbits(buf, 100, 8) as f64 * 2048.0,
                getbits(buf, 108, 8) as f64 * 16_384.0,
                getbits(buf, 116, 8) as f64 * 65_536.0,
                getbits(buf, 124, 8) as f64 * 65_536.0,
            ],
            a0: getbits(buf, 180, 24) as f64 * P2_29 * 2.0,
            a1: getbits(buf, 150, 24) as f64 * P2_29 * P2_24,
            leap_seconds: getbits(buf, 240, 8),
        }
    }

    /// Klobuchar ionospheric delay estimate, seconds, for a signal arriving
    /// from elevation `el_rad` and azimuth `az_rad` at geodetic `lat_rad`,
    /// `lon_rad`, at GPS time-of-day `tow_sec`.
    pub fn delay_sec(&self, lat_rad: f64, lon_rad: f64, az_rad: f64, el_rad: f64, tow_sec: f64) -> f64 {
        const SC2RAD: f64 = std::f64::consts::PI;
        let el_sc = el_rad / SC2RAD;
        let psi = 0.0137 / (el_sc + 0.11) - 0.022;

        let lat_i = (lat_rad / SC2RAD + psi * az_rad.cos()).clamp(-0.416, 0.416);
        let lon_i = lon_rad / SC2RAD + psi * az_rad.sin() / (lat_i * SC2RAD).cos();
        let lat_m = lat_i + 0.064 * ((lon_i - 1.617) * SC2RAD).cos();

        let t = (43_200.0 * lon_i + tow_sec).rem_euclid(86_400.0);

        let amp = self.alpha[0]
            + lat_m * (self.alpha[1] + lat_m * (self.alpha[2] + lat_m * self.alpha[3]));
        let amp = amp.max(0.0);
        let per = self.beta[0] + lat_m * (self.beta[1] + lat_m * (self.beta[2] + lat_m * self.beta[3]));
        let per = per.max(72_000.0);

        let x = 2.0 * std::f64::consts::PI * (t - 50_400.0) / per;
        let slant_factor = 1.0 + 16.0 * (0.53 - el_sc).powi(3);

        let delay = if x.abs() < 1.57 {
            5e-9 + amp * (1.0 - x * x / 2.0 + x.powi(4) / 24.0)
        } else {
            5e-9
        };
        delay * slant_factor
    }
}
