pub const PI: f64 = std::f64::consts::PI;

/// C/A code length in chips.
pub const PRN_CODE_LEN: usize = 1023;
/// Nominal C/A code period, seconds.
pub const CODE_PERIOD_SEC: f64 = 1e-3;
/// Number of GPS SVs (PRN 1..=32).
pub const NUM_GPS_SATS: usize = 32;
/// L1 carrier frequency, Hz.
pub const L1_HZ: f64 = 1575.42e6;

/// WGS-84 / GPS ICD-200 earth constants.
pub const EARTH_MU_GPS: f64 = 3.9860058e14;
pub const EARTH_ROTATION_RATE: f64 = 7.2921151467e-5;
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
pub const SECS_PER_WEEK: u32 = 7 * 24 * 60 * 60;
/// Relativistic correction constant, F = -2*sqrt(mu)/c^2.
pub const RELATIVISTIC_F: f64 = -4.442807633e-10;

/// LNAV frame/subframe geometry.
pub const BITS_PER_SUBFRAME: usize = 300;
pub const WORDS_PER_SUBFRAME: usize = 10;
pub const BITS_PER_WORD: usize = 30;
pub const BIT_PERIOD_MSEC: usize = 20;
pub const SUBFRAMES_PER_FRAME: usize = 5;
pub const PREAMBLE: [u8; 8] = [1, 0, 0, 0, 1, 0, 1, 1];

/// ICD-200 two's-power scale factors used throughout ephemeris/almanac decode.
pub const P2_5: f64 = 1.0 / 32.0;
pub const P2_11: f64 = 1.0 / 2048.0;
pub const P2_19: f64 = 1.0 / 524_288.0;
pub const P2_20: f64 = 1.0 / 1_048_576.0;
pub const P2_21: f64 = 1.0 / 2_097_152.0;
pub const P2_23: f64 = 1.0 / 8_388_608.0;
pub const P2_24: f64 = 1.0 / 16_777_216.0;
pub const P2_29: f64 = 1.0 / 536_870_912.0;
pub const P2_31: f64 = 1.0 / 2_147_483_648.0;
pub const P2_33: f64 = P2_31 / 4.0;
pub const P2_38: f64 = P2_31 / 128.0;
pub const P2_43: f64 = P2_31 / 4096.0;
pub const P2_55: f64 = P2_31 / 16_777_216.0;
/// Semicircles to radians.
pub const SC2RAD: f64 = PI;
