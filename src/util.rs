use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::types::Sample;

pub fn pretty_print(n: u64) -> String {
    let multiplier: u64;
    let unit: &str;
    let v: f64;

    if n >= 1024 * 1024 * 1024 {
        multiplier = 1024 * 1024 * 1024;
        unit = "GB";
    } else if n >= 1024 * 1024 {
        multiplier = 1024 * 1024;
        unit = "MB";
    } else if n >= 1024 {
        multiplier = 1024;
        unit = "KB";
    } else {
        multiplier = 1;
        unit = "bytes";
    }
    v = n as f64 / multiplier as f64;
    format!("{:.3} {}", v, unit)
}

/// In-place carrier wipe-off: multiplies `samples` by `exp(-j*2*pi*f*(t0+n/fs))`.
pub fn doppler_shift(freq_hz: f64, t0_sec: f64, samples: &mut [Sample], sample_rate_hz: f64) {
    for (n, s) in samples.iter_mut().enumerate() {
        let t = t0_sec + n as f64 / sample_rate_hz;
        let phase = -2.0 * std::f64::consts::PI * freq_hz * t;
        let rot = Complex64::new(phase.cos(), phase.sin());
        *s *= rot;
    }
}

/// FFT-based circular correlation: `IFFT(FFT(signal) . conj(FFT(reference)))`.
/// `reference_fft` must already be the FFT of the (possibly resampled) PRN
/// code, with the same length as `signal`.
pub fn calc_correlation(
    planner: &mut FftPlanner<f64>,
    signal: &[Sample],
    reference_fft: &[Sample],
) -> Vec<Sample> {
    let n = signal.len();
    assert_eq!(n, reference_fft.len());

    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buf: Vec<Sample> = signal.to_vec();
    fft.process(&mut buf);

    for (s, r) in buf.iter_mut().zip(reference_fft.iter()) {
        *s *= r.conj();
    }

    ifft.process(&mut buf);

    let scale = 1.0 / n as f64;
    for s in buf.iter_mut() {
        *s *= scale;
    }
    buf
}

pub fn fft_forward(planner: &mut FftPlanner<f64>, data: &[Sample]) -> Vec<Sample> {
    let n = data.len();
    let fft = planner.plan_fft_forward(n);
    let mut buf = data.to_vec();
    fft.process(&mut buf);
    buf
}

pub fn get_max_with_idx(v: &[f64]) -> (usize, f64) {
    let mut idx = 0;
    let mut max = f64::MIN;
    for (i, &x) in v.iter().enumerate() {
        if x > max {
            max = x;
            idx = i;
        }
    }
    (idx, max)
}

/// Extract an unsigned `len`-bit field from a packed bit buffer (one bit per
/// byte, MSB-first numbering as in ICD-200 word layout), starting at bit
/// offset `pos`. RTKLIB-style helper assumed by the navigation-message
/// decoders.
pub fn getbitu(buf: &[u8], pos: usize, len: usize) -> u32 {
    let mut v: u32 = 0;
    for i in pos..pos + len {
        v = (v << 1) | (buf[i] as u32 & 1);
    }
    v
}

/// Same as `getbitu` but sign-extends the result as a two's-complement value.
pub fn getbits(buf: &[u8], pos: usize, len: usize) -> i32 {
    let v = getbitu(buf, pos, len) as i64;
    if len == 0 || len >= 32 {
        return v as i32;
    }
    let sign_bit = 1i64 << (len - 1);
    if v & sign_bit != 0 {
        (v - (sign_bit << 1)) as i32
    } else {
        v as i32
    }
}

/// Two fields split across non-contiguous bit ranges, concatenated MSB-first
/// (`pos1` field forms the high bits), unsigned.
pub fn getbitu2(buf: &[u8], pos1: usize, len1: usize, pos2: usize, len2: usize) -> u32 {
    (getbitu(buf, pos1, len1) << len2) | getbitu(buf, pos2, len2)
}

/// Same as `getbitu2` but sign-extends the combined field.
pub fn getbits2(buf: &[u8], pos1: usize, len1: usize, pos2: usize, len2: usize) -> i32 {
    let len = len1 + len2;
    let v = getbitu2(buf, pos1, len1, pos2, len2) as i64;
    let sign_bit = 1i64 << (len - 1);
    if v & sign_bit != 0 {
        (v - (sign_bit << 1)) as i32
    } else {
        v as i32
    }
}

/// Parity of the set bits of `v` (XOR-fold), used by the GPS word-parity check.
pub fn xor_bits(mut v: u32) -> u8 {
    let mut p = 0u8;
    while v != 0 {
        p ^= (v & 1) as u8;
        v >>= 1;
    }
    p
}

/// True if `window` matches `pattern` bit-for-bit.
pub fn bmatch_n(pattern: &[u8], window: &[u8]) -> bool {
    pattern.len() == window.len() && pattern.iter().zip(window).all(|(a, b)| a == b)
}

/// True if `window` matches the bitwise inverse of `pattern`.
pub fn bmatch_r(pattern: &[u8], window: &[u8]) -> bool {
    pattern.len() == window.len()
        && pattern
            .iter()
            .zip(window)
            .all(|(a, b)| *a == (1 - b.min(&1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getbitu_reads_msb_first() {
        let buf = [0u8, 0, 0, 1, 1, 0, 1];
        assert_eq!(getbitu(&buf, 0, 7), 0b0001101);
    }

    #[test]
    fn getbits_sign_extends() {
        let buf = [1u8, 1, 1, 1];
        assert_eq!(getbits(&buf, 0, 4), -1);
        let buf2 = [0u8, 1, 1, 1];
        assert_eq!(getbits(&buf2, 0, 4), 7);
    }

    #[test]
    fn bmatch_inverse() {
        let p = [1u8, 0, 0, 0, 1, 0, 1, 1];
        let inv = [0u8, 1, 1, 1, 0, 1, 0, 0];
        assert!(bmatch_r(&p, &inv));
        assert!(!bmatch_n(&p, &inv));
        assert!(bmatch_n(&p, &p));
    }

    #[test]
    fn xor_bits_parity() {
        assert_eq!(xor_bits(0b111), 1);
        assert_eq!(xor_bits(0b110), 0);
        assert_eq!(xor_bits(0), 0);
    }
}
