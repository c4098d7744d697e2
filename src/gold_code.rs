//! Reference G1/G2 two-register Gold-code construction, kept alongside the
//! production G2-delay form in `code.rs` as an independent cross-check of
//! the LFSR polynomials (`1 + x^3 + x^10` for G1, `1 + x^2 + x^3 + x^6 +
//! x^8 + x^9 + x^10` for G2): any future change to either form's tap
//! tables should keep both producing maximal-length (1023-chip),
//! low-cross-correlation sequences.

const G1_TAP: [usize; 2] = [2, 9];
const G2_TAP: [usize; 6] = [1, 2, 5, 7, 8, 9];
const GOLD_CODE_LEN: usize = 1023;

/// SV-specific G2 phase select taps (two-register form), ICD-200 table 3-Ia.
const PRN_TO_G2_TAP: [(usize, usize); 32] = [
    (2, 6),
    (3, 7),
    (4, 8),
    (5, 9),
    (1, 9),
    (2, 10),
    (1, 8),
    (2, 9),
    (3, 10),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (7, 8),
    (8, 9),
    (9, 10),
    (1, 4),
    (2, 5),
    (3, 6),
    (4, 7),
    (5, 8),
    (6, 9),
    (1, 3),
    (4, 6),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (1, 6),
    (2, 7),
    (3, 8),
    (4, 9),
];

/// Generates the length-1023 0/1 chip sequence for `prn` (1..=32) via two
/// maximal-length LFSRs summed mod 2.
pub fn gen_code(prn: usize) -> Vec<usize> {
    let mut g1 = [1usize; 10];
    let mut g2 = [1usize; 10];
    let mut g = Vec::with_capacity(GOLD_CODE_LEN);

    for _ in 0..GOLD_CODE_LEN {
        let (p0, p1) = PRN_TO_G2_TAP[prn - 1];
        let v = (g1[9] + g2[p0 - 1] + g2[p1 - 1]) % 2;
        g.push(v);

        let fb1 = G1_TAP.iter().map(|&x| g1[x]).sum::<usize>() % 2;
        g1.rotate_right(1);
        g1[0] = fb1;

        let fb2 = G2_TAP.iter().map(|&x| g2[x]).sum::<usize>() % 2;
        g2.rotate_right(1);
        g2[0] = fb2;
    }
    g
}
