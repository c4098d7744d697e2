//! SV ECEF position (ICD-200 Kepler propagation + Sagnac correction),
//! pseudorange formation, and the iterative least-squares PVT solve.
//!
//! Grounded on `solver.rs::get_eccentric_anomaly`/`compute_sv_position_ecef`
//! of the teacher (kept near-verbatim, generalized off the `gnss_rtk::Epoch`
//! time type onto this crate's plain GPS-seconds representation); the
//! Gauss-Newton solve itself replaces the teacher's delegation to
//! `gnss_rtk::prelude::Solver::resolve` (see `DESIGN.md`).

use colored::Colorize;

use crate::constants::{
    EARTH_MU_GPS, EARTH_ROTATION_RATE, RELATIVISTIC_F, SECS_PER_WEEK, SPEED_OF_LIGHT,
};
use crate::ephemeris::Ephemeris;
use crate::errors::ReceiverError;

/// One SV's contribution to a fix: a formed pseudorange plus everything
/// needed to evaluate the observation model at a trial receiver state.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub sv_id: u8,
    /// `c * (t_rx_common - t_tx)`, uncorrected for SV clock error.
    pub pseudorange_m: f64,
    /// GPS seconds-of-week at which the signal left the SV.
    pub t_tx_sec: f64,
}

/// Dilution-of-precision terms derived from the solved geometry matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dops {
    pub gdop: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub tdop: f64,
}

/// A computed position/time fix.
#[derive(Debug, Clone, Copy)]
pub struct PvtSolution {
    pub ecef_x_m: f64,
    pub ecef_y_m: f64,
    pub ecef_z_m: f64,
    /// Receiver clock bias, `c * delta_t_receiver_clock`, meters.
    pub clock_bias_m: f64,
    pub dops: Dops,
    pub num_svs: usize,
    pub iterations: usize,
    pub t_rx_sample_index: u64,
}

const MAX_ITERATIONS: usize = 20;
const CONVERGENCE_M: f64 = 1e-4;
/// Above this condition-number estimate the geometry matrix is treated as
/// singular and the fix is skipped (spec's cancellation threshold).
const MAX_CONDITION_NUMBER: f64 = 1e6;

fn get_eccentric_anomaly(eph: &Ephemeris, t_k: f64) -> f64 {
    let n0 = (EARTH_MU_GPS / eph.a.powi(3)).sqrt();
    let n = n0 + eph.deln;
    let mk = eph.m0 + n * t_k;

    let mut e = mk;
    let mut e_prev = f64::MAX;
    let mut n_iter = 0;
    while (e - e_prev).abs() > 1e-12 && n_iter < 30 {
        e_prev = e;
        e += (mk - e + eph.ecc * e.sin()) / (1.0 - eph.ecc * e.cos());
        n_iter += 1;
    }
    e
}

/// SV position in ECEF at GPS time `t_tx_sec` (seconds-of-week in `eph`'s
/// week), via the ICD-200 broadcast-orbit algorithm. Does *not* apply the
/// Sagnac transit-time rotation; see `sagnac_rotate`.
pub fn compute_sv_position_ecef(eph: &Ephemeris, t_tx_sec: f64) -> [f64; 3] {
    let mut t_k = t_tx_sec - eph.toe as f64;
    if t_k > 302_400.0 {
        t_k -= SECS_PER_WEEK as f64;
    }
    if t_k < -302_400.0 {
        t_k += SECS_PER_WEEK as f64;
    }

    let ecc_anomaly = get_eccentric_anomaly(eph, t_k);
    let v_k =
        ((1.0 - eph.ecc * eph.ecc).sqrt() * ecc_anomaly.sin()).atan2(ecc_anomaly.cos() - eph.ecc);

    let phi_k = v_k + eph.omg;
    let duk = eph.cus * (2.0 * phi_k).sin() + eph.cuc * (2.0 * phi_k).cos();
    let drk = eph.crs * (2.0 * phi_k).sin() + eph.crc * (2.0 * phi_k).cos();
    let dik = eph.cis * (2.0 * phi_k).sin() + eph.cic * (2.0 * phi_k).cos();

    let uk = phi_k + duk;
    let rk = eph.a * (1.0 - eph.ecc * ecc_anomaly.cos()) + drk;
    let ik = eph.i0 + eph.i_dot * t_k + dik;

    let orb_x = rk * uk.cos();
    let orb_y = rk * uk.sin();

    let omega =
        eph.omg0 + (eph.omg_dot - EARTH_ROTATION_RATE) * t_k - EARTH_ROTATION_RATE * eph.toe as f64;

    let x = orb_x * omega.cos() - orb_y * ik.cos() * omega.sin();
    let y = orb_x * omega.sin() + orb_y * ik.cos() * omega.cos();
    let z = orb_y * ik.sin();
    [x, y, z]
}

/// Relativistic clock correction, seconds: `F * e * sqrt(A) * sin(E_k)`.
fn relativistic_correction_sec(eph: &Ephemeris, t_k: f64) -> f64 {
    let ecc_anomaly = get_eccentric_anomaly(eph, t_k);
    RELATIVISTIC_F * eph.ecc * eph.a.sqrt() * ecc_anomaly.sin()
}

/// SV clock bias at transmit time, seconds: polynomial clock model plus the
/// relativistic correction, minus the broadcast group delay.
pub fn sv_clock_bias_sec(eph: &Ephemeris, t_tx_sec: f64) -> f64 {
    let mut dt = t_tx_sec - eph.toc as f64;
    if dt > 302_400.0 {
        dt -= SECS_PER_WEEK as f64;
    }
    if dt < -302_400.0 {
        dt += SECS_PER_WEEK as f64;
    }
    // iterate once: f1/f2 depend only weakly on the correction itself.
    let t_k = t_tx_sec - eph.toe as f64;
    eph.f0 + eph.f1 * dt + eph.f2 * dt * dt + relativistic_correction_sec(eph, t_k) - eph.tgd
}

/// Rotates an ECEF position by the Earth's rotation during `transit_time_sec`
/// of signal flight, so the SV position is expressed in the ECEF frame at
/// the receiver's epoch rather than the (earlier) transmit epoch.
pub fn sagnac_rotate(pos: [f64; 3], transit_time_sec: f64) -> [f64; 3] {
    let theta = EARTH_ROTATION_RATE * transit_time_sec;
    let (s, c) = theta.sin_cos();
    [
        c * pos[0] + s * pos[1],
        -s * pos[0] + c * pos[1],
        pos[2],
    ]
}

/// WGS-84 ECEF -> geodetic latitude/longitude, radians, via Bowring's
/// closed-form iteration. Used only to rotate the position covariance block
/// into ENU for HDOP/VDOP; altitude is not needed and not returned.
fn ecef_to_lat_lon(x: f64, y: f64, z: f64) -> (f64, f64) {
    const WGS84_A: f64 = 6_378_137.0;
    const WGS84_F: f64 = 1.0 / 298.257_223_563;
    let e2 = WGS84_F * (2.0 - WGS84_F);

    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();
    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..5 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        lat = (z + e2 * n * sin_lat).atan2(p);
    }
    (lat, lon)
}

type Mat4 = [[f64; 4]; 4];
type Vec4 = [f64; 4];

fn mat4_zero() -> Mat4 {
    [[0.0; 4]; 4]
}

/// Solves `a * x = b` via Gauss-Jordan elimination with partial pivoting.
/// Returns `None` (and the largest/smallest pivot magnitudes seen) so the
/// caller can report a condition-number estimate even on success.
fn solve4(a: &Mat4, b: &Vec4) -> Option<(Vec4, f64)> {
    let mut m = *a;
    let mut rhs = *b;
    let mut min_pivot = f64::MAX;
    let mut max_pivot = 0f64;

    for col in 0..4 {
        let (pivot_row, _) = (col..4)
            .map(|r| (r, m[r][col].abs()))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())?;
        if m[pivot_row][col].abs() < 1e-18 {
            return None;
        }
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        min_pivot = min_pivot.min(pivot.abs());
        max_pivot = max_pivot.max(pivot.abs());

        for k in col..4 {
            m[col][k] /= pivot;
        }
        rhs[col] /= pivot;

        for r in 0..4 {
            if r == col {
                continue;
            }
            let factor = m[r][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..4 {
                m[r][k] -= factor * m[col][k];
            }
            rhs[r] -= factor * rhs[col];
        }
    }

    Some((rhs, max_pivot / min_pivot.max(1e-300)))
}

/// Inverts `a` (4x4) via Gauss-Jordan, used to derive the DOP covariance.
fn invert4(a: &Mat4) -> Option<Mat4> {
    let mut out = mat4_zero();
    for col in 0..4 {
        let mut e = [0.0; 4];
        e[col] = 1.0;
        let (x, _) = solve4(a, &e)?;
        for row in 0..4 {
            out[row][col] = x[row];
        }
    }
    Some(out)
}

fn range3(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Iterative Newton / linearized least-squares PVT solver.
pub struct PositionSolver;

impl Default for PositionSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSolver {
    pub fn new() -> Self {
        Self
    }

    /// Solves for `(x, y, z, clock_bias)` given pseudoranges from `measurements`
    /// against `ephs` (same length, matched by `sv_id`). Requires at least 4
    /// measurements. Iterates from the center of the Earth until the state
    /// update drops below 1e-4 m, or bails with `GeometrySingular` if the
    /// geometry matrix's condition number exceeds the configured threshold.
    pub fn solve(
        &self,
        measurements: &[Measurement],
        ephs: &[Ephemeris],
        t_rx_sample_index: u64,
    ) -> Result<PvtSolution, ReceiverError> {
        if measurements.len() < 4 {
            return Err(ReceiverError::GeometrySingular);
        }

        let mut state = [0.0f64, 0.0, 0.0, 0.0]; // x, y, z, b (meters)
        let mut iterations = 0;
        let mut last_condition = 1.0;

        for _ in 0..MAX_ITERATIONS {
            iterations += 1;
            let mut ata = mat4_zero();
            let mut atb = [0.0f64; 4];

            for m in measurements {
                let eph = ephs
                    .iter()
                    .find(|e| e.sv_id == m.sv_id)
                    .ok_or(ReceiverError::GeometrySingular)?;

                let approx_transit_sec = (m.pseudorange_m - state[3]).max(0.0) / SPEED_OF_LIGHT;
                let sv_pos_tx = compute_sv_position_ecef(eph, m.t_tx_sec);
                let sv_pos = sagnac_rotate(sv_pos_tx, approx_transit_sec);

                let dt_sv = sv_clock_bias_sec(eph, m.t_tx_sec);
                let corrected_pseudorange_m = m.pseudorange_m + SPEED_OF_LIGHT * dt_sv;

                let user_pos = [state[0], state[1], state[2]];
                let r = range3(sv_pos, user_pos).max(1.0);
                let predicted = r + state[3];
                let residual = corrected_pseudorange_m - predicted;

                let row = [
                    -(sv_pos[0] - user_pos[0]) / r,
                    -(sv_pos[1] - user_pos[1]) / r,
                    -(sv_pos[2] - user_pos[2]) / r,
                    1.0,
                ];

                for i in 0..4 {
                    atb[i] += row[i] * residual;
                    for j in 0..4 {
                        ata[i][j] += row[i] * row[j];
                    }
                }
            }

            let (delta, condition) = solve4(&ata, &atb).ok_or(ReceiverError::GeometrySingular)?;
            last_condition = condition;
            if condition > MAX_CONDITION_NUMBER {
                return Err(ReceiverError::GeometrySingular);
            }

            for i in 0..4 {
                state[i] += delta[i];
            }

            let step = (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
            if step < CONVERGENCE_M {
                break;
            }
        }

        let ata_final = {
            let mut ata = mat4_zero();
            for m in measurements {
                let eph = ephs
                    .iter()
                    .find(|e| e.sv_id == m.sv_id)
                    .ok_or(ReceiverError::GeometrySingular)?;
                let approx_transit_sec = (m.pseudorange_m - state[3]).max(0.0) / SPEED_OF_LIGHT;
                let sv_pos = sagnac_rotate(compute_sv_position_ecef(eph, m.t_tx_sec), approx_transit_sec);
                let user_pos = [state[0], state[1], state[2]];
                let r = range3(sv_pos, user_pos).max(1.0);
                let row = [
                    -(sv_pos[0] - user_pos[0]) / r,
                    -(sv_pos[1] - user_pos[1]) / r,
                    -(sv_pos[2] - user_pos[2]) / r,
                    1.0,
                ];
                for i in 0..4 {
                    for j in 0..4 {
                        ata[i][j] += row[i] * row[j];
                    }
                }
            }
            ata
        };

        let dops = invert4(&ata_final)
            .map(|q| {
                let (lat, lon) = ecef_to_lat_lon(state[0], state[1], state[2]);
                let (sin_lat, cos_lat) = lat.sin_cos();
                let (sin_lon, cos_lon) = lon.sin_cos();
                // ECEF -> ENU rotation rows (east, north, up).
                let r_e = [-sin_lon, cos_lon, 0.0];
                let r_n = [-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat];
                let r_u = [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat];

                let q3 = [
                    [q[0][0], q[0][1], q[0][2]],
                    [q[1][0], q[1][1], q[1][2]],
                    [q[2][0], q[2][1], q[2][2]],
                ];
                let apply = |row: [f64; 3]| -> [f64; 3] {
                    let mut qr = [0.0; 3];
                    for i in 0..3 {
                        qr[i] = row[0] * q3[0][i] + row[1] * q3[1][i] + row[2] * q3[2][i];
                    }
                    qr
                };
                let qe = apply(r_e);
                let qn = apply(r_n);
                let qu = apply(r_u);
                let q_ee = qe[0] * r_e[0] + qe[1] * r_e[1] + qe[2] * r_e[2];
                let q_nn = qn[0] * r_n[0] + qn[1] * r_n[1] + qn[2] * r_n[2];
                let q_uu = qu[0] * r_u[0] + qu[1] * r_u[1] + qu[2] * r_u[2];

                Dops {
                    gdop: (q[0][0] + q[1][1] + q[2][2] + q[3][3]).max(0.0).sqrt(),
                    pdop: (q[0][0] + q[1][1] + q[2][2]).max(0.0).sqrt(),
                    hdop: (q_ee + q_nn).max(0.0).sqrt(),
                    vdop: q_uu.max(0.0).sqrt(),
                    tdop: q[3][3].max(0.0).sqrt(),
                }
            })
            .unwrap_or_default();

        log::info!(
            "{}",
            format!(
                "fix: x={:.1} y={:.1} z={:.1} b={:.3}m svs={} iters={} cond={:.1e}",
                state[0],
                state[1],
                state[2],
                state[3],
                measurements.len(),
                iterations,
                last_condition
            )
            .green()
        );

        Ok(PvtSolution {
            ecef_x_m: state[0],
            ecef_y_m: state[1],
            ecef_z_m: state[2],
            clock_bias_m: state[3],
            dops,
            num_svs: measurements.len(),
            iterations,
            t_rx_sample_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_ephemeris(sv_id: u8) -> Ephemeris {
        // A roughly-circular 26560 km semi-major-axis orbit; exact orbital
        // parameters don't matter for the solver test, only that
        // `compute_sv_position_ecef` is deterministic and evaluable.
        Ephemeris {
            sv_id,
            a: 26_560_000.0,
            ecc: 0.001,
            deln: 0.0,
            m0: sv_id as f64 * 0.3,
            omg: 0.1,
            omg0: sv_id as f64 * 0.2,
            omg_dot: 0.0,
            cus: 0.0,
            cuc: 0.0,
            crs: 0.0,
            crc: 0.0,
            cis: 0.0,
            cic: 0.0,
            i0: 0.9,
            i_dot: 0.0,
            toe: 100_000,
            toc: 100_000,
            week: 2200,
            f0: 0.0,
            f1: 0.0,
            f2: 0.0,
            tgd: 0.0,
            ..Default::default()
        }
    }

    /// Four SVs at known ECEF positions, true user at (0,0,0) plus a known
    /// clock bias, noise-free: the solver should recover the bias to within
    /// the spec's `1e-3 m` tolerance in <= 8 iterations.
    #[test]
    fn recovers_known_clock_bias_noise_free() {
        let svs: Vec<u8> = vec![1, 2, 3, 4];
        let ephs: Vec<Ephemeris> = svs.iter().map(|&s| synthetic_ephemeris(s)).collect();
        let t_tx_sec = 100_000.0 - 0.075;

        let true_user = [1_000.0, 2_000.0, -500.0];
        let b_true = 123_456.0;

        let measurements: Vec<Measurement> = ephs
            .iter()
            .map(|eph| {
                let sv_pos = compute_sv_position_ecef(eph, t_tx_sec);
                let r = range3(sv_pos, true_user);
                Measurement {
                    sv_id: eph.sv_id,
                    pseudorange_m: r + b_true,
                    t_tx_sec,
                }
            })
            .collect();

        let solver = PositionSolver::new();
        let solution = solver.solve(&measurements, &ephs, 0).expect("should solve");

        assert!(solution.iterations <= 8, "iterations={}", solution.iterations);
        assert!(
            (solution.clock_bias_m - b_true).abs() < 1e-3,
            "b_hat={} b_true={}",
            solution.clock_bias_m,
            b_true
        );
        assert!((solution.ecef_x_m - true_user[0]).abs() < 1e-2);
        assert!((solution.ecef_y_m - true_user[1]).abs() < 1e-2);
        assert!((solution.ecef_z_m - true_user[2]).abs() < 1e-2);
    }

    /// `synthetic_ephemeris`'s four SVs differ only in mean anomaly along a
    /// shared orbital plane, which is fine for a noise-free exactness check
    /// but gives a near-singular, poorly-spread geometry (HDOP in the tens).
    /// The noisy-recovery test below needs a realistic sky geometry for its
    /// `3*sigma*sqrt(HDOP)` bound to mean anything, so it spreads RAAN and
    /// inclination across the four SVs as well.
    fn spread_sky_ephemeris(sv_id: u8, m0: f64, omg0: f64, i0: f64) -> Ephemeris {
        Ephemeris {
            m0,
            omg0,
            i0,
            ..synthetic_ephemeris(sv_id)
        }
    }

    /// Minimal PRNG used only to manufacture repeatable Gaussian pseudorange
    /// noise for the test below; not used anywhere outside `#[cfg(test)]`.
    struct SplitMix64(u64);

    impl SplitMix64 {
        fn next_u64(&mut self) -> u64 {
            self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = self.0;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        }

        fn next_unit(&mut self) -> f64 {
            (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    /// Box-Muller transform, mean 0 and standard deviation `sigma_m`.
    fn gaussian_noise_m(rng: &mut SplitMix64, sigma_m: f64) -> f64 {
        let u1 = rng.next_unit().max(1e-12);
        let u2 = rng.next_unit();
        sigma_m * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Four SVs spread across the sky, pseudoranges perturbed by zero-mean
    /// Gaussian noise with `sigma_m = 10`: the solved position should land
    /// within `3*sigma*sqrt(HDOP)` of truth and the clock bias within `3*sigma`.
    #[test]
    fn recovers_under_gaussian_pseudorange_noise() {
        let ephs = vec![
            spread_sky_ephemeris(1, 0.3, 0.2, 0.9),
            spread_sky_ephemeris(2, 1.9, 1.7, 1.3),
            spread_sky_ephemeris(3, 3.4, 3.0, 0.6),
            spread_sky_ephemeris(4, 5.0, 4.6, 1.1),
        ];
        let t_tx_sec = 100_000.0 - 0.075;
        let true_user = [1_000.0, 2_000.0, -500.0];
        let b_true = 123_456.0;
        let sigma_m = 10.0;

        let mut rng = SplitMix64(1);
        let measurements: Vec<Measurement> = ephs
            .iter()
            .map(|eph| {
                let sv_pos = compute_sv_position_ecef(eph, t_tx_sec);
                let r = range3(sv_pos, true_user);
                let noise = gaussian_noise_m(&mut rng, sigma_m);
                Measurement {
                    sv_id: eph.sv_id,
                    pseudorange_m: r + b_true + noise,
                    t_tx_sec,
                }
            })
            .collect();

        let solver = PositionSolver::new();
        let solution = solver.solve(&measurements, &ephs, 0).expect("should solve");

        let pos_err_m = range3(
            [solution.ecef_x_m, solution.ecef_y_m, solution.ecef_z_m],
            true_user,
        );
        let pos_bound_m = 3.0 * sigma_m * solution.dops.hdop.sqrt();
        assert!(
            pos_err_m < pos_bound_m,
            "pos_err={pos_err_m} bound={pos_bound_m} hdop={}",
            solution.dops.hdop
        );

        let clock_err_m = (solution.clock_bias_m - b_true).abs();
        assert!(
            clock_err_m < 3.0 * sigma_m,
            "clock_err={clock_err_m} bound={}",
            3.0 * sigma_m
        );
    }

    #[test]
    fn fewer_than_four_svs_is_geometry_singular() {
        let svs: Vec<u8> = vec![1, 2, 3];
        let ephs: Vec<Ephemeris> = svs.iter().map(|&s| synthetic_ephemeris(s)).collect();
        let measurements: Vec<Measurement> = svs
            .iter()
            .map(|&sv_id| Measurement {
                sv_id,
                pseudorange_m: 20_000_000.0,
                t_tx_sec: 100_000.0,
            })
            .collect();

        let solver = PositionSolver::new();
        let err = solver.solve(&measurements, &ephs, 0).unwrap_err();
        assert!(matches!(err, ReceiverError::GeometrySingular));
    }

    #[test]
    fn eccentric_anomaly_converges_for_near_circular_orbit() {
        let eph = synthetic_ephemeris(5);
        let e = get_eccentric_anomaly(&eph, 1_000.0);
        assert!(e.is_finite());
    }
}
