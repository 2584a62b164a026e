use crate::error::FailureReason;
use crate::integrator::{IntegrationStats, SolverOptions};
use crate::traits::{DynamicalSystem, Steppable};
use tracing::trace;

/// Classical fourth-order Runge-Kutta with a fixed step, used to cross-check
/// the adaptive solver.
pub struct Rk4 {
    stages: [Vec<f64>; 4],
    scratch: Vec<f64>,
}

impl Rk4 {
    pub fn new(dim: usize) -> Self {
        Self {
            stages: std::array::from_fn(|_| vec![0.0; dim]),
            scratch: vec![0.0; dim],
        }
    }
}

/// `out = y + h * k`
fn offset(out: &mut [f64], y: &[f64], h: f64, k: &[f64]) {
    for ((o, yi), ki) in out.iter_mut().zip(y).zip(k) {
        *o = yi + h * ki;
    }
}

impl Steppable for Rk4 {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], h: f64) {
        let t0 = *t;
        let half = 0.5 * h;
        let [k1, k2, k3, k4] = &mut self.stages;

        system.apply(t0, state, k1);
        offset(&mut self.scratch, state, half, k1);
        system.apply(t0 + half, &self.scratch, k2);
        offset(&mut self.scratch, state, half, k2);
        system.apply(t0 + half, &self.scratch, k3);
        offset(&mut self.scratch, state, h, k3);
        system.apply(t0 + h, &self.scratch, k4);

        for (i, y) in state.iter_mut().enumerate() {
            *y += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
        *t = t0 + h;
    }
}

// Dormand-Prince 5(4) tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights; the advancing solution.
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th- and embedded 4th-order weights.
const E1: f64 = -71.0 / 57600.0;
const E3: f64 = 71.0 / 16695.0;
const E4: f64 = -71.0 / 1920.0;
const E5: f64 = 17253.0 / 339200.0;
const E6: f64 = -22.0 / 525.0;
const E7: f64 = 1.0 / 40.0;

// Continuous extension (Hairer, Norsett & Wanner).
const D1: f64 = -12715105075.0 / 11282082432.0;
const D3: f64 = 87487479700.0 / 32700410799.0;
const D4: f64 = -10690763975.0 / 1880347072.0;
const D5: f64 = 701980252875.0 / 199316789632.0;
const D6: f64 = -1453857185.0 / 822651844.0;
const D7: f64 = 69997945.0 / 29380423.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// Adaptive Dormand-Prince 5(4) stepper with dense output.
///
/// The stepper owns the current point `(t, y)` and the derivative there
/// (first-same-as-last). Each call to [`Dopri5::step`] performs exactly one
/// accepted step, retrying with smaller step sizes as needed, and leaves the
/// interpolant for `[t_old, t]` ready for [`Dopri5::dense_output`].
pub struct Dopri5 {
    t: f64,
    t_old: f64,
    t_bound: f64,
    h_abs: f64,
    h_last: f64,
    rtol: f64,
    atol: f64,
    max_step: f64,
    max_steps: Option<usize>,
    y: Vec<f64>,
    y_old: Vec<f64>,
    y_new: Vec<f64>,
    y_tmp: Vec<f64>,
    k: [Vec<f64>; 7],
    rcont: [Vec<f64>; 4],
    stats: IntegrationStats,
}

impl Dopri5 {
    /// Prepares integration from `(t0, y0)` towards `t_bound`.
    ///
    /// Fails if the derivative at the initial point is not finite.
    pub fn new(
        system: &impl DynamicalSystem,
        t0: f64,
        y0: &[f64],
        t_bound: f64,
        opts: &SolverOptions,
    ) -> Result<Self, FailureReason> {
        let dim = y0.len();
        let mut stepper = Self {
            t: t0,
            t_old: t0,
            t_bound,
            h_abs: 0.0,
            h_last: 0.0,
            rtol: opts.rtol,
            atol: opts.atol,
            max_step: opts.max_step.unwrap_or(f64::INFINITY),
            max_steps: opts.max_steps,
            y: y0.to_vec(),
            y_old: y0.to_vec(),
            y_new: vec![0.0; dim],
            y_tmp: vec![0.0; dim],
            k: std::array::from_fn(|_| vec![0.0; dim]),
            rcont: std::array::from_fn(|_| vec![0.0; dim]),
            stats: IntegrationStats::default(),
        };

        system.apply(t0, &stepper.y, &mut stepper.k[0]);
        stepper.stats.rhs_evaluations += 1;
        if let Some(index) = first_non_finite(&stepper.k[0]) {
            return Err(FailureReason::NonFiniteDerivative { index });
        }

        stepper.h_abs = match opts.first_step {
            Some(h) => h,
            None => stepper.select_initial_step(system),
        }
        .min(stepper.max_step);
        Ok(stepper)
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn state(&self) -> &[f64] {
        &self.y
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stats
    }

    /// Starting step size estimate (Hairer, Norsett & Wanner, II.4).
    fn select_initial_step(&mut self, system: &impl DynamicalSystem) -> f64 {
        let interval = (self.t_bound - self.t).abs();
        if self.y.is_empty() || interval == 0.0 {
            return interval;
        }
        let n = self.y.len() as f64;
        let mut d0 = 0.0;
        let mut d1 = 0.0;
        for i in 0..self.y.len() {
            let scale = self.atol + self.y[i].abs() * self.rtol;
            d0 += (self.y[i] / scale).powi(2);
            d1 += (self.k[0][i] / scale).powi(2);
        }
        let d0 = (d0 / n).sqrt();
        let d1 = (d1 / n).sqrt();

        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(interval);

        for i in 0..self.y.len() {
            self.y_tmp[i] = self.y[i] + h0 * self.k[0][i];
        }
        system.apply(self.t + h0, &self.y_tmp, &mut self.k[1]);
        self.stats.rhs_evaluations += 1;

        let mut d2 = 0.0;
        for i in 0..self.y.len() {
            let scale = self.atol + self.y[i].abs() * self.rtol;
            d2 += ((self.k[1][i] - self.k[0][i]) / scale).powi(2);
        }
        let d2 = (d2 / n).sqrt() / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };
        if !h1.is_finite() {
            return h0;
        }
        (100.0 * h0).min(h1).min(interval)
    }

    /// Advances by one accepted step, never past `t_bound`.
    pub fn step(&mut self, system: &impl DynamicalSystem) -> Result<(), FailureReason> {
        if let Some(max_steps) = self.max_steps {
            if self.stats.accepted_steps >= max_steps {
                return Err(FailureReason::TooManySteps { max_steps });
            }
        }

        let min_step = min_step_at(self.t);
        if self.h_abs > self.max_step {
            self.h_abs = self.max_step;
        } else if self.h_abs < min_step {
            self.h_abs = min_step;
        }

        let mut step_rejected = false;
        loop {
            if self.h_abs < min_step {
                return Err(FailureReason::StepSizeUnderflow { h: self.h_abs });
            }

            let mut h = self.h_abs;
            let mut t_new = self.t + h;
            if t_new > self.t_bound {
                t_new = self.t_bound;
                h = t_new - self.t;
            }

            let error_norm = self.attempt(system, h);
            if error_norm < 1.0 {
                let mut factor = if error_norm == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * error_norm.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
                };
                if step_rejected {
                    factor = factor.min(1.0);
                }
                self.accept(t_new, h);
                self.h_abs = h * factor;
                return Ok(());
            }

            trace!(t = self.t, h, error_norm, "step rejected");
            self.stats.rejected_steps += 1;
            self.h_abs = h * (SAFETY * error_norm.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
            step_rejected = true;
        }
    }

    /// Computes the stages for a step of size `h` and returns the scaled
    /// error norm. Non-finite stages count as an infinite error.
    fn attempt(&mut self, system: &impl DynamicalSystem, h: f64) -> f64 {
        let t = self.t;
        let [k1, k2, k3, k4, k5, k6, k7] = &mut self.k;
        let y = &self.y;
        let tmp = &mut self.y_tmp;
        let n = y.len();

        for i in 0..n {
            tmp[i] = y[i] + h * A21 * k1[i];
        }
        system.apply(t + C2 * h, tmp, k2);

        for i in 0..n {
            tmp[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        system.apply(t + C3 * h, tmp, k3);

        for i in 0..n {
            tmp[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        system.apply(t + C4 * h, tmp, k4);

        for i in 0..n {
            tmp[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        system.apply(t + C5 * h, tmp, k5);

        for i in 0..n {
            tmp[i] =
                y[i] + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        system.apply(t + h, tmp, k6);

        for i in 0..n {
            self.y_new[i] =
                y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
        }
        system.apply(t + h, &self.y_new, k7);
        self.stats.rhs_evaluations += 6;

        let mut sum = 0.0;
        for i in 0..n {
            let err =
                h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = self.atol + y[i].abs().max(self.y_new[i].abs()) * self.rtol;
            sum += (err / scale).powi(2);
        }
        let norm = (sum / n as f64).sqrt();
        if norm.is_finite() {
            norm
        } else {
            f64::INFINITY
        }
    }

    fn accept(&mut self, t_new: f64, h: f64) {
        let n = self.y.len();
        let [r2, r3, r4, r5] = &mut self.rcont;
        let k = &self.k;
        for i in 0..n {
            let diff = self.y_new[i] - self.y[i];
            let bspl = h * k[0][i] - diff;
            r2[i] = diff;
            r3[i] = bspl;
            r4[i] = diff - h * k[6][i] - bspl;
            r5[i] = h
                * (D1 * k[0][i]
                    + D3 * k[2][i]
                    + D4 * k[3][i]
                    + D5 * k[4][i]
                    + D6 * k[5][i]
                    + D7 * k[6][i]);
        }

        std::mem::swap(&mut self.y_old, &mut self.y);
        self.y.copy_from_slice(&self.y_new);
        let [k1, .., k7] = &mut self.k;
        std::mem::swap(k1, k7);

        self.t_old = self.t;
        self.t = t_new;
        self.h_last = h;
        self.stats.accepted_steps += 1;
    }

    /// Interpolates the solution at `t` inside the last accepted step.
    pub fn dense_output(&self, t: f64, out: &mut [f64]) {
        if t == self.t {
            out.copy_from_slice(&self.y);
            return;
        }
        let theta = (t - self.t_old) / self.h_last;
        let theta1 = 1.0 - theta;
        let [r2, r3, r4, r5] = &self.rcont;
        for i in 0..out.len() {
            out[i] = self.y_old[i]
                + theta * (r2[i] + theta1 * (r3[i] + theta * (r4[i] + theta1 * r5[i])));
        }
    }
}

/// Smallest usable step at time `t`: ten ulps of `t`, and never zero.
fn min_step_at(t: f64) -> f64 {
    (10.0 * f64::EPSILON * t.abs()).max(f64::MIN_POSITIVE)
}

fn first_non_finite(values: &[f64]) -> Option<usize> {
    values.iter().position(|v| !v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    /// x'' = -x written as a first-order system.
    struct Oscillator;

    impl DynamicalSystem for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    struct Blowup;

    impl DynamicalSystem for Blowup {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] * x[0];
        }
    }

    fn tight() -> SolverOptions {
        SolverOptions {
            rtol: 1e-10,
            atol: 1e-12,
            ..SolverOptions::default()
        }
    }

    #[test]
    fn min_step_scales_with_time_and_stays_positive() {
        assert_eq!(min_step_at(0.0), f64::MIN_POSITIVE);
        assert_eq!(min_step_at(1.0), 10.0 * f64::EPSILON);
        assert_eq!(min_step_at(-4.0), 40.0 * f64::EPSILON);
    }

    #[test]
    fn steps_far_below_epsilon_are_allowed_near_zero() {
        let system = Decay { rate: 1.0 };
        let opts = SolverOptions {
            first_step: Some(1e-300),
            ..SolverOptions::default()
        };
        let mut stepper = Dopri5::new(&system, 0.0, &[1.0], 1.0, &opts).unwrap();
        stepper.step(&system).expect("tiny first step is usable at t = 0");
        assert_eq!(stepper.t(), 1e-300);
    }

    #[test]
    fn rk4_tracks_exponential_decay() {
        let system = Decay { rate: 0.5 };
        let mut solver = Rk4::new(1);
        let mut t = 0.0;
        let mut state = vec![1.0];
        for _ in 0..100 {
            solver.step(&system, &mut t, &mut state, 0.02);
        }
        assert!((t - 2.0).abs() < 1e-12);
        assert!((state[0] - (-1.0_f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn dopri5_reaches_bound_exactly() {
        let system = Decay { rate: 1.0 };
        let mut stepper = Dopri5::new(&system, 0.0, &[1.0], 3.0, &tight()).unwrap();
        while stepper.t() < 3.0 {
            stepper.step(&system).expect("decay should integrate");
        }
        assert_eq!(stepper.t(), 3.0);
        assert!((stepper.state()[0] - (-3.0_f64).exp()).abs() < 1e-9);
        let stats = stepper.stats();
        assert!(stats.accepted_steps > 1);
        assert!(stats.rhs_evaluations >= 2 + 6 * stats.accepted_steps);
    }

    #[test]
    fn dense_output_interpolates_within_step() {
        let system = Oscillator;
        let opts = SolverOptions {
            rtol: 1e-8,
            atol: 1e-10,
            ..SolverOptions::default()
        };
        let mut stepper = Dopri5::new(&system, 0.0, &[0.0, 1.0], 10.0, &opts).unwrap();
        stepper.step(&system).unwrap();
        stepper.step(&system).unwrap();
        let (t_old, t_new) = (stepper.t_old, stepper.t());
        assert!(t_new > t_old);

        let mut out = [0.0; 2];
        for frac in [0.1, 0.37, 0.5, 0.9] {
            let t = t_old + frac * (t_new - t_old);
            stepper.dense_output(t, &mut out);
            assert!((out[0] - t.sin()).abs() < 1e-6, "sin mismatch at {t}");
            assert!((out[1] - t.cos()).abs() < 1e-6, "cos mismatch at {t}");
        }

        stepper.dense_output(t_new, &mut out);
        assert_eq!(out, [stepper.state()[0], stepper.state()[1]]);
    }

    #[test]
    fn dopri5_reports_non_finite_initial_derivative() {
        let system = Decay { rate: f64::NAN };
        let err = Dopri5::new(&system, 0.0, &[1.0], 1.0, &SolverOptions::default())
            .err()
            .expect("NaN rate must fail");
        assert!(matches!(err, FailureReason::NonFiniteDerivative { .. }));
    }

    #[test]
    fn dopri5_fails_with_underflow_on_finite_time_blowup() {
        // x' = x^2, x(0) = 1 explodes at t = 1.
        let system = Blowup;
        let mut stepper = Dopri5::new(&system, 0.0, &[1.0], 2.0, &SolverOptions::default())
            .expect("initial derivative is finite");
        let err = loop {
            match stepper.step(&system) {
                Ok(()) if stepper.t() < 2.0 => continue,
                Ok(()) => panic!("integration should not pass the singularity"),
                Err(err) => break err,
            }
        };
        assert!(
            matches!(err, FailureReason::StepSizeUnderflow { .. }),
            "unexpected failure {err:?}"
        );
        assert!(stepper.t() < 1.0);
        assert!(stepper.t() > 0.9);
    }

    #[test]
    fn dopri5_honours_max_steps() {
        let system = Decay { rate: 1.0 };
        let opts = SolverOptions {
            first_step: Some(0.1),
            max_step: Some(0.1),
            max_steps: Some(5),
            ..SolverOptions::default()
        };
        let mut stepper = Dopri5::new(&system, 0.0, &[1.0], 10.0, &opts).unwrap();
        for _ in 0..5 {
            stepper.step(&system).unwrap();
        }
        assert_eq!(
            stepper.step(&system),
            Err(FailureReason::TooManySteps { max_steps: 5 })
        );
        assert!((stepper.t() - 0.5).abs() < 1e-12);
    }
}
