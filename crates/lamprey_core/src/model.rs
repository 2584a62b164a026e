//! The lamprey life-cycle vector field.
//!
//! Seven compartments are coupled through two logistic saturation factors
//! (one per habitat), a density-dependent adult death rate and a breeding
//! term that is switched on only during the low sub-period of each cycle.
//!
//! With `AL = F + M`, `sat_up = 1 - (C + Fast + Slow) / K_upstream`,
//! `sat_down = 1 - (F + M + O) / K_downstream` and
//! `breed = gamma * min(M, F) * phase(t)`:
//!
//! ```text
//! dC    = sat_up   * (p_E_to_C * E - (1 - p_C_to_C) * C)
//! dFast = sat_up   * (p_C_to_Fast * C - (1 - p_Fast_to_Fast) * Fast)
//! dSlow = sat_up   * (p_C_to_Slow * C - (1 - p_Slow_to_Slow) * Slow)
//! dF    = sat_down * (p_Fast_to_F * Fast - p_F_to_D * AL / (beta * O + AL) * F - breed)
//! dM    = sat_down * (p_Slow_to_M * Slow - p_M_to_D * AL / (beta * O + AL) * M - breed)
//! dO    = sat_down * (r_O * O - alpha * O * AL)
//! dE    = -(1 - p_E_to_E) * E + mu * breed
//! ```
//!
//! The saturation factors are not clamped: above capacity they turn
//! negative and invert the sign of the compartment derivatives.

use crate::config::Parameters;
use crate::error::EvaluationError;
use crate::state::{Compartment, State, STATE_DIM};
use crate::traits::DynamicalSystem;

/// Breeding indicator: 0 during the high sub-period `[k·P, k·P + T_HP)`,
/// 1 during the low sub-period, where `P = T_HP + T_MP`.
pub fn phase(t: f64, params: &Parameters) -> f64 {
    let r = t.rem_euclid(params.cycle_length());
    if r < params.t_hp {
        0.0
    } else {
        1.0
    }
}

/// `num / den`, defined as 0 when the denominator is exactly zero.
pub fn guarded_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Evaluates the vector field at `(t, y)`.
pub fn derivative(t: f64, y: &State, params: &Parameters) -> State {
    let mut out = State::zeros();
    evaluate(t, &y.0, params, &mut out.0);
    out
}

/// Same as [`derivative`], but reports a non-finite component as an error.
pub fn try_derivative(t: f64, y: &State, params: &Parameters) -> Result<State, EvaluationError> {
    let dy = derivative(t, y, params);
    match dy.first_non_finite() {
        Some(compartment) => Err(EvaluationError::NonFinite { compartment, t }),
        None => Ok(dy),
    }
}

fn evaluate(t: f64, y: &[f64], p: &Parameters, out: &mut [f64]) {
    let c = y[Compartment::C.index()];
    let fast = y[Compartment::Fast.index()];
    let slow = y[Compartment::Slow.index()];
    let f = y[Compartment::F.index()];
    let m = y[Compartment::M.index()];
    let o = y[Compartment::O.index()];
    let e = y[Compartment::E.index()];

    let phase = phase(t, p);
    let al = f + m;

    let sat_up = 1.0 - (c + fast + slow) / p.k_upstream;
    let sat_down = 1.0 - (al + o) / p.k_downstream;

    let breed = p.gamma * m.min(f) * phase;

    let competition = p.beta * o + al;
    let death_f = guarded_ratio(p.p_f_to_d * al, competition);
    let death_m = guarded_ratio(p.p_m_to_d * al, competition);

    out[Compartment::C.index()] = sat_up * (p.p_e_to_c * e - (1.0 - p.p_c_to_c) * c);
    out[Compartment::Fast.index()] =
        sat_up * (p.p_c_to_fast * c - (1.0 - p.p_fast_to_fast) * fast);
    out[Compartment::Slow.index()] =
        sat_up * (p.p_c_to_slow * c - (1.0 - p.p_slow_to_slow) * slow);
    out[Compartment::F.index()] = sat_down * (p.p_fast_to_f * fast - death_f * f - breed);
    out[Compartment::M.index()] = sat_down * (p.p_slow_to_m * slow - death_m * m - breed);
    out[Compartment::O.index()] = sat_down * (p.r_o * o - p.alpha * o * al);
    out[Compartment::E.index()] = -(1.0 - p.p_e_to_e) * e + p.mu * breed;
}

/// The lamprey model bound to one parameter set.
#[derive(Debug, Clone, Copy)]
pub struct LampreyModel<'a> {
    params: &'a Parameters,
}

impl<'a> LampreyModel<'a> {
    pub fn new(params: &'a Parameters) -> Self {
        Self { params }
    }
}

impl DynamicalSystem for LampreyModel<'_> {
    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        evaluate(t, x, self.params, out);
    }
}
