//! Seams between vector fields and the solvers that advance them.

/// An autonomous or time-dependent vector field `dy/dt = f(t, y)`.
pub trait DynamicalSystem {
    /// Length of the state vectors accepted by [`apply`](Self::apply).
    fn dimension(&self) -> usize;

    /// Writes `f(t, y)` into `dydt`. Both slices have length `dimension()`.
    fn apply(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

impl<S: DynamicalSystem + ?Sized> DynamicalSystem for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        (**self).apply(t, y, dydt)
    }
}

/// Fixed-step solvers. `t` and `state` are advanced in place by `h`.
pub trait Steppable {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], h: f64);
}
