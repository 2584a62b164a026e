//! Compartment labels and the fixed-size state vector of the lamprey model.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of state variables in the model.
pub const STATE_DIM: usize = 7;

/// One life-stage or habitat subdivision of the population.
///
/// The discriminant is the position of the compartment inside a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    /// Sex-undetermined juveniles in the stable upstream compartment.
    C = 0,
    /// Juveniles in the favorable-growth upstream compartment.
    Fast = 1,
    /// Juveniles in the unfavorable-growth upstream compartment.
    Slow = 2,
    /// Adult females, downstream.
    F = 3,
    /// Adult males, downstream.
    M = 4,
    /// Other species sharing the downstream capacity.
    O = 5,
    /// Eggs.
    E = 6,
}

impl Compartment {
    pub const ALL: [Compartment; STATE_DIM] = [
        Compartment::C,
        Compartment::Fast,
        Compartment::Slow,
        Compartment::F,
        Compartment::M,
        Compartment::O,
        Compartment::E,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Compartment::C => "C",
            Compartment::Fast => "Fast",
            Compartment::Slow => "Slow",
            Compartment::F => "F",
            Compartment::M => "M",
            Compartment::O => "O",
            Compartment::E => "E",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Population densities in the fixed order `C, Fast, Slow, F, M, O, E`.
///
/// Values are not clamped; transient negatives are part of the model's
/// behaviour under extreme parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct State(pub [f64; STATE_DIM]);

impl State {
    pub const fn new(values: [f64; STATE_DIM]) -> Self {
        Self(values)
    }

    pub fn zeros() -> Self {
        Self([0.0; STATE_DIM])
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, ConfigError> {
        let array: [f64; STATE_DIM] = values.try_into().map_err(|_| ConfigError::StateLength {
            expected: STATE_DIM,
            found: values.len(),
        })?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    /// Returns the first compartment holding a non-finite value.
    pub fn first_non_finite(&self) -> Option<Compartment> {
        Compartment::ALL
            .into_iter()
            .find(|c| !self[*c].is_finite())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Compartment, f64)> + '_ {
        Compartment::ALL.into_iter().map(move |c| (c, self[c]))
    }
}

impl Index<Compartment> for State {
    type Output = f64;

    fn index(&self, compartment: Compartment) -> &f64 {
        &self.0[compartment.index()]
    }
}

impl IndexMut<Compartment> for State {
    fn index_mut(&mut self, compartment: Compartment) -> &mut f64 {
        &mut self.0[compartment.index()]
    }
}

impl Index<usize> for State {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl From<[f64; STATE_DIM]> for State {
    fn from(values: [f64; STATE_DIM]) -> Self {
        Self(values)
    }
}

impl TryFrom<Vec<f64>> for State {
    type Error = ConfigError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl From<State> for Vec<f64> {
    fn from(state: State) -> Self {
        state.0.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compartments_follow_fixed_order() {
        let labels: Vec<&str> = Compartment::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels, ["C", "Fast", "Slow", "F", "M", "O", "E"]);
        for (idx, compartment) in Compartment::ALL.iter().enumerate() {
            assert_eq!(compartment.index(), idx);
            assert_eq!(Compartment::from_index(idx), Some(*compartment));
        }
        assert_eq!(Compartment::from_index(STATE_DIM), None);
    }

    #[test]
    fn from_slice_reports_wrong_length() {
        let err = State::from_slice(&[1.0, 2.0, 3.0]).expect_err("length 3 must be rejected");
        assert_eq!(
            err,
            ConfigError::StateLength {
                expected: 7,
                found: 3
            }
        );
        assert!(err.to_string().contains("expected 7"));
    }

    #[test]
    fn state_deserializes_from_array_and_rejects_bad_length() {
        let state: State = serde_json::from_str("[10, 10, 10, 10, 10, 4000, 1000]")
            .expect("seven values should parse");
        assert_eq!(state[Compartment::O], 4000.0);
        assert_eq!(state[Compartment::E], 1000.0);

        let err = serde_json::from_str::<State>("[1, 2, 3, 4, 5, 6, 7, 8]")
            .expect_err("eight values must be rejected");
        assert!(err.to_string().contains("found 8"), "got {err}");
    }

    #[test]
    fn first_non_finite_finds_offending_compartment() {
        let mut state = State::zeros();
        assert_eq!(state.first_non_finite(), None);
        state[Compartment::M] = f64::NAN;
        state[Compartment::E] = f64::INFINITY;
        assert_eq!(state.first_non_finite(), Some(Compartment::M));
    }
}
