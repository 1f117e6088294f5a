use std::time::Duration;

use crate::model::Model;
use crate::solution::Solution;

/// Options passed to a [`SolverGateway`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct SolveOptions {
    /// Stop waiting for the solver after this long
    #[cfg_attr(feature = "serde", serde(rename = "timeLimitSeconds", with = "seconds"))]
    pub time_limit: Option<Duration>,
    /// Hint only
    pub parallel: bool,
    /// Hint only
    pub presolve: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            parallel: false,
            presolve: true,
        }
    }
}

impl SolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_presolve(mut self, presolve: bool) -> Self {
        self.presolve = presolve;
        self
    }
}

/// The narrow interface the formulation layer needs from a solver.
///
/// Implementations must not panic: a model without a feasible point is
/// reported as [`SolutionStatus::Infeasible`](crate::SolutionStatus) with no
/// values, and internal failures as `Error`.
pub trait SolverGateway {
    fn solve(&self, model: &Model, options: &SolveOptions) -> Solution;
}

#[cfg(feature = "serde")]
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!("invalid time limit {}", s))),
            None => Ok(None),
        }
    }
}
