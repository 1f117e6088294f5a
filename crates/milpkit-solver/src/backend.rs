use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

use good_lp::solvers::microlp::microlp;
use good_lp::{Expression, ProblemVariables, ResolutionError, Solution as _, SolverModel, variable};
use log::{debug, info, warn};

use crate::gateway::{SolveOptions, SolverGateway};
use crate::model::{Model, ModelId, Relation, Sense};
use crate::solution::Solution;

/// [`SolverGateway`] backed by the pure-Rust `microlp` solver through `good_lp`.
///
/// The model is lowered to owned rows and solved on a worker thread so that
/// `time_limit` bounds how long the caller waits. microlp reports no
/// incumbent before it finishes, so a solve that outlives its limit returns
/// [`SolutionStatus::TimeLimitReached`](crate::SolutionStatus) without values
/// and the worker is left to finish in the background.
#[derive(Debug, Clone, Default)]
pub struct MicroLp;

impl MicroLp {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy)]
struct Column {
    integral: bool,
    lower: f64,
    upper: Option<f64>,
}

#[derive(Debug, Clone)]
struct Row {
    relation: Relation,
    terms: Vec<(f64, usize)>,
    rhs: f64,
}

/// A model stripped down to what the backend needs, owned so it can move
/// onto the worker thread
#[derive(Debug, Clone)]
struct Lowered {
    columns: Vec<Column>,
    sense: Sense,
    objective: Vec<(f64, usize)>,
    rows: Vec<Row>,
}

enum Outcome {
    Optimal(Vec<f64>),
    Infeasible,
    Unbounded,
    Failed(String),
}

impl Lowered {
    fn from_model(model: &Model) -> Option<Self> {
        let objective = model.objective()?;
        let columns = model
            .variables()
            .iter()
            .map(|v| Column {
                integral: v.domain.is_integral(),
                lower: v.lower(),
                upper: v.upper(),
            })
            .collect();
        let rows = model
            .constraints()
            .iter()
            .map(|c| Row {
                relation: c.relation,
                terms: c.terms.iter().map(|(coef, var)| (*coef, var.index())).collect(),
                rhs: c.rhs,
            })
            .collect();
        Some(Self {
            columns,
            sense: objective.sense,
            objective: objective.terms.iter().map(|(coef, var)| (*coef, var.index())).collect(),
            rows,
        })
    }

    fn solve(self) -> Outcome {
        let mut vars = ProblemVariables::new();
        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|column| {
                let mut definition = variable().min(column.lower);
                if column.integral {
                    definition = definition.integer();
                }
                if let Some(upper) = column.upper {
                    definition = definition.max(upper);
                }
                vars.add(definition)
            })
            .collect();

        let mut objective = Expression::with_capacity(self.objective.len());
        for (coef, j) in &self.objective {
            objective.add_mul(*coef, columns[*j]);
        }
        let mut problem = match self.sense {
            Sense::Minimize => vars.minimise(objective),
            Sense::Maximize => vars.maximise(objective),
        }
        .using(microlp);

        for row in self.rows {
            let mut lhs = Expression::with_capacity(row.terms.len());
            for (coef, j) in &row.terms {
                lhs.add_mul(*coef, columns[*j]);
            }
            let constraint = match row.relation {
                Relation::Le => lhs.leq(row.rhs),
                Relation::Ge => lhs.geq(row.rhs),
                Relation::Eq => lhs.eq(row.rhs),
            };
            problem = problem.with(constraint);
        }

        match problem.solve() {
            Ok(solution) => {
                let values = columns
                    .iter()
                    .zip(&self.columns)
                    .map(|(var, column)| {
                        let value = solution.value(*var);
                        if column.integral { value.round() } else { value }
                    })
                    .collect();
                Outcome::Optimal(values)
            }
            Err(ResolutionError::Infeasible) => Outcome::Infeasible,
            Err(ResolutionError::Unbounded) => Outcome::Unbounded,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

fn into_solution(model: &Model, outcome: Outcome) -> Solution {
    match outcome {
        Outcome::Optimal(values) => {
            let objective = model.objective().map(|o| o.evaluate(&values)).unwrap_or(0.0);
            Solution::optimal(model.id(), values, objective)
        }
        Outcome::Infeasible => Solution::infeasible(model.id()),
        Outcome::Unbounded => Solution::unbounded(model.id()),
        Outcome::Failed(message) => Solution::error(model.id(), message),
    }
}

fn timed_out(id: ModelId, name: &str) -> Solution {
    warn!("model '{}' stopped on the time limit without an incumbent", name);
    Solution::time_limit_reached(id, None)
}

impl SolverGateway for MicroLp {
    fn solve(&self, model: &Model, options: &SolveOptions) -> Solution {
        let started = Instant::now();
        if options.parallel {
            debug!("parallel hint ignored: microlp runs single-threaded");
        }
        if !options.presolve {
            debug!("presolve hint ignored: microlp always solves the full model");
        }

        let Some(lowered) = Lowered::from_model(model) else {
            return Solution::error(model.id(), "model has no objective");
        };
        debug!(
            "handing {} columns and {} rows to microlp",
            lowered.columns.len(),
            lowered.rows.len()
        );
        if options.time_limit.is_some_and(|limit| limit.is_zero()) {
            return timed_out(model.id(), model.name());
        }

        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(format!("microlp-{}", model.name()))
            .spawn(move || {
                // The receiver is gone once the caller gave up waiting
                let _ = tx.send(lowered.solve());
            });
        if let Err(e) = worker {
            return Solution::error(model.id(), format!("failed to start solver thread: {}", e));
        }

        let received = match options.time_limit {
            Some(limit) => rx.recv_timeout(limit),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let solution = match received {
            Ok(outcome) => into_solution(model, outcome),
            Err(RecvTimeoutError::Timeout) => timed_out(model.id(), model.name()),
            Err(RecvTimeoutError::Disconnected) => {
                Solution::error(model.id(), "solver thread stopped without a result")
            }
        };

        info!(
            "model '{}': {:?}, objective {:?} in {:.3}s",
            model.name(),
            solution.status,
            solution.objective_value,
            started.elapsed().as_secs_f64()
        );
        solution
    }
}
