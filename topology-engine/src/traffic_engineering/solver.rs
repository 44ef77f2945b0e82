use crate::traffic_engineering::model::LpModel;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Anything able to solve mixed-integer linear programs
pub trait Solver {
    fn solve(&self, model: &LpModel, timeout: Duration) -> Result<Solution, SolverError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    /// A solution was found, but the solver stopped before proving optimality
    Feasible,
    Infeasible,
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("the solver did not finish within {0:?}")]
    Timeout(Duration),
    #[error("the solver `{program}` could not be started: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("the solver failed: {0}")]
    Failed(String),
}

/// Variable assignment returned by a solver
#[derive(Clone, Debug)]
pub struct Solution {
    status: SolveStatus,
    values: HashMap<String, f64>,
}

impl Solution {
    pub fn new(status: SolveStatus) -> Self {
        Self {
            status,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, variable: &str, value: f64) -> Self {
        self.set_value(variable, value);
        self
    }

    pub fn set_value(&mut self, variable: &str, value: f64) {
        self.values.insert(variable.to_string(), value);
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// The value of the variable, or zero if the solver did not report it
    pub fn value(&self, variable: &str) -> f64 {
        self.values.get(variable).copied().unwrap_or(0.0)
    }

    /// Whether a binary variable was set
    pub fn is_selected(&self, variable: &str) -> bool {
        self.value(variable) > 0.5
    }
}

/// Runs a CBC-compatible solver as a child process
///
/// The model is written to a uniquely named file in `work_dir`, and the solver is asked to write
/// its solution next to it. Both files are removed afterwards.
pub struct CommandSolver {
    program: String,
    work_dir: PathBuf,
}

impl CommandSolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

impl Solver for CommandSolver {
    fn solve(&self, model: &LpModel, timeout: Duration) -> Result<Solution, SolverError> {
        let id = uuid::Uuid::new_v4();
        let files = TempFiles {
            model: self.work_dir.join(format!("netcompile-{id}.lp")),
            solution: self.work_dir.join(format!("netcompile-{id}.sol")),
        };

        std::fs::write(&files.model, model.to_lp_string()).map_err(|e| {
            SolverError::Failed(format!(
                "unable to write model to {}: {e}",
                files.model.display()
            ))
        })?;

        let seconds = timeout.as_secs().max(1);
        tracing::debug!(
            "running {} on {} with a limit of {seconds}s",
            self.program,
            files.model.display()
        );

        let mut child = Command::new(&self.program)
            .arg(&files.model)
            .arg("sec")
            .arg(seconds.to_string())
            .arg("solve")
            .arg("solu")
            .arg(&files.solution)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SolverError::Unavailable {
                program: self.program.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        let exit_status = loop {
            let status = child
                .try_wait()
                .map_err(|e| SolverError::Failed(format!("unable to poll the solver: {e}")))?;
            if let Some(status) = status {
                break status;
            }

            if Instant::now() >= deadline {
                // The process may exit on its own in the meantime, so errors are irrelevant
                child.kill().ok();
                child.wait().ok();
                return Err(SolverError::Timeout(timeout));
            }

            std::thread::sleep(POLL_INTERVAL);
        };

        if !exit_status.success() {
            return Err(SolverError::Failed(format!(
                "{} exited with {exit_status}",
                self.program
            )));
        }

        let raw = std::fs::read_to_string(&files.solution).map_err(|e| {
            SolverError::Failed(format!(
                "unable to read solution from {}: {e}",
                files.solution.display()
            ))
        })?;

        parse_cbc_solution(&raw)
    }
}

struct TempFiles {
    model: PathBuf,
    solution: PathBuf,
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        remove_if_exists(&self.model);
        remove_if_exists(&self.solution);
    }
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("unable to remove {}: {e}", path.display());
        }
    }
}

/// Parses a solution file as written by CBC's `solu` command
///
/// The first line holds the status, every other line is `index name value reduced_cost`,
/// optionally prefixed by `**` when the value is infeasible.
pub fn parse_cbc_solution(raw: &str) -> Result<Solution, SolverError> {
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let Some(status_line) = lines.next() else {
        return Err(SolverError::Failed("empty solution file".to_string()));
    };

    let status_line = status_line.trim();
    let lowercase = status_line.to_ascii_lowercase();
    let status = if lowercase.starts_with("optimal") {
        SolveStatus::Optimal
    } else if lowercase.contains("infeasible") {
        SolveStatus::Infeasible
    } else if lowercase.starts_with("stopped") {
        SolveStatus::Feasible
    } else {
        return Err(SolverError::Failed(format!(
            "unexpected solution status: {status_line}"
        )));
    };

    let mut solution = Solution::new(status);
    for line in lines {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.peek() == Some(&"**") {
            tokens.next();
        }

        let (Some(_index), Some(name), Some(value)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(SolverError::Failed(format!(
                "malformed solution line: {line}"
            )));
        };

        let value: f64 = value.parse().map_err(|_| {
            SolverError::Failed(format!("invalid value for {name}: {value}"))
        })?;
        solution.set_value(name, value);
    }

    // CBC reports a time limit without any solution as stopped, with no values at all
    if status == SolveStatus::Feasible && solution.values.is_empty() {
        return Err(SolverError::Failed(
            "the solver stopped without finding a solution".to_string(),
        ));
    }

    Ok(solution)
}
