//! Linear programs and their CPLEX LP text representation

use crate::traffic_engineering::solver::Solution;
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Write};
use std::sync::Arc;

/// Absolute tolerance used when checking a solution against the model
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Lines in the LP output are wrapped once they grow past this many characters
const MAX_LINE_LEN: usize = 80;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum VariableKind {
    Binary,
    Continuous { lower: f64, upper: Option<f64> },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sense {
    LessEq,
    GreaterEq,
    Eq,
}

impl Display for Sense {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sense = match self {
            Sense::LessEq => "<=",
            Sense::GreaterEq => ">=",
            Sense::Eq => "=",
        };
        f.write_str(sense)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub coefficient: f64,
    pub variable: Arc<str>,
}

impl Term {
    pub fn new(coefficient: f64, variable: &Arc<str>) -> Self {
        Self {
            coefficient,
            variable: variable.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<Term>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    fn lhs(&self, solution: &Solution) -> f64 {
        evaluate(&self.terms, solution)
    }

    fn is_satisfied(&self, solution: &Solution) -> bool {
        let lhs = self.lhs(solution);
        match self.sense {
            Sense::LessEq => lhs <= self.rhs + FEASIBILITY_TOLERANCE,
            Sense::GreaterEq => lhs >= self.rhs - FEASIBILITY_TOLERANCE,
            Sense::Eq => (lhs - self.rhs).abs() <= FEASIBILITY_TOLERANCE,
        }
    }
}

/// A maximization problem over binary and bounded continuous variables
#[derive(Clone, Debug, Default)]
pub struct LpModel {
    objective: Vec<Term>,
    constraints: Vec<Constraint>,
    /// Variables in declaration order
    variables: Vec<(Arc<str>, VariableKind)>,
    variable_index: HashMap<Arc<str>, usize>,
}

impl LpModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a binary variable, returning its name
    pub fn add_binary(&mut self, name: String) -> Arc<str> {
        self.add_variable(name, VariableKind::Binary)
    }

    /// Declares a continuous variable in `[lower, upper]` (unbounded above if `upper` is `None`)
    pub fn add_continuous(&mut self, name: String, lower: f64, upper: Option<f64>) -> Arc<str> {
        self.add_variable(name, VariableKind::Continuous { lower, upper })
    }

    fn add_variable(&mut self, name: String, kind: VariableKind) -> Arc<str> {
        let name: Arc<str> = name.into();
        debug_assert!(
            !self.variable_index.contains_key(&name),
            "variable {name} declared twice"
        );

        self.variable_index
            .insert(name.clone(), self.variables.len());
        self.variables.push((name.clone(), kind));
        name
    }

    pub fn add_objective_term(&mut self, coefficient: f64, variable: &Arc<str>) {
        self.objective.push(Term::new(coefficient, variable));
    }

    /// Adds a constraint, unless it has no terms at all
    pub fn add_constraint(&mut self, name: String, terms: Vec<Term>, sense: Sense, rhs: f64) {
        if terms.is_empty() {
            tracing::debug!("skipping constraint {name} without terms");
            return;
        }

        self.constraints.push(Constraint {
            name,
            terms,
            sense,
            rhs,
        });
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable_index.contains_key(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&Arc<str>, VariableKind)> {
        self.variables.iter().map(|(name, kind)| (name, *kind))
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn objective_value(&self, solution: &Solution) -> f64 {
        evaluate(&self.objective, solution)
    }

    /// Describes every bound, integrality and constraint violated by the solution
    ///
    /// Variables missing from the solution are taken to be zero, like the solver does.
    pub fn violations(&self, solution: &Solution) -> Vec<String> {
        let mut violations = Vec::new();

        for (name, kind) in &self.variables {
            let value = solution.value(name);
            match *kind {
                VariableKind::Binary => {
                    if value.abs() > FEASIBILITY_TOLERANCE
                        && (value - 1.0).abs() > FEASIBILITY_TOLERANCE
                    {
                        violations.push(format!("binary {name} has value {value}"));
                    }
                }
                VariableKind::Continuous { lower, upper } => {
                    if value < lower - FEASIBILITY_TOLERANCE {
                        violations.push(format!("{name} = {value} is below {lower}"));
                    }
                    if let Some(upper) = upper {
                        if value > upper + FEASIBILITY_TOLERANCE {
                            violations.push(format!("{name} = {value} is above {upper}"));
                        }
                    }
                }
            }
        }

        for constraint in &self.constraints {
            if !constraint.is_satisfied(solution) {
                violations.push(format!(
                    "{}: {} {} {} does not hold",
                    constraint.name,
                    constraint.lhs(solution),
                    constraint.sense,
                    constraint.rhs
                ));
            }
        }

        for term in self.objective.iter().chain(self.constraints.iter().flat_map(|c| &c.terms)) {
            if !self.has_variable(&term.variable) {
                violations.push(format!("undeclared variable {}", term.variable));
            }
        }

        violations
    }

    /// Renders the model in CPLEX LP format
    pub fn to_lp_string(&self) -> String {
        self.to_string()
    }
}

impl Display for LpModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        writeln!(out, "\\ Traffic engineering model")?;
        writeln!(out, "Maximize")?;
        write_row(&mut out, "obj", &self.objective)?;
        writeln!(out)?;

        writeln!(out, "Subject To")?;
        for constraint in &self.constraints {
            write_row(&mut out, &constraint.name, &constraint.terms)?;
            writeln!(out, " {} {}", constraint.sense, format_number(constraint.rhs))?;
        }

        let bounded: Vec<_> = self
            .variables
            .iter()
            .filter_map(|(name, kind)| match *kind {
                VariableKind::Continuous { lower, upper } if lower != 0.0 || upper.is_some() => {
                    Some((name, lower, upper))
                }
                _ => None,
            })
            .collect();
        if !bounded.is_empty() {
            writeln!(out, "Bounds")?;
            for (name, lower, upper) in bounded {
                match upper {
                    Some(upper) => writeln!(
                        out,
                        " {} <= {name} <= {}",
                        format_number(lower),
                        format_number(upper)
                    )?,
                    None => writeln!(out, " {name} >= {}", format_number(lower))?,
                }
            }
        }

        let binaries: Vec<_> = self
            .variables
            .iter()
            .filter(|(_, kind)| *kind == VariableKind::Binary)
            .map(|(name, _)| name)
            .collect();
        if !binaries.is_empty() {
            writeln!(out, "Binary")?;
            for name in binaries {
                writeln!(out, " {name}")?;
            }
        }

        writeln!(out, "End")?;
        f.write_str(&out)
    }
}

/// Writes ` name: term + term ...`, wrapping long rows, without a trailing newline
fn write_row(out: &mut String, name: &str, terms: &[Term]) -> std::fmt::Result {
    let mut line_len = 0;
    let start = out.len();
    write!(out, " {name}:")?;
    line_len += out.len() - start;

    for (i, term) in terms.iter().enumerate() {
        let rendered = format_term(term, i == 0);
        if line_len + rendered.len() > MAX_LINE_LEN && i > 0 {
            out.push_str("\n  ");
            line_len = 2;
        }
        out.push_str(&rendered);
        line_len += rendered.len();
    }

    Ok(())
}

fn format_term(term: &Term, first: bool) -> String {
    let sign = if term.coefficient < 0.0 { "-" } else { "+" };
    let magnitude = term.coefficient.abs();
    let coefficient = if magnitude == 1.0 {
        String::new()
    } else {
        format!("{} ", format_number(magnitude))
    };

    if first && sign == "+" {
        format!(" {coefficient}{}", term.variable)
    } else {
        format!(" {sign} {coefficient}{}", term.variable)
    }
}

/// Integers print without a fractional part, everything else in plain decimal notation
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn evaluate(terms: &[Term], solution: &Solution) -> f64 {
    terms
        .iter()
        .map(|t| t.coefficient * solution.value(&t.variable))
        .sum()
}
