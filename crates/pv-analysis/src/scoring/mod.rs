//! Voting-power formula engine.
//!
//! A formula is a small arithmetic expression over a fixed vocabulary of
//! position features:
//!
//! | Name | Meaning |
//! |------|---------|
//! | `reg_amount` | designated-token amount held by the position |
//! | `reg_equivalent` | other-token amount valued in designated-token units |
//! | `relative_distance` | range-center distance from the current price, as a fraction of it |
//! | `price_distance` | absolute range-center distance from the current price |
//! | `is_active` | `1` when the current price is inside the range, else `0` |
//!
//! Only numbers, those names (plus any caller-supplied extras), the functions
//! `abs`, `min`, `max`, `pow`, `round`, and arithmetic / comparison operators
//! are understood. The text is parsed into a typed tree and evaluated by a
//! pure function; nothing in a formula can reach the host process.
//!
//! [`evaluate`] never fails: compile and runtime errors are logged and score
//! as `0.0`. Use [`try_evaluate`] or [`Formula::try_evaluate`] to see the error.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::error;

use ast::Expr;

/// Formula every registry starts with: 4 votes per REG, 2 per REG-equivalent.
pub const DEFAULT_FORMULA: &str = "reg_amount * 4 + reg_equivalent * 2";

pub const REG_AMOUNT: &str = "reg_amount";
pub const REG_EQUIVALENT: &str = "reg_equivalent";
pub const RELATIVE_DISTANCE: &str = "relative_distance";
pub const PRICE_DISTANCE: &str = "price_distance";
pub const IS_ACTIVE: &str = "is_active";

/// Names a formula can use when scoring an enriched position.
pub const VOCABULARY: [&str; 5] = [
    REG_AMOUNT,
    REG_EQUIVALENT,
    RELATIVE_DISTANCE,
    PRICE_DISTANCE,
    IS_ACTIVE,
];

/// Why a formula could not produce a score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of formula, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("formula nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error in {0}")]
    Domain(&'static str),

    #[error("numeric overflow in {0}")]
    Overflow(&'static str),
}

/// Value of a caller-supplied variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    /// Evaluates as `1` or `0`.
    Flag(bool),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Number(value) => value,
            Value::Flag(true) => 1.0,
            Value::Flag(false) => 0.0,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Flag(value)
    }
}

/// Extra named values visible to a formula.
///
/// These shadow `reg_amount` and `reg_equivalent` when a caller binds the
/// same name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`Variables::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Formula text together with its compiled tree.
///
/// Compilation happens once, at construction. A formula that fails to compile
/// is still a valid value: it keeps the error and reports it on every
/// evaluation.
#[derive(Clone, Debug)]
pub struct Formula {
    source: String,
    compiled: Result<Expr, FormulaError>,
}

impl Formula {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = parser::parse(&source);
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compile error, if the text is not a valid formula.
    pub fn compile_error(&self) -> Option<&FormulaError> {
        self.compiled.as_ref().err()
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }

    /// Evaluate with the two always-present amounts and any extra variables.
    ///
    /// Extras are resolved first, then `reg_amount` and `reg_equivalent`.
    pub fn try_evaluate(
        &self,
        reg_amount: f64,
        reg_equivalent: f64,
        extra: &Variables,
    ) -> Result<f64, FormulaError> {
        let expr = self.compiled.as_ref().map_err(Clone::clone)?;
        eval::eval(expr, &|name: &str| {
            extra.get(name).map(Value::as_f64).or(match name {
                REG_AMOUNT => Some(reg_amount),
                REG_EQUIVALENT => Some(reg_equivalent),
                _ => None,
            })
        })
    }

    /// Like [`Formula::try_evaluate`], but logs failures and scores them `0.0`.
    pub fn evaluate(&self, reg_amount: f64, reg_equivalent: f64, extra: &Variables) -> f64 {
        match self.try_evaluate(reg_amount, reg_equivalent, extra) {
            Ok(score) => score,
            Err(err) => {
                error!(formula = %self.source, error = %err, "error evaluating formula");
                0.0
            }
        }
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Default for Formula {
    fn default() -> Self {
        Self::new(DEFAULT_FORMULA)
    }
}

/// Score one set of inputs with formula text, reporting failures as `0.0`.
pub fn evaluate(reg_amount: f64, formula: &str, reg_equivalent: f64, extra: &Variables) -> f64 {
    Formula::new(formula).evaluate(reg_amount, reg_equivalent, extra)
}

/// Score one set of inputs with formula text.
///
/// # Errors
/// Returns the compile or runtime error of the formula.
pub fn try_evaluate(
    reg_amount: f64,
    formula: &str,
    reg_equivalent: f64,
    extra: &Variables,
) -> Result<f64, FormulaError> {
    Formula::new(formula).try_evaluate(reg_amount, reg_equivalent, extra)
}
