//! Pure evaluator over the formula syntax tree.
//!
//! `//` floors, `%` takes the sign of the divisor, `round` rounds half to
//! even, and comparisons produce `1` or `0`.

use super::ast::{BinaryOp, CompareOp, Expr, Function, UnaryOp};
use super::FormulaError;

/// Evaluate `expr`, resolving variable names through `lookup`.
pub fn eval<F>(expr: &Expr, lookup: &F) -> Result<f64, FormulaError>
where
    F: Fn(&str) -> Option<f64>,
{
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Variable(name) => {
            lookup(name).ok_or_else(|| FormulaError::UnknownVariable(name.clone()))
        }
        Expr::Unary { op, operand } => {
            let value = eval(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Neg => -value,
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, lookup)?;
            let rhs = eval(rhs, lookup)?;
            binary(*op, lhs, rhs)
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, lookup)?;
            for (op, expr) in rest {
                let right = eval(expr, lookup)?;
                if !compare(*op, left, right) {
                    return Ok(0.0);
                }
                left = right;
            }
            Ok(1.0)
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, lookup))
                .collect::<Result<Vec<f64>, _>>()?;
            call(*function, &values)
        }
    }
}

fn binary(op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64, FormulaError> {
    match op {
        BinaryOp::Add => Ok(lhs + rhs),
        BinaryOp::Sub => Ok(lhs - rhs),
        BinaryOp::Mul => Ok(lhs * rhs),
        BinaryOp::Div => {
            if rhs == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Ok(lhs / rhs)
        }
        BinaryOp::FloorDiv => {
            if rhs == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Ok(floor_div(lhs, rhs))
        }
        BinaryOp::Mod => {
            if rhs == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Ok(floor_mod(lhs, rhs))
        }
        BinaryOp::Pow => power(lhs, rhs, "**"),
    }
}

fn compare(op: CompareOp, lhs: f64, rhs: f64) -> bool {
    match op {
        CompareOp::Lt => lhs < rhs,
        CompareOp::Le => lhs <= rhs,
        CompareOp::Gt => lhs > rhs,
        CompareOp::Ge => lhs >= rhs,
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ne => lhs != rhs,
    }
}

fn call(function: Function, args: &[f64]) -> Result<f64, FormulaError> {
    match (function, args) {
        (Function::Abs, [value]) => Ok(value.abs()),
        (Function::Min, [first, rest @ ..]) if !rest.is_empty() => {
            Ok(rest.iter().fold(*first, |acc, value| if *value < acc { *value } else { acc }))
        }
        (Function::Max, [first, rest @ ..]) if !rest.is_empty() => {
            Ok(rest.iter().fold(*first, |acc, value| if *value > acc { *value } else { acc }))
        }
        (Function::Pow, [base, exponent]) => power(*base, *exponent, "pow"),
        (Function::Round, [value]) => Ok(value.round_ties_even()),
        (Function::Round, [value, digits]) => round_to(*value, *digits),
        _ => Err(FormulaError::Arity {
            function: function.name(),
            expected: function.arity_text(),
            found: args.len(),
        }),
    }
}

fn power(base: f64, exponent: f64, context: &'static str) -> Result<f64, FormulaError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(FormulaError::DivisionByZero);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(FormulaError::Domain(context));
    }
    let result = base.powf(exponent);
    if result.is_infinite() && base.is_finite() && exponent.is_finite() {
        return Err(FormulaError::Overflow(context));
    }
    Ok(result)
}

/// Quotient consistent with `floor_mod`, so `1 // 0.1` is `9`.
fn floor_div(lhs: f64, rhs: f64) -> f64 {
    let remainder = lhs % rhs;
    let mut quotient = (lhs - remainder) / rhs;
    if remainder != 0.0 && (remainder < 0.0) != (rhs < 0.0) {
        quotient -= 1.0;
    }
    if quotient == 0.0 {
        return 0.0f64.copysign(lhs / rhs);
    }
    // The division above is inexact; snap to the nearest integer.
    let floored = quotient.floor();
    if quotient - floored > 0.5 {
        floored + 1.0
    } else {
        floored
    }
}

fn floor_mod(lhs: f64, rhs: f64) -> f64 {
    let remainder = lhs % rhs;
    if remainder != 0.0 && (remainder < 0.0) != (rhs < 0.0) {
        remainder + rhs
    } else {
        remainder
    }
}

fn round_to(value: f64, digits: f64) -> Result<f64, FormulaError> {
    if digits.fract() != 0.0 {
        return Err(FormulaError::Domain("round"));
    }
    // Beyond these magnitudes the scaling itself is exact or meaningless.
    if digits > 308.0 {
        return Ok(value);
    }
    if digits < -308.0 {
        return Ok(0.0 * value.signum());
    }
    let scale = 10f64.powi(digits.abs() as i32);
    if digits >= 0.0 {
        let scaled = value * scale;
        if !scaled.is_finite() {
            return Ok(value);
        }
        Ok(scaled.round_ties_even() / scale)
    } else {
        Ok((value / scale).round_ties_even() * scale)
    }
}
