//! Formula evaluation against a single snapshot.
//!
//! The only names an expression can resolve are the snapshot's own fields.

use crate::domain::error::EvalError;
use crate::domain::formula::{BinaryOp, Expr};
use crate::domain::snapshot::Snapshot;

pub fn evaluate(expr: &Expr, snapshot: &Snapshot) -> Result<f64, EvalError> {
    let value = eval_node(expr, snapshot)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

fn eval_node(expr: &Expr, snapshot: &Snapshot) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Field(name) => snapshot
            .value(name)
            .ok_or_else(|| EvalError::UnknownField(name.clone())),
        Expr::Neg(inner) => Ok(-eval_node(inner, snapshot)?),
        Expr::Binary { op, left, right } => {
            let l = eval_node(left, snapshot)?;
            let r = eval_node(right, snapshot)?;
            Ok(apply(*op, l, r))
        }
    }
}

fn apply(op: BinaryOp, l: f64, r: f64) -> f64 {
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        // Floored modulo: the result takes the divisor's sign.
        BinaryOp::Rem => l - r * (l / r).floor(),
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Lt => truth(l < r),
        BinaryOp::Le => truth(l <= r),
        BinaryOp::Gt => truth(l > r),
        BinaryOp::Ge => truth(l >= r),
        BinaryOp::Eq => truth(l == r),
        BinaryOp::Ne => truth(l != r),
    }
}
