//! The cross-type binary/unary operator matrix.
//!
//! Every routine takes operands by reference and produces a fresh record;
//! only assignment (`assign.rs`) mutates. Dispatch is a match over the
//! `(Kind, Kind)` pair. Struct operands are not handled here: the evaluator
//! resolves user operator overloads before calling in, so a struct reaching
//! this matrix is a type error.

use std::cmp::Ordering;
use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::ast::{BinOp, UnaryOp};
use crate::record::{ErrorKind, EvalError, EvalResult, Kind, Payload, Record};

fn bool_int(b: bool) -> Record {
    Record::make_int(if b { 1 } else { 0 })
}

pub fn binary(op: BinOp, left: &Record, right: &Record) -> EvalResult<Record> {
    match op {
        BinOp::Eq => Ok(bool_int(equal(left, right))),
        // != is the negation of ==
        BinOp::Ne => Ok(bool_int(!equal(left, right))),
        BinOp::And => Ok(bool_int(left.truthy() && right.truthy())),
        BinOp::Or => Ok(bool_int(left.truthy() || right.truthy())),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = compare(op, left, right)?;
            Ok(bool_int(match op {
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Le => ord != Ordering::Greater,
                BinOp::Gt => ord == Ordering::Greater,
                BinOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            }))
        }
        BinOp::Shl | BinOp::Shr => shift(op, left, right),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => bitwise(op, left, right),
        BinOp::Add
        | BinOp::Sub
        | BinOp::Mul
        | BinOp::Div
        | BinOp::FloorDiv
        | BinOp::Rem
        | BinOp::Pow => arithmetic(op, left, right),
    }
}

// ---- Arithmetic ----

fn arithmetic(op: BinOp, left: &Record, right: &Record) -> EvalResult<Record> {
    // null / undefined / nan poison arithmetic
    if left.is_nullish() || right.is_nullish() {
        return Ok(Record::make_nan());
    }

    match (&left.payload, &right.payload) {
        (Payload::Str(a), Payload::Str(b)) if op == BinOp::Add => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            return Ok(Record::make_string(out));
        }
        (Payload::Str(s), _) if op == BinOp::Mul && right.kind == Kind::Int => {
            return repeat_string(s, right);
        }
        _ => {}
    }

    if !left.is_numeric() || !right.is_numeric() {
        return Err(EvalError::mismatch(op.symbol(), left.kind, right.kind));
    }

    // Division by a numeric zero is a runtime error, never a NaN.
    if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Rem) {
        let zero = match &right.payload {
            Payload::Int(v) => v.is_zero(),
            Payload::Float(v) => v.is_zero(),
            Payload::Char(c) => *c == '\0',
            _ => false,
        };
        if zero {
            return Err(EvalError::new(
                ErrorKind::DivisionByZero,
                crate::ast::Span::UNKNOWN,
            ));
        }
    }

    // INT x INT (chars count as ints) stays integral; any float promotes.
    if left.kind != Kind::Float && right.kind != Kind::Float {
        let a = left.as_bigint().expect("numeric");
        let b = right.as_bigint().expect("numeric");
        return int_arith(op, &a, &b);
    }

    let a = left.as_bigdecimal().expect("numeric");
    let b = right.as_bigdecimal().expect("numeric");
    float_arith(op, &a, &b)
}

fn int_arith(op: BinOp, a: &BigInt, b: &BigInt) -> EvalResult<Record> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        // `/` truncates toward zero, `\` floors
        BinOp::Div => a / b,
        BinOp::FloorDiv => {
            let q = a / b;
            if (a % b).is_zero() || a.is_negative() == b.is_negative() {
                q
            } else {
                q - 1
            }
        }
        BinOp::Rem => a % b,
        BinOp::Pow => {
            let exp = b
                .to_u32()
                .ok_or_else(|| EvalError::runtime("exponent out of range"))?;
            num_traits::pow::Pow::pow(a, exp)
        }
        _ => unreachable!(),
    };
    Ok(Record::make_int(v))
}

fn float_arith(op: BinOp, a: &BigDecimal, b: &BigDecimal) -> EvalResult<Record> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).with_scale_round(0, RoundingMode::Floor),
        BinOp::Rem => {
            // a - trunc(a / b) * b, kept in decimal arithmetic
            let q = (a / b).with_scale_round(0, RoundingMode::Down);
            a - q * b
        }
        BinOp::Pow => {
            let (x, y) = match (a.to_f64(), b.to_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Ok(Record::make_nan()),
            };
            let p = x.powf(y);
            if !p.is_finite() {
                return Ok(Record::make_nan());
            }
            match BigDecimal::try_from(p) {
                Ok(v) => v,
                Err(_) => return Ok(Record::make_nan()),
            }
        }
        _ => unreachable!(),
    };
    Ok(Record::make_float(v))
}

/// `"ab" * 3` — concatenation with itself until total length is
/// `len(left) * right`. The count must be a non-negative integer.
fn repeat_string(s: &str, count: &Record) -> EvalResult<Record> {
    let n = count
        .as_bigint()
        .and_then(|v| if v.is_negative() { None } else { v.to_usize() })
        .ok_or_else(|| EvalError::runtime("string repetition count must be a non-negative integer"))?;
    let mut out = String::new();
    for _ in 0..n {
        out.push_str(s);
    }
    Ok(Record::make_string(out))
}

// ---- Comparison ----

fn compare(op: BinOp, left: &Record, right: &Record) -> EvalResult<Ordering> {
    // Two nullish operands compare equal; a nullish operand against a
    // numeric peer reads as zero.
    if left.is_nullish() && right.is_nullish() {
        return Ok(Ordering::Equal);
    }
    if left.is_nullish() && right.is_numeric() {
        let b = right.as_bigdecimal().expect("numeric");
        return Ok(BigDecimal::zero().cmp(&b));
    }
    if right.is_nullish() && left.is_numeric() {
        let a = left.as_bigdecimal().expect("numeric");
        return Ok(a.cmp(&BigDecimal::zero()));
    }

    if left.is_numeric() && right.is_numeric() {
        let a = left.as_bigdecimal().expect("numeric");
        let b = right.as_bigdecimal().expect("numeric");
        return Ok(a.cmp(&b));
    }

    if let (Payload::Str(a), Payload::Str(b)) = (&left.payload, &right.payload) {
        return Ok(a.as_str().cmp(b.as_str()));
    }

    Err(EvalError::mismatch(op.symbol(), left.kind, right.kind))
}

// ---- Shifting ----

fn shift(op: BinOp, left: &Record, right: &Record) -> EvalResult<Record> {
    if left.is_nullish() || right.is_nullish() {
        return Ok(Record::make_nan());
    }
    if !left.is_numeric() || !right.is_numeric() {
        return Err(EvalError::mismatch(op.symbol(), left.kind, right.kind));
    }
    let a = left.as_bigint().expect("numeric");
    let amount = right
        .as_bigint()
        .and_then(|v| if v.is_negative() { None } else { v.to_u64() })
        .ok_or_else(|| EvalError::runtime("shift amount out of range"))?;

    let v = match op {
        BinOp::Shl => a << amount,
        BinOp::Shr => {
            // Shifting out every bit yields zero instead of leaning on
            // native shift behavior.
            if amount >= a.bits() {
                BigInt::zero()
            } else {
                a >> amount
            }
        }
        _ => unreachable!(),
    };
    Ok(Record::make_int(v))
}

// ---- Bitwise ----

fn bitwise(op: BinOp, left: &Record, right: &Record) -> EvalResult<Record> {
    if left.is_nullish() || right.is_nullish() {
        return Ok(Record::make_nan());
    }
    if !left.is_numeric() || !right.is_numeric() {
        return Err(EvalError::mismatch(op.symbol(), left.kind, right.kind));
    }
    let a = left.as_bigint().expect("numeric");
    let b = right.as_bigint().expect("numeric");
    let v = match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        _ => unreachable!(),
    };
    Ok(Record::make_int(v))
}

// ---- Equality ----

/// Recursive structural equality. Objects compare by key set (order
/// independent); tuples pointwise; mismatched kind pairs that have no
/// numeric or nullish bridge compare unequal rather than erroring.
pub fn equal(left: &Record, right: &Record) -> bool {
    if left.is_nullish() || right.is_nullish() {
        if left.is_nullish() && right.is_nullish() {
            return true;
        }
        let peer = if left.is_nullish() { right } else { left };
        return match peer.as_bigdecimal() {
            Some(v) => v.is_zero(),
            None => false,
        };
    }

    if left.is_numeric() && right.is_numeric() {
        let a = left.as_bigdecimal().expect("numeric");
        let b = right.as_bigdecimal().expect("numeric");
        return a == b;
    }

    match (&left.payload, &right.payload) {
        (Payload::Str(a), Payload::Str(b)) => a == b,
        (Payload::Tuple(a), Payload::Tuple(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| equal(&x.lock(), &y.lock()))
        }
        (Payload::Object(a), Payload::Object(b)) => {
            if a.len() != b.len() {
                return false;
            }
            a.iter().all(|(key, val)| match b.iter().find(|(k, _)| k == key) {
                Some((_, other)) => equal(&val.lock(), &other.lock()),
                None => false,
            })
        }
        (
            Payload::Struct { class: ca, fields: fa },
            Payload::Struct { class: cb, fields: fb },
        ) => {
            if !Arc::ptr_eq(ca, cb) || fa.len() != fb.len() {
                return false;
            }
            fa.iter().all(|(key, val)| match fb.iter().find(|(k, _)| k == key) {
                Some((_, other)) => equal(&val.lock(), &other.lock()),
                None => false,
            })
        }
        (Payload::Type(a), Payload::Type(b)) => a.name == b.name,
        (Payload::Proc(a), Payload::Proc(b)) => Arc::ptr_eq(&a.body, &b.body),
        (Payload::Builtin(a), Payload::Builtin(b)) => a.name == b.name,
        _ => false,
    }
}

// ---- Unary ----

pub fn unary(op: UnaryOp, operand: &Record) -> EvalResult<Record> {
    match op {
        UnaryOp::Not => Ok(bool_int(!operand.truthy())),
        UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => {
            if operand.is_nullish() {
                return Ok(Record::make_nan());
            }
            match (&operand.payload, op) {
                (Payload::Int(v), UnaryOp::Neg) => Ok(Record::make_int(-v)),
                (Payload::Int(v), UnaryOp::Plus) => Ok(Record::make_int(v.clone())),
                (Payload::Int(v), UnaryOp::BitNot) => Ok(Record::make_int(!v)),
                (Payload::Float(v), UnaryOp::Neg) => Ok(Record::make_float(-v)),
                (Payload::Float(v), UnaryOp::Plus) => Ok(Record::make_float(v.clone())),
                (Payload::Char(_), _) => {
                    let v = operand.as_bigint().expect("numeric");
                    match op {
                        UnaryOp::Neg => Ok(Record::make_int(-v)),
                        UnaryOp::Plus => Ok(Record::make_int(v)),
                        UnaryOp::BitNot => Ok(Record::make_int(!v)),
                        UnaryOp::Not => unreachable!(),
                    }
                }
                _ => Err(EvalError::new(
                    ErrorKind::UnsupportedUnary {
                        op: op.symbol().to_string(),
                        kind: operand.kind.name(),
                    },
                    crate::ast::Span::UNKNOWN,
                )),
            }
        }
    }
}
