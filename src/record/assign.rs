//! Destructive assignment: the `=`-family contract.
//!
//! The guards run in a fixed order — readonly, then reference, then typed —
//! and null stays an orthogonal attribute throughout: assigning from a null
//! source toggles the flag without touching the stored kind, and only a
//! record literally constructed as null (kind `Null`, "pending kind")
//! transmutes to the source's kind on first assignment.

use std::sync::Arc;

use crate::ast::Span;
use crate::record::{ErrorKind, EvalError, EvalResult, Kind, RecordRef};

/// Assign `source` into `target`, mutating the target cell in place.
pub fn set_value(target: &RecordRef, source: &RecordRef) -> EvalResult<()> {
    // Self-assignment would deadlock on the same cell; it is also a no-op.
    if Arc::ptr_eq(target, source) {
        return Ok(());
    }

    // Snapshot the source before locking the target: a deep copy detaches
    // aggregate children, so `x = y` never aliases y's storage.
    let src = source.lock().deep_copy();
    let mut tgt = target.lock();

    if tgt.readonly {
        return Err(EvalError::new(ErrorKind::Readonly, Span::UNKNOWN));
    }

    // Assigning from a null source only raises the flag, unless the target
    // is itself a pending-kind null record (handled by the replace path).
    if src.kind == Kind::Null && tgt.kind != Kind::Null {
        tgt.null = true;
        return Ok(());
    }

    if tgt.reference {
        if tgt.kind != src.kind {
            return Err(EvalError::mismatch("=", tgt.kind, src.kind));
        }
        tgt.payload = src.payload;
        tgt.null = src.null;
        return Ok(());
    }

    if tgt.typed && tgt.kind != Kind::Null {
        if tgt.kind != src.kind {
            return Err(EvalError::mismatch("=", tgt.kind, src.kind));
        }
        tgt.payload = src.payload;
        tgt.null = src.null;
        return Ok(());
    }

    // Full replacement: the old payload drops here, the source's deep copy
    // moves in, and the kind follows the source.
    tgt.kind = src.kind;
    tgt.payload = src.payload;
    tgt.null = src.null;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ops, Payload, Record};
    use num_bigint::BigInt;

    fn cell(r: Record) -> RecordRef {
        r.into_ref()
    }

    #[test]
    fn matching_kind_assignment_is_idempotent_under_equality() {
        let x = cell(Record::make_int(1));
        let y = cell(Record::make_int(42));
        set_value(&x, &y).unwrap();
        assert!(ops::equal(&x.lock(), &y.lock()));
    }

    #[test]
    fn untyped_assignment_replaces_kind() {
        let x = cell(Record::make_int(1));
        let y = cell(Record::make_string("hello"));
        set_value(&x, &y).unwrap();
        let x = x.lock();
        assert_eq!(x.kind, Kind::Str);
        assert_eq!(x.to_string(), "hello");
    }

    #[test]
    fn readonly_rejects_assignment() {
        let x = cell(Record::make_int(1));
        x.lock().readonly = true;
        let y = cell(Record::make_int(2));
        let err = set_value(&x, &y).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Readonly));
    }

    #[test]
    fn typed_rejects_kind_change() {
        let x = cell(Record::make_int(1));
        x.lock().typed = true;
        let y = cell(Record::make_string("s"));
        assert!(set_value(&x, &y).is_err());
        // same kind still fine
        let z = cell(Record::make_int(9));
        set_value(&x, &z).unwrap();
        assert_eq!(x.lock().to_string(), "9");
    }

    #[test]
    fn typed_accepts_null_without_kind_change() {
        let x = cell(Record::make_int(1));
        x.lock().typed = true;
        let n = cell(Record::make_null());
        set_value(&x, &n).unwrap();
        let guard = x.lock();
        assert_eq!(guard.kind, Kind::Int);
        assert!(guard.null);
    }

    #[test]
    fn typed_rejects_undefined_and_nan() {
        let x = cell(Record::make_int(1));
        x.lock().typed = true;
        assert!(set_value(&x, &cell(Record::make_undefined())).is_err());
        assert!(set_value(&x, &cell(Record::make_nan())).is_err());
    }

    #[test]
    fn null_is_orthogonal_for_every_kind() {
        let samples = vec![
            Record::make_int(3),
            Record::make_float("1.5".parse().unwrap()),
            Record::make_char('c'),
            Record::make_string("s"),
            Record::make_tuple(vec![]),
            Record::make_object(vec![]),
        ];
        for sample in samples {
            let kind = sample.kind;
            let x = cell(sample);
            set_value(&x, &cell(Record::make_null())).unwrap();
            {
                let guard = x.lock();
                assert_eq!(guard.kind, kind, "kind must survive null assignment");
                assert!(guard.null);
            }
            // a numeric assignment clears the flag and may change kind
            set_value(&x, &cell(Record::make_int(7))).unwrap();
            let guard = x.lock();
            assert!(!guard.null);
            assert_eq!(guard.kind, Kind::Int);
        }
    }

    #[test]
    fn pending_kind_null_transmutes() {
        let x = cell(Record::make_null());
        set_value(&x, &cell(Record::make_string("now a string"))).unwrap();
        let guard = x.lock();
        assert_eq!(guard.kind, Kind::Str);
        assert!(!guard.null);
    }

    #[test]
    fn reference_requires_matching_kind() {
        let x = cell(Record::make_int(1));
        x.lock().reference = true;
        let err = set_value(&x, &cell(Record::make_string("s"))).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
        set_value(&x, &cell(Record::make_int(8))).unwrap();
        assert_eq!(x.lock().to_string(), "8");
        assert!(x.lock().reference, "reference flag survives assignment");
    }

    #[test]
    fn self_assignment_is_a_no_op() {
        let x = cell(Record::make_int(5));
        set_value(&x, &x).unwrap();
        assert_eq!(x.lock().to_string(), "5");
    }

    #[test]
    fn aggregate_assignment_deep_copies() {
        let inner = cell(Record::make_int(1));
        let y = cell(Record::make_tuple(vec![Arc::clone(&inner)]));
        let x = cell(Record::make_int(0));
        set_value(&x, &y).unwrap();
        inner.lock().payload = Payload::Int(BigInt::from(99));
        // x holds a detached copy of the tuple
        assert_eq!(x.lock().to_string(), "[1]");
    }

    #[test]
    fn every_kind_pair_succeeds_without_guards() {
        let make_all = || {
            vec![
                Record::make_int(1),
                Record::make_float("1.0".parse().unwrap()),
                Record::make_char('a'),
                Record::make_string("s"),
                Record::make_object(vec![]),
                Record::make_tuple(vec![]),
                Record::make_null(),
                Record::make_undefined(),
                Record::make_nan(),
            ]
        };
        for tgt in make_all() {
            for src in make_all() {
                let t = cell(tgt.clone());
                let s = cell(src.clone());
                set_value(&t, &s).unwrap_or_else(|e| {
                    panic!("{} = {} failed: {}", tgt.kind, src.kind, e)
                });
            }
        }
    }
}
