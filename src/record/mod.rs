use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use parking_lot::Mutex;

use crate::ast::{Param, Span, VarDecl};
use crate::interpreter::strip::Strip;

pub mod assign;
pub mod ops;

pub use assign::set_value;

/// Shared handle to a runtime value. Assignment mutates through the cell,
/// so aliases (reference parameters, captured slots, aggregate children)
/// observe the change; the atomic count on `Arc` is what the original
/// tracked with an intrusive `link` field.
pub type RecordRef = Arc<Mutex<Record>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Float,
    Char,
    Str,
    Object,
    Tuple,
    Struct,
    Type,
    Null,
    Undefined,
    Nan,
    Proc,
    Builtin,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Char => "char",
            Kind::Str => "string",
            Kind::Object => "object",
            Kind::Tuple => "tuple",
            Kind::Struct => "struct",
            Kind::Type => "type",
            Kind::Null => "null",
            Kind::Undefined => "undefined",
            Kind::Nan => "nan",
            Kind::Proc => "proc",
            Kind::Builtin => "builtin",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A user-declared class. Built once when the declaration executes; shared
/// by every instance and by the `type` record that names it.
#[derive(Debug)]
pub struct ClassDef {
    pub name: String,
    pub generics: Vec<String>,
    /// `type` record of the base class, if the declaration had a heritage.
    pub heritage: Option<RecordRef>,
    pub properties: Vec<VarDecl>,
    pub methods: Vec<(String, ProcData)>,
    /// Strip captured where the class was declared. Property initializers
    /// evaluate against it, the same way method bodies do.
    pub captured: Strip,
    /// Evaluated annotations: name and argument values.
    pub notes: Vec<(String, Vec<RecordRef>)>,
}

impl ClassDef {
    /// Look a method up on this class, then up the heritage chain.
    pub fn find_method(&self, name: &str) -> Option<ProcData> {
        if let Some((_, m)) = self.methods.iter().find(|(n, _)| n == name) {
            return Some(m.clone());
        }
        let base = self.heritage.as_ref()?;
        let base = base.lock();
        match &base.payload {
            Payload::Type(def) => def.find_method(name),
            _ => None,
        }
    }

    /// Property declarations from the root of the heritage chain down,
    /// so derived initializers override base ones. Each comes paired with
    /// the strip of the class that declared it.
    pub fn all_properties(&self) -> Vec<(VarDecl, Strip)> {
        let mut props = match self.heritage.as_ref() {
            Some(base) => {
                let base = base.lock();
                match &base.payload {
                    Payload::Type(def) => def.all_properties(),
                    _ => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        props.extend(
            self.properties
                .iter()
                .map(|p| (p.clone(), self.captured.clone())),
        );
        props
    }

    /// True if `other` names this class or one of its ancestors.
    pub fn is_named(&self, other: &str) -> bool {
        if self.name == other {
            return true;
        }
        match self.heritage.as_ref() {
            Some(base) => match &base.lock().payload {
                Payload::Type(def) => def.is_named(other),
                _ => false,
            },
            None => false,
        }
    }
}

/// A callable closure: parameters, body, and the strip frames captured at
/// definition time. Binding a method sets `this`.
#[derive(Debug, Clone)]
pub struct ProcData {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Arc<crate::ast::Block>,
    pub captured: Strip,
    pub this: Option<RecordRef>,
}

pub type BuiltinFn =
    fn(&mut crate::interpreter::Interpreter, Vec<RecordRef>, Span) -> Result<RecordRef, EvalError>;

#[derive(Clone)]
pub struct BuiltinData {
    pub name: &'static str,
    pub handler: BuiltinFn,
}

impl std::fmt::Debug for BuiltinData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinData({})", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Int(BigInt),
    Float(BigDecimal),
    Char(char),
    Str(String),
    /// Keyed children; insertion order preserved, equality order-independent
    Object(Vec<(String, RecordRef)>),
    /// Positional children
    Tuple(Vec<RecordRef>),
    /// Instantiated class: the class `type` record plus per-instance fields
    Struct {
        class: RecordRef,
        fields: Vec<(String, RecordRef)>,
    },
    Type(Arc<ClassDef>),
    Proc(ProcData),
    Builtin(BuiltinData),
    /// Null / Undefined / Nan carry nothing
    Empty,
}

/// The runtime value: a kind tag, the kind-determined payload, and the
/// orthogonal flags. `null` is an attribute, not a fourteenth kind — a
/// record keeps its kind while logically null.
#[derive(Debug, Clone)]
pub struct Record {
    pub kind: Kind,
    pub payload: Payload,
    pub null: bool,
    /// Declared static type: assignment must preserve the kind.
    pub typed: bool,
    /// Assignment forbidden.
    pub readonly: bool,
    /// Aliases caller storage: assignment mutates in place, kind fixed.
    pub reference: bool,
}

impl Record {
    fn new(kind: Kind, payload: Payload) -> Record {
        Record {
            kind,
            payload,
            null: false,
            typed: false,
            readonly: false,
            reference: false,
        }
    }

    pub fn into_ref(self) -> RecordRef {
        Arc::new(Mutex::new(self))
    }

    // ---- Constructors, one per kind ----

    pub fn make_int<T: Into<BigInt>>(v: T) -> Record {
        Record::new(Kind::Int, Payload::Int(v.into()))
    }

    pub fn make_float(v: BigDecimal) -> Record {
        Record::new(Kind::Float, Payload::Float(v))
    }

    pub fn make_char(c: char) -> Record {
        Record::new(Kind::Char, Payload::Char(c))
    }

    pub fn make_string(s: impl Into<String>) -> Record {
        Record::new(Kind::Str, Payload::Str(s.into()))
    }

    pub fn make_object(children: Vec<(String, RecordRef)>) -> Record {
        Record::new(Kind::Object, Payload::Object(children))
    }

    pub fn make_tuple(children: Vec<RecordRef>) -> Record {
        Record::new(Kind::Tuple, Payload::Tuple(children))
    }

    pub fn make_struct(class: RecordRef, fields: Vec<(String, RecordRef)>) -> Record {
        Record::new(Kind::Struct, Payload::Struct { class, fields })
    }

    pub fn make_type(def: Arc<ClassDef>) -> Record {
        Record::new(Kind::Type, Payload::Type(def))
    }

    pub fn make_null() -> Record {
        let mut r = Record::new(Kind::Null, Payload::Empty);
        r.null = true;
        r
    }

    pub fn make_undefined() -> Record {
        Record::new(Kind::Undefined, Payload::Empty)
    }

    pub fn make_nan() -> Record {
        Record::new(Kind::Nan, Payload::Empty)
    }

    pub fn make_proc(data: ProcData) -> Record {
        Record::new(Kind::Proc, Payload::Proc(data))
    }

    pub fn make_builtin(name: &'static str, handler: BuiltinFn) -> Record {
        Record::new(Kind::Builtin, Payload::Builtin(BuiltinData { name, handler }))
    }

    // ---- Queries ----

    /// Null, undefined and nan all poison arithmetic the same way.
    pub fn is_nullish(&self) -> bool {
        self.null || matches!(self.kind, Kind::Null | Kind::Undefined | Kind::Nan)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, Kind::Int | Kind::Float | Kind::Char)
    }

    pub fn truthy(&self) -> bool {
        if self.is_nullish() {
            return false;
        }
        match &self.payload {
            Payload::Int(v) => !v.is_zero(),
            Payload::Float(v) => !v.is_zero(),
            Payload::Char(c) => *c != '\0',
            Payload::Str(s) => !s.is_empty(),
            Payload::Object(children) => !children.is_empty(),
            Payload::Tuple(children) => !children.is_empty(),
            _ => true,
        }
    }

    /// Numeric view as an arbitrary-precision integer (floats truncate,
    /// chars read as their scalar value). `None` for non-numerics.
    pub fn as_bigint(&self) -> Option<BigInt> {
        match &self.payload {
            Payload::Int(v) => Some(v.clone()),
            Payload::Float(v) => {
                let (mantissa, scale) = v.clone().with_scale(0).into_bigint_and_exponent();
                debug_assert_eq!(scale, 0);
                Some(mantissa)
            }
            Payload::Char(c) => Some(BigInt::from(*c as u32)),
            _ => None,
        }
    }

    /// Numeric view as an arbitrary-precision float.
    pub fn as_bigdecimal(&self) -> Option<BigDecimal> {
        match &self.payload {
            Payload::Int(v) => Some(BigDecimal::from(v.clone())),
            Payload::Float(v) => Some(v.clone()),
            Payload::Char(c) => Some(BigDecimal::from(BigInt::from(*c as u32))),
            _ => None,
        }
    }

    /// Deep copy: aggregates copy their children into fresh cells; procs
    /// and builtins share their capture; the copy is a plain value again.
    pub fn deep_copy(&self) -> Record {
        let payload = match &self.payload {
            Payload::Object(children) => Payload::Object(object_copy(children)),
            Payload::Tuple(children) => Payload::Tuple(tuple_copy(children)),
            Payload::Struct { class, fields } => Payload::Struct {
                class: Arc::clone(class),
                fields: object_copy(fields),
            },
            other => other.clone(),
        };
        Record {
            kind: self.kind,
            payload,
            null: self.null,
            typed: false,
            readonly: false,
            reference: false,
        }
    }
}

/// Copy keyed children into fresh cells, recursively.
pub fn object_copy(children: &[(String, RecordRef)]) -> Vec<(String, RecordRef)> {
    children
        .iter()
        .map(|(k, v)| (k.clone(), v.lock().deep_copy().into_ref()))
        .collect()
}

/// Copy positional children into fresh cells, recursively.
pub fn tuple_copy(children: &[RecordRef]) -> Vec<RecordRef> {
    children
        .iter()
        .map(|v| v.lock().deep_copy().into_ref())
        .collect()
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.null && self.kind != Kind::Null {
            return write!(f, "null");
        }
        match &self.payload {
            Payload::Int(v) => write!(f, "{}", v),
            Payload::Float(v) => write!(f, "{}", v.normalized()),
            Payload::Char(c) => write!(f, "{}", c),
            Payload::Str(s) => write!(f, "{}", s),
            Payload::Object(children) => {
                write!(f, "{{")?;
                for (i, (k, v)) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v.lock())?;
                }
                write!(f, "}}")
            }
            Payload::Tuple(children) => {
                write!(f, "[")?;
                for (i, v) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v.lock())?;
                }
                write!(f, "]")
            }
            Payload::Struct { class, fields } => {
                let name = match &class.lock().payload {
                    Payload::Type(def) => def.name.clone(),
                    _ => "?".to_string(),
                };
                write!(f, "{} {{", name)?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v.lock())?;
                }
                write!(f, "}}")
            }
            Payload::Type(def) => write!(f, "<class {}>", def.name),
            Payload::Proc(p) => write!(f, "<fun {}>", p.name),
            Payload::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Payload::Empty => match self.kind {
                Kind::Undefined => write!(f, "undefined"),
                Kind::Nan => write!(f, "nan"),
                _ => write!(f, "null"),
            },
        }
    }
}

// ---- Errors ----

#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    #[error("type mismatch: {op} not defined between {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },
    #[error("unary {op} not defined for {kind}")]
    UnsupportedUnary { op: String, kind: &'static str },
    #[error("assignment to readonly binding")]
    Readonly,
    #[error("floating point exception")]
    DivisionByZero,
    #[error("undefined name: {0}")]
    UndefinedName(String),
    #[error("{0} is not callable")]
    NotCallable(&'static str),
    #[error("no attribute '{name}' on {kind}")]
    NoAttribute { kind: &'static str, name: String },
    #[error("{0}")]
    Runtime(String),
    #[error("expected {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },
    #[error("uncaught exception: {}", .0.lock())]
    Thrown(RecordRef),
    #[error("system error: {0}")]
    System(String),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub span: Span,
}

impl EvalError {
    pub fn new(kind: ErrorKind, span: Span) -> EvalError {
        EvalError { kind, span }
    }

    pub fn mismatch(op: impl Into<String>, left: Kind, right: Kind) -> EvalError {
        EvalError::new(
            ErrorKind::TypeMismatch {
                op: op.into(),
                left: left.name(),
                right: right.name(),
            },
            Span::UNKNOWN,
        )
    }

    pub fn runtime(msg: impl Into<String>) -> EvalError {
        EvalError::new(ErrorKind::Runtime(msg.into()), Span::UNKNOWN)
    }

    /// Attach a source span if one has not been recorded yet.
    pub fn at(mut self, span: Span) -> EvalError {
        if self.span == Span::UNKNOWN {
            self.span = span;
        }
        self
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_record_is_nullish_and_falsy() {
        let r = Record::make_null();
        assert_eq!(r.kind, Kind::Null);
        assert!(r.null);
        assert!(r.is_nullish());
        assert!(!r.truthy());
    }

    #[test]
    fn null_flag_is_orthogonal_to_kind() {
        let mut r = Record::make_int(7);
        r.null = true;
        assert_eq!(r.kind, Kind::Int);
        assert!(r.is_nullish());
        assert_eq!(r.to_string(), "null");
    }

    #[test]
    fn truthiness() {
        assert!(Record::make_int(1).truthy());
        assert!(!Record::make_int(0).truthy());
        assert!(Record::make_string("x").truthy());
        assert!(!Record::make_string("").truthy());
        assert!(!Record::make_nan().truthy());
        assert!(!Record::make_undefined().truthy());
        assert!(Record::make_char('a').truthy());
        assert!(!Record::make_tuple(vec![]).truthy());
    }

    #[test]
    fn char_reads_as_its_scalar_value() {
        let c = Record::make_char('A');
        assert_eq!(c.as_bigint(), Some(BigInt::from(65)));
    }

    #[test]
    fn float_truncates_to_bigint() {
        let f = Record::make_float("2.9".parse().unwrap());
        assert_eq!(f.as_bigint(), Some(BigInt::from(2)));
    }

    #[test]
    fn deep_copy_detaches_aggregate_children() {
        let child = Record::make_int(1).into_ref();
        let tuple = Record::make_tuple(vec![Arc::clone(&child)]);
        let copy = tuple.deep_copy();
        let Payload::Tuple(children) = &copy.payload else {
            panic!("copy lost its kind");
        };
        assert!(!Arc::ptr_eq(&children[0], &child));
        // Mutating the original child must not leak into the copy.
        child.lock().payload = Payload::Int(BigInt::from(99));
        let Payload::Int(v) = &children[0].lock().payload.clone() else {
            panic!()
        };
        assert_eq!(*v, BigInt::from(1));
    }

    #[test]
    fn deep_copy_clears_binding_flags() {
        let mut r = Record::make_int(5);
        r.typed = true;
        r.readonly = true;
        r.reference = true;
        let copy = r.deep_copy();
        assert!(!copy.typed && !copy.readonly && !copy.reference);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Record::make_int(42).to_string(), "42");
        assert_eq!(Record::make_string("hi").to_string(), "hi");
        assert_eq!(Record::make_nan().to_string(), "nan");
        assert_eq!(Record::make_undefined().to_string(), "undefined");
        let t = Record::make_tuple(vec![
            Record::make_int(1).into_ref(),
            Record::make_string("a").into_ref(),
        ]);
        assert_eq!(t.to_string(), "[1, a]");
    }

    #[test]
    fn display_normalizes_floats() {
        let f = Record::make_float("2.5000".parse().unwrap());
        assert_eq!(f.to_string(), "2.5");
    }
}
