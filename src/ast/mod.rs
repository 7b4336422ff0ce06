use serde::{Deserialize, Serialize};

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Identifies one node of the tree for the opcode tape: `Ls`, `Catch` and
/// `Label` operands carry a `NodeId` instead of a raw node pointer.
/// Assigned monotonically by the parser, unique within one `Module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const UNKNOWN: NodeId = NodeId(u32::MAX);

    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

// ---- Core AST types ----

/// A complete parsed module: top-level statements and declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub body: Vec<Stmt>,
    #[serde(skip)]
    pub source: Option<String>,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `var a = 1` / `final pi = 3.14` / `var n: int = 0`
    Var(VarDecl),

    /// `var {a, b, c} = expr` — one evaluation, one binding per name
    VarSet {
        names: Vec<String>,
        init: Expr,
        #[serde(skip)]
        span: Span,
    },

    Fun(FunDecl),

    Class(ClassDecl),

    If(IfStmt),

    For(ForStmt),

    /// `try { ... } catch (e: T) { ... }`
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        #[serde(skip)]
        span: Span,
    },

    Return {
        value: Option<Expr>,
        #[serde(skip)]
        span: Span,
    },

    Throw {
        value: Expr,
        #[serde(skip)]
        span: Span,
    },

    Break {
        label: Option<String>,
        #[serde(skip)]
        span: Span,
    },

    Continue {
        label: Option<String>,
        #[serde(skip)]
        span: Span,
    },

    /// Bare `{ ... }` block — its own lexical scope
    Block {
        body: Block,
        #[serde(skip)]
        span: Span,
    },

    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var(d) => d.span,
            Stmt::VarSet { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Break { span, .. }
            | Stmt::Continue { span, .. }
            | Stmt::Block { span, .. } => *span,
            Stmt::Fun(f) => f.span,
            Stmt::Class(c) => c.span,
            Stmt::If(i) => i.span,
            Stmt::For(f) => f.span,
            Stmt::Expr(e) => e.span,
        }
    }
}

/// One variable slot declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    /// Declared static type, if any — locks the record's kind.
    pub ty: Option<String>,
    /// `final` binding: assignment after initialization is an error.
    pub readonly: bool,
    pub init: Option<Expr>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunDecl {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    #[serde(skip)]
    pub span: Span,
}

/// A user annotation attached to a class or member: `@trace(level)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub id: NodeId,
    pub name: String,
    /// Generic parameter names: `class Box<T, U>`
    pub generics: Vec<String>,
    /// Declared base class: `class Child is Parent`
    pub heritage: Option<String>,
    pub notes: Vec<Note>,
    pub members: Vec<Member>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Member {
    /// Property: per-instance slot with optional initializer
    Var(VarDecl),
    /// Method; operator-overload methods are named by the operator symbol
    Fun(FunDecl),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub cond: Expr,
    pub then: Block,
    pub otherwise: Option<Box<Else>>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Else {
    /// `else if ...` — continues the chain, shares the chain's landing pad
    If(IfStmt),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStmt {
    pub id: NodeId,
    /// `outer: for (...)` — target for labeled break/continue
    pub label: Option<String>,
    pub init: Option<Box<Stmt>>,
    pub cond: Option<Expr>,
    pub step: Option<Expr>,
    pub body: Block,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub id: NodeId,
    pub param: String,
    /// Declared catch type; `None` catches everything.
    pub ty: Option<String>,
    pub body: Block,
    #[serde(skip)]
    pub span: Span,
}

// ---- Expressions ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    #[serde(skip)]
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal, kept as source digits — parsed to a bignum at eval
    Int(String),
    /// Float literal, kept as source digits
    Float(String),
    Char(char),
    Str(String),
    Null,
    Undefined,
    Nan,
    Ident(String),

    Tuple(Vec<Expr>),
    Object(Vec<(String, Expr)>),

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Attr {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Block,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    /// Surface symbol — used for operator-overload method lookup and in
    /// type errors.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "\\",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
}

impl AssignOp {
    /// The binary operator a compound assignment folds through, if any.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::FloorDiv => Some(BinOp::FloorDiv),
            AssignOp::Rem => Some(BinOp::Rem),
            AssignOp::Shl => Some(BinOp::Shl),
            AssignOp::Shr => Some(BinOp::Shr),
            AssignOp::BitAnd => Some(BinOp::BitAnd),
            AssignOp::BitOr => Some(BinOp::BitOr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge_takes_extremes() {
        let a = Span { start: 5, end: 10 };
        let b = Span { start: 2, end: 15 };
        assert_eq!(a.merge(b), Span { start: 2, end: 15 });
    }

    #[test]
    fn span_merge_non_overlapping() {
        let a = Span { start: 0, end: 5 };
        let b = Span { start: 10, end: 20 };
        assert_eq!(a.merge(b), Span { start: 0, end: 20 });
    }

    #[test]
    fn node_id_fits_operand() {
        assert_eq!(NodeId(7).as_i64(), 7);
        assert_eq!(NodeId(0).as_i64(), 0);
    }

    #[test]
    fn assign_op_binary_mapping() {
        assert_eq!(AssignOp::Set.binary(), None);
        assert_eq!(AssignOp::Add.binary(), Some(BinOp::Add));
        assert_eq!(AssignOp::FloorDiv.binary(), Some(BinOp::FloorDiv));
        assert_eq!(AssignOp::Shl.binary(), Some(BinOp::Shl));
    }

    #[test]
    fn operator_symbols() {
        assert_eq!(BinOp::FloorDiv.symbol(), "\\");
        assert_eq!(BinOp::Pow.symbol(), "**");
        assert_eq!(BinOp::Ne.symbol(), "!=");
        assert_eq!(UnaryOp::BitNot.symbol(), "~");
    }

    #[test]
    fn stmt_span_not_serialized() {
        let stmt = Stmt::Break {
            label: Some("outer".to_string()),
            span: Span { start: 4, end: 15 },
        };
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(!json.contains("span"));
        assert!(json.contains("outer"));
    }

    #[test]
    fn module_source_not_serialized() {
        let module = Module {
            body: vec![],
            source: Some("var x = 1".to_string()),
        };
        let json = serde_json::to_string(&module).unwrap();
        assert!(!json.contains("var x = 1"));
    }
}
