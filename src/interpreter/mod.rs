//! The tree-walking evaluator.
//!
//! Walks the node tree directly against the record model and a strip of
//! scope frames. Control flow inside a body travels as a `Flow` signal;
//! exceptions travel as `EvalError` results, with `ErrorKind::Thrown`
//! carrying user-thrown records to the nearest matching catch.

use std::sync::Arc;

use num_bigint::BigInt;

use crate::ast::{
    BinOp, Block, CatchClause, Else, Expr, ExprKind, ForStmt, IfStmt, Module, Span, Stmt,
};
use crate::record::{
    set_value, ops, ErrorKind, EvalError, EvalResult, Kind, Payload, ProcData, Record, RecordRef,
};
use crate::runtime::{RuntimeContext, ThreadNode};

pub mod builtins;
pub mod strip;

use strip::Strip;

/// How a statement left its enclosing body.
#[derive(Debug)]
enum Flow {
    Normal,
    Return(RecordRef),
    Break(Option<String>),
    Continue(Option<String>),
}

pub struct Interpreter {
    pub ctx: Arc<RuntimeContext>,
    /// This interpreter's node in the thread tree.
    pub node: Arc<ThreadNode>,
    strip: Strip,
    /// Return-value register: the value of the last evaluated statement.
    pub rax: Option<RecordRef>,
}

impl Interpreter {
    pub fn new(ctx: Arc<RuntimeContext>) -> Interpreter {
        let node = ctx.root();
        Interpreter::with_node(ctx, node)
    }

    /// Interpreter for a spawned thread, rooted at its own tree node.
    pub fn with_node(ctx: Arc<RuntimeContext>, node: Arc<ThreadNode>) -> Interpreter {
        let mut interp = Interpreter {
            ctx,
            node,
            strip: Strip::new(),
            rax: None,
        };
        builtins::install(&mut interp);
        interp
    }

    /// Wrap a fresh record in a shared cell and hand it to the collector.
    pub fn alloc(&self, record: Record) -> RecordRef {
        let cell = record.into_ref();
        self.ctx.gc.push(&cell);
        cell
    }

    pub(crate) fn declare(&mut self, name: impl Into<String>, cell: RecordRef) {
        self.strip.declare(name, cell);
    }

    /// Execute a whole module; the result is the value of the last
    /// statement (the `rax` register), or the early `return` value.
    pub fn run_module(&mut self, module: &Module) -> EvalResult<RecordRef> {
        self.strip.push_frame();
        let flow = self.exec_block(&module.body);
        self.strip.pop_frame();
        match flow {
            Ok(Flow::Return(v)) => Ok(v),
            Ok(_) => Ok(self
                .rax
                .clone()
                .unwrap_or_else(|| self.alloc(Record::make_undefined()))),
            Err(e) => {
                self.node.push_pending(e.clone());
                Err(e)
            }
        }
    }

    // ---- Statements ----

    fn exec_block(&mut self, block: &Block) -> EvalResult<Flow> {
        for stmt in block {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_scoped(&mut self, block: &Block) -> EvalResult<Flow> {
        self.strip.push_frame();
        let flow = self.exec_block(block);
        self.strip.pop_frame();
        flow
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Var(decl) => {
                let cell = self.eval_var_decl(decl)?;
                self.strip.declare(&decl.name, cell);
                Ok(Flow::Normal)
            }

            Stmt::VarSet { names, init, span } => {
                // The right-hand side evaluates exactly once; every name
                // claims a slot against that one value. An object source
                // binds its matching keys.
                let value = self.eval(init)?;
                for name in names {
                    let cell = {
                        let guard = value.lock();
                        match &guard.payload {
                            Payload::Object(children) => children
                                .iter()
                                .find(|(k, _)| k == name)
                                .map(|(_, v)| v.clone()),
                            _ => None,
                        }
                    };
                    let cell = match cell {
                        Some(c) => c,
                        None => {
                            let copy = value.lock().deep_copy();
                            self.alloc(copy)
                        }
                    };
                    self.strip.declare(name, cell);
                }
                let _ = span;
                Ok(Flow::Normal)
            }

            Stmt::Fun(f) => {
                // Declare first so the capture sees the cell — recursion.
                let cell = self.alloc(Record::make_undefined());
                self.strip.declare(&f.name, cell.clone());
                let data = ProcData {
                    name: f.name.clone(),
                    params: f.params.clone(),
                    body: Arc::new(f.body.clone()),
                    captured: self.strip.clone(),
                    this: None,
                };
                *cell.lock() = Record::make_proc(data);
                Ok(Flow::Normal)
            }

            Stmt::Class(c) => {
                let cell = self.alloc(Record::make_undefined());
                self.strip.declare(&c.name, cell.clone());

                let heritage = match &c.heritage {
                    Some(name) => {
                        let base = self.strip.lookup(name).ok_or_else(|| {
                            EvalError::new(ErrorKind::UndefinedName(name.clone()), c.span)
                        })?;
                        if base.lock().kind != Kind::Type {
                            return Err(EvalError::runtime(format!(
                                "heritage '{name}' does not name a class"
                            ))
                            .at(c.span));
                        }
                        Some(base)
                    }
                    None => None,
                };

                let mut notes = Vec::new();
                for note in &c.notes {
                    let mut args = Vec::new();
                    for a in &note.args {
                        args.push(self.eval(a)?);
                    }
                    notes.push((note.name.clone(), args));
                }

                let captured = self.strip.clone();
                let mut properties = Vec::new();
                let mut methods = Vec::new();
                for member in &c.members {
                    match member {
                        crate::ast::Member::Var(v) => properties.push(v.clone()),
                        crate::ast::Member::Fun(f) => methods.push((
                            f.name.clone(),
                            ProcData {
                                name: format!("{}.{}", c.name, f.name),
                                params: f.params.clone(),
                                body: Arc::new(f.body.clone()),
                                captured: captured.clone(),
                                this: None,
                            },
                        )),
                    }
                }

                let def = Arc::new(crate::record::ClassDef {
                    name: c.name.clone(),
                    generics: c.generics.clone(),
                    heritage,
                    properties,
                    methods,
                    captured,
                    notes,
                });
                *cell.lock() = Record::make_type(def);
                Ok(Flow::Normal)
            }

            Stmt::If(stmt) => self.run_if(stmt),

            Stmt::For(f) => {
                self.strip.push_frame();
                let flow = self.run_for(f);
                self.strip.pop_frame();
                flow
            }

            Stmt::Try { body, catches, .. } => self.run_try(body, catches),

            Stmt::Return { value, span } => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => self.alloc(Record::make_undefined()),
                };
                let _ = span;
                self.rax = Some(v.clone());
                Ok(Flow::Return(v))
            }

            Stmt::Throw { value, span } => {
                let v = self.eval(value)?;
                Err(EvalError::new(ErrorKind::Thrown(v), *span))
            }

            Stmt::Break { label, .. } => Ok(Flow::Break(label.clone())),

            Stmt::Continue { label, .. } => Ok(Flow::Continue(label.clone())),

            Stmt::Block { body, .. } => self.exec_scoped(body),

            Stmt::Expr(expr) => {
                let v = self.eval(expr)?;
                self.rax = Some(v);
                Ok(Flow::Normal)
            }
        }
    }

    fn eval_var_decl(&mut self, decl: &crate::ast::VarDecl) -> EvalResult<RecordRef> {
        let mut record = match &decl.init {
            Some(init) => {
                let v = self.eval(init)?;
                let copy = v.lock().deep_copy();
                copy
            }
            None => Record::make_undefined(),
        };
        if let Some(ty) = &decl.ty {
            if decl.init.is_some() {
                check_declared_type(&record, ty).map_err(|e| e.at(decl.span))?;
            }
            record.typed = true;
        }
        if decl.readonly {
            record.readonly = true;
        }
        Ok(self.alloc(record))
    }

    fn run_if(&mut self, stmt: &IfStmt) -> EvalResult<Flow> {
        let cond = self.eval(&stmt.cond)?;
        let truthy = cond.lock().truthy();
        if truthy {
            return self.exec_scoped(&stmt.then);
        }
        match &stmt.otherwise {
            Some(otherwise) => match otherwise.as_ref() {
                Else::If(chained) => self.run_if(chained),
                Else::Block(block) => self.exec_scoped(block),
            },
            None => Ok(Flow::Normal),
        }
    }

    fn run_for(&mut self, f: &ForStmt) -> EvalResult<Flow> {
        if let Some(init) = &f.init {
            match self.exec_stmt(init)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        loop {
            if let Some(cond) = &f.cond {
                let c = self.eval(cond)?;
                let truthy = c.lock().truthy();
                if !truthy {
                    break;
                }
            }
            self.strip.push_frame();
            let flow = self.exec_block(&f.body);
            self.strip.pop_frame();
            match flow? {
                Flow::Normal => {}
                Flow::Continue(label) => {
                    if !label_matches(&label, &f.label) {
                        return Ok(Flow::Continue(label));
                    }
                }
                Flow::Break(label) => {
                    if label_matches(&label, &f.label) {
                        break;
                    }
                    return Ok(Flow::Break(label));
                }
                Flow::Return(v) => return Ok(Flow::Return(v)),
            }
            if let Some(step) = &f.step {
                self.eval(step)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn run_try(&mut self, body: &Block, catches: &[CatchClause]) -> EvalResult<Flow> {
        let result = self.exec_scoped(body);
        let err = match result {
            Ok(flow) => return Ok(flow),
            Err(err) => err,
        };
        // System failures are fatal; no catch sees them.
        if matches!(err.kind, ErrorKind::System(_)) {
            return Err(err);
        }
        let thrown = match &err.kind {
            ErrorKind::Thrown(r) => r.clone(),
            other => self.alloc(Record::make_string(other.to_string())),
        };
        for clause in catches {
            if catch_matches(clause, &thrown) {
                self.strip.push_frame();
                self.strip.declare(&clause.param, thrown.clone());
                let flow = self.exec_block(&clause.body);
                self.strip.pop_frame();
                return flow;
            }
        }
        Err(err)
    }

    // ---- Expressions ----

    pub fn eval(&mut self, expr: &Expr) -> EvalResult<RecordRef> {
        self.eval_inner(expr).map_err(|e| e.at(expr.span))
    }

    fn eval_inner(&mut self, expr: &Expr) -> EvalResult<RecordRef> {
        match &expr.kind {
            ExprKind::Int(digits) => {
                let v = digits
                    .parse::<BigInt>()
                    .map_err(|_| EvalError::runtime("malformed integer literal"))?;
                Ok(self.alloc(Record::make_int(v)))
            }
            ExprKind::Float(digits) => {
                let v = digits
                    .parse()
                    .map_err(|_| EvalError::runtime("malformed float literal"))?;
                Ok(self.alloc(Record::make_float(v)))
            }
            ExprKind::Char(c) => Ok(self.alloc(Record::make_char(*c))),
            ExprKind::Str(s) => Ok(self.alloc(Record::make_string(s.clone()))),
            ExprKind::Null => Ok(self.alloc(Record::make_null())),
            ExprKind::Undefined => Ok(self.alloc(Record::make_undefined())),
            ExprKind::Nan => Ok(self.alloc(Record::make_nan())),

            ExprKind::Ident(name) => self
                .strip
                .lookup(name)
                .ok_or_else(|| EvalError::new(ErrorKind::UndefinedName(name.clone()), expr.span)),

            ExprKind::Tuple(items) => {
                let mut cells = Vec::with_capacity(items.len());
                for item in items {
                    let v = self.eval(item)?;
                    let copy = v.lock().deep_copy();
                    cells.push(self.alloc(copy));
                }
                Ok(self.alloc(Record::make_tuple(cells)))
            }

            ExprKind::Object(pairs) => {
                let mut children = Vec::with_capacity(pairs.len());
                for (key, val) in pairs {
                    let v = self.eval(val)?;
                    let copy = v.lock().deep_copy();
                    children.push((key.clone(), self.alloc(copy)));
                }
                Ok(self.alloc(Record::make_object(children)))
            }

            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand)?;
                let result = {
                    let guard = v.lock();
                    ops::unary(*op, &guard)
                }?;
                Ok(self.alloc(result))
            }

            ExprKind::Binary { op, left, right } => {
                // && and || short-circuit before the matrix sees them
                if *op == BinOp::And {
                    let l = self.eval(left)?;
                    let truthy = l.lock().truthy();
                    if !truthy {
                        return Ok(self.alloc(Record::make_int(0)));
                    }
                    let r = self.eval(right)?;
                    let t = r.lock().truthy();
                    return Ok(self.alloc(Record::make_int(if t { 1 } else { 0 })));
                }
                if *op == BinOp::Or {
                    let l = self.eval(left)?;
                    let truthy = l.lock().truthy();
                    if truthy {
                        return Ok(self.alloc(Record::make_int(1)));
                    }
                    let r = self.eval(right)?;
                    let t = r.lock().truthy();
                    return Ok(self.alloc(Record::make_int(if t { 1 } else { 0 })));
                }
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.binary_op(*op, &l, &r, expr.span)
            }

            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let c = self.eval(cond)?;
                let truthy = c.lock().truthy();
                if truthy {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }

            ExprKind::Assign { op, target, value } => {
                let place = self.eval_place(target)?;
                let val = self.eval(value)?;
                match op.binary() {
                    None => set_value(&place, &val).map_err(|e| e.at(expr.span))?,
                    Some(bop) => {
                        let result = self.binary_op(bop, &place, &val, expr.span)?;
                        set_value(&place, &result).map_err(|e| e.at(expr.span))?;
                    }
                }
                Ok(place)
            }

            ExprKind::Call { callee, args } => {
                let callee_cell = self.eval(callee)?;
                let mut arg_cells = Vec::with_capacity(args.len());
                for a in args {
                    arg_cells.push(self.eval(a)?);
                }
                self.call_value(&callee_cell, arg_cells, expr.span)
            }

            ExprKind::Attr { object, name } => {
                let obj = self.eval(object)?;
                self.attr_get(&obj, name, expr.span)
            }

            ExprKind::Index { object, index } => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                self.index_get(&obj, &idx, expr.span)
            }

            ExprKind::Lambda { params, body } => {
                let data = ProcData {
                    name: "<lambda>".to_string(),
                    params: params.clone(),
                    body: Arc::new(body.clone()),
                    captured: self.strip.clone(),
                    this: None,
                };
                Ok(self.alloc(Record::make_proc(data)))
            }
        }
    }

    /// Resolve an assignment target to its storage cell. Object attribute
    /// and key targets create the slot on first assignment; struct fields
    /// and tuple elements must already exist.
    fn eval_place(&mut self, expr: &Expr) -> EvalResult<RecordRef> {
        match &expr.kind {
            ExprKind::Ident(name) => self
                .strip
                .lookup(name)
                .ok_or_else(|| EvalError::new(ErrorKind::UndefinedName(name.clone()), expr.span)),

            ExprKind::Attr { object, name } => {
                let obj = self.eval(object)?;
                let mut guard = obj.lock();
                let kind = guard.kind;
                match &mut guard.payload {
                    Payload::Object(children) => {
                        if let Some((_, cell)) = children.iter().find(|(k, _)| k == name) {
                            return Ok(cell.clone());
                        }
                        let cell = self.alloc(Record::make_undefined());
                        children.push((name.clone(), cell.clone()));
                        Ok(cell)
                    }
                    Payload::Struct { fields, .. } => fields
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, cell)| cell.clone())
                        .ok_or_else(|| {
                            EvalError::new(
                                ErrorKind::NoAttribute {
                                    kind: kind.name(),
                                    name: name.clone(),
                                },
                                expr.span,
                            )
                        }),
                    _ => Err(EvalError::new(
                        ErrorKind::NoAttribute {
                            kind: kind.name(),
                            name: name.clone(),
                        },
                        expr.span,
                    )),
                }
            }

            ExprKind::Index { object, index } => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                let key = index_key(&idx);
                let mut guard = obj.lock();
                let kind = guard.kind;
                match (&mut guard.payload, key) {
                    (Payload::Tuple(items), IndexKey::Position(i)) => {
                        items.get(i).cloned().ok_or_else(|| {
                            EvalError::runtime(format!("index {i} out of range")).at(expr.span)
                        })
                    }
                    (Payload::Object(children), IndexKey::Key(name)) => {
                        if let Some((_, cell)) = children.iter().find(|(k, _)| k == &name) {
                            return Ok(cell.clone());
                        }
                        let cell = self.alloc(Record::make_undefined());
                        children.push((name, cell.clone()));
                        Ok(cell)
                    }
                    _ => Err(EvalError::mismatch("[]", kind, idx.lock().kind).at(expr.span)),
                }
            }

            _ => Err(EvalError::runtime("invalid assignment target").at(expr.span)),
        }
    }

    /// Binary dispatch with operator overloading: a struct on the left
    /// resolves a method named by the operator's symbol on its class and
    /// calls it with the right operand as sole argument.
    fn binary_op(
        &mut self,
        op: BinOp,
        left: &RecordRef,
        right: &RecordRef,
        span: Span,
    ) -> EvalResult<RecordRef> {
        let struct_method = {
            let guard = left.lock();
            match &guard.payload {
                Payload::Struct { class, .. } => {
                    let class = class.lock();
                    match &class.payload {
                        Payload::Type(def) => Some(def.find_method(op.symbol())),
                        _ => Some(None),
                    }
                }
                _ => None,
            }
        };
        if let Some(found) = struct_method {
            let method = found.ok_or_else(|| {
                EvalError::mismatch(op.symbol(), Kind::Struct, right.lock().kind).at(span)
            })?;
            let bound = ProcData {
                this: Some(left.clone()),
                ..method
            };
            return self.call_proc(&bound, vec![right.clone()], span);
        }

        let result = if Arc::ptr_eq(left, right) {
            let guard = left.lock();
            ops::binary(op, &guard, &guard)
        } else {
            let l = left.lock();
            let r = right.lock();
            ops::binary(op, &l, &r)
        }
        .map_err(|e| e.at(span))?;
        Ok(self.alloc(result))
    }

    fn attr_get(&mut self, obj: &RecordRef, name: &str, span: Span) -> EvalResult<RecordRef> {
        let found = {
            let guard = obj.lock();
            match &guard.payload {
                Payload::Object(children) => children
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, cell)| AttrHit::Cell(cell.clone())),
                Payload::Struct { class, fields } => fields
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, cell)| AttrHit::Cell(cell.clone()))
                    .or_else(|| {
                        let class = class.lock();
                        match &class.payload {
                            Payload::Type(def) => {
                                def.find_method(name).map(AttrHit::Method)
                            }
                            _ => None,
                        }
                    }),
                Payload::Type(def) => def.find_method(name).map(AttrHit::Method),
                _ => None,
            }
        };
        match found {
            Some(AttrHit::Cell(cell)) => Ok(cell),
            Some(AttrHit::Method(method)) => {
                let this = match obj.lock().kind {
                    Kind::Struct => Some(obj.clone()),
                    _ => None,
                };
                let bound = ProcData { this, ..method };
                Ok(self.alloc(Record::make_proc(bound)))
            }
            None => {
                let kind = obj.lock().kind;
                Err(EvalError::new(
                    ErrorKind::NoAttribute {
                        kind: kind.name(),
                        name: name.to_string(),
                    },
                    span,
                ))
            }
        }
    }

    fn index_get(&mut self, obj: &RecordRef, idx: &RecordRef, span: Span) -> EvalResult<RecordRef> {
        let key = index_key(idx);
        let result = {
            let guard = obj.lock();
            match (&guard.payload, &key) {
                (Payload::Tuple(items), IndexKey::Position(i)) => match items.get(*i) {
                    Some(cell) => Ok(Some(cell.clone())),
                    None => Err(EvalError::runtime(format!("index {i} out of range")).at(span)),
                },
                (Payload::Str(s), IndexKey::Position(i)) => match s.chars().nth(*i) {
                    Some(c) => Ok(Some(self.alloc(Record::make_char(c)))),
                    None => Err(EvalError::runtime(format!("index {i} out of range")).at(span)),
                },
                (Payload::Object(children), IndexKey::Key(name)) => {
                    match children.iter().find(|(k, _)| k == name) {
                        Some((_, cell)) => Ok(Some(cell.clone())),
                        None => Err(EvalError::new(
                            ErrorKind::NoAttribute {
                                kind: guard.kind.name(),
                                name: name.clone(),
                            },
                            span,
                        )),
                    }
                }
                _ => Err(EvalError::mismatch("[]", guard.kind, idx.lock().kind).at(span)),
            }
        }?;
        Ok(result.expect("every Ok arm produces a cell"))
    }

    // ---- Calls ----

    pub fn call_value(
        &mut self,
        callee: &RecordRef,
        args: Vec<RecordRef>,
        span: Span,
    ) -> EvalResult<RecordRef> {
        enum Callee {
            Proc(ProcData),
            Builtin(crate::record::BuiltinData),
            Type,
        }
        let target = {
            let guard = callee.lock();
            match &guard.payload {
                Payload::Proc(p) => Callee::Proc(p.clone()),
                Payload::Builtin(b) => Callee::Builtin(b.clone()),
                Payload::Type(_) => Callee::Type,
                _ => {
                    return Err(EvalError::new(
                        ErrorKind::NotCallable(guard.kind.name()),
                        span,
                    ))
                }
            }
        };
        match target {
            Callee::Proc(p) => self.call_proc(&p, args, span),
            Callee::Builtin(b) => (b.handler)(self, args, span),
            Callee::Type => self.instantiate(callee, args, span),
        }
    }

    pub fn call_proc(
        &mut self,
        proc: &ProcData,
        args: Vec<RecordRef>,
        span: Span,
    ) -> EvalResult<RecordRef> {
        if args.len() > proc.params.len() {
            return Err(EvalError::new(
                ErrorKind::Arity {
                    expected: proc.params.len(),
                    got: args.len(),
                },
                span,
            ));
        }
        // The body runs against the strip captured at definition time;
        // the caller's strip is set aside and restored on the way out.
        let mut saved = std::mem::replace(&mut self.strip, proc.captured.clone());
        self.strip.push_frame();
        if let Some(this) = &proc.this {
            self.strip.declare("this", this.clone());
        }
        let mut bind_err = None;
        for (i, param) in proc.params.iter().enumerate() {
            let cell = match args.get(i) {
                Some(arg) => {
                    let mut copy = arg.lock().deep_copy();
                    if let Some(ty) = &param.ty {
                        if !copy.is_nullish() {
                            if let Err(e) = check_declared_type(&copy, ty) {
                                bind_err = Some(e.at(span));
                                break;
                            }
                        }
                        copy.typed = true;
                    }
                    self.alloc(copy)
                }
                None => self.alloc(Record::make_undefined()),
            };
            self.strip.declare(&param.name, cell);
        }
        let result = match bind_err {
            Some(e) => Err(e),
            None => self.exec_block(&proc.body),
        };
        self.strip.pop_frame();
        std::mem::swap(&mut self.strip, &mut saved);
        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(self.alloc(Record::make_undefined())),
        }
    }

    /// Call on a `type` record: build a struct from the class's property
    /// initializers (heritage first), then run its `init` method if any.
    fn instantiate(
        &mut self,
        class_cell: &RecordRef,
        args: Vec<RecordRef>,
        span: Span,
    ) -> EvalResult<RecordRef> {
        let def = {
            let guard = class_cell.lock();
            match &guard.payload {
                Payload::Type(def) => Arc::clone(def),
                _ => unreachable!("instantiate is only called on type records"),
            }
        };
        let mut fields: Vec<(String, RecordRef)> = Vec::new();
        for (prop, captured) in def.all_properties() {
            // Initializers see the strip their class was declared in, not
            // the instantiation site's.
            let mut saved = std::mem::replace(&mut self.strip, captured);
            self.strip.push_frame();
            let cell = self.eval_var_decl(&prop);
            self.strip.pop_frame();
            std::mem::swap(&mut self.strip, &mut saved);
            let cell = cell?;
            match fields.iter_mut().find(|(k, _)| *k == prop.name) {
                // Derived initializer overrides the base one.
                Some((_, existing)) => *existing = cell,
                None => fields.push((prop.name.clone(), cell)),
            }
        }
        let instance = self.alloc(Record::make_struct(class_cell.clone(), fields));
        match def.find_method("init") {
            Some(ctor) => {
                let bound = ProcData {
                    this: Some(instance.clone()),
                    ..ctor
                };
                self.call_proc(&bound, args, span)?;
            }
            None if !args.is_empty() => {
                return Err(EvalError::new(
                    ErrorKind::Arity {
                        expected: 0,
                        got: args.len(),
                    },
                    span,
                ));
            }
            None => {}
        }
        Ok(instance)
    }
}

enum AttrHit {
    Cell(RecordRef),
    Method(ProcData),
}

enum IndexKey {
    Position(usize),
    Key(String),
    Other,
}

fn index_key(idx: &RecordRef) -> IndexKey {
    let guard = idx.lock();
    if guard.is_nullish() {
        return IndexKey::Other;
    }
    match &guard.payload {
        Payload::Str(s) => IndexKey::Key(s.clone()),
        _ => match guard.as_bigint().and_then(|v| num_traits::ToPrimitive::to_usize(&v)) {
            Some(i) => IndexKey::Position(i),
            None => IndexKey::Other,
        },
    }
}

fn label_matches(flow_label: &Option<String>, loop_label: &Option<String>) -> bool {
    match flow_label {
        None => true,
        Some(l) => loop_label.as_deref() == Some(l.as_str()),
    }
}

fn catch_matches(clause: &CatchClause, thrown: &RecordRef) -> bool {
    let ty = match &clause.ty {
        None => return true,
        Some(ty) => ty,
    };
    let guard = thrown.lock();
    match &guard.payload {
        Payload::Struct { class, .. } => {
            let class = class.lock();
            match &class.payload {
                Payload::Type(def) => def.is_named(ty),
                _ => false,
            }
        }
        _ => guard.kind.name() == ty,
    }
}

/// Declared-type check for typed slots and typed parameters. Builtin type
/// names map to kinds; any other name is expected to be a class, matched
/// up the heritage chain.
fn check_declared_type(record: &Record, ty: &str) -> EvalResult<()> {
    let expected = match ty {
        "int" => Some(Kind::Int),
        "float" => Some(Kind::Float),
        "char" => Some(Kind::Char),
        "string" => Some(Kind::Str),
        "object" => Some(Kind::Object),
        "tuple" => Some(Kind::Tuple),
        "type" => Some(Kind::Type),
        "proc" => Some(Kind::Proc),
        _ => None,
    };
    match expected {
        Some(kind) => {
            if record.kind == kind {
                Ok(())
            } else {
                Err(EvalError::mismatch("=", kind, record.kind))
            }
        }
        None => match &record.payload {
            Payload::Struct { class, .. } => {
                let class = class.lock();
                match &class.payload {
                    Payload::Type(def) if def.is_named(ty) => Ok(()),
                    _ => Err(EvalError::runtime(format!(
                        "value is not an instance of {ty}"
                    ))),
                }
            }
            _ => Err(EvalError::runtime(format!(
                "value is not an instance of {ty}"
            ))),
        },
    }
}
