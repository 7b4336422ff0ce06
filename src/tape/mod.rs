//! Opcode tape builder: linearizes a node tree into a flat instruction
//! tape for the tape-interpreting backend.
//!
//! The tape is an appendable vector of cells. A cell is either an opcode
//! or a raw operand following its opcode. Forward targets are reserved at
//! emit time and overwritten once known; `Ent` always reserves its two
//! slot-accounting operands the same way. Operands are plain i64: tape
//! indices for jump targets, node ids for `Ls`/`Catch`/`Label`/`Pack`.

use crate::ast::{Block, Else, ForStmt, IfStmt, Member, Module, Stmt, VarDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    /// Scope entry; followed by (initial slot offset, slot count).
    Ent,
    /// Scope exit.
    Lev,
    /// Load the immediate operand that follows.
    Imm,
    Push,
    Pop,
    /// Unconditional jump to the tape index in the operand.
    Jmp,
    /// Jump if the last loaded value is falsy.
    Jz,
    /// Store the pushed value into the slot named by the preceding `Imm`.
    Psave,
    /// Evaluate the subtree named by the node-id operand.
    Ls,
    /// Exception dispatch point; operand names the catch clause node.
    Catch,
    /// Protected-region entry.
    Tent,
    /// Protected-region exit.
    Tlev,
    /// Names a labeled loop; operand is the loop's node id.
    Label,
    /// Package the declaration named by the node-id operand into a value.
    Pack,
    Throw,
    Ret,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::Ent => "ent",
            Op::Lev => "lev",
            Op::Imm => "imm",
            Op::Push => "push",
            Op::Pop => "pop",
            Op::Jmp => "jmp",
            Op::Jz => "jz",
            Op::Psave => "psave",
            Op::Ls => "ls",
            Op::Catch => "catch",
            Op::Tent => "tent",
            Op::Tlev => "tlev",
            Op::Label => "label",
            Op::Pack => "pack",
            Op::Throw => "throw",
            Op::Ret => "ret",
        }
    }

    /// How many operand cells follow this opcode on the tape.
    pub fn operand_count(self) -> usize {
        match self {
            Op::Ent => 2,
            Op::Imm | Op::Jmp | Op::Jz | Op::Ls | Op::Catch | Op::Label | Op::Pack => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Op(Op),
    Operand(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("break outside of a loop")]
    BreakOutsideLoop,
    #[error("continue outside of a loop")]
    ContinueOutsideLoop,
    #[error("no enclosing loop labeled '{0}'")]
    UnknownLabel(String),
}

/// A finished tape.
#[derive(Debug)]
pub struct Program {
    cells: Vec<Cell>,
}

impl Program {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Human-readable listing, one opcode (with operands) per line.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < self.cells.len() {
            match self.cells[i] {
                Cell::Op(op) => {
                    out.push_str(&format!("{i:04} {}", op.mnemonic()));
                    for k in 0..op.operand_count() {
                        if let Some(Cell::Operand(v)) = self.cells.get(i + 1 + k) {
                            out.push_str(&format!(" {v}"));
                        }
                    }
                    out.push('\n');
                    i += 1 + op.operand_count();
                }
                Cell::Operand(v) => {
                    // only reachable on a malformed tape
                    out.push_str(&format!("{i:04} ?operand {v}\n"));
                    i += 1;
                }
            }
        }
        out
    }
}

/// Build the tape for a whole module. The module body is itself a scope.
pub fn build(module: &Module) -> Result<Program, BuildError> {
    let mut b = Builder {
        cells: Vec::new(),
        n_slots: 0,
        checkpoints: Vec::new(),
        loops: Vec::new(),
    };
    let scope = b.enter_scope();
    b.block(&module.body)?;
    b.leave_scope(scope);
    Ok(Program { cells: b.cells })
}

/// Per-loop bookkeeping: where `continue` lands, and the `break` jump
/// operands waiting for the exit pad. An explicit stack replaces walking
/// the node tree's parent chain to find the loop a label names.
struct LoopFrame {
    label: Option<String>,
    cond_pad: usize,
    break_patches: Vec<usize>,
}

/// Scope bookkeeping: where the reserved `Ent` operands sit and the slot
/// counter to restore, so sibling scopes reuse slot numbers.
struct ScopeMark {
    operand_at: usize,
    saved_slots: i64,
}

struct Builder {
    cells: Vec<Cell>,
    n_slots: i64,
    checkpoints: Vec<i64>,
    loops: Vec<LoopFrame>,
}

impl Builder {
    // ---- Emission primitives ----

    fn emit(&mut self, op: Op) -> usize {
        let at = self.cells.len();
        self.cells.push(Cell::Op(op));
        at
    }

    fn operand(&mut self, v: i64) -> usize {
        let at = self.cells.len();
        self.cells.push(Cell::Operand(v));
        at
    }

    fn reserve(&mut self) -> usize {
        self.operand(-1)
    }

    fn patch(&mut self, at: usize, v: i64) {
        self.cells[at] = Cell::Operand(v);
    }

    fn here(&self) -> usize {
        self.cells.len()
    }

    /// Post-incremented slot claim, per declaration.
    fn claim_slot(&mut self) -> i64 {
        let slot = self.n_slots;
        self.n_slots += 1;
        slot
    }

    fn enter_scope(&mut self) -> ScopeMark {
        self.emit(Op::Ent);
        let operand_at = self.reserve();
        self.reserve();
        self.checkpoints.push(self.n_slots);
        ScopeMark {
            operand_at,
            saved_slots: self.n_slots,
        }
    }

    fn leave_scope(&mut self, mark: ScopeMark) {
        let count = self.n_slots - mark.saved_slots;
        self.patch(mark.operand_at, mark.saved_slots);
        self.patch(mark.operand_at + 1, count);
        self.n_slots = self.checkpoints.pop().unwrap_or(0);
        self.emit(Op::Lev);
    }

    // ---- Statements ----

    fn block(&mut self, body: &Block) -> Result<(), BuildError> {
        for stmt in body {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn scoped_block(&mut self, body: &Block) -> Result<(), BuildError> {
        let mark = self.enter_scope();
        self.block(body)?;
        self.leave_scope(mark);
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), BuildError> {
        match stmt {
            Stmt::Var(decl) => self.var_decl(decl),

            Stmt::VarSet { names, init, .. } => {
                // one evaluation, one claim sequence per name
                self.emit(Op::Ls);
                self.operand(init.id.as_i64());
                self.emit(Op::Push);
                for _ in names {
                    let slot = self.claim_slot();
                    self.emit(Op::Imm);
                    self.operand(slot);
                    self.emit(Op::Psave);
                }
                self.emit(Op::Pop);
                Ok(())
            }

            Stmt::Fun(f) => {
                self.claim_slot();
                self.emit(Op::Pack);
                self.operand(f.id.as_i64());
                let skip = {
                    self.emit(Op::Jmp);
                    self.reserve()
                };
                let mark = self.enter_scope();
                for _ in &f.params {
                    self.claim_slot();
                }
                self.block(&f.body)?;
                self.leave_scope(mark);
                let after = self.here() as i64;
                self.patch(skip, after);
                Ok(())
            }

            Stmt::Class(c) => {
                self.claim_slot();
                self.emit(Op::Pack);
                self.operand(c.id.as_i64());
                let skip = {
                    self.emit(Op::Jmp);
                    self.reserve()
                };
                let mark = self.enter_scope();
                for _ in &c.generics {
                    self.claim_slot();
                }
                if c.heritage.is_some() {
                    self.claim_slot();
                }
                for member in &c.members {
                    match member {
                        Member::Var(prop) => self.var_decl(prop)?,
                        Member::Fun(m) => {
                            self.claim_slot();
                            self.emit(Op::Pack);
                            self.operand(m.id.as_i64());
                            let skip = {
                                self.emit(Op::Jmp);
                                self.reserve()
                            };
                            let method = self.enter_scope();
                            for _ in &m.params {
                                self.claim_slot();
                            }
                            self.block(&m.body)?;
                            self.leave_scope(method);
                            let after = self.here() as i64;
                            self.patch(skip, after);
                        }
                    }
                }
                self.leave_scope(mark);
                let after = self.here() as i64;
                self.patch(skip, after);
                Ok(())
            }

            Stmt::If(stmt) => {
                let mut pad_patches = Vec::new();
                self.if_chain(stmt, &mut pad_patches)?;
                // one landing pad serves the whole else-if chain
                let pad = self.emit(Op::Nop) as i64;
                for at in pad_patches {
                    self.patch(at, pad);
                }
                Ok(())
            }

            Stmt::For(f) => self.for_loop(f),

            Stmt::Try { body, catches, .. } => {
                self.emit(Op::Tent);
                for clause in catches {
                    self.emit(Op::Catch);
                    self.operand(clause.id.as_i64());
                    let skip = {
                        self.emit(Op::Jmp);
                        self.reserve()
                    };
                    let mark = self.enter_scope();
                    // the catch parameter claims the scope's first slot
                    self.claim_slot();
                    self.block(&clause.body)?;
                    self.leave_scope(mark);
                    let after = self.here() as i64;
                    self.patch(skip, after);
                }
                self.scoped_block(body)?;
                self.emit(Op::Tlev);
                Ok(())
            }

            Stmt::Return { value, .. } => {
                if let Some(expr) = value {
                    self.emit(Op::Ls);
                    self.operand(expr.id.as_i64());
                }
                self.emit(Op::Ret);
                Ok(())
            }

            Stmt::Throw { value, .. } => {
                self.emit(Op::Ls);
                self.operand(value.id.as_i64());
                self.emit(Op::Throw);
                Ok(())
            }

            Stmt::Break { label, .. } => {
                self.emit(Op::Jmp);
                let at = self.reserve();
                let frame = self.find_loop(label.as_deref(), true)?;
                frame.break_patches.push(at);
                Ok(())
            }

            Stmt::Continue { label, .. } => {
                let target = {
                    let frame = self.find_loop(label.as_deref(), false)?;
                    frame.cond_pad as i64
                };
                self.emit(Op::Jmp);
                self.operand(target);
                Ok(())
            }

            Stmt::Block { body, .. } => self.scoped_block(body),

            Stmt::Expr(expr) => {
                self.emit(Op::Ls);
                self.operand(expr.id.as_i64());
                Ok(())
            }
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) -> Result<(), BuildError> {
        let slot = self.claim_slot();
        if let Some(init) = &decl.init {
            self.emit(Op::Ls);
            self.operand(init.id.as_i64());
            self.emit(Op::Push);
            self.emit(Op::Imm);
            self.operand(slot);
            self.emit(Op::Psave);
        }
        Ok(())
    }

    fn if_chain(&mut self, stmt: &IfStmt, pad_patches: &mut Vec<usize>) -> Result<(), BuildError> {
        self.emit(Op::Ls);
        self.operand(stmt.cond.id.as_i64());
        self.emit(Op::Jz);
        let jz_at = self.reserve();
        self.scoped_block(&stmt.then)?;
        match &stmt.otherwise {
            None => pad_patches.push(jz_at),
            Some(otherwise) => {
                self.emit(Op::Jmp);
                let jmp_at = self.reserve();
                pad_patches.push(jmp_at);
                // the false branch starts right here
                let else_at = self.here() as i64;
                self.patch(jz_at, else_at);
                match otherwise.as_ref() {
                    Else::If(chained) => self.if_chain(chained, pad_patches)?,
                    Else::Block(block) => self.scoped_block(block)?,
                }
            }
        }
        Ok(())
    }

    fn for_loop(&mut self, f: &ForStmt) -> Result<(), BuildError> {
        if f.label.is_some() {
            self.emit(Op::Label);
            self.operand(f.id.as_i64());
        }
        let mark = self.enter_scope();
        if let Some(init) = &f.init {
            self.stmt(init)?;
        }
        let cond_pad = self.emit(Op::Nop);
        let mut cond_exit = None;
        if let Some(cond) = &f.cond {
            self.emit(Op::Ls);
            self.operand(cond.id.as_i64());
            self.emit(Op::Jz);
            cond_exit = Some(self.reserve());
        }
        self.loops.push(LoopFrame {
            label: f.label.clone(),
            cond_pad,
            break_patches: Vec::new(),
        });
        let body = self.enter_scope();
        let body_result = self.block(&f.body);
        self.leave_scope(body);
        let frame = self.loops.pop().expect("loop frame pushed above");
        body_result?;
        if let Some(step) = &f.step {
            self.emit(Op::Ls);
            self.operand(step.id.as_i64());
        }
        self.emit(Op::Jmp);
        self.operand(cond_pad as i64);
        let exit_pad = self.emit(Op::Nop) as i64;
        if let Some(at) = cond_exit {
            self.patch(at, exit_pad);
        }
        for at in frame.break_patches {
            self.patch(at, exit_pad);
        }
        self.leave_scope(mark);
        Ok(())
    }

    fn find_loop(
        &mut self,
        label: Option<&str>,
        breaking: bool,
    ) -> Result<&mut LoopFrame, BuildError> {
        let index = match label {
            None => {
                if self.loops.is_empty() {
                    return Err(if breaking {
                        BuildError::BreakOutsideLoop
                    } else {
                        BuildError::ContinueOutsideLoop
                    });
                }
                self.loops.len() - 1
            }
            Some(name) => self
                .loops
                .iter()
                .rposition(|f| f.label.as_deref() == Some(name))
                .ok_or_else(|| BuildError::UnknownLabel(name.to_string()))?,
        };
        Ok(&mut self.loops[index])
    }
}
