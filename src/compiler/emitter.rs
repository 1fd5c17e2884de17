//! Lowers the AST of one source file into bytecode.
//!
//! Every function body gets its own [`Emitter`]; the emitters of one file
//! share a [`CompileUnit`] holding the source text, the interner and the
//! declarations hoisted to the top of the file. Jumps are emitted against
//! labels and patched to instruction indexes by [`Emitter::finish`].
//!
//! Expressions live in `expr.rs`, class bodies in `class.rs`.

use super::chunk::{ClassDecl, ClosureCapture, CodeChunk, DefaultValue, FuncParam, TryRegion, TypeHint, UserFunc};
use super::constant;
use super::error::{CompileError, SourcePos};
use super::walk;
use crate::core::interner::Interner;
use crate::core::value::{Symbol, Val};
use crate::parser::ast::{Catch, Expr, ExprId, Name, Param, Stmt, StmtId, Type};
use crate::parser::lexer::token::Token;
use crate::parser::span::Span;
use crate::vm::opcode::{OpCode, Place};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// State shared by the emitters of one source file.
pub struct CompileUnit<'a> {
    pub(crate) source: &'a [u8],
    pub(crate) file_name: Vec<u8>,
    pub(crate) interner: &'a mut Interner,
    line_starts: Vec<usize>,
    pub(crate) strict_types: bool,
    anonymous_classes: u32,
    /// Top-level functions, declared before the file runs
    pub(crate) functions: Vec<(Rc<UserFunc>, SourcePos)>,
    /// Top-level classes, linked before the file runs when their parents allow it
    pub(crate) classes: Vec<Rc<ClassDecl>>,
}

impl<'a> CompileUnit<'a> {
    pub fn new(source: &'a [u8], file_name: &[u8], interner: &'a mut Interner) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            file_name: file_name.to_vec(),
            interner,
            line_starts,
            strict_types: false,
            anonymous_classes: 0,
            functions: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub(crate) fn position(&self, offset: usize) -> SourcePos {
        let line = self.line_starts.partition_point(|&start| start <= offset).max(1);
        SourcePos {
            line: line as u32,
            column: (offset - self.line_starts[line - 1] + 1) as u32,
        }
    }

    pub(crate) fn text(&self, span: Span) -> &'a [u8] {
        let source: &'a [u8] = self.source;
        let end = span.end.min(source.len());
        &source[span.start.min(end)..end]
    }

    pub(crate) fn next_anonymous_class(&mut self) -> u32 {
        self.anonymous_classes += 1;
        self.anonymous_classes - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Label(pub(super) u32);

struct LoopScope {
    break_label: Label,
    continue_label: Label,
    /// The loop owns a foreach iterator that must be released when leaving it
    owns_iterator: bool,
    /// Number of enclosing `try` blocks with `finally` when the loop started
    finally_depth: usize,
}

/// Lexical context used by magic constants and class-relative names.
#[derive(Debug, Clone, Default)]
pub(super) struct Scope {
    pub function: Option<Symbol>,
    pub method: Option<Symbol>,
    pub class: Option<ClassScope>,
    pub property: Option<Symbol>,
}

#[derive(Debug, Clone)]
pub(super) struct ClassScope {
    pub name: Symbol,
    pub is_trait: bool,
}

/// What a compiled function body consists of.
#[derive(Clone, Copy)]
pub(super) enum Body<'b, 'ast> {
    Block(&'b [StmtId<'ast>]),
    /// The value of the expression is returned
    Expr(ExprId<'ast>),
    /// The value of the expression is stored into `$this->name`
    StoreProperty(Symbol, ExprId<'ast>),
}

pub(super) struct FunctionSpec<'b, 'ast> {
    pub name: Symbol,
    pub params: &'b [Param<'ast>],
    /// Parameter added when the source declares none (`set` hooks)
    pub implicit_param: Option<(Symbol, Option<TypeHint>)>,
    pub body: Body<'b, 'ast>,
    pub by_ref: bool,
    pub return_type: Option<&'b Type<'ast>>,
    pub is_static: bool,
    pub captures: Vec<(Symbol, bool)>,
    /// Constructor whose modifier-carrying parameters become properties
    pub promote: bool,
    pub scope: Scope,
}

pub(super) struct Emitter<'u, 'a> {
    pub(super) unit: &'u mut CompileUnit<'a>,
    pub(super) chunk: CodeChunk,
    labels: Vec<Option<u32>>,
    locals: HashMap<Symbol, u32>,
    loops: Vec<LoopScope>,
    finally_depth: usize,
    pub(super) iter_depth: u32,
    statics: u32,
    pub(super) scope: Scope,
    /// Declarations at this level are hoisted to the start of the file
    top_level: bool,
    nesting: u32,
    line: u32,
    /// Reads are emitted without diagnostics (isset, empty, `??`)
    pub(super) quiet: bool,
    /// Where a `?->` short-circuit lands for the chain being emitted
    pub(super) chain_end: Option<Label>,
}

impl<'u, 'a> Emitter<'u, 'a> {
    pub(super) fn new(unit: &'u mut CompileUnit<'a>, scope: Scope) -> Self {
        let chunk = CodeChunk {
            strict_types: unit.strict_types,
            ..Default::default()
        };
        Self {
            unit,
            chunk,
            labels: Vec::new(),
            locals: HashMap::new(),
            loops: Vec::new(),
            finally_depth: 0,
            iter_depth: 0,
            statics: 0,
            scope,
            top_level: false,
            nesting: 0,
            line: 0,
            quiet: false,
            chain_end: None,
        }
    }

    // ---- low-level emission -------------------------------------------

    pub(super) fn emit(&mut self, op: OpCode) -> u32 {
        self.chunk.code.push(op);
        self.chunk.lines.push(self.line);
        (self.chunk.code.len() - 1) as u32
    }

    pub(super) fn here(&self) -> u32 {
        self.chunk.code.len() as u32
    }

    pub(super) fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    pub(super) fn bind(&mut self, label: Label) {
        let here = self.here();
        self.labels[label.0 as usize] = Some(here);
    }

    pub(super) fn jump(&mut self, make: fn(u32) -> OpCode, label: Label) {
        self.emit(make(label.0));
    }

    pub(super) fn emit_const(&mut self, val: Val) {
        let op = match val {
            Val::Null => OpCode::Null,
            val => {
                self.chunk.constants.push(val);
                OpCode::Const((self.chunk.constants.len() - 1) as u32)
            }
        };
        self.emit(op);
    }

    pub(super) fn pos(&self, span: Span) -> SourcePos {
        self.unit.position(span.start)
    }

    pub(super) fn mark(&mut self, span: Span) {
        self.line = self.unit.position(span.start).line;
    }

    // ---- names and locals ---------------------------------------------

    pub(super) fn intern(&mut self, bytes: &[u8]) -> Symbol {
        self.unit.interner.intern(bytes)
    }

    pub(super) fn intern_span(&mut self, span: Span) -> Symbol {
        let text = self.unit.text(span);
        self.unit.interner.intern(text)
    }

    /// Name of a `$variable` token without the sigil.
    pub(super) fn variable_token(&mut self, token: &Token) -> Symbol {
        let text = self.unit.text(token.span);
        let text = text.strip_prefix(b"$").unwrap_or(text);
        self.unit.interner.intern(text)
    }

    /// Class, function or constant name with any namespace prefix removed.
    pub(super) fn short_name(&self, span: Span) -> &'a [u8] {
        let text = self.unit.text(span);
        match text.iter().rposition(|b| *b == b'\\') {
            Some(i) => &text[i + 1..],
            None => text,
        }
    }

    pub(super) fn name_symbol(&mut self, name: &Name<'_>) -> Symbol {
        let text = self.short_name(name.span);
        self.unit.interner.intern(text)
    }

    pub(super) fn local(&mut self, name: Symbol) -> u32 {
        if let Some(slot) = self.locals.get(&name) {
            return *slot;
        }
        let slot = self.chunk.local_names.len() as u32;
        self.chunk.local_names.push(Some(name));
        self.locals.insert(name, slot);
        slot
    }

    pub(super) fn temp(&mut self) -> u32 {
        self.chunk.local_names.push(None);
        (self.chunk.local_names.len() - 1) as u32
    }

    pub(super) fn is_this(&self, span: Span) -> bool {
        self.unit.text(span) == b"this"
    }

    // ---- types ----------------------------------------------------------

    pub(super) fn type_hint(&mut self, ty: &Type<'_>) -> TypeHint {
        match ty {
            Type::Simple(name) => {
                let text = self.short_name(name.span);
                match text.to_ascii_lowercase().as_slice() {
                    b"int" => TypeHint::Int,
                    b"float" => TypeHint::Float,
                    b"string" => TypeHint::String,
                    b"bool" => TypeHint::Bool,
                    b"true" => TypeHint::True,
                    b"false" => TypeHint::False,
                    b"array" => TypeHint::Array,
                    b"object" => TypeHint::Object,
                    b"callable" => TypeHint::Callable,
                    b"iterable" => TypeHint::Iterable,
                    b"mixed" => TypeHint::Mixed,
                    b"void" => TypeHint::Void,
                    b"never" => TypeHint::Never,
                    b"null" => TypeHint::Null,
                    b"static" => TypeHint::Static,
                    b"self" => TypeHint::SelfType,
                    b"parent" => TypeHint::Parent,
                    _ => TypeHint::Class(self.unit.interner.intern(text)),
                }
            }
            Type::Nullable(inner) => TypeHint::Nullable(Box::new(self.type_hint(inner))),
            Type::Union(types) => TypeHint::Union(types.iter().map(|t| self.type_hint(t)).collect()),
            Type::Intersection(types) => {
                TypeHint::Intersection(types.iter().map(|t| self.type_hint(t)).collect())
            }
        }
    }

    // ---- finishing ------------------------------------------------------

    pub(super) fn finish(mut self) -> Result<CodeChunk, CompileError> {
        let lines = &self.chunk.lines;
        for (ip, op) in self.chunk.code.iter_mut().enumerate() {
            if let Some(target) = op.jump_target_mut() {
                match self.labels.get(*target as usize).copied().flatten() {
                    Some(pos) => *target = pos,
                    None => {
                        return Err(CompileError::UndefinedLabel {
                            label: *target,
                            at: SourcePos {
                                line: lines.get(ip).copied().unwrap_or(0),
                                column: 0,
                            },
                        });
                    }
                }
            }
        }
        Ok(self.chunk)
    }

    // ---- functions --------------------------------------------------------

    /// Compiles the statements of a file into its `{main}` function.
    pub(super) fn compile_main(
        unit: &'u mut CompileUnit<'a>,
        statements: &[StmtId<'_>],
    ) -> Result<Rc<UserFunc>, CompileError> {
        let name = unit.interner.intern(b"{main}");
        let mut emitter = Emitter::new(unit, Scope::default());
        emitter.top_level = true;
        emitter.chunk.name = name;
        emitter.emit_stmts(statements)?;
        emitter.emit(OpCode::Null);
        emitter.emit(OpCode::Return);
        let statics = emitter.statics as usize;
        let chunk = emitter.finish()?;
        Ok(Rc::new(UserFunc {
            name,
            params: Vec::new(),
            uses: Vec::new(),
            chunk: Rc::new(chunk),
            is_static: false,
            is_generator: false,
            returns_ref: false,
            return_type: None,
            statics: RefCell::new(vec![None; statics]),
        }))
    }

    pub(super) fn compile_function(
        &mut self,
        spec: FunctionSpec<'_, '_>,
    ) -> Result<Rc<UserFunc>, CompileError> {
        let return_type = spec.return_type.map(|t| self.type_hint(t));
        let mut sub = Emitter::new(&mut *self.unit, spec.scope);
        sub.chunk.name = spec.name;

        let mut params = Vec::with_capacity(spec.params.len());
        for param in spec.params {
            sub.mark(param.span);
            let name = sub.variable_token(param.name);
            if sub.locals.contains_key(&name) {
                return Err(CompileError::Duplicate {
                    what: "parameter",
                    name: format!("${}", sub.unit.interner.display(name)),
                    at: sub.pos(param.span),
                });
            }
            sub.local(name);
            let default = param.default.map(|d| match constant::fold(sub.unit.source, d) {
                Some(v) => DefaultValue::Const(v),
                None => DefaultValue::Expr,
            });
            params.push(FuncParam {
                name,
                by_ref: param.by_ref,
                param_type: param.ty.map(|t| sub.type_hint(t)),
                is_variadic: param.variadic,
                default,
            });
        }
        if params.is_empty()
            && let Some((name, ty)) = spec.implicit_param
        {
            sub.local(name);
            params.push(FuncParam {
                name,
                by_ref: false,
                param_type: ty,
                is_variadic: false,
                default: None,
            });
        }

        let uses: Vec<ClosureCapture> = spec
            .captures
            .iter()
            .map(|(name, by_ref)| ClosureCapture {
                name: *name,
                slot: sub.local(*name),
                by_ref: *by_ref,
            })
            .collect();

        for (index, param) in spec.params.iter().enumerate() {
            if let (Some(default), Some(DefaultValue::Expr)) =
                (param.default, params[index].default.as_ref())
            {
                let skip = sub.new_label();
                sub.emit(OpCode::RecvDefault {
                    param: index as u32,
                    skip: skip.0,
                });
                sub.emit_expr(default)?;
                sub.emit(OpCode::AssignLocal(index as u32));
                sub.emit(OpCode::Pop);
                sub.bind(skip);
            }
        }

        if spec.promote {
            for (index, param) in spec.params.iter().enumerate() {
                if param.modifiers.is_empty() {
                    continue;
                }
                let name = params[index].name;
                sub.emit(OpCode::LoadThis);
                sub.emit(OpCode::LoadLocal(index as u32));
                sub.emit(OpCode::Assign {
                    place: Place::Prop(name),
                    depth: 0,
                });
                sub.emit(OpCode::Pop);
            }
        }

        let is_generator = match spec.body {
            Body::Block(stmts) => {
                let generator = walk::stmts_yield(stmts);
                sub.emit_stmts(stmts)?;
                generator
            }
            Body::Expr(expr) => {
                sub.mark(expr.span());
                let generator = walk::expr_yields(expr);
                sub.emit_expr(expr)?;
                sub.emit(OpCode::Return);
                generator
            }
            Body::StoreProperty(name, expr) => {
                sub.mark(expr.span());
                sub.emit(OpCode::LoadThis);
                sub.emit_expr(expr)?;
                sub.emit(OpCode::Assign {
                    place: Place::Prop(name),
                    depth: 0,
                });
                sub.emit(OpCode::Pop);
                false
            }
        };
        sub.emit(OpCode::Null);
        sub.emit(OpCode::Return);

        let statics = sub.statics as usize;
        let chunk = sub.finish()?;
        Ok(Rc::new(UserFunc {
            name: spec.name,
            params,
            uses,
            chunk: Rc::new(chunk),
            is_static: spec.is_static,
            is_generator,
            returns_ref: spec.by_ref,
            return_type,
            statics: RefCell::new(vec![None; statics]),
        }))
    }

    // ---- statements -------------------------------------------------------

    pub(super) fn emit_stmts(&mut self, stmts: &[StmtId<'_>]) -> Result<(), CompileError> {
        for stmt in stmts {
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    fn emit_nested(&mut self, stmts: &[StmtId<'_>]) -> Result<(), CompileError> {
        self.nesting += 1;
        self.emit_stmts(stmts)?;
        self.nesting -= 1;
        Ok(())
    }

    fn hoisting(&self) -> bool {
        self.top_level && self.nesting == 0
    }

    fn emit_stmt(&mut self, stmt: &Stmt<'_>) -> Result<(), CompileError> {
        self.mark(stmt.span());
        match stmt {
            Stmt::Echo { exprs, .. } => {
                for expr in exprs.iter() {
                    self.emit_expr(expr)?;
                    self.emit(OpCode::Echo);
                }
            }
            Stmt::InlineHtml { value, .. } => {
                self.emit_const(Val::string(value.to_vec()));
                self.emit(OpCode::Echo);
            }
            Stmt::Expression { expr, .. } => {
                self.emit_expr(expr)?;
                self.emit(OpCode::Pop);
            }
            Stmt::Return { expr, .. } => {
                match expr {
                    Some(e) => self.emit_expr(e)?,
                    None => {
                        self.emit(OpCode::Null);
                    }
                }
                self.emit(OpCode::Return);
            }
            Stmt::If {
                condition,
                then_block,
                else_block,
                ..
            } => {
                let else_label = self.new_label();
                self.emit_expr(condition)?;
                self.jump(OpCode::JmpIfFalse, else_label);
                self.emit_nested(then_block)?;
                match else_block {
                    Some(block) => {
                        let end = self.new_label();
                        self.jump(OpCode::Jmp, end);
                        self.bind(else_label);
                        self.emit_nested(block)?;
                        self.bind(end);
                    }
                    None => self.bind(else_label),
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                let cont = self.new_label();
                let brk = self.new_label();
                self.bind(cont);
                self.emit_expr(condition)?;
                self.jump(OpCode::JmpIfFalse, brk);
                self.emit_loop_body(body, brk, cont, false)?;
                self.jump(OpCode::Jmp, cont);
                self.bind(brk);
            }
            Stmt::DoWhile {
                body, condition, ..
            } => {
                let top = self.new_label();
                let cont = self.new_label();
                let brk = self.new_label();
                self.bind(top);
                self.emit_loop_body(body, brk, cont, false)?;
                self.bind(cont);
                self.emit_expr(condition)?;
                self.jump(OpCode::JmpIfTrue, top);
                self.bind(brk);
            }
            Stmt::For {
                init,
                condition,
                loop_expr,
                body,
                ..
            } => {
                for e in init.iter() {
                    self.emit_expr(e)?;
                    self.emit(OpCode::Pop);
                }
                let top = self.new_label();
                let cont = self.new_label();
                let brk = self.new_label();
                self.bind(top);
                for (i, e) in condition.iter().enumerate() {
                    self.emit_expr(e)?;
                    if i + 1 == condition.len() {
                        self.jump(OpCode::JmpIfFalse, brk);
                    } else {
                        self.emit(OpCode::Pop);
                    }
                }
                self.emit_loop_body(body, brk, cont, false)?;
                self.bind(cont);
                for e in loop_expr.iter() {
                    self.emit_expr(e)?;
                    self.emit(OpCode::Pop);
                }
                self.jump(OpCode::Jmp, top);
                self.bind(brk);
            }
            Stmt::Foreach {
                expr,
                key_var,
                value_var,
                by_ref,
                body,
                ..
            } => self.emit_foreach(expr, *key_var, value_var, *by_ref, body)?,
            Stmt::Switch {
                condition, cases, ..
            } => {
                let subject = self.temp();
                self.emit_expr(condition)?;
                self.emit(OpCode::AssignLocal(subject));
                self.emit(OpCode::Pop);
                let brk = self.new_label();
                let targets: Vec<Label> = cases.iter().map(|_| self.new_label()).collect();
                let mut default = None;
                for (case, target) in cases.iter().zip(&targets) {
                    match case.condition {
                        Some(cond) => {
                            self.emit(OpCode::LoadLocal(subject));
                            self.emit_expr(cond)?;
                            self.emit(OpCode::IsEqual);
                            self.jump(OpCode::JmpIfTrue, *target);
                        }
                        None => default = Some(*target),
                    }
                }
                self.jump(OpCode::Jmp, default.unwrap_or(brk));
                self.loops.push(LoopScope {
                    break_label: brk,
                    continue_label: brk,
                    owns_iterator: false,
                    finally_depth: self.finally_depth,
                });
                for (case, target) in cases.iter().zip(&targets) {
                    self.bind(*target);
                    self.emit_nested(case.body)?;
                }
                self.loops.pop();
                self.bind(brk);
            }
            Stmt::Break { level, span } => self.emit_break(*level, *span, false)?,
            Stmt::Continue { level, span } => self.emit_break(*level, *span, true)?,
            Stmt::Block { statements, .. } => self.emit_stmts(statements)?,
            Stmt::Function {
                name,
                by_ref,
                params,
                return_type,
                body,
                span,
            } => {
                let short = self.short_name(name.span);
                let sym = self.intern(short);
                let func = self.compile_function(FunctionSpec {
                    name: sym,
                    params,
                    implicit_param: None,
                    body: Body::Block(body),
                    by_ref: *by_ref,
                    return_type: *return_type,
                    is_static: false,
                    captures: Vec::new(),
                    promote: false,
                    scope: Scope {
                        function: Some(sym),
                        method: Some(sym),
                        ..Default::default()
                    },
                })?;
                if self.hoisting() {
                    let at = self.pos(*span);
                    self.unit.functions.push((func, at));
                } else {
                    self.chunk.functions.push(func);
                    let idx = (self.chunk.functions.len() - 1) as u32;
                    self.emit(OpCode::DeclareFunction(idx));
                }
            }
            Stmt::Class { .. } | Stmt::Interface { .. } | Stmt::Trait { .. } => {
                let decl = self.compile_class_stmt(stmt)?;
                if self.hoisting() {
                    self.unit.classes.push(decl.clone());
                }
                self.chunk.classes.push(decl);
                let idx = (self.chunk.classes.len() - 1) as u32;
                self.emit(OpCode::DeclareClass(idx));
            }
            Stmt::Try {
                body,
                catches,
                finally,
                ..
            } => self.emit_try(body, catches, *finally)?,
            Stmt::Global { vars, .. } => {
                for var in vars.iter() {
                    if let Expr::Variable { name, .. } = var {
                        let sym = self.intern_span(*name);
                        let slot = self.local(sym);
                        self.emit(OpCode::BindGlobal { slot, name: sym });
                    }
                }
            }
            Stmt::Static { vars, .. } => {
                for var in vars.iter() {
                    let Expr::Variable { name, span } = var.var else {
                        continue;
                    };
                    if self.is_this(*name) {
                        return Err(CompileError::invalid(
                            "Cannot use $this as static variable",
                            self.pos(*span),
                        ));
                    }
                    let sym = self.intern_span(*name);
                    let slot = self.local(sym);
                    let index = self.statics;
                    self.statics += 1;
                    let skip = self.new_label();
                    self.emit(OpCode::StaticInit {
                        slot,
                        index,
                        skip: skip.0,
                    });
                    match var.default {
                        Some(d) => self.emit_expr(d)?,
                        None => {
                            self.emit(OpCode::Null);
                        }
                    }
                    self.emit(OpCode::StaticBind { slot, index });
                    self.bind(skip);
                }
            }
            Stmt::Unset { vars, .. } => {
                for var in vars.iter() {
                    self.emit_unset(var)?;
                }
            }
            Stmt::Const { consts, .. } => {
                for c in consts.iter() {
                    let name = self.intern_span(c.name.span);
                    self.emit_expr(c.value)?;
                    self.emit(OpCode::DeclareConst(name));
                }
            }
            Stmt::Declare { body, .. } => self.emit_stmts(body)?,
            Stmt::Namespace { body, .. } => {
                if let Some(b) = body {
                    self.emit_stmts(b)?;
                }
            }
            Stmt::Use { .. } | Stmt::Nop { .. } => {}
            Stmt::Error { span } => {
                return Err(CompileError::invalid("Invalid statement", self.pos(*span)));
            }
        }
        Ok(())
    }

    fn emit_loop_body(
        &mut self,
        body: &[StmtId<'_>],
        break_label: Label,
        continue_label: Label,
        owns_iterator: bool,
    ) -> Result<(), CompileError> {
        self.loops.push(LoopScope {
            break_label,
            continue_label,
            owns_iterator,
            finally_depth: self.finally_depth,
        });
        self.emit_nested(body)?;
        self.loops.pop();
        Ok(())
    }

    fn emit_break(
        &mut self,
        level: Option<ExprId<'_>>,
        span: Span,
        is_continue: bool,
    ) -> Result<(), CompileError> {
        let keyword = if is_continue { "continue" } else { "break" };
        let depth = match level {
            None => 1,
            Some(Expr::Integer { value, .. }) => match constant::parse_int_literal(value) {
                Val::Int(n) if n >= 1 => n as u32,
                _ => 0,
            },
            Some(_) => 0,
        };
        if depth == 0 || depth as usize > self.loops.len() {
            return Err(CompileError::InvalidBreak {
                keyword,
                depth,
                at: self.pos(span),
            });
        }
        let target_index = self.loops.len() - depth as usize;
        for exited in self.loops[target_index + 1..].iter().rev() {
            if exited.owns_iterator {
                self.chunk.code.push(OpCode::IterFree);
                self.chunk.lines.push(self.line);
            }
        }
        let target = &self.loops[target_index];
        let (label, crosses_finally) = (
            if is_continue {
                target.continue_label
            } else {
                target.break_label
            },
            target.finally_depth < self.finally_depth,
        );
        if crosses_finally {
            self.jump(OpCode::JmpFinally, label);
        } else {
            self.jump(OpCode::Jmp, label);
        }
        Ok(())
    }

    fn emit_foreach(
        &mut self,
        subject: ExprId<'_>,
        key_var: Option<ExprId<'_>>,
        value_var: ExprId<'_>,
        by_ref: bool,
        body: &[StmtId<'_>],
    ) -> Result<(), CompileError> {
        if by_ref && self.is_place(subject) {
            let place = self.emit_place(subject)?;
            self.emit(OpCode::MakeRef {
                place: place.place,
                depth: place.depth,
            });
        } else {
            self.emit_expr(subject)?;
        }
        let end = self.new_label();
        let body_label = self.new_label();
        let cont = self.new_label();
        let brk = self.new_label();
        self.emit(OpCode::IterInit { end: end.0, by_ref });
        self.iter_depth += 1;
        self.bind(body_label);

        if by_ref {
            let place = self.emit_place(value_var)?;
            self.emit(OpCode::IterValue);
            self.emit(OpCode::AssignRef {
                place: place.place,
                depth: place.depth,
            });
            self.emit(OpCode::Pop);
        } else {
            self.emit_assign_from(value_var, OpCode::IterValue)?;
        }
        if let Some(key) = key_var {
            self.emit_assign_from(key, OpCode::IterKey)?;
        }

        self.emit_loop_body(body, brk, cont, true)?;
        self.iter_depth -= 1;
        self.bind(cont);
        self.jump(OpCode::IterNext, body_label);
        self.bind(brk);
        self.emit(OpCode::IterFree);
        self.bind(end);
        Ok(())
    }

    /// Stores the value produced by `source` (an instruction pushing one
    /// value) into `target`, which may be a destructuring pattern.
    fn emit_assign_from(&mut self, target: ExprId<'_>, source: OpCode) -> Result<(), CompileError> {
        match target {
            Expr::Variable { name, .. } if !self.is_this(*name) => {
                let sym = self.intern_span(*name);
                let slot = self.local(sym);
                self.emit(source);
                self.emit(OpCode::AssignLocal(slot));
                self.emit(OpCode::Pop);
            }
            Expr::Array { items, .. } => {
                let tmp = self.temp();
                self.emit(source);
                self.emit(OpCode::AssignLocal(tmp));
                self.emit(OpCode::Pop);
                self.emit_destructure(tmp, items)?;
            }
            _ => {
                let place = self.emit_place(target)?;
                self.emit(source);
                self.emit(OpCode::Assign {
                    place: place.place,
                    depth: place.depth,
                });
                self.emit(OpCode::Pop);
            }
        }
        Ok(())
    }

    fn emit_try(
        &mut self,
        body: &[StmtId<'_>],
        catches: &[Catch<'_>],
        finally: Option<&[StmtId<'_>]>,
    ) -> Result<(), CompileError> {
        let region = self.chunk.try_regions.len();
        self.chunk.try_regions.push(TryRegion {
            start: self.here(),
            try_end: 0,
            catches: Vec::new(),
            protected_end: 0,
            finally: None,
            finally_end: 0,
            iter_depth: self.iter_depth,
        });
        let after = self.new_label();
        if finally.is_some() {
            self.finally_depth += 1;
        }

        self.emit_nested(body)?;
        self.jump(OpCode::Jmp, after);
        self.chunk.try_regions[region].try_end = self.here();

        for catch in catches {
            let mut types = Vec::with_capacity(catch.types.len());
            for ty in catch.types {
                let text = self.short_name(ty.span);
                types.push(self.unit.interner.intern_lower(text));
            }
            let target = self.here();
            self.chunk.try_regions[region]
                .catches
                .push(super::chunk::CatchHandler { types, target });
            self.mark(catch.span);
            match catch.var {
                Some(var) => {
                    let sym = self.variable_token(var);
                    let slot = self.local(sym);
                    self.emit(OpCode::AssignLocal(slot));
                    self.emit(OpCode::Pop);
                }
                None => {
                    self.emit(OpCode::Pop);
                }
            }
            self.emit_nested(catch.body)?;
            self.jump(OpCode::Jmp, after);
        }
        self.chunk.try_regions[region].protected_end = self.here();

        match finally {
            Some(stmts) => {
                self.finally_depth -= 1;
                self.bind(after);
                self.chunk.try_regions[region].finally = Some(self.here());
                self.emit_nested(stmts)?;
                self.emit(OpCode::FinallyEnd(region as u32));
                self.chunk.try_regions[region].finally_end = self.here();
            }
            None => {
                let end = self.here();
                self.chunk.try_regions[region].finally_end = end;
                self.bind(after);
            }
        }
        Ok(())
    }

    fn emit_unset(&mut self, var: ExprId<'_>) -> Result<(), CompileError> {
        match var {
            Expr::Variable { name, span } if self.is_this(*name) => Err(CompileError::invalid(
                "Cannot unset $this",
                self.pos(*span),
            )),
            _ if self.is_place(var) => {
                let place = self.emit_place(var)?;
                self.emit(OpCode::Unset {
                    place: place.place,
                    depth: place.depth,
                });
                Ok(())
            }
            _ => Err(CompileError::invalid(
                "Cannot unset the result of an expression",
                self.pos(var.span()),
            )),
        }
    }

    // ---- closures ---------------------------------------------------------

    /// Compiles a closure or arrow function body and emits the instructions
    /// creating the closure object.
    pub(super) fn emit_closure(
        &mut self,
        expr: &Expr<'_>,
    ) -> Result<(), CompileError> {
        let (is_static, by_ref, params, return_type, body, captures) = match expr {
            Expr::Closure {
                is_static,
                by_ref,
                params,
                uses,
                return_type,
                body,
                ..
            } => {
                let mut captures = Vec::with_capacity(uses.len());
                for u in uses.iter() {
                    let sym = self.variable_token(u.var);
                    if self.unit.text(u.var.span) == b"$this" {
                        return Err(CompileError::invalid(
                            "Cannot use $this as lexical variable",
                            self.pos(u.span),
                        ));
                    }
                    captures.push((sym, u.by_ref));
                }
                (*is_static, *by_ref, *params, *return_type, Body::Block(*body), captures)
            }
            Expr::ArrowFunction {
                is_static,
                by_ref,
                params,
                return_type,
                expr: inner,
                ..
            } => {
                let mut captures = Vec::new();
                let param_names: Vec<&[u8]> = params
                    .iter()
                    .map(|p| {
                        let text = self.unit.text(p.name.span);
                        text.strip_prefix(b"$").unwrap_or(text)
                    })
                    .collect();
                for span in walk::free_variables(self.unit.source, inner) {
                    let text = self.unit.text(span);
                    if param_names.contains(&text) {
                        continue;
                    }
                    captures.push((self.intern(text), false));
                }
                (*is_static, *by_ref, *params, *return_type, Body::Expr(*inner), captures)
            }
            _ => return Err(CompileError::invalid("Expected a closure", self.pos(expr.span()))),
        };

        let name = self.intern(b"{closure}");
        let mut scope = self.scope.clone();
        scope.function = Some(name);
        if let Some(class) = &scope.class {
            let class_name = self.unit.interner.display(class.name).into_owned();
            scope.method = Some(self.intern(format!("{class_name}::{{closure}}").as_bytes()));
        } else {
            scope.method = Some(name);
        }
        let func = self.compile_function(FunctionSpec {
            name,
            params,
            implicit_param: None,
            body,
            by_ref,
            return_type,
            is_static,
            captures: captures.clone(),
            promote: false,
            scope,
        })?;
        self.chunk.functions.push(func);
        let index = (self.chunk.functions.len() - 1) as u32;

        for (name, by_ref) in &captures {
            let slot = self.local(*name);
            if *by_ref {
                self.emit(OpCode::MakeRef {
                    place: Place::Local(slot),
                    depth: 0,
                });
            } else {
                self.emit(OpCode::LoadLocal(slot));
            }
        }
        self.emit(OpCode::MakeClosure {
            func: index,
            captures: captures.len() as u16,
        });
        Ok(())
    }
}

/// Scans for `declare(strict_types=1)` among the leading statements.
pub(super) fn declares_strict_types(source: &[u8], statements: &[StmtId<'_>]) -> bool {
    statements.iter().any(|stmt| match stmt {
        Stmt::Declare { declares, .. } => declares.iter().any(|d| {
            d.key.text(source).eq_ignore_ascii_case(b"strict_types")
                && matches!(constant::fold(source, d.value), Some(Val::Int(1)))
        }),
        _ => false,
    })
}
