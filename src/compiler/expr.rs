use super::constant;
use super::emitter::{Emitter, Label};
use super::error::CompileError;
use crate::core::value::Val;
use crate::parser::ast::{
    Arg, ArrayItem, AssignOp, BinaryOp, CastKind, Expr, ExprId, MagicConstKind, MatchArm, UnaryOp,
};
use crate::vm::opcode::{ArithOp, CastType, ClassRef, IncDecKind, OpCode, Place, YieldKind};

/// An lvalue whose prefix and keys have been pushed.
#[derive(Debug, Clone, Copy)]
pub(super) struct PlaceRef {
    pub place: Place,
    pub depth: u8,
}

fn is_chain_link(expr: &Expr<'_>) -> bool {
    matches!(
        expr,
        Expr::PropertyFetch { .. }
            | Expr::NullsafePropertyFetch { .. }
            | Expr::MethodCall { .. }
            | Expr::NullsafeMethodCall { .. }
            | Expr::ArrayDimFetch { .. }
    )
}

fn chain_has_nullsafe(expr: &Expr<'_>) -> bool {
    match expr {
        Expr::NullsafePropertyFetch { .. } | Expr::NullsafeMethodCall { .. } => true,
        Expr::PropertyFetch { target, .. } | Expr::MethodCall { target, .. } => {
            chain_has_nullsafe(target)
        }
        Expr::ArrayDimFetch { array, .. } => chain_has_nullsafe(array),
        _ => false,
    }
}

fn arith(op: AssignOp) -> Option<ArithOp> {
    Some(match op {
        AssignOp::Plus => ArithOp::Add,
        AssignOp::Minus => ArithOp::Sub,
        AssignOp::Mul => ArithOp::Mul,
        AssignOp::Div => ArithOp::Div,
        AssignOp::Mod => ArithOp::Mod,
        AssignOp::Pow => ArithOp::Pow,
        AssignOp::Concat => ArithOp::Concat,
        AssignOp::BitAnd => ArithOp::BitAnd,
        AssignOp::BitOr => ArithOp::BitOr,
        AssignOp::BitXor => ArithOp::BitXor,
        AssignOp::ShiftLeft => ArithOp::Shl,
        AssignOp::ShiftRight => ArithOp::Shr,
        AssignOp::Coalesce => return None,
    })
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Plus => OpCode::Add,
        BinaryOp::Minus => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Mod => OpCode::Mod,
        BinaryOp::Pow => OpCode::Pow,
        BinaryOp::Concat => OpCode::Concat,
        BinaryOp::BitAnd => OpCode::BitwiseAnd,
        BinaryOp::BitOr => OpCode::BitwiseOr,
        BinaryOp::BitXor => OpCode::BitwiseXor,
        BinaryOp::ShiftLeft => OpCode::ShiftLeft,
        BinaryOp::ShiftRight => OpCode::ShiftRight,
        BinaryOp::Xor => OpCode::BoolXor,
        BinaryOp::EqEq => OpCode::IsEqual,
        BinaryOp::NotEq => OpCode::IsNotEqual,
        BinaryOp::Identical => OpCode::IsIdentical,
        BinaryOp::NotIdentical => OpCode::IsNotIdentical,
        BinaryOp::Lt => OpCode::IsLess,
        BinaryOp::LtEq => OpCode::IsLessOrEqual,
        BinaryOp::Gt => OpCode::IsGreater,
        BinaryOp::GtEq => OpCode::IsGreaterOrEqual,
        BinaryOp::Spaceship => OpCode::Spaceship,
        // short-circuit operators are lowered to jumps before reaching here
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => OpCode::Nop,
    }
}

impl<'u, 'a> Emitter<'u, 'a> {
    /// Emits `expr` as a fresh value: any enclosing `?->` chain and quiet
    /// mode do not extend into it.
    pub(super) fn emit_expr(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        let chain = self.chain_end.take();
        let quiet = std::mem::replace(&mut self.quiet, false);
        let result = self.emit_chain(expr);
        self.chain_end = chain;
        self.quiet = quiet;
        result
    }

    /// Emits a read that yields null instead of failing on missing
    /// variables, keys and properties.
    pub(super) fn emit_quiet(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        let chain = self.chain_end.take();
        let quiet = std::mem::replace(&mut self.quiet, true);
        let result = self.emit_chain(expr);
        self.chain_end = chain;
        self.quiet = quiet;
        result
    }

    fn emit_chain(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        if is_chain_link(expr) && chain_has_nullsafe(expr) {
            let end = self.new_label();
            self.chain_end = Some(end);
            self.emit_node(expr)?;
            self.bind(end);
            Ok(())
        } else {
            self.emit_node(expr)
        }
    }

    fn emit_null_guard(&mut self) {
        let end = match self.chain_end {
            Some(end) => end,
            None => {
                let end = self.new_label();
                self.chain_end = Some(end);
                end
            }
        };
        self.jump(OpCode::JmpNull, end);
    }

    fn invalid(&self, message: &str, expr: &Expr<'_>) -> CompileError {
        CompileError::invalid(message, self.pos(expr.span()))
    }

    fn emit_node(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        match expr {
            Expr::Variable { name, .. } => {
                if self.is_this(*name) {
                    self.emit(OpCode::LoadThis);
                } else {
                    let sym = self.intern_span(*name);
                    let slot = self.local(sym);
                    self.emit(OpCode::LoadLocal(slot));
                }
            }
            Expr::Integer { value, .. } => self.emit_const(constant::parse_int_literal(value)),
            Expr::Float { value, .. } => self.emit_const(constant::parse_float_literal(value)),
            Expr::String { value, .. } => self.emit_const(Val::string(value.to_vec())),
            Expr::InterpolatedString { parts, .. } => {
                for part in parts.iter() {
                    self.emit_expr(part)?;
                }
                if parts.len() == 1 {
                    self.emit(OpCode::Cast(CastType::String));
                } else if parts.is_empty() {
                    self.emit_const(Val::string(Vec::new()));
                } else {
                    self.emit(OpCode::ConcatN(parts.len().min(u16::MAX as usize) as u16));
                }
            }
            Expr::Identifier { name, .. } => match constant::fold(self.unit.source, expr) {
                Some(v) => self.emit_const(v),
                None => {
                    let short = self.short_name(*name);
                    let sym = self.intern(short);
                    self.emit(OpCode::FetchConst(sym));
                }
            },
            Expr::MagicConst { kind, span } => self.emit_magic_const(*kind, *span),
            Expr::Array { items, .. } => match constant::fold(self.unit.source, expr) {
                Some(v) => self.emit_const(v),
                None => self.emit_array(items)?,
            },
            Expr::Assign { var, expr, .. } => self.emit_assign(var, expr)?,
            Expr::AssignRef { var, expr, .. } => self.emit_assign_ref(var, expr)?,
            Expr::AssignOp { var, op, expr, .. } => self.emit_assign_op(var, *op, expr)?,
            Expr::PostInc { var, .. } => self.emit_inc_dec(var, IncDecKind::PostInc)?,
            Expr::PostDec { var, .. } => self.emit_inc_dec(var, IncDecKind::PostDec)?,
            Expr::Binary {
                left, op, right, ..
            } => match constant::fold(self.unit.source, expr) {
                Some(v) => self.emit_const(v),
                None => self.emit_binary(left, *op, right)?,
            },
            Expr::Unary { op, expr: inner, .. } => match (op, constant::fold(self.unit.source, expr)) {
                (UnaryOp::Minus | UnaryOp::Plus, Some(v)) => self.emit_const(v),
                _ => self.emit_unary(*op, inner)?,
            },
            Expr::Call { .. }
            | Expr::MethodCall { .. }
            | Expr::NullsafeMethodCall { .. }
            | Expr::StaticCall { .. } => self.emit_call(expr)?,
            Expr::ArrayDimFetch { array, dim, .. } => {
                let Some(dim) = dim else {
                    return Err(self.invalid("Cannot use [] for reading", expr));
                };
                self.emit_node(array)?;
                self.emit_expr(dim)?;
                self.emit(OpCode::FetchDim { quiet: self.quiet });
            }
            Expr::PropertyFetch {
                target, property, ..
            } => {
                self.emit_node(target)?;
                self.emit_property_read(property)?;
            }
            Expr::NullsafePropertyFetch {
                target, property, ..
            } => {
                self.emit_node(target)?;
                self.emit_null_guard();
                self.emit_property_read(property)?;
            }
            Expr::StaticPropertyFetch {
                class, property, ..
            } => {
                let class = self.emit_class_ref(class)?;
                let name = self.static_property_name(property)?;
                self.emit(OpCode::FetchStaticProp { class, name });
            }
            Expr::ClassConstFetch {
                class, constant, ..
            } => self.emit_class_const(class, constant)?,
            Expr::New { class, args, span } => {
                self.mark(*span);
                let class = match class {
                    Expr::AnonymousClass { .. } => {
                        let decl = self.compile_anonymous_class(class)?;
                        let name = decl.name;
                        self.chunk.classes.push(decl);
                        let index = (self.chunk.classes.len() - 1) as u32;
                        self.emit(OpCode::DeclareClass(index));
                        ClassRef::Named(name)
                    }
                    _ => self.emit_class_ref(class)?,
                };
                self.emit(OpCode::InitNew(class));
                if args.iter().any(|a| matches!(a.value, Expr::VariadicPlaceholder { .. })) {
                    return Err(self.invalid("Cannot create Closure for new expression", expr));
                }
                self.emit_args(args)?;
            }
            Expr::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                let end = self.new_label();
                self.emit_expr(condition)?;
                match if_true {
                    Some(then) => {
                        let otherwise = self.new_label();
                        self.jump(OpCode::JmpIfFalse, otherwise);
                        self.emit_expr(then)?;
                        self.jump(OpCode::Jmp, end);
                        self.bind(otherwise);
                        self.emit_expr(if_false)?;
                    }
                    None => {
                        self.emit(OpCode::Dup);
                        self.jump(OpCode::JmpIfTrue, end);
                        self.emit(OpCode::Pop);
                        self.emit_expr(if_false)?;
                    }
                }
                self.bind(end);
            }
            Expr::Match {
                condition, arms, ..
            } => self.emit_match(condition, arms)?,
            Expr::InstanceOf { expr, class, .. } => {
                self.emit_expr(expr)?;
                let class = self.emit_class_ref(class)?;
                self.emit(OpCode::InstanceOf(class));
            }
            Expr::Print { expr, .. } => {
                self.emit_expr(expr)?;
                self.emit(OpCode::Echo);
                self.emit_const(Val::Int(1));
            }
            Expr::Yield { key, value, .. } => {
                self.check_yield_context(expr)?;
                let kind = match key {
                    Some(k) => {
                        self.emit_expr(k)?;
                        YieldKind::Keyed
                    }
                    None => YieldKind::Auto,
                };
                match value {
                    Some(v) => self.emit_expr(v)?,
                    None => {
                        self.emit(OpCode::Null);
                    }
                }
                self.emit(OpCode::Yield(kind));
            }
            Expr::YieldFrom { expr: inner, .. } => {
                self.check_yield_context(expr)?;
                self.emit_expr(inner)?;
                let done = self.new_label();
                let next = self.new_label();
                self.jump(OpCode::YieldFromInit, done);
                self.bind(next);
                self.emit(OpCode::IterKey);
                self.emit(OpCode::IterValue);
                self.emit(OpCode::Yield(YieldKind::Delegated));
                self.jump(OpCode::YieldFromNext, next);
                self.bind(done);
                self.emit(OpCode::YieldFromResult);
            }
            Expr::Throw { expr, span } => {
                self.mark(*span);
                self.emit_expr(expr)?;
                self.emit(OpCode::Throw);
            }
            Expr::Cast { kind, expr, .. } => {
                self.emit_expr(expr)?;
                self.emit(OpCode::Cast(match kind {
                    CastKind::Int => CastType::Int,
                    CastKind::Bool => CastType::Bool,
                    CastKind::Float => CastType::Float,
                    CastKind::String => CastType::String,
                    CastKind::Array => CastType::Array,
                    CastKind::Object => CastType::Object,
                    CastKind::Unset => CastType::Null,
                }));
            }
            Expr::Empty { expr, .. } => self.emit_isset(expr, true)?,
            Expr::Isset { vars, .. } => {
                let end = self.new_label();
                for (i, var) in vars.iter().enumerate() {
                    self.emit_isset(var, false)?;
                    if i + 1 < vars.len() {
                        self.jump(OpCode::JmpZEx, end);
                    }
                }
                if vars.is_empty() {
                    self.emit_const(Val::Bool(false));
                }
                self.bind(end);
            }
            Expr::Exit { expr, span } => {
                self.mark(*span);
                match expr {
                    Some(e) => self.emit_expr(e)?,
                    None => {
                        self.emit(OpCode::Null);
                    }
                }
                self.emit(OpCode::Exit);
                self.emit(OpCode::Null);
            }
            Expr::Closure { .. } | Expr::ArrowFunction { .. } => self.emit_closure(expr)?,
            Expr::Clone { expr, .. } => {
                self.emit_expr(expr)?;
                self.emit(OpCode::Clone);
            }
            Expr::AnonymousClass { .. } => {
                return Err(self.invalid("Anonymous class must be instantiated", expr));
            }
            Expr::VariadicPlaceholder { .. } => {
                return Err(self.invalid("Cannot use '...' here", expr));
            }
            Expr::Omitted { .. } => {
                return Err(self.invalid("Cannot use empty array elements in arrays", expr));
            }
            Expr::Error { .. } => return Err(self.invalid("Invalid expression", expr)),
        }
        Ok(())
    }

    fn check_yield_context(&self, expr: &Expr<'_>) -> Result<(), CompileError> {
        if self.scope.function.is_none() && self.scope.method.is_none() {
            return Err(self.invalid(
                "The \"yield\" expression can only be used inside a function",
                expr,
            ));
        }
        Ok(())
    }

    fn emit_magic_const(&mut self, kind: MagicConstKind, span: crate::parser::span::Span) {
        let text = |e: &Self, sym: Option<crate::core::value::Symbol>| -> Vec<u8> {
            sym.map(|s| e.unit.interner.text(s).to_vec()).unwrap_or_default()
        };
        let value = match kind {
            MagicConstKind::Line => Val::Int(self.pos(span).line as i64),
            MagicConstKind::File => Val::string(self.unit.file_name.clone()),
            MagicConstKind::Dir => {
                let file = &self.unit.file_name;
                let dir = match file.iter().rposition(|b| *b == b'/') {
                    Some(0) => b"/".to_vec(),
                    Some(i) => file[..i].to_vec(),
                    None => b".".to_vec(),
                };
                Val::string(dir)
            }
            MagicConstKind::Function => Val::string(text(self, self.scope.function)),
            MagicConstKind::Method => Val::string(text(self, self.scope.method)),
            MagicConstKind::Property => Val::string(text(self, self.scope.property)),
            MagicConstKind::Namespace => Val::string(Vec::new()),
            MagicConstKind::Class => match &self.scope.class {
                Some(class) if class.is_trait => {
                    self.emit(OpCode::ClassName(ClassRef::SelfRef));
                    return;
                }
                Some(class) => Val::string(self.unit.interner.text(class.name).to_vec()),
                None => Val::string(Vec::new()),
            },
            MagicConstKind::Trait => match &self.scope.class {
                Some(class) if class.is_trait => {
                    Val::string(self.unit.interner.text(class.name).to_vec())
                }
                _ => Val::string(Vec::new()),
            },
        };
        self.emit_const(value);
    }

    fn emit_array(&mut self, items: &[ArrayItem<'_>]) -> Result<(), CompileError> {
        self.emit(OpCode::NewArray(items.len() as u32));
        for item in items {
            if let Expr::Omitted { .. } = item.value {
                return Err(self.invalid("Cannot use empty array elements in arrays", item.value));
            }
            if item.unpack {
                self.emit_expr(item.value)?;
                self.emit(OpCode::ArraySpread);
                continue;
            }
            if let Some(key) = item.key {
                self.emit_expr(key)?;
            }
            if item.by_ref && self.is_place(item.value) {
                let place = self.emit_place(item.value)?;
                self.emit(OpCode::MakeRef {
                    place: place.place,
                    depth: place.depth,
                });
            } else {
                self.emit_expr(item.value)?;
            }
            self.emit(if item.key.is_some() {
                OpCode::ArrayInsert
            } else {
                OpCode::ArrayPush
            });
        }
        Ok(())
    }

    // ---- places -----------------------------------------------------------

    pub(super) fn is_place(&self, expr: &Expr<'_>) -> bool {
        match expr {
            Expr::Variable { name, .. } => !self.is_this(*name),
            Expr::ArrayDimFetch { array, .. } => {
                self.is_place(array)
                    || matches!(array, Expr::Variable { name, .. } if self.is_this(*name))
            }
            Expr::PropertyFetch { .. } | Expr::StaticPropertyFetch { .. } => true,
            _ => false,
        }
    }

    /// Pushes the prefix and dimension keys of an lvalue.
    pub(super) fn emit_place(&mut self, expr: &Expr<'_>) -> Result<PlaceRef, CompileError> {
        match expr {
            Expr::Variable { name, .. } => {
                if self.is_this(*name) {
                    return Err(self.invalid("Cannot re-assign $this", expr));
                }
                let sym = self.intern_span(*name);
                Ok(PlaceRef {
                    place: Place::Local(self.local(sym)),
                    depth: 0,
                })
            }
            Expr::ArrayDimFetch { array, dim, .. } => {
                let base = match array {
                    Expr::Variable { name, .. } if self.is_this(*name) => {
                        let slot = self.temp();
                        self.emit(OpCode::LoadThis);
                        self.emit(OpCode::AssignLocal(slot));
                        self.emit(OpCode::Pop);
                        PlaceRef {
                            place: Place::Local(slot),
                            depth: 0,
                        }
                    }
                    _ if self.is_place(array) => self.emit_place(array)?,
                    _ => {
                        return Err(
                            self.invalid("Cannot use temporary expression in write context", expr)
                        );
                    }
                };
                match dim {
                    Some(d) => self.emit_expr(d)?,
                    None => self.emit_const(Val::AppendPlaceholder),
                }
                if base.depth == u8::MAX {
                    return Err(self.invalid("Too many nested array dimensions", expr));
                }
                Ok(PlaceRef {
                    place: base.place,
                    depth: base.depth + 1,
                })
            }
            Expr::PropertyFetch {
                target, property, ..
            } => {
                self.emit_expr(target)?;
                let place = match property {
                    Expr::Identifier { name, .. } => Place::Prop(self.intern_span(*name)),
                    _ => {
                        self.emit_expr(property)?;
                        Place::PropDynamic
                    }
                };
                Ok(PlaceRef { place, depth: 0 })
            }
            Expr::StaticPropertyFetch {
                class, property, ..
            } => {
                let class = self.emit_class_ref(class)?;
                let name = self.static_property_name(property)?;
                Ok(PlaceRef {
                    place: Place::StaticProp(class, name),
                    depth: 0,
                })
            }
            Expr::NullsafePropertyFetch { .. } | Expr::NullsafeMethodCall { .. } => {
                Err(self.invalid("Can't use nullsafe operator in write context", expr))
            }
            _ => Err(self.invalid("Cannot use temporary expression in write context", expr)),
        }
    }

    fn static_property_name(
        &mut self,
        property: &Expr<'_>,
    ) -> Result<crate::core::value::Symbol, CompileError> {
        match property {
            Expr::Variable { name, .. } => Ok(self.intern_span(*name)),
            _ => Err(self.invalid("Dynamic static property names are not supported", property)),
        }
    }

    fn emit_property_read(&mut self, property: &Expr<'_>) -> Result<(), CompileError> {
        let quiet = self.quiet;
        match property {
            Expr::Identifier { name, .. } => {
                let name = self.intern_span(*name);
                self.emit(OpCode::FetchProp { name, quiet });
            }
            _ => {
                self.emit_expr(property)?;
                self.emit(OpCode::FetchPropDynamic { quiet });
            }
        }
        Ok(())
    }

    /// Resolves a class operand; dynamic operands are pushed.
    pub(super) fn emit_class_ref(&mut self, class: &Expr<'_>) -> Result<ClassRef, CompileError> {
        match class {
            Expr::Identifier { name, .. } => {
                let short = self.short_name(*name);
                Ok(match short.to_ascii_lowercase().as_slice() {
                    b"self" => ClassRef::SelfRef,
                    b"parent" => ClassRef::Parent,
                    b"static" => ClassRef::Static,
                    _ => ClassRef::Named(self.intern(short)),
                })
            }
            _ => {
                self.emit_expr(class)?;
                Ok(ClassRef::Dynamic)
            }
        }
    }

    fn emit_class_const(&mut self, class: &Expr<'_>, constant: &Expr<'_>) -> Result<(), CompileError> {
        let Expr::Identifier { name, .. } = constant else {
            return Err(self.invalid("Dynamic class constant names are not supported", constant));
        };
        let text = self.unit.text(*name);
        if text.eq_ignore_ascii_case(b"class") {
            match self.emit_class_ref(class)? {
                ClassRef::Named(sym) => {
                    let bytes = self.unit.interner.text(sym).to_vec();
                    self.emit_const(Val::string(bytes));
                }
                other => {
                    self.emit(OpCode::ClassName(other));
                }
            }
            return Ok(());
        }
        let class = self.emit_class_ref(class)?;
        let name = self.intern(text);
        self.emit(OpCode::FetchClassConst { class, name });
        Ok(())
    }

    // ---- assignment -------------------------------------------------------

    fn emit_assign(&mut self, var: &Expr<'_>, value: &Expr<'_>) -> Result<(), CompileError> {
        match var {
            Expr::Array { items, .. } => {
                self.emit_expr(value)?;
                let tmp = self.temp();
                self.emit(OpCode::AssignLocal(tmp));
                self.emit_destructure(tmp, items)
            }
            Expr::Variable { name, .. } if !self.is_this(*name) => {
                self.emit_expr(value)?;
                let sym = self.intern_span(*name);
                let slot = self.local(sym);
                self.emit(OpCode::AssignLocal(slot));
                Ok(())
            }
            _ => {
                let place = self.emit_place(var)?;
                self.emit_expr(value)?;
                self.emit(OpCode::Assign {
                    place: place.place,
                    depth: place.depth,
                });
                Ok(())
            }
        }
    }

    /// Assigns the elements of the array held in local `source` to the
    /// targets of a `[...]`/`list(...)` pattern.
    pub(super) fn emit_destructure(
        &mut self,
        source: u32,
        items: &[ArrayItem<'_>],
    ) -> Result<(), CompileError> {
        let mut index = 0i64;
        for item in items {
            if let Expr::Omitted { .. } = item.value {
                index += 1;
                continue;
            }
            if item.unpack {
                return Err(self.invalid("Spread operator is not supported in assignments", item.value));
            }
            if let Expr::Array { items: nested, .. } = item.value {
                self.emit(OpCode::LoadLocal(source));
                self.emit_list_key(item.key, &mut index)?;
                self.emit(OpCode::FetchDim { quiet: true });
                let tmp = self.temp();
                self.emit(OpCode::AssignLocal(tmp));
                self.emit(OpCode::Pop);
                self.emit_destructure(tmp, nested)?;
                continue;
            }
            let place = self.emit_place(item.value)?;
            self.emit(OpCode::LoadLocal(source));
            self.emit_list_key(item.key, &mut index)?;
            self.emit(OpCode::FetchDim { quiet: true });
            self.emit(OpCode::Assign {
                place: place.place,
                depth: place.depth,
            });
            self.emit(OpCode::Pop);
        }
        Ok(())
    }

    fn emit_list_key(&mut self, key: Option<ExprId<'_>>, index: &mut i64) -> Result<(), CompileError> {
        match key {
            Some(k) => self.emit_expr(k),
            None => {
                self.emit_const(Val::Int(*index));
                *index += 1;
                Ok(())
            }
        }
    }

    fn emit_assign_ref(&mut self, var: &Expr<'_>, value: &Expr<'_>) -> Result<(), CompileError> {
        let target = self.emit_place(var)?;
        if self.is_place(value) {
            let source = self.emit_place(value)?;
            self.emit(OpCode::MakeRef {
                place: source.place,
                depth: source.depth,
            });
        } else {
            self.emit_expr(value)?;
        }
        self.emit(OpCode::AssignRef {
            place: target.place,
            depth: target.depth,
        });
        Ok(())
    }

    fn emit_assign_op(&mut self, var: &Expr<'_>, op: AssignOp, value: &Expr<'_>) -> Result<(), CompileError> {
        match arith(op) {
            Some(op) => {
                let place = self.emit_place(var)?;
                self.emit_expr(value)?;
                self.emit(OpCode::AssignOp {
                    place: place.place,
                    depth: place.depth,
                    op,
                });
            }
            None => {
                let end = self.new_label();
                self.emit_quiet(var)?;
                self.jump(OpCode::Coalesce, end);
                let place = self.emit_place(var)?;
                self.emit_expr(value)?;
                self.emit(OpCode::Assign {
                    place: place.place,
                    depth: place.depth,
                });
                self.bind(end);
            }
        }
        Ok(())
    }

    fn emit_inc_dec(&mut self, var: &Expr<'_>, kind: IncDecKind) -> Result<(), CompileError> {
        let place = self.emit_place(var)?;
        self.emit(OpCode::IncDec {
            place: place.place,
            depth: place.depth,
            kind,
        });
        Ok(())
    }

    // ---- operators --------------------------------------------------------

    fn emit_binary(&mut self, left: &Expr<'_>, op: BinaryOp, right: &Expr<'_>) -> Result<(), CompileError> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let end = self.new_label();
                self.emit_expr(left)?;
                if op == BinaryOp::And {
                    self.jump(OpCode::JmpZEx, end);
                } else {
                    self.jump(OpCode::JmpNzEx, end);
                }
                self.emit_expr(right)?;
                self.emit(OpCode::ToBool);
                self.bind(end);
            }
            BinaryOp::Coalesce => {
                let end = self.new_label();
                self.emit_quiet(left)?;
                self.jump(OpCode::Coalesce, end);
                self.emit_expr(right)?;
                self.bind(end);
            }
            _ => {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                self.emit(binary_opcode(op));
            }
        }
        Ok(())
    }

    fn emit_unary(&mut self, op: UnaryOp, expr: &Expr<'_>) -> Result<(), CompileError> {
        match op {
            UnaryOp::PreInc => return self.emit_inc_dec(expr, IncDecKind::PreInc),
            UnaryOp::PreDec => return self.emit_inc_dec(expr, IncDecKind::PreDec),
            UnaryOp::ErrorSuppress => return self.emit_quiet(expr),
            _ => {}
        }
        self.emit_expr(expr)?;
        self.emit(match op {
            UnaryOp::Plus => OpCode::UnaryPlus,
            UnaryOp::Minus => OpCode::Negate,
            UnaryOp::Not => OpCode::BoolNot,
            _ => OpCode::BitwiseNot,
        });
        Ok(())
    }

    fn emit_isset(&mut self, var: &Expr<'_>, empty: bool) -> Result<(), CompileError> {
        match var {
            Expr::Variable { name, .. } if self.is_this(*name) => {
                self.emit_const(Val::Bool(!empty && self.scope.class.is_some()));
            }
            Expr::Variable { name, .. } => {
                let sym = self.intern_span(*name);
                let slot = self.local(sym);
                self.emit(OpCode::IssetLocal { slot, empty });
            }
            Expr::ArrayDimFetch {
                array, dim: Some(dim), ..
            } => {
                self.emit_quiet(array)?;
                self.emit_expr(dim)?;
                self.emit(OpCode::IssetDim { empty });
            }
            Expr::PropertyFetch {
                target, property, ..
            }
            | Expr::NullsafePropertyFetch {
                target, property, ..
            } => {
                self.emit_quiet(target)?;
                match property {
                    Expr::Identifier { name, .. } => {
                        let name = self.intern_span(*name);
                        self.emit(OpCode::IssetProp { name, empty });
                    }
                    _ => {
                        self.emit_expr(property)?;
                        self.emit(OpCode::IssetPropDynamic { empty });
                    }
                }
            }
            Expr::StaticPropertyFetch {
                class, property, ..
            } => {
                let class = self.emit_class_ref(class)?;
                let name = self.static_property_name(property)?;
                self.emit(OpCode::IssetStaticProp { class, name, empty });
            }
            _ => {
                self.emit_quiet(var)?;
                if empty {
                    self.emit(OpCode::BoolNot);
                } else {
                    self.emit(OpCode::Null);
                    self.emit(OpCode::IsNotIdentical);
                }
            }
        }
        Ok(())
    }

    fn emit_match(&mut self, subject: &Expr<'_>, arms: &[MatchArm<'_>]) -> Result<(), CompileError> {
        let tmp = self.temp();
        self.emit_expr(subject)?;
        self.emit(OpCode::AssignLocal(tmp));
        self.emit(OpCode::Pop);
        let end = self.new_label();
        let targets: Vec<Label> = arms.iter().map(|_| self.new_label()).collect();
        let mut default = None;
        for (arm, target) in arms.iter().zip(&targets) {
            match arm.conditions {
                Some(conditions) => {
                    for cond in conditions.iter() {
                        self.emit(OpCode::LoadLocal(tmp));
                        self.emit_expr(cond)?;
                        self.emit(OpCode::IsIdentical);
                        self.jump(OpCode::JmpIfTrue, *target);
                    }
                }
                None => {
                    if default.is_some() {
                        return Err(CompileError::invalid(
                            "Match expressions may only contain one default arm",
                            self.pos(arm.span),
                        ));
                    }
                    default = Some(*target);
                }
            }
        }
        match default {
            Some(target) => self.jump(OpCode::Jmp, target),
            None => {
                self.emit(OpCode::LoadLocal(tmp));
                self.emit(OpCode::MatchError);
            }
        }
        for (arm, target) in arms.iter().zip(&targets) {
            self.bind(*target);
            self.emit_expr(arm.body)?;
            self.jump(OpCode::Jmp, end);
        }
        self.bind(end);
        Ok(())
    }

    // ---- calls ------------------------------------------------------------

    fn emit_call(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        self.mark(expr.span());
        let args = match expr {
            Expr::Call { func, args, .. } => {
                match func {
                    Expr::Identifier { name, .. } => {
                        let short = self.short_name(*name);
                        let name = self.intern(short);
                        let lname = self.unit.interner.intern_lower(short);
                        self.emit(OpCode::InitFcall { name, lname });
                    }
                    _ => {
                        self.emit_expr(func)?;
                        self.emit(OpCode::InitCallable);
                    }
                }
                args
            }
            Expr::MethodCall {
                target,
                method,
                args,
                ..
            }
            | Expr::NullsafeMethodCall {
                target,
                method,
                args,
                ..
            } => {
                self.emit_node(target)?;
                if matches!(expr, Expr::NullsafeMethodCall { .. }) {
                    self.emit_null_guard();
                }
                match method {
                    Expr::Identifier { name, .. } => {
                        let name = self.intern_span(*name);
                        self.emit(OpCode::InitMethodCall(name));
                    }
                    _ => {
                        self.emit_expr(method)?;
                        self.emit(OpCode::InitMethodCallDynamic);
                    }
                }
                args
            }
            Expr::StaticCall {
                class, method, args, ..
            } => {
                let class = self.emit_class_ref(class)?;
                match method {
                    Expr::Identifier { name, .. } => {
                        let name = self.intern_span(*name);
                        self.emit(OpCode::InitStaticCall { class, name });
                    }
                    _ => {
                        self.emit_expr(method)?;
                        self.emit(OpCode::InitStaticCallDynamic(class));
                    }
                }
                args
            }
            _ => return Err(self.invalid("Expected a call", expr)),
        };
        if let [Arg {
            value: Expr::VariadicPlaceholder { .. },
            ..
        }] = args
        {
            self.emit(OpCode::MakeCallableClosure);
            return Ok(());
        }
        self.emit_args(args)
    }

    fn emit_args(&mut self, args: &[Arg<'_>]) -> Result<(), CompileError> {
        for arg in args {
            if arg.unpack {
                self.emit_expr(arg.value)?;
                self.emit(OpCode::SendUnpack);
            } else if let Some(name) = arg.name {
                self.emit_expr(arg.value)?;
                let name = self.intern_span(name.span);
                self.emit(OpCode::SendNamed(name));
            } else if self.is_place(arg.value) {
                let place = self.emit_place(arg.value)?;
                self.emit(OpCode::SendPlace {
                    place: place.place,
                    depth: place.depth,
                });
            } else {
                self.emit_expr(arg.value)?;
                self.emit(OpCode::SendVal);
            }
        }
        self.emit(OpCode::DoCall);
        Ok(())
    }
}
