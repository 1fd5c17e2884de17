//! Read-only traversal of function bodies.
//!
//! The walker never enters nested function or class bodies: closures,
//! named functions and classes are compiled on their own. Arrow function
//! bodies are entered only when the visitor asks for it.

use crate::parser::ast::{
    ArrayItem, Arg, Expr, MatchArm, PropertyHookBody, Stmt, StmtId,
};
use crate::parser::span::Span;

pub(super) trait Visitor<'ast> {
    /// Called before the children of `expr`; returning false skips them.
    fn visit(&mut self, expr: &'ast Expr<'ast>) -> bool;
}

pub(super) fn walk_stmts<'ast>(v: &mut impl Visitor<'ast>, stmts: &[StmtId<'ast>]) {
    for stmt in stmts {
        walk_stmt(v, stmt);
    }
}

pub(super) fn walk_stmt<'ast>(v: &mut impl Visitor<'ast>, stmt: &Stmt<'ast>) {
    match stmt {
        Stmt::Echo { exprs, .. } | Stmt::Global { vars: exprs, .. } | Stmt::Unset { vars: exprs, .. } => {
            for e in exprs.iter() {
                walk_expr(v, e);
            }
        }
        Stmt::Expression { expr, .. } => walk_expr(v, expr),
        Stmt::Return { expr, .. } => {
            if let Some(e) = expr {
                walk_expr(v, e);
            }
        }
        Stmt::If {
            condition,
            then_block,
            else_block,
            ..
        } => {
            walk_expr(v, condition);
            walk_stmts(v, then_block);
            if let Some(block) = else_block {
                walk_stmts(v, block);
            }
        }
        Stmt::While {
            condition, body, ..
        }
        | Stmt::DoWhile {
            condition, body, ..
        } => {
            walk_expr(v, condition);
            walk_stmts(v, body);
        }
        Stmt::For {
            init,
            condition,
            loop_expr,
            body,
            ..
        } => {
            for e in init.iter().chain(condition.iter()).chain(loop_expr.iter()) {
                walk_expr(v, e);
            }
            walk_stmts(v, body);
        }
        Stmt::Foreach {
            expr,
            key_var,
            value_var,
            body,
            ..
        } => {
            walk_expr(v, expr);
            if let Some(k) = key_var {
                walk_expr(v, k);
            }
            walk_expr(v, value_var);
            walk_stmts(v, body);
        }
        Stmt::Switch {
            condition, cases, ..
        } => {
            walk_expr(v, condition);
            for case in cases.iter() {
                if let Some(c) = case.condition {
                    walk_expr(v, c);
                }
                walk_stmts(v, case.body);
            }
        }
        Stmt::Break { level, .. } | Stmt::Continue { level, .. } => {
            if let Some(l) = level {
                walk_expr(v, l);
            }
        }
        Stmt::Block { statements, .. } => walk_stmts(v, statements),
        Stmt::Try {
            body,
            catches,
            finally,
            ..
        } => {
            walk_stmts(v, body);
            for catch in catches.iter() {
                walk_stmts(v, catch.body);
            }
            if let Some(f) = finally {
                walk_stmts(v, f);
            }
        }
        Stmt::Static { vars, .. } => {
            for var in vars.iter() {
                walk_expr(v, var.var);
                if let Some(d) = var.default {
                    walk_expr(v, d);
                }
            }
        }
        Stmt::Const { consts, .. } => {
            for c in consts.iter() {
                walk_expr(v, c.value);
            }
        }
        Stmt::Declare { body, .. } => walk_stmts(v, body),
        Stmt::Namespace { body, .. } => {
            if let Some(b) = body {
                walk_stmts(v, b);
            }
        }
        Stmt::InlineHtml { .. }
        | Stmt::Function { .. }
        | Stmt::Class { .. }
        | Stmt::Interface { .. }
        | Stmt::Trait { .. }
        | Stmt::Use { .. }
        | Stmt::Nop { .. }
        | Stmt::Error { .. } => {}
    }
}

fn walk_args<'ast>(v: &mut impl Visitor<'ast>, args: &[Arg<'ast>]) {
    for arg in args {
        walk_expr(v, arg.value);
    }
}

fn walk_items<'ast>(v: &mut impl Visitor<'ast>, items: &[ArrayItem<'ast>]) {
    for item in items {
        if let Some(k) = item.key {
            walk_expr(v, k);
        }
        walk_expr(v, item.value);
    }
}

fn walk_arms<'ast>(v: &mut impl Visitor<'ast>, arms: &[MatchArm<'ast>]) {
    for arm in arms {
        for c in arm.conditions.unwrap_or(&[]) {
            walk_expr(v, c);
        }
        walk_expr(v, arm.body);
    }
}

pub(super) fn walk_expr<'ast>(v: &mut impl Visitor<'ast>, expr: &'ast Expr<'ast>) {
    if !v.visit(expr) {
        return;
    }
    match expr {
        Expr::Assign { var, expr, .. }
        | Expr::AssignRef { var, expr, .. }
        | Expr::AssignOp { var, expr, .. } => {
            walk_expr(v, var);
            walk_expr(v, expr);
        }
        Expr::Binary { left, right, .. } => {
            walk_expr(v, left);
            walk_expr(v, right);
        }
        Expr::Unary { expr, .. }
        | Expr::Print { expr, .. }
        | Expr::YieldFrom { expr, .. }
        | Expr::Throw { expr, .. }
        | Expr::Cast { expr, .. }
        | Expr::Empty { expr, .. }
        | Expr::Clone { expr, .. } => walk_expr(v, expr),
        Expr::PostInc { var, .. } | Expr::PostDec { var, .. } => walk_expr(v, var),
        Expr::Call { func, args, .. } => {
            walk_expr(v, func);
            walk_args(v, args);
        }
        Expr::Array { items, .. } => walk_items(v, items),
        Expr::ArrayDimFetch { array, dim, .. } => {
            walk_expr(v, array);
            if let Some(d) = dim {
                walk_expr(v, d);
            }
        }
        Expr::PropertyFetch {
            target, property, ..
        }
        | Expr::NullsafePropertyFetch {
            target, property, ..
        } => {
            walk_expr(v, target);
            walk_expr(v, property);
        }
        Expr::StaticPropertyFetch {
            class, property, ..
        } => {
            walk_expr(v, class);
            walk_expr(v, property);
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
            walk_expr(v, target);
            walk_expr(v, method);
            walk_args(v, args);
        }
        Expr::StaticCall {
            class,
            method,
            args,
            ..
        } => {
            walk_expr(v, class);
            walk_expr(v, method);
            walk_args(v, args);
        }
        Expr::ClassConstFetch {
            class, constant, ..
        } => {
            walk_expr(v, class);
            walk_expr(v, constant);
        }
        Expr::New { class, args, .. } => {
            walk_expr(v, class);
            walk_args(v, args);
        }
        Expr::InterpolatedString { parts, .. } => {
            for p in parts.iter() {
                walk_expr(v, p);
            }
        }
        Expr::Ternary {
            condition,
            if_true,
            if_false,
            ..
        } => {
            walk_expr(v, condition);
            if let Some(t) = if_true {
                walk_expr(v, t);
            }
            walk_expr(v, if_false);
        }
        Expr::Match {
            condition, arms, ..
        } => {
            walk_expr(v, condition);
            walk_arms(v, arms);
        }
        Expr::InstanceOf { expr, class, .. } => {
            walk_expr(v, expr);
            walk_expr(v, class);
        }
        Expr::Yield { key, value, .. } => {
            if let Some(k) = key {
                walk_expr(v, k);
            }
            if let Some(val) = value {
                walk_expr(v, val);
            }
        }
        Expr::Isset { vars, .. } => {
            for var in vars.iter() {
                walk_expr(v, var);
            }
        }
        Expr::Exit { expr, .. } => {
            if let Some(e) = expr {
                walk_expr(v, e);
            }
        }
        Expr::ArrowFunction { expr, .. } => walk_expr(v, expr),
        Expr::Closure { .. }
        | Expr::AnonymousClass { .. }
        | Expr::Variable { .. }
        | Expr::Identifier { .. }
        | Expr::Integer { .. }
        | Expr::Float { .. }
        | Expr::String { .. }
        | Expr::MagicConst { .. }
        | Expr::VariadicPlaceholder { .. }
        | Expr::Omitted { .. }
        | Expr::Error { .. } => {}
    }
}

struct YieldFinder {
    found: bool,
}

impl<'ast> Visitor<'ast> for YieldFinder {
    fn visit(&mut self, expr: &'ast Expr<'ast>) -> bool {
        match expr {
            Expr::Yield { .. } | Expr::YieldFrom { .. } => {
                self.found = true;
                false
            }
            Expr::ArrowFunction { .. } => false,
            _ => !self.found,
        }
    }
}

/// Whether a function body contains `yield`, which makes it a generator.
pub(super) fn stmts_yield(stmts: &[StmtId<'_>]) -> bool {
    let mut finder = YieldFinder { found: false };
    walk_stmts(&mut finder, stmts);
    finder.found
}

pub(super) fn expr_yields<'ast>(expr: &'ast Expr<'ast>) -> bool {
    let mut finder = YieldFinder { found: false };
    walk_expr(&mut finder, expr);
    finder.found
}

/// Collects the variables an arrow function reads from its parent scope.
struct FreeVars<'s> {
    source: &'s [u8],
    names: Vec<Span>,
}

impl<'ast> Visitor<'ast> for FreeVars<'_> {
    fn visit(&mut self, expr: &'ast Expr<'ast>) -> bool {
        match expr {
            Expr::Variable { name, .. } => {
                let text = name.as_str(self.source);
                if text != b"this"
                    && !self
                        .names
                        .iter()
                        .any(|seen| seen.as_str(self.source) == text)
                {
                    self.names.push(*name);
                }
                false
            }
            Expr::Closure { uses, .. } => {
                for u in uses.iter() {
                    let span = Span::new(u.var.span.start + 1, u.var.span.end);
                    if !self
                        .names
                        .iter()
                        .any(|seen| seen.as_str(self.source) == span.as_str(self.source))
                    {
                        self.names.push(span);
                    }
                }
                false
            }
            _ => true,
        }
    }
}

pub(super) fn free_variables<'ast>(source: &[u8], expr: &'ast Expr<'ast>) -> Vec<Span> {
    let mut collector = FreeVars {
        source,
        names: Vec::new(),
    };
    walk_expr(&mut collector, expr);
    collector.names
}

/// Finds `$this->name` accesses, which make a hooked property backed.
struct BackingAccess<'s> {
    source: &'s [u8],
    name: &'s [u8],
    found: bool,
}

impl<'ast> Visitor<'ast> for BackingAccess<'_> {
    fn visit(&mut self, expr: &'ast Expr<'ast>) -> bool {
        if let Expr::PropertyFetch {
            target, property, ..
        } = expr
            && let (Expr::Variable { name: var, .. }, Expr::Identifier { name: prop, .. }) =
                (target, property)
            && var.as_str(self.source) == b"this"
            && prop.as_str(self.source) == self.name
        {
            self.found = true;
        }
        !self.found
    }
}

pub(super) fn hook_uses_backing(source: &[u8], name: &[u8], body: &PropertyHookBody<'_>) -> bool {
    let mut finder = BackingAccess {
        source,
        name,
        found: false,
    };
    match body {
        PropertyHookBody::Statements(stmts) => walk_stmts(&mut finder, stmts),
        PropertyHookBody::Expr(expr) => walk_expr(&mut finder, expr),
    }
    finder.found
}
