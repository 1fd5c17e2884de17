use super::chunk::{
    ClassDecl, ClassKind, ConstDecl, ConstInit, MethodDecl, PropDecl, PropertyHooks, TraitRule,
};
use super::constant;
use super::emitter::{Body, ClassScope, Emitter, FunctionSpec, Scope};
use super::error::CompileError;
use super::walk;
use crate::core::value::{Symbol, Val, Visibility};
use crate::parser::ast::{
    ClassMember, Expr, Name, PropertyHook, PropertyHookBody, Stmt, TraitAdaptation, Type,
};
use crate::parser::lexer::token::{Token, TokenKind};
use crate::parser::span::Span;
use std::rc::Rc;

struct ClassSource<'b, 'ast> {
    name: Symbol,
    kind: ClassKind,
    modifiers: &'b [Token],
    parent: Option<&'b Name<'ast>>,
    interfaces: &'b [Name<'ast>],
    members: &'b [ClassMember<'ast>],
    span: Span,
    is_anonymous: bool,
}

fn has_modifier(modifiers: &[Token], kind: TokenKind) -> bool {
    modifiers.iter().any(|m| m.kind == kind)
}

fn visibility(modifiers: &[Token]) -> Visibility {
    for m in modifiers {
        match m.kind {
            TokenKind::Private => return Visibility::Private,
            TokenKind::Protected => return Visibility::Protected,
            TokenKind::Public => return Visibility::Public,
            _ => {}
        }
    }
    Visibility::Public
}

impl<'u, 'a> Emitter<'u, 'a> {
    pub(super) fn compile_class_stmt(&mut self, stmt: &Stmt<'_>) -> Result<Rc<ClassDecl>, CompileError> {
        let source = match stmt {
            Stmt::Class {
                name,
                modifiers,
                extends,
                implements,
                members,
                span,
            } => ClassSource {
                name: self.intern_span(name.span),
                kind: ClassKind::Class,
                modifiers,
                parent: extends.as_ref(),
                interfaces: implements,
                members,
                span: *span,
                is_anonymous: false,
            },
            Stmt::Interface {
                name,
                extends,
                members,
                span,
            } => ClassSource {
                name: self.intern_span(name.span),
                kind: ClassKind::Interface,
                modifiers: &[],
                parent: None,
                interfaces: extends,
                members,
                span: *span,
                is_anonymous: false,
            },
            Stmt::Trait {
                name,
                members,
                span,
            } => ClassSource {
                name: self.intern_span(name.span),
                kind: ClassKind::Trait,
                modifiers: &[],
                parent: None,
                interfaces: &[],
                members,
                span: *span,
                is_anonymous: false,
            },
            other => {
                return Err(CompileError::invalid(
                    "Expected a class declaration",
                    self.pos(other.span()),
                ));
            }
        };
        self.compile_class(source)
    }

    pub(super) fn compile_anonymous_class(&mut self, expr: &Expr<'_>) -> Result<Rc<ClassDecl>, CompileError> {
        let Expr::AnonymousClass {
            extends,
            implements,
            members,
            span,
        } = expr
        else {
            return Err(CompileError::invalid("Expected an anonymous class", self.pos(expr.span())));
        };
        let index = self.unit.next_anonymous_class();
        let line = self.pos(*span).line;
        let mut name = b"class@anonymous\0".to_vec();
        name.extend_from_slice(&self.unit.file_name);
        name.extend_from_slice(format!(":{line}${index:x}").as_bytes());
        let name = self.intern(&name);
        self.compile_class(ClassSource {
            name,
            kind: ClassKind::Class,
            modifiers: &[],
            parent: extends.as_ref(),
            interfaces: implements,
            members,
            span: *span,
            is_anonymous: true,
        })
    }

    fn duplicate(&self, what: &'static str, name: String, span: Span) -> CompileError {
        CompileError::Duplicate {
            what,
            name,
            at: self.pos(span),
        }
    }

    fn compile_class(&mut self, src: ClassSource<'_, '_>) -> Result<Rc<ClassDecl>, CompileError> {
        let at = self.pos(src.span);
        let class_name = self.unit.interner.display(src.name).into_owned();
        let class_scope = ClassScope {
            name: src.name,
            is_trait: src.kind == ClassKind::Trait,
        };
        let is_readonly = has_modifier(src.modifiers, TokenKind::Readonly);
        let mut decl = ClassDecl {
            name: src.name,
            kind: src.kind,
            is_abstract: has_modifier(src.modifiers, TokenKind::Abstract),
            is_final: has_modifier(src.modifiers, TokenKind::Final),
            is_readonly,
            is_anonymous: src.is_anonymous,
            parent: src.parent.map(|p| self.name_symbol(p)),
            interfaces: src.interfaces.iter().map(|n| self.name_symbol(n)).collect(),
            traits: Vec::new(),
            trait_rules: Vec::new(),
            constants: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            line: at.line,
            column: at.column,
        };
        if decl.is_abstract && decl.is_final {
            return Err(CompileError::invalid(
                format!("Cannot use the final modifier on an abstract class {class_name}"),
                at,
            ));
        }

        for member in src.members {
            match member {
                ClassMember::Property {
                    modifiers,
                    ty,
                    entries,
                    span,
                } => {
                    if src.kind == ClassKind::Interface {
                        return Err(CompileError::invalid(
                            "Interfaces may not include properties",
                            self.pos(*span),
                        ));
                    }
                    let type_hint = ty.map(|t| self.type_hint(t));
                    let readonly = is_readonly || has_modifier(modifiers, TokenKind::Readonly);
                    let is_static = has_modifier(modifiers, TokenKind::Static);
                    for entry in entries.iter() {
                        let name = self.variable_token(entry.name);
                        if decl.properties.iter().any(|p| p.name == name) {
                            let prop = self.unit.interner.display(name).into_owned();
                            return Err(self.duplicate(
                                "property",
                                format!("{class_name}::${prop}"),
                                entry.span,
                            ));
                        }
                        if readonly && type_hint.is_none() {
                            let prop = self.unit.interner.display(name).into_owned();
                            return Err(CompileError::invalid(
                                format!("Readonly property {class_name}::${prop} must have type"),
                                self.pos(entry.span),
                            ));
                        }
                        let default = match entry.default {
                            Some(_) if readonly => {
                                let prop = self.unit.interner.display(name).into_owned();
                                return Err(CompileError::invalid(
                                    format!(
                                        "Readonly property {class_name}::${prop} cannot have default value"
                                    ),
                                    self.pos(entry.span),
                                ));
                            }
                            Some(expr) => Some(self.const_init(&class_name, name, expr, &class_scope)?),
                            None if type_hint.is_none() => Some(ConstInit::Const(Val::Null)),
                            None => None,
                        };
                        decl.properties.push(PropDecl {
                            name,
                            default,
                            visibility: visibility(modifiers),
                            is_static,
                            is_readonly: readonly,
                            type_hint: type_hint.clone(),
                            hooks: None,
                        });
                    }
                }
                ClassMember::HookedProperty {
                    modifiers,
                    ty,
                    name,
                    default,
                    hooks,
                    span,
                } => {
                    let prop = self.compile_hooked_property(
                        &class_name,
                        &class_scope,
                        modifiers,
                        *ty,
                        name,
                        *default,
                        hooks,
                        *span,
                    )?;
                    if decl.properties.iter().any(|p| p.name == prop.name) {
                        let shown = self.unit.interner.display(prop.name).into_owned();
                        return Err(self.duplicate("property", format!("{class_name}::${shown}"), *span));
                    }
                    decl.properties.push(prop);
                }
                ClassMember::Method {
                    modifiers,
                    name,
                    by_ref,
                    params,
                    return_type,
                    body,
                    span,
                } => {
                    let text = self.unit.text(name.span);
                    let method = self.intern(text);
                    if decl.methods.iter().any(|m| {
                        self.unit
                            .interner
                            .text(m.name)
                            .eq_ignore_ascii_case(text)
                    }) {
                        return Err(self.duplicate(
                            "method",
                            format!("{class_name}::{}()", String::from_utf8_lossy(text)),
                            *span,
                        ));
                    }
                    let is_abstract = has_modifier(modifiers, TokenKind::Abstract)
                        || src.kind == ClassKind::Interface;
                    let display = format!("{class_name}::{}", String::from_utf8_lossy(text));
                    if body.is_none() && !is_abstract {
                        return Err(CompileError::invalid(
                            format!("Non-abstract method {display}() must contain body"),
                            self.pos(*span),
                        ));
                    }
                    if body.is_some() && is_abstract {
                        let message = if src.kind == ClassKind::Interface {
                            format!("Interface function {display}() cannot contain body")
                        } else {
                            format!("Abstract function {display}() cannot contain body")
                        };
                        return Err(CompileError::invalid(message, self.pos(*span)));
                    }
                    if is_abstract && src.kind == ClassKind::Class && !decl.is_abstract {
                        return Err(CompileError::invalid(
                            format!(
                                "Class {class_name} declares abstract method {}() and must therefore be declared abstract",
                                String::from_utf8_lossy(text)
                            ),
                            self.pos(*span),
                        ));
                    }
                    let is_ctor = text.eq_ignore_ascii_case(b"__construct");
                    if let Some(p) = params.iter().find(|p| !p.modifiers.is_empty())
                        && (!is_ctor || is_abstract)
                    {
                        return Err(CompileError::invalid(
                            "Cannot declare promoted property outside a constructor",
                            self.pos(p.span),
                        ));
                    }
                    let display_sym = self.intern(display.as_bytes());
                    let is_static = has_modifier(modifiers, TokenKind::Static);
                    let func = self.compile_function(FunctionSpec {
                        name: display_sym,
                        params,
                        implicit_param: None,
                        body: Body::Block(body.unwrap_or(&[])),
                        by_ref: *by_ref,
                        return_type: *return_type,
                        is_static,
                        captures: Vec::new(),
                        promote: is_ctor,
                        scope: Scope {
                            function: Some(method),
                            method: Some(display_sym),
                            class: Some(class_scope.clone()),
                            property: None,
                        },
                    })?;
                    if is_ctor {
                        for (param, compiled) in params.iter().zip(&func.params) {
                            if param.modifiers.is_empty() {
                                continue;
                            }
                            if decl.properties.iter().any(|p| p.name == compiled.name) {
                                let shown = self.unit.interner.display(compiled.name).into_owned();
                                return Err(self.duplicate(
                                    "property",
                                    format!("{class_name}::${shown}"),
                                    param.span,
                                ));
                            }
                            let readonly =
                                is_readonly || has_modifier(param.modifiers, TokenKind::Readonly);
                            if readonly && compiled.param_type.is_none() {
                                let shown = self.unit.interner.display(compiled.name).into_owned();
                                return Err(CompileError::invalid(
                                    format!("Readonly property {class_name}::${shown} must have type"),
                                    self.pos(param.span),
                                ));
                            }
                            decl.properties.push(PropDecl {
                                name: compiled.name,
                                default: match compiled.param_type {
                                    Some(_) => None,
                                    None => Some(ConstInit::Const(Val::Null)),
                                },
                                visibility: visibility(param.modifiers),
                                is_static: false,
                                is_readonly: readonly,
                                type_hint: compiled.param_type.clone(),
                                hooks: None,
                            });
                        }
                    }
                    decl.methods.push(MethodDecl {
                        name: method,
                        func,
                        visibility: visibility(modifiers),
                        is_static,
                        is_abstract,
                        is_final: has_modifier(modifiers, TokenKind::Final),
                    });
                }
                ClassMember::Const {
                    modifiers, consts, ..
                } => {
                    for c in consts.iter() {
                        let name = self.intern_span(c.name.span);
                        if decl.constants.iter().any(|k| k.name == name) {
                            let shown = self.unit.interner.display(name).into_owned();
                            return Err(self.duplicate("constant", format!("{class_name}::{shown}"), c.span));
                        }
                        let value = self.const_init(&class_name, name, c.value, &class_scope)?;
                        decl.constants.push(ConstDecl {
                            name,
                            value,
                            visibility: visibility(modifiers),
                            is_final: has_modifier(modifiers, TokenKind::Final),
                        });
                    }
                }
                ClassMember::TraitUse {
                    traits,
                    adaptations,
                    span,
                } => {
                    if src.kind == ClassKind::Interface {
                        return Err(CompileError::invalid(
                            format!("Cannot use traits inside of interface {class_name}"),
                            self.pos(*span),
                        ));
                    }
                    for t in traits.iter() {
                        let sym = self.name_symbol(t);
                        decl.traits.push(sym);
                    }
                    for adaptation in adaptations.iter() {
                        let rule = self.trait_rule(adaptation)?;
                        decl.trait_rules.push(rule);
                    }
                }
            }
        }

        Ok(Rc::new(decl))
    }

    fn trait_rule(&mut self, adaptation: &TraitAdaptation<'_>) -> Result<TraitRule, CompileError> {
        Ok(match adaptation {
            TraitAdaptation::Precedence {
                method,
                insteadof,
                span,
            } => {
                let Some(trait_name) = method.trait_name.as_ref() else {
                    return Err(CompileError::invalid(
                        "insteadof requires a trait-qualified method name",
                        self.pos(*span),
                    ));
                };
                let trait_name = self.name_symbol(trait_name);
                let method_text = self.unit.text(method.method.span);
                TraitRule::Precedence {
                    trait_name,
                    method: self.unit.interner.intern_lower(method_text),
                    excluded: insteadof.iter().map(|n| self.name_symbol(n)).collect(),
                }
            }
            TraitAdaptation::Alias {
                method,
                alias,
                visibility: vis,
                ..
            } => {
                let trait_name = method.trait_name.as_ref().map(|n| self.name_symbol(n));
                let method_text = self.unit.text(method.method.span);
                TraitRule::Alias {
                    trait_name,
                    method: self.unit.interner.intern_lower(method_text),
                    alias: alias.map(|a| self.intern_span(a.span)),
                    visibility: vis.map(|v| visibility(std::slice::from_ref(v))),
                }
            }
        })
    }

    /// Folds a constant or default initializer, or compiles it into a thunk
    /// run in the declaring class on first use.
    fn const_init(
        &mut self,
        class_name: &str,
        name: Symbol,
        expr: &Expr<'_>,
        class_scope: &ClassScope,
    ) -> Result<ConstInit, CompileError> {
        if let Some(v) = constant::fold(self.unit.source, expr) {
            return Ok(ConstInit::Const(v));
        }
        let label = format!("{class_name}::{}", self.unit.interner.display(name));
        let label = self.intern(label.as_bytes());
        let func = self.compile_function(FunctionSpec {
            name: label,
            params: &[],
            implicit_param: None,
            body: Body::Expr(expr),
            by_ref: false,
            return_type: None,
            is_static: true,
            captures: Vec::new(),
            promote: false,
            scope: Scope {
                function: None,
                method: None,
                class: Some(class_scope.clone()),
                property: None,
            },
        })?;
        Ok(ConstInit::Thunk(func))
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_hooked_property(
        &mut self,
        class_name: &str,
        class_scope: &ClassScope,
        modifiers: &[Token],
        ty: Option<&Type<'_>>,
        name_token: &Token,
        default: Option<&Expr<'_>>,
        hooks: &[PropertyHook<'_>],
        span: Span,
    ) -> Result<PropDecl, CompileError> {
        let name = self.variable_token(name_token);
        let shown = self.unit.interner.display(name).into_owned();
        if has_modifier(modifiers, TokenKind::Static) {
            return Err(CompileError::invalid(
                format!("Cannot declare hooks for static property {class_name}::${shown}"),
                self.pos(span),
            ));
        }
        let type_hint = ty.map(|t| self.type_hint(t));
        let name_text = self.unit.interner.text(name).to_vec();
        let value_sym = self.intern(b"value");
        let mut hook_set = PropertyHooks::default();
        let mut backed = false;

        for hook in hooks {
            let kind = self.unit.text(hook.name.span).to_ascii_lowercase();
            if walk::hook_uses_backing(self.unit.source, &name_text, &hook.body) {
                backed = true;
            }
            let label = format!(
                "{class_name}::${shown}::{}",
                String::from_utf8_lossy(&kind)
            );
            let label = self.intern(label.as_bytes());
            let scope = Scope {
                function: Some(label),
                method: Some(label),
                class: Some(class_scope.clone()),
                property: Some(name),
            };
            match kind.as_slice() {
                b"get" => {
                    if hook_set.get.is_some() {
                        return Err(self.duplicate("hook", format!("{class_name}::${shown}::get"), hook.span));
                    }
                    let body = match hook.body {
                        PropertyHookBody::Statements(stmts) => Body::Block(stmts),
                        PropertyHookBody::Expr(expr) => Body::Expr(expr),
                    };
                    hook_set.get = Some(self.compile_function(FunctionSpec {
                        name: label,
                        params: &[],
                        implicit_param: None,
                        body,
                        by_ref: false,
                        return_type: None,
                        is_static: false,
                        captures: Vec::new(),
                        promote: false,
                        scope,
                    })?);
                }
                b"set" => {
                    if hook_set.set.is_some() {
                        return Err(self.duplicate("hook", format!("{class_name}::${shown}::set"), hook.span));
                    }
                    let body = match hook.body {
                        PropertyHookBody::Statements(stmts) => Body::Block(stmts),
                        PropertyHookBody::Expr(expr) => {
                            backed = true;
                            Body::StoreProperty(name, expr)
                        }
                    };
                    hook_set.set = Some(self.compile_function(FunctionSpec {
                        name: label,
                        params: hook.params,
                        implicit_param: Some((value_sym, type_hint.clone())),
                        body,
                        by_ref: false,
                        return_type: None,
                        is_static: false,
                        captures: Vec::new(),
                        promote: false,
                        scope,
                    })?);
                }
                _ => {
                    return Err(CompileError::invalid(
                        format!("Unknown hook \"{}\" for property {class_name}::${shown}", String::from_utf8_lossy(&kind)),
                        self.pos(hook.span),
                    ));
                }
            }
        }
        if hook_set.get.is_none() {
            backed = true;
        }
        hook_set.is_virtual = !backed;

        let default = match default {
            Some(_) if hook_set.is_virtual => {
                return Err(CompileError::invalid(
                    format!("Cannot specify default value for virtual hooked property {class_name}::${shown}"),
                    self.pos(span),
                ));
            }
            Some(expr) => Some(self.const_init(class_name, name, expr, class_scope)?),
            None if type_hint.is_none() && backed => Some(ConstInit::Const(Val::Null)),
            None => None,
        };
        Ok(PropDecl {
            name,
            default,
            visibility: visibility(modifiers),
            is_static: false,
            is_readonly: has_modifier(modifiers, TokenKind::Readonly),
            type_hint,
            hooks: Some(Rc::new(hook_set)),
        })
    }
}
