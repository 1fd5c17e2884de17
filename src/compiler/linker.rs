//! Class linking: turns a [`ClassDecl`] into a [`ClassDef`] once its parent,
//! interfaces and traits are known.
//!
//! Tables are flattened in the order parent, traits, own members, so a
//! class method overrides a trait method, which overrides an inherited one.
//! Interface methods are only added where nothing implements them yet; the
//! abstract check at the end catches any that remain.
//!
//! ## References
//!
//! - `$PHP_SRC_PATH/Zend/zend_inheritance.c` - do_inheritance, trait binding

use super::chunk::{ClassDecl, ClassKind, ConstInit, LazyVal, TraitRule};
use super::error::{CompileError, SourcePos};
use crate::core::value::{Symbol, Visibility};
use crate::runtime::context::{
    ClassConst, ClassDef, LazyInit, MethodEntry, MethodImpl, Program, PropertyInfo, StaticProp,
};
use indexmap::IndexMap;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// A parent, interface or trait is not declared (yet)
    Missing { kind: &'static str, name: String },
    Invalid(CompileError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Missing { kind, name } => write!(f, "{} \"{}\" not found", kind, name),
            LinkError::Invalid(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LinkError {}

struct Linker<'p> {
    program: &'p mut Program,
    decl: &'p ClassDecl,
    name: Symbol,
    lname: Symbol,
    at: SourcePos,
}

impl Linker<'_> {
    fn text(&self, sym: Symbol) -> String {
        self.program.display(sym)
    }

    fn lower(&mut self, sym: Symbol) -> Symbol {
        let text = self.program.interner.text(sym).to_vec();
        self.program.interner.intern_lower(&text)
    }

    fn invalid(&self, message: String) -> LinkError {
        LinkError::Invalid(CompileError::Inheritance {
            message,
            at: self.at,
        })
    }

    fn lookup(&mut self, name: Symbol, kind: &'static str) -> Result<Rc<ClassDef>, LinkError> {
        let lname = self.lower(name);
        match self.program.classes.get(&lname) {
            Some(class) => Ok(class.clone()),
            None => Err(LinkError::Missing {
                kind,
                name: self.text(name),
            }),
        }
    }

    fn class_label(&self) -> String {
        let text = self.program.interner.text(self.name);
        let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
        String::from_utf8_lossy(&text[..end]).into_owned()
    }
}

/// Links one declaration against the classes already in `program`.
pub fn link_class(program: &mut Program, decl: &Rc<ClassDecl>) -> Result<Rc<ClassDef>, LinkError> {
    let name = decl.name;
    let text = program.interner.text(name).to_vec();
    let lname = program.interner.intern_lower(&text);
    let mut linker = Linker {
        program,
        decl,
        name,
        lname,
        at: SourcePos {
            line: decl.line,
            column: decl.column,
        },
    };
    let mut class = linker.link()?;
    class.decl = Some(decl.clone());
    debug!(class = %linker.class_label(), methods = class.methods.len(), "class linked");
    Ok(Rc::new(class))
}

impl Linker<'_> {
    fn link(&mut self) -> Result<ClassDef, LinkError> {
        let decl = self.decl;
        let label = self.class_label();

        let parent = match decl.parent {
            Some(p) => {
                let parent = self.lookup(p, "Class")?;
                let parent_name = self.program.class_display(&parent);
                match parent.kind {
                    ClassKind::Interface => {
                        return Err(self.invalid(format!(
                            "Class {label} cannot extend interface {parent_name}"
                        )));
                    }
                    ClassKind::Trait => {
                        return Err(self.invalid(format!(
                            "Class {label} cannot extend trait {parent_name}"
                        )));
                    }
                    ClassKind::Class => {}
                }
                if parent.is_final {
                    return Err(self.invalid(format!(
                        "Class {label} cannot extend final class {parent_name}"
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let mut interfaces_defs = Vec::with_capacity(decl.interfaces.len());
        for iface in &decl.interfaces {
            let def = self.lookup(*iface, "Interface")?;
            if def.kind != ClassKind::Interface {
                let shown = self.program.class_display(&def);
                return Err(self.invalid(format!("{label} cannot implement {shown} - it is not an interface")));
            }
            interfaces_defs.push(def);
        }
        let mut trait_defs = Vec::with_capacity(decl.traits.len());
        for t in &decl.traits {
            let def = self.lookup(*t, "Trait")?;
            if def.kind != ClassKind::Trait {
                let shown = self.program.class_display(&def);
                return Err(self.invalid(format!("{label} cannot use {shown} - it is not a trait")));
            }
            trait_defs.push(def);
        }

        let mut methods = IndexMap::new();
        let mut properties = IndexMap::new();
        let mut static_props = IndexMap::new();
        let mut constants = IndexMap::new();
        let mut interfaces: Vec<Symbol> = Vec::new();
        if let Some(parent) = &parent {
            methods = parent.methods.clone();
            properties = parent.properties.clone();
            static_props = parent.static_props.clone();
            constants = parent.constants.clone();
            interfaces = parent.interfaces.clone();
        }
        for iface in &interfaces_defs {
            for sym in std::iter::once(iface.lname).chain(iface.interfaces.iter().copied()) {
                if !interfaces.contains(&sym) {
                    interfaces.push(sym);
                }
            }
            for (key, constant) in &iface.constants {
                constants.entry(*key).or_insert_with(|| constant.clone());
            }
        }

        self.import_traits(&trait_defs, &mut methods, &mut properties, &mut static_props, &mut constants)?;
        self.add_constants(&mut constants)?;
        self.add_properties(&mut properties, &mut static_props)?;
        self.add_methods(&mut methods)?;

        for iface in &interfaces_defs {
            for (key, method) in &iface.methods {
                match methods.get(key) {
                    Some(existing) if existing.visibility != Visibility::Public && !existing.is_abstract => {
                        let method_name = self.text(existing.name);
                        let iface_name = self.program.class_display(iface);
                        return Err(self.invalid(format!(
                            "Access level to {label}::{method_name}() must be public (as in class {iface_name})"
                        )));
                    }
                    Some(_) => {}
                    None => {
                        methods.insert(*key, method.clone());
                    }
                }
            }
        }

        let to_string = self.program.sym.to_string;
        let stringable = self.program.sym.stringable;
        if decl.kind == ClassKind::Class
            && methods.contains_key(&to_string)
            && !interfaces.contains(&stringable)
        {
            interfaces.push(stringable);
        }

        if decl.kind == ClassKind::Class && !decl.is_abstract {
            let missing: Vec<String> = methods
                .values()
                .filter(|m| m.is_abstract)
                .map(|m| format!("{}::{}", self.text(m.origin), self.text(m.name)))
                .collect();
            if !missing.is_empty() {
                let noun = if missing.len() == 1 { "method" } else { "methods" };
                return Err(self.invalid(format!(
                    "Class {label} contains {} abstract {noun} and must therefore be declared abstract or implement the remaining methods ({})",
                    missing.len(),
                    missing.join(", ")
                )));
            }
        }

        Ok(ClassDef {
            name: self.name,
            lname: self.lname,
            kind: decl.kind,
            parent,
            is_abstract: decl.is_abstract,
            is_final: decl.is_final,
            is_readonly: decl.is_readonly,
            is_anonymous: decl.is_anonymous,
            interfaces,
            methods,
            properties,
            static_props,
            constants,
            decl: None,
        })
    }

    fn import_traits(
        &mut self,
        traits: &[Rc<ClassDef>],
        methods: &mut IndexMap<Symbol, Rc<MethodEntry>>,
        properties: &mut IndexMap<Symbol, Rc<PropertyInfo>>,
        static_props: &mut IndexMap<Symbol, Rc<StaticProp>>,
        constants: &mut IndexMap<Symbol, Rc<ClassConst>>,
    ) -> Result<(), LinkError> {
        if traits.is_empty() {
            return Ok(());
        }
        let decl = self.decl;
        let own_methods: Vec<Symbol> = decl.methods.iter().map(|m| m.name).collect();
        let own_methods: Vec<Symbol> = own_methods.into_iter().map(|m| self.lower(m)).collect();

        let mut rules = Vec::with_capacity(decl.trait_rules.len());
        for rule in &decl.trait_rules {
            rules.push(match rule {
                TraitRule::Precedence {
                    trait_name,
                    method,
                    excluded,
                } => {
                    let excluded = excluded.iter().map(|t| self.lower(*t)).collect::<Vec<_>>();
                    (Some(self.lower(*trait_name)), *method, Some(excluded), None, None)
                }
                TraitRule::Alias {
                    trait_name,
                    method,
                    alias,
                    visibility,
                } => {
                    let trait_name = trait_name.map(|t| self.lower(t));
                    (trait_name, *method, None, *alias, *visibility)
                }
            });
        }
        for (trait_name, method, _, _, _) in &rules {
            let found = traits.iter().any(|t| {
                trait_name.is_none_or(|n| n == t.lname) && t.methods.contains_key(method)
            });
            if !found {
                let label = self.class_label();
                let method_name = self.text(*method);
                return Err(self.invalid(format!(
                    "An alias was defined for {}::{method_name} but this method does not exist in {label}",
                    trait_name.map(|t| self.text(t)).unwrap_or_else(|| "a used trait".to_string())
                )));
            }
        }

        // lowercased method name -> trait that supplied it
        let mut imported: IndexMap<Symbol, Symbol> = IndexMap::new();
        for t in traits {
            for (key, method) in &t.methods {
                let excluded = rules.iter().any(|(_, m, excl, _, _)| {
                    *m == *key && excl.as_ref().is_some_and(|e| e.contains(&t.lname))
                });
                if excluded {
                    continue;
                }
                let mut entry = (**method).clone();
                entry.scope = self.lname;
                for (rule_trait, m, excl, alias, vis) in &rules {
                    if excl.is_none()
                        && alias.is_none()
                        && *m == *key
                        && rule_trait.is_none_or(|n| n == t.lname)
                        && let Some(vis) = vis
                    {
                        entry.visibility = *vis;
                    }
                }
                if let Some(previous) = imported.get(key).copied()
                    && !own_methods.contains(key)
                {
                    let existing_abstract = methods.get(key).is_some_and(|m| m.is_abstract);
                    if method.is_abstract {
                        continue;
                    }
                    if !existing_abstract {
                        return Err(LinkError::Invalid(CompileError::TraitConflict {
                            class: self.class_label(),
                            method: self.text(method.name),
                            traits: (self.text(previous), self.text(t.name)),
                            at: self.at,
                        }));
                    }
                }
                if method.is_abstract && methods.get(key).is_some_and(|m| !m.is_abstract) {
                    continue;
                }
                trace!(method = %self.text(method.name), from = %self.text(t.name), "trait method imported");
                imported.insert(*key, t.name);
                methods.insert(*key, Rc::new(entry));
            }

            for (trait_name, m, excl, alias, vis) in &rules {
                let (Some(alias), None) = (alias, excl) else {
                    continue;
                };
                if !trait_name.is_none_or(|n| n == t.lname) {
                    continue;
                }
                let Some(method) = t.methods.get(m) else {
                    continue;
                };
                let mut entry = (**method).clone();
                entry.name = *alias;
                entry.scope = self.lname;
                if let Some(vis) = vis {
                    entry.visibility = *vis;
                }
                let key = self.lower(*alias);
                methods.insert(key, Rc::new(entry));
            }

            for (name, prop) in &t.properties {
                let mut info = (**prop).clone();
                info.declaring_class = self.lname;
                info.default = prop.default.as_ref().map(|d| LazyInit::new(d.init.clone()));
                properties.insert(*name, Rc::new(info));
            }
            for (name, prop) in &t.static_props {
                static_props.insert(
                    *name,
                    Rc::new(StaticProp {
                        name: prop.name,
                        visibility: prop.visibility,
                        declaring_class: self.lname,
                        is_readonly: prop.is_readonly,
                        type_hint: prop.type_hint.clone(),
                        init: prop.init.clone(),
                        cell: OnceCell::new(),
                    }),
                );
            }
            for (name, constant) in &t.constants {
                constants.insert(
                    *name,
                    Rc::new(ClassConst {
                        name: constant.name,
                        init: constant.init.clone(),
                        cache: LazyVal::default(),
                        visibility: constant.visibility,
                        is_final: constant.is_final,
                        declaring_class: self.lname,
                    }),
                );
            }
        }
        Ok(())
    }

    fn add_constants(&mut self, constants: &mut IndexMap<Symbol, Rc<ClassConst>>) -> Result<(), LinkError> {
        let decl = self.decl;
        for c in &decl.constants {
            if let Some(existing) = constants.get(&c.name)
                && existing.is_final
                && existing.declaring_class != self.lname
            {
                let label = self.class_label();
                let shown = self.text(c.name);
                let owner = self.owner_display(existing.declaring_class);
                return Err(self.invalid(format!(
                    "{label}::{shown} cannot override final constant {owner}::{shown}"
                )));
            }
            constants.insert(
                c.name,
                Rc::new(ClassConst {
                    name: c.name,
                    init: c.value.clone(),
                    cache: LazyVal::default(),
                    visibility: c.visibility,
                    is_final: c.is_final,
                    declaring_class: self.lname,
                }),
            );
        }
        Ok(())
    }

    fn add_properties(
        &mut self,
        properties: &mut IndexMap<Symbol, Rc<PropertyInfo>>,
        static_props: &mut IndexMap<Symbol, Rc<StaticProp>>,
    ) -> Result<(), LinkError> {
        let decl = self.decl;
        let label = self.class_label();
        for p in &decl.properties {
            let shown = self.text(p.name);
            let inherited_instance = properties
                .get(&p.name)
                .filter(|i| i.visibility != Visibility::Private && i.declaring_class != self.lname)
                .map(|i| (i.visibility, i.declaring_class));
            let inherited_static = static_props
                .get(&p.name)
                .filter(|i| i.visibility != Visibility::Private && i.declaring_class != self.lname)
                .map(|i| (i.visibility, i.declaring_class));
            match (p.is_static, inherited_instance, inherited_static) {
                (true, Some((_, owner)), _) => {
                    let owner = self.owner_display(owner);
                    return Err(self.invalid(format!(
                        "Cannot redeclare non static {owner}::${shown} as static {label}::${shown}"
                    )));
                }
                (false, _, Some((_, owner))) => {
                    let owner = self.owner_display(owner);
                    return Err(self.invalid(format!(
                        "Cannot redeclare static {owner}::${shown} as non static {label}::${shown}"
                    )));
                }
                _ => {}
            }
            if let Some((vis, owner)) = inherited_instance.or(inherited_static)
                && rank(p.visibility) > rank(vis)
            {
                let owner = self.owner_display(owner);
                let message = match vis {
                    Visibility::Public => {
                        format!("Access level to {label}::${shown} must be public (as in class {owner})")
                    }
                    _ => format!(
                        "Access level to {label}::${shown} must be protected (as in class {owner}) or weaker"
                    ),
                };
                return Err(self.invalid(message));
            }

            if p.is_static {
                static_props.insert(
                    p.name,
                    Rc::new(StaticProp {
                        name: p.name,
                        visibility: p.visibility,
                        declaring_class: self.lname,
                        is_readonly: p.is_readonly,
                        type_hint: p.type_hint.clone(),
                        init: p.default.clone().unwrap_or(ConstInit::Const(Default::default())),
                        cell: OnceCell::new(),
                    }),
                );
            } else {
                properties.insert(
                    p.name,
                    Rc::new(PropertyInfo {
                        name: p.name,
                        visibility: p.visibility,
                        declaring_class: self.lname,
                        is_readonly: p.is_readonly || decl.is_readonly,
                        type_hint: p.type_hint.clone(),
                        hooks: p.hooks.clone(),
                        default: p.default.clone().map(LazyInit::new),
                    }),
                );
            }
        }
        Ok(())
    }

    fn add_methods(&mut self, methods: &mut IndexMap<Symbol, Rc<MethodEntry>>) -> Result<(), LinkError> {
        let decl = self.decl;
        let label = self.class_label();
        let construct = self.program.sym.construct;
        for m in &decl.methods {
            let key = self.lower(m.name);
            let shown = self.text(m.name);
            let inherited = methods
                .get(&key)
                .filter(|e| e.visibility != Visibility::Private && e.scope != self.lname)
                .cloned();
            if let Some(parent) = inherited {
                let owner = self.text(parent.origin);
                if parent.is_final {
                    return Err(self.invalid(format!("Cannot override final method {owner}::{shown}()")));
                }
                if parent.is_static && !m.is_static {
                    return Err(self.invalid(format!(
                        "Cannot make static method {owner}::{shown}() non static in class {label}"
                    )));
                }
                if !parent.is_static && m.is_static {
                    return Err(self.invalid(format!(
                        "Cannot make non static method {owner}::{shown}() static in class {label}"
                    )));
                }
                if key != construct && rank(m.visibility) > rank(parent.visibility) {
                    let message = match parent.visibility {
                        Visibility::Public => format!(
                            "Access level to {label}::{shown}() must be public (as in class {owner})"
                        ),
                        _ => format!(
                            "Access level to {label}::{shown}() must be protected (as in class {owner}) or weaker"
                        ),
                    };
                    return Err(self.invalid(message));
                }
            }
            methods.insert(
                key,
                Rc::new(MethodEntry {
                    name: m.name,
                    func: MethodImpl::User(m.func.clone()),
                    visibility: m.visibility,
                    is_static: m.is_static,
                    is_abstract: m.is_abstract,
                    is_final: m.is_final,
                    scope: self.lname,
                    origin: self.name,
                }),
            );
        }
        Ok(())
    }

    fn owner_display(&self, lname: Symbol) -> String {
        match self.program.classes.get(&lname) {
            Some(class) => self.program.class_display(class),
            None => self.text(lname),
        }
    }
}

fn rank(visibility: Visibility) -> u8 {
    match visibility {
        Visibility::Public => 0,
        Visibility::Protected => 1,
        Visibility::Private => 2,
    }
}
