use super::context::{ClassConst, ClassDef, LazyInit, MethodEntry, MethodImpl, Program, PropertyInfo};
use super::registry::{ExtensionRegistry, NativeClassDef};
use crate::compiler::chunk::{ClassKind, ConstInit, LazyVal};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Extension metadata and version information
#[derive(Debug, Clone)]
pub struct ExtensionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub dependencies: &'static [&'static str],
}

/// Lifecycle hook results
#[derive(Debug)]
pub enum ExtensionResult {
    Success,
    Failure(String),
}

impl ExtensionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtensionResult::Success)
    }
}

/// A bundle of builtin functions, classes and constants.
///
/// `module_init` runs once while the [`Program`] is created; everything it
/// registers is installed before any user code is compiled, so user
/// declarations can extend builtin classes and collide with builtin names.
pub trait Extension {
    fn info(&self) -> ExtensionInfo;

    fn module_init(&self, _registry: &mut ExtensionRegistry) -> ExtensionResult {
        ExtensionResult::Success
    }
}

/// Runs `module_init` of every extension and installs the results.
pub fn load_extensions(program: &mut Program, extensions: Vec<Box<dyn Extension>>) {
    let mut registry = ExtensionRegistry::new();
    for extension in &extensions {
        let info = extension.info();
        match extension.module_init(&mut registry) {
            ExtensionResult::Success => debug!(extension = info.name, version = info.version, "extension loaded"),
            ExtensionResult::Failure(reason) => {
                warn!(extension = info.name, %reason, "extension failed to initialize");
            }
        }
    }
    let ExtensionRegistry {
        functions,
        classes,
        constants,
    } = registry;
    program.natives = functions;
    for (name, value) in constants {
        let sym = program.interner.intern(name);
        program.constants.insert(sym, value);
    }
    for class in classes {
        let def = link_native_class(program, &class);
        program.classes.insert(def.lname, Rc::new(def));
    }
}

/// Builds the linked form of a builtin class. Parents and interfaces must
/// already be installed.
fn link_native_class(program: &mut Program, native: &NativeClassDef) -> ClassDef {
    let name = program.interner.intern(native.name);
    let lname = program.interner.intern_lower(native.name);
    let parent = native.parent.and_then(|p| {
        let sym = program.interner.intern_lower(p);
        program.classes.get(&sym).cloned()
    });

    let mut interfaces = Vec::new();
    let mut methods = IndexMap::new();
    let mut properties = IndexMap::new();
    let mut constants = IndexMap::new();
    if let Some(parent) = &parent {
        interfaces.extend(parent.interfaces.iter().copied());
        methods = parent.methods.clone();
        properties = parent.properties.clone();
        constants = parent.constants.clone();
    }

    for method in &native.methods {
        let spelled = program.interner.intern(method.name);
        let key = program.interner.intern_lower(method.name);
        methods.insert(
            key,
            Rc::new(MethodEntry {
                name: spelled,
                func: MethodImpl::Native(method.handler),
                visibility: method.visibility,
                is_static: method.is_static,
                is_abstract: method.is_abstract,
                is_final: method.is_final,
                scope: lname,
                origin: name,
            }),
        );
    }

    for iface in native.interfaces {
        let key = program.interner.intern_lower(iface);
        let Some(def) = program.classes.get(&key).cloned() else {
            warn!(class = %String::from_utf8_lossy(native.name), interface = %String::from_utf8_lossy(iface), "unknown builtin interface");
            continue;
        };
        for sym in std::iter::once(def.lname).chain(def.interfaces.iter().copied()) {
            if !interfaces.contains(&sym) {
                interfaces.push(sym);
            }
        }
        for (key, method) in &def.methods {
            methods.entry(*key).or_insert_with(|| method.clone());
        }
        for (key, constant) in &def.constants {
            constants.entry(*key).or_insert_with(|| constant.clone());
        }
    }
    if native.kind == ClassKind::Class && methods.contains_key(&program.sym.to_string) {
        let stringable = program.sym.stringable;
        if program.classes.contains_key(&stringable) && !interfaces.contains(&stringable) {
            interfaces.push(stringable);
        }
    }

    for prop in &native.properties {
        let sym = program.interner.intern(prop.name);
        properties.insert(
            sym,
            Rc::new(PropertyInfo {
                name: sym,
                visibility: prop.visibility,
                declaring_class: lname,
                is_readonly: false,
                type_hint: None,
                hooks: None,
                default: Some(LazyInit::new(ConstInit::Const(prop.default.clone()))),
            }),
        );
    }
    for (const_name, value) in &native.constants {
        let sym = program.interner.intern(const_name);
        constants.insert(
            sym,
            Rc::new(ClassConst {
                name: sym,
                init: ConstInit::Const(value.clone()),
                cache: LazyVal::default(),
                visibility: crate::core::value::Visibility::Public,
                is_final: false,
                declaring_class: lname,
            }),
        );
    }

    ClassDef {
        name,
        lname,
        kind: native.kind,
        parent,
        is_abstract: native.is_abstract,
        is_final: native.is_final,
        is_readonly: false,
        is_anonymous: false,
        interfaces,
        methods,
        properties,
        static_props: IndexMap::new(),
        constants,
        decl: None,
    }
}
