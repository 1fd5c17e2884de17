use super::context::NativeMethod;
use crate::compiler::chunk::ClassKind;
use crate::core::value::{Val, Visibility};
use crate::vm::engine::{VM, VmError};
use std::collections::HashMap;

/// Handler of a builtin function. By-reference arguments arrive as `Val::Ref`.
pub type NativeHandler = fn(&mut VM, &mut [Val]) -> Result<Val, VmError>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub handler: NativeHandler,
    /// Zero-based positions of by-reference parameters
    pub by_ref_args: &'static [usize],
}

impl NativeFunction {
    pub fn arg_by_ref(&self, index: usize) -> bool {
        self.by_ref_args.contains(&index)
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("by_ref_args", &self.by_ref_args)
            .finish()
    }
}

/// Builtin functions by lowercased name.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<Vec<u8>, NativeFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &[u8], handler: NativeHandler) {
        self.register_with_by_ref(name, handler, &[]);
    }

    pub fn register_with_by_ref(
        &mut self,
        name: &[u8],
        handler: NativeHandler,
        by_ref_args: &'static [usize],
    ) {
        self.functions.insert(
            name.to_ascii_lowercase(),
            NativeFunction {
                handler,
                by_ref_args,
            },
        );
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &[u8]) -> Option<&NativeFunction> {
        if name.iter().any(u8::is_ascii_uppercase) {
            self.functions.get(&name.to_ascii_lowercase())
        } else {
            self.functions.get(name)
        }
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &[u8]> {
        self.functions.keys().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Builtin class definition registered by an extension
#[derive(Clone)]
pub struct NativeClassDef {
    pub name: &'static [u8],
    pub kind: ClassKind,
    pub parent: Option<&'static [u8]>,
    pub interfaces: &'static [&'static [u8]],
    pub is_abstract: bool,
    pub is_final: bool,
    pub methods: Vec<NativeMethodEntry>,
    pub properties: Vec<NativePropertyEntry>,
    pub constants: Vec<(&'static [u8], Val)>,
}

impl NativeClassDef {
    pub fn class(name: &'static [u8]) -> Self {
        Self {
            name,
            kind: ClassKind::Class,
            parent: None,
            interfaces: &[],
            is_abstract: false,
            is_final: false,
            methods: Vec::new(),
            properties: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn interface(name: &'static [u8]) -> Self {
        Self {
            kind: ClassKind::Interface,
            ..Self::class(name)
        }
    }

    pub fn extends(mut self, parent: &'static [u8]) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn implements(mut self, interfaces: &'static [&'static [u8]]) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn method(mut self, name: &'static [u8], handler: NativeMethod) -> Self {
        self.methods.push(NativeMethodEntry {
            name,
            handler,
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: false,
            is_final: false,
        });
        self
    }

    pub fn static_method(mut self, name: &'static [u8], handler: NativeMethod) -> Self {
        self.methods.push(NativeMethodEntry {
            name,
            handler,
            visibility: Visibility::Public,
            is_static: true,
            is_abstract: false,
            is_final: false,
        });
        self
    }

    pub fn final_method(mut self, name: &'static [u8], handler: NativeMethod) -> Self {
        self.methods.push(NativeMethodEntry {
            name,
            handler,
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: false,
            is_final: true,
        });
        self
    }

    /// Interface method; calling it directly raises an error.
    pub fn abstract_method(mut self, name: &'static [u8]) -> Self {
        self.methods.push(NativeMethodEntry {
            name,
            handler: abstract_method_stub,
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: true,
            is_final: false,
        });
        self
    }

    pub fn property(mut self, name: &'static [u8], default: Val, visibility: Visibility) -> Self {
        self.properties.push(NativePropertyEntry {
            name,
            default,
            visibility,
        });
        self
    }

    pub fn constant(mut self, name: &'static [u8], value: Val) -> Self {
        self.constants.push((name, value));
        self
    }
}

#[derive(Clone)]
pub struct NativeMethodEntry {
    pub name: &'static [u8],
    pub handler: NativeMethod,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

#[derive(Clone)]
pub struct NativePropertyEntry {
    pub name: &'static [u8],
    pub default: Val,
    pub visibility: Visibility,
}

fn abstract_method_stub(
    vm: &mut VM,
    _this: Option<&crate::core::value::ObjectRef>,
    _args: &mut [Val],
) -> Result<Val, VmError> {
    Err(vm.throw_error(b"Error", "Cannot call abstract method"))
}

/// Everything extensions register during module init, in registration order.
#[derive(Default)]
pub struct ExtensionRegistry {
    pub functions: FunctionRegistry,
    pub classes: Vec<NativeClassDef>,
    pub constants: Vec<(&'static [u8], Val)>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function(&mut self, name: &[u8], handler: NativeHandler) {
        self.functions.register(name, handler);
    }

    pub fn register_function_with_by_ref(
        &mut self,
        name: &[u8],
        handler: NativeHandler,
        by_ref_args: &'static [usize],
    ) {
        self.functions.register_with_by_ref(name, handler, by_ref_args);
    }

    /// Classes must be registered after their parent and interfaces.
    pub fn register_class(&mut self, class: NativeClassDef) {
        self.classes.push(class);
    }

    pub fn register_constant(&mut self, name: &'static [u8], value: Val) {
        self.constants.push((name, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_vm: &mut VM, _args: &mut [Val]) -> Result<Val, VmError> {
        Ok(Val::Null)
    }

    #[test]
    fn lookup_ignores_case() {
        let mut registry = FunctionRegistry::new();
        registry.register(b"StrLen", noop);
        assert!(registry.get(b"strlen").is_some());
        assert!(registry.get(b"STRLEN").is_some());
        assert!(registry.get(b"strlen2").is_none());
    }

    #[test]
    fn by_ref_positions_are_kept() {
        let mut registry = FunctionRegistry::new();
        registry.register_with_by_ref(b"sort", noop, &[0]);
        let sort = registry.get(b"sort").copied();
        assert!(sort.is_some_and(|f| f.arg_by_ref(0) && !f.arg_by_ref(1)));
    }
}
