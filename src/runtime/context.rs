//! Program-wide tables: classes, functions and constants.
//!
//! A [`Program`] is built by the compiler before execution starts and is
//! owned by the VM afterwards. During execution it only grows: nested
//! `function`/`class` declarations and `define`-style constants are added
//! as they run, nothing is ever removed.

use super::registry::{FunctionRegistry, NativeFunction};
use crate::compiler::chunk::{ClassDecl, ClassKind, ConstInit, LazyVal, PropertyHooks, TypeHint, UserFunc};
use crate::core::interner::Interner;
use crate::core::value::{ObjectRef, Reference, Symbol, Val, Visibility};
use crate::vm::engine::{VM, VmError};
use indexmap::IndexMap;
use std::cell::OnceCell;
use std::rc::Rc;

/// Handler of a builtin method. Receives `$this` for instance calls.
pub type NativeMethod = fn(&mut VM, Option<&ObjectRef>, &mut [Val]) -> Result<Val, VmError>;

#[derive(Clone)]
pub enum MethodImpl {
    User(Rc<UserFunc>),
    Native(NativeMethod),
}

impl std::fmt::Debug for MethodImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodImpl::User(func) => write!(f, "User({:?})", func.name),
            MethodImpl::Native(_) => write!(f, "Native"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodEntry {
    /// Spelling used in the declaration (or the trait alias)
    pub name: Symbol,
    pub func: MethodImpl,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    /// Lowercased name of the class whose scope the body runs in (`self`)
    pub scope: Symbol,
    /// Class, trait or interface the method was written in, as spelled
    pub origin: Symbol,
}

impl MethodEntry {
    pub fn user_func(&self) -> Option<&Rc<UserFunc>> {
        match &self.func {
            MethodImpl::User(func) => Some(func),
            MethodImpl::Native(_) => None,
        }
    }
}

/// Default value of an instance property, evaluated once per class.
#[derive(Debug)]
pub struct LazyInit {
    pub init: ConstInit,
    pub value: LazyVal,
}

impl LazyInit {
    pub fn new(init: ConstInit) -> Rc<Self> {
        Rc::new(Self {
            init,
            value: LazyVal::default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: Symbol,
    pub visibility: Visibility,
    /// Lowercased name of the declaring class
    pub declaring_class: Symbol,
    pub is_readonly: bool,
    pub type_hint: Option<TypeHint>,
    pub hooks: Option<Rc<PropertyHooks>>,
    /// `None` leaves typed properties uninitialized
    pub default: Option<Rc<LazyInit>>,
}

impl PropertyInfo {
    pub fn is_virtual(&self) -> bool {
        self.hooks.as_ref().is_some_and(|h| h.is_virtual)
    }
}

/// A static property. Subclasses share the parent's cell unless they
/// redeclare the property; classes using a trait each get their own.
#[derive(Debug)]
pub struct StaticProp {
    pub name: Symbol,
    pub visibility: Visibility,
    pub declaring_class: Symbol,
    pub is_readonly: bool,
    pub type_hint: Option<TypeHint>,
    pub init: ConstInit,
    pub cell: OnceCell<Reference>,
}

#[derive(Debug)]
pub struct ClassConst {
    pub name: Symbol,
    pub init: ConstInit,
    pub cache: LazyVal,
    pub visibility: Visibility,
    pub is_final: bool,
    pub declaring_class: Symbol,
}

/// A linked class: inheritance and traits applied, ready to instantiate.
#[derive(Debug)]
pub struct ClassDef {
    pub name: Symbol,
    pub lname: Symbol,
    pub kind: ClassKind,
    pub parent: Option<Rc<ClassDef>>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
    pub is_anonymous: bool,
    /// Every implemented interface, transitively, lowercased
    pub interfaces: Vec<Symbol>,
    pub methods: IndexMap<Symbol, Rc<MethodEntry>>,
    pub properties: IndexMap<Symbol, Rc<PropertyInfo>>,
    pub static_props: IndexMap<Symbol, Rc<StaticProp>>,
    pub constants: IndexMap<Symbol, Rc<ClassConst>>,
    /// Source declaration, `None` for builtin classes
    pub decl: Option<Rc<ClassDecl>>,
}

impl ClassDef {
    pub fn find_method(&self, lname: Symbol) -> Option<&Rc<MethodEntry>> {
        self.methods.get(&lname)
    }

    /// `instanceof` against a lowercased class or interface name.
    pub fn is_a(&self, lname: Symbol) -> bool {
        if self.lname == lname || self.interfaces.contains(&lname) {
            return true;
        }
        let mut current = self.parent.as_deref();
        while let Some(class) = current {
            if class.lname == lname {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }

    pub fn is_subclass_of(&self, other: &ClassDef) -> bool {
        self.is_a(other.lname)
    }
}

/// Symbols the VM looks up constantly, interned once.
#[derive(Debug, Clone, Copy)]
pub struct KnownSymbols {
    pub construct: Symbol,
    pub destruct: Symbol,
    pub get: Symbol,
    pub set: Symbol,
    pub isset: Symbol,
    pub unset: Symbol,
    pub call: Symbol,
    pub call_static: Symbol,
    pub to_string: Symbol,
    pub invoke: Symbol,
    pub clone: Symbol,
    pub closure: Symbol,
    pub generator: Symbol,
    pub std_class: Symbol,
    pub throwable: Symbol,
    pub traversable: Symbol,
    pub iterator: Symbol,
    pub iterator_aggregate: Symbol,
    pub array_access: Symbol,
    pub countable: Symbol,
    pub stringable: Symbol,
    pub message: Symbol,
    pub code: Symbol,
    pub previous: Symbol,
    pub file: Symbol,
    pub line: Symbol,
    pub trace: Symbol,
    pub this: Symbol,
}

impl KnownSymbols {
    fn new(interner: &mut Interner) -> Self {
        let mut s = |text: &[u8]| interner.intern(text);
        Self {
            construct: s(b"__construct"),
            destruct: s(b"__destruct"),
            get: s(b"__get"),
            set: s(b"__set"),
            isset: s(b"__isset"),
            unset: s(b"__unset"),
            call: s(b"__call"),
            call_static: s(b"__callstatic"),
            to_string: s(b"__tostring"),
            invoke: s(b"__invoke"),
            clone: s(b"__clone"),
            closure: s(b"closure"),
            generator: s(b"generator"),
            std_class: s(b"stdclass"),
            throwable: s(b"throwable"),
            traversable: s(b"traversable"),
            iterator: s(b"iterator"),
            iterator_aggregate: s(b"iteratoraggregate"),
            array_access: s(b"arrayaccess"),
            countable: s(b"countable"),
            stringable: s(b"stringable"),
            message: s(b"message"),
            code: s(b"code"),
            previous: s(b"previous"),
            file: s(b"file"),
            line: s(b"line"),
            trace: s(b"trace"),
            this: s(b"this"),
        }
    }
}

/// Everything the VM needs to run a compiled file.
pub struct Program {
    pub interner: Interner,
    pub main: Option<Rc<UserFunc>>,
    pub file_name: Vec<u8>,
    /// User functions by lowercased name
    pub functions: IndexMap<Symbol, Rc<UserFunc>>,
    pub natives: FunctionRegistry,
    /// Linked classes by lowercased name
    pub classes: IndexMap<Symbol, Rc<ClassDef>>,
    /// Global constants, case-sensitive
    pub constants: IndexMap<Symbol, Val>,
    pub sym: KnownSymbols,
}

impl Program {
    /// A program holding only the builtin classes, functions and constants.
    pub fn new() -> Self {
        let mut interner = Interner::new();
        let sym = KnownSymbols::new(&mut interner);
        let mut program = Self {
            interner,
            main: None,
            file_name: b"Standard input code".to_vec(),
            functions: IndexMap::new(),
            natives: FunctionRegistry::new(),
            classes: IndexMap::new(),
            constants: IndexMap::new(),
            sym,
        };
        super::extension::load_extensions(&mut program, vec![Box::new(super::core_extension::CoreExtension)]);
        program
    }

    pub fn class(&self, lname: Symbol) -> Option<&Rc<ClassDef>> {
        self.classes.get(&lname)
    }

    /// Case-insensitive class lookup by source spelling.
    pub fn find_class(&self, name: &[u8]) -> Option<&Rc<ClassDef>> {
        let name = name.strip_prefix(b"\\").unwrap_or(name);
        let short = match name.iter().rposition(|b| *b == b'\\') {
            Some(i) => &name[i + 1..],
            None => name,
        };
        let lname = self.interner.find_lower(short)?;
        self.classes.get(&lname)
    }

    pub fn native_function(&self, lname: Symbol) -> Option<&NativeFunction> {
        self.natives.get(self.interner.text(lname))
    }

    pub fn function_exists(&self, lname: Symbol) -> bool {
        self.functions.contains_key(&lname) || self.native_function(lname).is_some()
    }

    pub fn display(&self, sym: Symbol) -> String {
        self.interner.display(sym).into_owned()
    }

    /// Display name of a class for messages; anonymous classes stop at the NUL.
    pub fn class_display(&self, class: &ClassDef) -> String {
        let text = self.interner.text(class.name);
        match text.iter().position(|b| *b == 0) {
            Some(i) => String::from_utf8_lossy(&text[..i]).into_owned(),
            None => String::from_utf8_lossy(text).into_owned(),
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("functions", &self.functions.len())
            .field("classes", &self.classes.len())
            .field("constants", &self.constants.len())
            .finish()
    }
}
