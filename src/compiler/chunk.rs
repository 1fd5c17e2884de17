use crate::core::value::{Reference, Symbol, Val, Visibility};
use crate::vm::opcode::OpCode;
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

#[derive(Debug)]
pub struct UserFunc {
    /// Display name (`foo`, `Foo::bar`, `{closure}`)
    pub name: Symbol,
    pub params: Vec<FuncParam>,
    pub uses: Vec<ClosureCapture>,
    pub chunk: Rc<CodeChunk>,
    pub is_static: bool,
    pub is_generator: bool,
    pub returns_ref: bool,
    pub return_type: Option<TypeHint>,
    /// `static $x` cells, shared by every call of this function
    pub statics: RefCell<Vec<Option<Reference>>>,
}

impl UserFunc {
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none() && !p.is_variadic)
            .count()
    }

    pub fn param_by_ref(&self, index: usize) -> bool {
        match self.params.get(index) {
            Some(param) => param.by_ref,
            None => self.params.last().is_some_and(|p| p.is_variadic && p.by_ref),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeHint {
    Int,
    Float,
    String,
    Bool,
    True,
    False,
    Array,
    Object,
    Callable,
    Iterable,
    Mixed,
    Void,
    Never,
    Null,
    Static,
    SelfType,
    Parent,
    /// Class or interface; the symbol keeps the source spelling
    Class(Symbol),
    Nullable(Box<TypeHint>),
    Union(Vec<TypeHint>),
    Intersection(Vec<TypeHint>),
}

impl TypeHint {
    pub fn allows_null(&self) -> bool {
        match self {
            TypeHint::Null | TypeHint::Mixed | TypeHint::Nullable(_) => true,
            TypeHint::Union(types) => types.iter().any(TypeHint::allows_null),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncParam {
    pub name: Symbol,
    pub by_ref: bool,
    pub param_type: Option<TypeHint>,
    pub is_variadic: bool,
    /// Present when the parameter has a default; the default itself is
    /// evaluated by the `RecvDefault` prologue in the function body.
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Clone)]
pub enum DefaultValue {
    /// Constant-folded at compile time
    Const(Val),
    /// Evaluated by bytecode on each call
    Expr,
}

#[derive(Debug, Clone, Copy)]
pub struct ClosureCapture {
    pub name: Symbol,
    /// Local slot inside the closure body
    pub slot: u32,
    pub by_ref: bool,
}

/// A guarded `try` statement. All offsets are instruction indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct TryRegion {
    pub start: u32,
    /// End of the `try` block (exclusive); catch handlers follow
    pub try_end: u32,
    pub catches: Vec<CatchHandler>,
    /// End of the last catch block (exclusive)
    pub protected_end: u32,
    pub finally: Option<u32>,
    pub finally_end: u32,
    /// Active foreach iterators when the region was entered
    pub iter_depth: u32,
}

impl TryRegion {
    pub fn in_try(&self, pc: u32) -> bool {
        pc >= self.start && pc < self.try_end
    }

    pub fn in_catch(&self, pc: u32) -> bool {
        pc >= self.try_end && pc < self.protected_end
    }

    pub fn in_finally(&self, pc: u32) -> bool {
        self.finally.is_some_and(|f| pc >= f && pc < self.finally_end)
    }

    pub fn contains(&self, pc: u32) -> bool {
        pc >= self.start && pc < self.finally_end.max(self.protected_end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchHandler {
    /// Lowercased class names accepted by this handler
    pub types: Vec<Symbol>,
    pub target: u32,
}

#[derive(Debug, Default)]
pub struct CodeChunk {
    pub name: Symbol,
    pub strict_types: bool,
    pub code: Vec<OpCode>,
    pub constants: Vec<Val>,
    pub lines: Vec<u32>,
    /// Names of the local slots; `None` marks compiler temporaries
    pub local_names: Vec<Option<Symbol>>,
    pub try_regions: Vec<TryRegion>,
    /// Closures and conditionally declared functions defined in this body
    pub functions: Vec<Rc<UserFunc>>,
    /// Classes declared at runtime from this body
    pub classes: Vec<Rc<ClassDecl>>,
}

impl CodeChunk {
    pub fn line_at(&self, ip: usize) -> u32 {
        self.lines.get(ip).copied().unwrap_or(0)
    }
}

/// Initializer of a class constant, property default or static property.
#[derive(Debug, Clone)]
pub enum ConstInit {
    Const(Val),
    /// Bytecode computing the value in the declaring class scope, run on first use
    Thunk(Rc<UserFunc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
}

/// A class as written in the source, before inheritance and traits are applied.
#[derive(Debug)]
pub struct ClassDecl {
    pub name: Symbol,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
    pub is_anonymous: bool,
    pub parent: Option<Symbol>,
    pub interfaces: Vec<Symbol>,
    pub traits: Vec<Symbol>,
    pub trait_rules: Vec<TraitRule>,
    pub constants: Vec<ConstDecl>,
    pub properties: Vec<PropDecl>,
    pub methods: Vec<MethodDecl>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub enum TraitRule {
    /// `T::m insteadof U, V`
    Precedence {
        trait_name: Symbol,
        method: Symbol,
        excluded: Vec<Symbol>,
    },
    /// `T::m as [visibility] [alias]`
    Alias {
        trait_name: Option<Symbol>,
        method: Symbol,
        alias: Option<Symbol>,
        visibility: Option<Visibility>,
    },
}

#[derive(Debug)]
pub struct ConstDecl {
    pub name: Symbol,
    pub value: ConstInit,
    pub visibility: Visibility,
    pub is_final: bool,
}

#[derive(Debug)]
pub struct PropDecl {
    pub name: Symbol,
    pub default: Option<ConstInit>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_readonly: bool,
    pub type_hint: Option<TypeHint>,
    pub hooks: Option<Rc<PropertyHooks>>,
}

#[derive(Debug, Default)]
pub struct PropertyHooks {
    pub get: Option<Rc<UserFunc>>,
    pub set: Option<Rc<UserFunc>>,
    /// Virtual properties have no backing storage in the object
    pub is_virtual: bool,
}

#[derive(Debug)]
pub struct MethodDecl {
    pub name: Symbol,
    pub func: Rc<UserFunc>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

/// Lazily computed value cached on first access.
#[derive(Debug, Default)]
pub struct LazyVal {
    cell: OnceCell<Val>,
}

impl LazyVal {
    pub fn get(&self) -> Option<&Val> {
        self.cell.get()
    }

    pub fn set(&self, val: Val) -> Val {
        let _ = self.cell.set(val);
        self.cell.get().cloned().unwrap_or_default()
    }
}
