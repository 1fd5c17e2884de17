use crate::compiler::chunk::{CodeChunk, UserFunc};
use crate::core::value::{ArrayData, ObjectRef, Reference, Symbol, Tracer, Val};
use crate::runtime::context::{ClassDef, NativeMethod};
use crate::runtime::registry::NativeFunction;
use smallvec::SmallVec;
use std::rc::Rc;

pub const INLINE_ARG_CAPACITY: usize = 8;
pub type ArgList = SmallVec<[Val; INLINE_ARG_CAPACITY]>;

/// One activation of a user function, the main script or a generator body.
pub struct Frame {
    pub func: Rc<UserFunc>,
    pub chunk: Rc<CodeChunk>,
    /// Index of the next instruction
    pub ip: usize,
    pub locals: Vec<Reference>,
    pub stack: Vec<Val>,
    pub this: Option<ObjectRef>,
    /// Class the code was written in (`self`)
    pub scope: Option<Rc<ClassDef>>,
    /// Class the call was made on (`static`)
    pub static_class: Option<Rc<ClassDef>>,
    /// Every argument passed, for `func_get_args`
    pub args: ArgList,
    /// Calls being assembled by `Init*`/`Send*`
    pub calls: Vec<PendingCall>,
    /// Active foreach and `yield from` iterators
    pub iterators: Vec<IterState>,
    /// Pending completion per try region while its finally body runs
    pub completions: Vec<Option<Completion>>,
    /// Drop the return value instead of pushing it on the caller's stack
    pub discard: bool,
    /// Set while running a property hook: (object address, property)
    pub hook: Option<(usize, Symbol)>,
    /// The generator object while this frame runs as its body
    pub generator: Option<ObjectRef>,
    pub is_main: bool,
}

impl Frame {
    pub fn new(func: Rc<UserFunc>) -> Self {
        let chunk = func.chunk.clone();
        let locals = (0..chunk.local_names.len())
            .map(|_| Reference::new(Val::Uninitialized))
            .collect();
        let completions = vec![None; chunk.try_regions.len()];
        Self {
            func,
            chunk,
            ip: 0,
            locals,
            stack: Vec::with_capacity(8),
            this: None,
            scope: None,
            static_class: None,
            args: ArgList::new(),
            calls: Vec::new(),
            iterators: Vec::new(),
            completions,
            discard: false,
            hook: None,
            generator: None,
            is_main: false,
        }
    }

    /// Instruction index of the instruction being executed.
    pub fn pc(&self) -> u32 {
        self.ip.saturating_sub(1) as u32
    }

    pub fn line(&self) -> u32 {
        self.chunk.line_at(self.ip.saturating_sub(1))
    }

    /// Visits every counted edge held by a suspended frame.
    pub fn trace(&self, tracer: &mut dyn Tracer) {
        for cell in &self.locals {
            tracer.cell(cell);
        }
        for val in self.stack.iter().chain(self.args.iter()) {
            tracer.value(val);
        }
        if let Some(this) = &self.this {
            tracer.object(this);
        }
        for call in &self.calls {
            call.trace(tracer);
        }
        for iter in &self.iterators {
            iter.trace(tracer);
        }
        for completion in self.completions.iter().flatten() {
            match completion {
                Completion::Return(val) => tracer.value(val),
                Completion::Throw(exc) => tracer.object(exc),
                Completion::Jump(_) => {}
            }
        }
    }
}

/// How a try region was left while its finally body runs.
#[derive(Debug, Clone)]
pub enum Completion {
    Return(Val),
    Throw(ObjectRef),
    Jump(u32),
}

/// What a call will invoke once its arguments are collected.
#[derive(Clone)]
pub enum Callee {
    User {
        func: Rc<UserFunc>,
        this: Option<ObjectRef>,
        scope: Option<Rc<ClassDef>>,
        static_class: Option<Rc<ClassDef>>,
        /// Closure captures in `uses` order; by-reference captures are `Val::Ref`
        captures: Option<Rc<[Val]>>,
    },
    Native(NativeFunction),
    NativeMethod {
        handler: NativeMethod,
        this: Option<ObjectRef>,
    },
    /// `new` on a class without a constructor
    Noop,
}

impl Callee {
    /// Whether argument `index` is passed by reference.
    pub fn arg_by_ref(&self, index: usize) -> bool {
        match self {
            Callee::User { func, .. } => func.param_by_ref(index),
            Callee::Native(native) => native.arg_by_ref(index),
            Callee::NativeMethod { .. } | Callee::Noop => false,
        }
    }

    pub fn user_func(&self) -> Option<&Rc<UserFunc>> {
        match self {
            Callee::User { func, .. } => Some(func),
            _ => None,
        }
    }

    pub fn this(&self) -> Option<&ObjectRef> {
        match self {
            Callee::User { this, .. } | Callee::NativeMethod { this, .. } => this.as_ref(),
            _ => None,
        }
    }

    pub fn trace(&self, tracer: &mut dyn Tracer) {
        match self {
            Callee::User { this, captures, .. } => {
                if let Some(this) = this {
                    tracer.object(this);
                }
                for val in captures.iter().flat_map(|c| c.iter()) {
                    tracer.value(val);
                }
            }
            Callee::NativeMethod { this: Some(this), .. } => tracer.object(this),
            _ => {}
        }
    }
}

impl std::fmt::Debug for Callee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callee::User { func, .. } => write!(f, "User({:?})", func.name),
            Callee::Native(_) => write!(f, "Native"),
            Callee::NativeMethod { .. } => write!(f, "NativeMethod"),
            Callee::Noop => write!(f, "Noop"),
        }
    }
}

/// A call between its `Init*` instruction and `DoCall`.
pub struct PendingCall {
    pub callee: Callee,
    pub args: ArgList,
    pub named: Vec<(Symbol, Val)>,
    pub discard: bool,
    /// Method name for a call redirected to `__call`/`__callStatic`
    pub magic: Option<Val>,
}

impl PendingCall {
    pub fn new(callee: Callee) -> Self {
        Self {
            callee,
            args: ArgList::new(),
            named: Vec::new(),
            discard: false,
            magic: None,
        }
    }

    fn trace(&self, tracer: &mut dyn Tracer) {
        self.callee.trace(tracer);
        for val in &self.args {
            tracer.value(val);
        }
        for (_, val) in &self.named {
            tracer.value(val);
        }
    }
}

/// Position of a foreach loop or `yield from` delegation.
pub enum IterState {
    Array {
        array: Rc<ArrayData>,
        pos: usize,
    },
    /// By-reference iteration over the array held in a variable
    ArrayRef {
        cell: Reference,
        pos: usize,
    },
    /// Plain object: visible properties, names taken when the loop starts
    Object {
        obj: ObjectRef,
        keys: Vec<Symbol>,
        pos: usize,
        by_ref: bool,
    },
    Iterator {
        obj: ObjectRef,
    },
    Generator {
        obj: ObjectRef,
    },
}

impl IterState {
    fn trace(&self, tracer: &mut dyn Tracer) {
        match self {
            IterState::Array { array, .. } => tracer.value(&Val::Array(array.clone())),
            IterState::ArrayRef { cell, .. } => tracer.cell(cell),
            IterState::Object { obj, .. }
            | IterState::Iterator { obj }
            | IterState::Generator { obj } => tracer.object(obj),
        }
    }
}
