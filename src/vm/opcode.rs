use crate::core::value::Symbol;

/// How an instruction names a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRef {
    /// Source spelling of the name
    Named(Symbol),
    /// The class lexically enclosing the executing code
    SelfRef,
    Parent,
    /// The class the current call was made on (late static binding)
    Static,
    /// Class name string or object popped from the stack
    Dynamic,
}

/// Base of an lvalue. `Prop` and `PropDynamic` expect the object (and for
/// the dynamic form, the name) on the stack below any dimension keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Local(u32),
    Prop(Symbol),
    PropDynamic,
    StaticProp(ClassRef, Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecKind {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldKind {
    /// `yield $v`: key is the next auto index
    Auto,
    /// `yield $k => $v`
    Keyed,
    /// Re-yield of a delegate's pair inside `yield from`; auto keys untouched
    Delegated,
}

/// Instructions. Jump operands hold label ids until the emitter patches
/// them to instruction indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // Stack
    Nop,
    Const(u32),
    Null,
    Pop,
    Dup,

    // Variables and places
    LoadLocal(u32),
    LoadThis,
    AssignLocal(u32),               // [Val] -> [Val]
    Assign { place: Place, depth: u8 }, // [prefix.., keys.., Val] -> [Val]
    AssignOp { place: Place, depth: u8, op: ArithOp },
    IncDec { place: Place, depth: u8, kind: IncDecKind },
    AssignRef { place: Place, depth: u8 }, // [prefix.., keys.., Ref] -> [Val]
    MakeRef { place: Place, depth: u8 },   // [prefix.., keys..] -> [Ref]
    Unset { place: Place, depth: u8 },
    IssetLocal { slot: u32, empty: bool },
    IssetDim { empty: bool },               // [Container, Key] -> [Bool]
    IssetProp { name: Symbol, empty: bool }, // [Obj] -> [Bool]
    IssetPropDynamic { empty: bool },        // [Obj, Name] -> [Bool]
    IssetStaticProp { class: ClassRef, name: Symbol, empty: bool },
    BindGlobal { slot: u32, name: Symbol },
    StaticInit { slot: u32, index: u32, skip: u32 },
    StaticBind { slot: u32, index: u32 }, // [Val] -> []

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    ConcatN(u16),
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseNot,
    ShiftLeft,
    ShiftRight,
    Negate,
    UnaryPlus,

    // Comparison
    IsEqual,
    IsNotEqual,
    IsIdentical,
    IsNotIdentical,
    IsLess,
    IsLessOrEqual,
    IsGreater,
    IsGreaterOrEqual,
    Spaceship,

    // Logical
    BoolNot,
    BoolXor,
    ToBool,
    Cast(CastType),

    // Control flow
    Jmp(u32),
    JmpIfFalse(u32),
    JmpIfTrue(u32),
    JmpZEx(u32),   // falsy: replace with false and jump, otherwise pop
    JmpNzEx(u32),  // truthy: replace with true and jump, otherwise pop
    Coalesce(u32), // non-null: keep and jump, otherwise pop
    JmpNull(u32),  // null: keep and jump
    JmpFinally(u32), // jump that leaves try blocks, running their finally bodies first
    FinallyEnd(u32), // resume the completion recorded for try region N

    // Arrays
    NewArray(u32),
    ArrayPush,   // [Arr, Val] -> [Arr]
    ArrayInsert, // [Arr, Key, Val] -> [Arr]
    ArraySpread, // [Arr, Iterable] -> [Arr]
    FetchDim { quiet: bool }, // [Container, Key] -> [Val]

    // Constants
    FetchConst(Symbol),
    DeclareConst(Symbol), // [Val] -> []

    // Calls
    InitFcall { name: Symbol, lname: Symbol },
    InitCallable,                 // [Callable] -> []
    InitMethodCall(Symbol),       // [Obj] -> []
    InitMethodCallDynamic,        // [Obj, Name] -> []
    InitStaticCall { class: ClassRef, name: Symbol },
    InitStaticCallDynamic(ClassRef), // [Class?, Name] -> []
    InitNew(ClassRef),            // [Class?] -> [Obj]
    SendVal,
    SendPlace { place: Place, depth: u8 },
    SendNamed(Symbol),
    SendUnpack,
    DoCall,
    MakeCallableClosure,
    RecvDefault { param: u32, skip: u32 },
    Return,

    // Declarations
    DeclareFunction(u32),
    DeclareClass(u32),
    MakeClosure { func: u32, captures: u16 },

    // Objects
    FetchProp { name: Symbol, quiet: bool }, // [Obj] -> [Val]
    FetchPropDynamic { quiet: bool },        // [Obj, Name] -> [Val]
    FetchStaticProp { class: ClassRef, name: Symbol },
    FetchClassConst { class: ClassRef, name: Symbol },
    ClassName(ClassRef),
    InstanceOf(ClassRef), // [Val, Class?] -> [Bool]
    Clone,

    // Iteration
    IterInit { end: u32, by_ref: bool },
    IterKey,
    IterValue,
    IterNext(u32),
    IterFree,
    YieldFromInit(u32),
    YieldFromNext(u32),
    YieldFromResult,

    // Generators
    Yield(YieldKind),

    // Exceptions
    Throw,
    MatchError,

    // Output and process
    Echo,
    Exit,
}

impl OpCode {
    /// The jump operand of control-flow instructions.
    pub fn jump_target_mut(&mut self) -> Option<&mut u32> {
        match self {
            OpCode::Jmp(t)
            | OpCode::JmpIfFalse(t)
            | OpCode::JmpIfTrue(t)
            | OpCode::JmpZEx(t)
            | OpCode::JmpNzEx(t)
            | OpCode::Coalesce(t)
            | OpCode::JmpNull(t)
            | OpCode::JmpFinally(t)
            | OpCode::IterNext(t)
            | OpCode::YieldFromInit(t)
            | OpCode::YieldFromNext(t) => Some(t),
            OpCode::StaticInit { skip, .. } | OpCode::RecvDefault { skip, .. } => Some(skip),
            OpCode::IterInit { end, .. } => Some(end),
            _ => None,
        }
    }

    pub fn jump_target(&self) -> Option<u32> {
        let mut copy = *self;
        copy.jump_target_mut().copied()
    }
}
