use crate::parser::lexer::token::Token;
use crate::parser::span::{LineInfo, Span};
use serde::Serialize;

pub type ExprId<'ast> = &'ast Expr<'ast>;
pub type StmtId<'ast> = &'ast Stmt<'ast>;
/// A braced statement list, a function body or a case body.
pub type Block<'ast> = &'ast [StmtId<'ast>];
pub type ExprList<'ast> = &'ast [ExprId<'ast>];
/// Keyword tokens such as `public`, `static` or `readonly`, in source order.
pub type Modifiers<'ast> = &'ast [Token];
pub type Args<'ast> = &'ast [Arg<'ast>];
pub type Params<'ast> = &'ast [Param<'ast>];
pub type Names<'ast> = &'ast [Name<'ast>];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParseError {
    pub span: Span,
    pub message: &'static str,
}

impl ParseError {
    pub fn to_human_readable(&self, source: &[u8]) -> String {
        let Some(LineInfo {
            line,
            column,
            line_text,
        }) = self.span.line_info(source)
        else {
            return format!("error: {}", self.message);
        };

        let line_str = String::from_utf8_lossy(line_text);
        let gutter = " ".repeat(line.to_string().len() + 1);
        let padding = column.saturating_sub(1).min(line_text.len());
        let width = self.span.len().clamp(1, line_text.len().saturating_sub(padding).max(1));

        format!(
            "error: {} at line {line}, column {column}\n{gutter}|\n{line} | {line_str}\n{gutter}| {}{}",
            self.message,
            " ".repeat(padding),
            "^".repeat(width),
        )
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (bytes {}..{})", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Serialize)]
pub struct Program<'ast> {
    pub statements: Block<'ast>,
    pub errors: &'ast [ParseError],
    pub span: Span,
}

#[derive(Debug, Serialize)]
pub enum Stmt<'ast> {
    Echo {
        exprs: ExprList<'ast>,
        span: Span,
    },
    InlineHtml {
        value: &'ast [u8],
        span: Span,
    },
    Expression {
        expr: ExprId<'ast>,
        span: Span,
    },
    Return {
        expr: Option<ExprId<'ast>>,
        span: Span,
    },
    If {
        condition: ExprId<'ast>,
        then_block: Block<'ast>,
        /// `elseif` chains are nested `If` statements inside the else block.
        else_block: Option<Block<'ast>>,
        span: Span,
    },
    While {
        condition: ExprId<'ast>,
        body: Block<'ast>,
        span: Span,
    },
    DoWhile {
        body: Block<'ast>,
        condition: ExprId<'ast>,
        span: Span,
    },
    For {
        init: ExprList<'ast>,
        condition: ExprList<'ast>,
        loop_expr: ExprList<'ast>,
        body: Block<'ast>,
        span: Span,
    },
    Foreach {
        expr: ExprId<'ast>,
        key_var: Option<ExprId<'ast>>,
        value_var: ExprId<'ast>,
        by_ref: bool,
        body: Block<'ast>,
        span: Span,
    },
    Switch {
        condition: ExprId<'ast>,
        cases: &'ast [Case<'ast>],
        span: Span,
    },
    Break {
        level: Option<ExprId<'ast>>,
        span: Span,
    },
    Continue {
        level: Option<ExprId<'ast>>,
        span: Span,
    },
    Block {
        statements: Block<'ast>,
        span: Span,
    },
    Function {
        name: &'ast Token,
        by_ref: bool,
        params: Params<'ast>,
        return_type: Option<&'ast Type<'ast>>,
        body: Block<'ast>,
        span: Span,
    },
    Class {
        name: &'ast Token,
        modifiers: Modifiers<'ast>,
        extends: Option<Name<'ast>>,
        implements: Names<'ast>,
        members: &'ast [ClassMember<'ast>],
        span: Span,
    },
    Interface {
        name: &'ast Token,
        extends: Names<'ast>,
        members: &'ast [ClassMember<'ast>],
        span: Span,
    },
    Trait {
        name: &'ast Token,
        members: &'ast [ClassMember<'ast>],
        span: Span,
    },
    Try {
        body: Block<'ast>,
        catches: &'ast [Catch<'ast>],
        finally: Option<Block<'ast>>,
        span: Span,
    },
    Global {
        vars: ExprList<'ast>,
        span: Span,
    },
    Static {
        vars: &'ast [StaticVar<'ast>],
        span: Span,
    },
    Unset {
        vars: ExprList<'ast>,
        span: Span,
    },
    Const {
        consts: &'ast [ClassConst<'ast>],
        span: Span,
    },
    Declare {
        declares: &'ast [DeclareItem<'ast>],
        body: Block<'ast>,
        span: Span,
    },
    Namespace {
        name: Option<Name<'ast>>,
        body: Option<Block<'ast>>,
        span: Span,
    },
    Use {
        uses: Names<'ast>,
        span: Span,
    },
    Nop {
        span: Span,
    },
    Error {
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StaticVar<'ast> {
    pub var: ExprId<'ast>,
    pub default: Option<ExprId<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Param<'ast> {
    pub name: &'ast Token,
    pub ty: Option<&'ast Type<'ast>>,
    pub default: Option<ExprId<'ast>>,
    pub by_ref: bool,
    pub variadic: bool,
    /// Visibility/readonly modifiers for constructor promotion.
    pub modifiers: Modifiers<'ast>,
    pub span: Span,
}

#[derive(Debug, Serialize)]
pub enum Expr<'ast> {
    Assign {
        var: ExprId<'ast>,
        expr: ExprId<'ast>,
        span: Span,
    },
    AssignRef {
        var: ExprId<'ast>,
        expr: ExprId<'ast>,
        span: Span,
    },
    AssignOp {
        var: ExprId<'ast>,
        op: AssignOp,
        expr: ExprId<'ast>,
        span: Span,
    },
    Binary {
        left: ExprId<'ast>,
        op: BinaryOp,
        right: ExprId<'ast>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: ExprId<'ast>,
        span: Span,
    },
    PostInc {
        var: ExprId<'ast>,
        span: Span,
    },
    PostDec {
        var: ExprId<'ast>,
        span: Span,
    },
    Call {
        func: ExprId<'ast>,
        args: Args<'ast>,
        span: Span,
    },
    Array {
        items: &'ast [ArrayItem<'ast>],
        span: Span,
    },
    ArrayDimFetch {
        array: ExprId<'ast>,
        dim: Option<ExprId<'ast>>,
        span: Span,
    },
    PropertyFetch {
        target: ExprId<'ast>,
        property: ExprId<'ast>,
        span: Span,
    },
    NullsafePropertyFetch {
        target: ExprId<'ast>,
        property: ExprId<'ast>,
        span: Span,
    },
    StaticPropertyFetch {
        class: ExprId<'ast>,
        property: ExprId<'ast>,
        span: Span,
    },
    MethodCall {
        target: ExprId<'ast>,
        method: ExprId<'ast>,
        args: Args<'ast>,
        span: Span,
    },
    NullsafeMethodCall {
        target: ExprId<'ast>,
        method: ExprId<'ast>,
        args: Args<'ast>,
        span: Span,
    },
    StaticCall {
        class: ExprId<'ast>,
        method: ExprId<'ast>,
        args: Args<'ast>,
        span: Span,
    },
    ClassConstFetch {
        class: ExprId<'ast>,
        constant: ExprId<'ast>,
        span: Span,
    },
    New {
        class: ExprId<'ast>,
        args: Args<'ast>,
        span: Span,
    },
    AnonymousClass {
        extends: Option<Name<'ast>>,
        implements: Names<'ast>,
        members: &'ast [ClassMember<'ast>],
        span: Span,
    },
    Variable {
        name: Span,
        span: Span,
    },
    /// A bare or qualified name: constant, function or class reference.
    Identifier {
        name: Span,
        span: Span,
    },
    Integer {
        value: &'ast [u8],
        span: Span,
    },
    Float {
        value: &'ast [u8],
        span: Span,
    },
    String {
        value: &'ast [u8],
        span: Span,
    },
    InterpolatedString {
        parts: ExprList<'ast>,
        span: Span,
    },
    MagicConst {
        kind: MagicConstKind,
        span: Span,
    },
    Ternary {
        condition: ExprId<'ast>,
        if_true: Option<ExprId<'ast>>,
        if_false: ExprId<'ast>,
        span: Span,
    },
    Match {
        condition: ExprId<'ast>,
        arms: &'ast [MatchArm<'ast>],
        span: Span,
    },
    InstanceOf {
        expr: ExprId<'ast>,
        class: ExprId<'ast>,
        span: Span,
    },
    Print {
        expr: ExprId<'ast>,
        span: Span,
    },
    Yield {
        key: Option<ExprId<'ast>>,
        value: Option<ExprId<'ast>>,
        span: Span,
    },
    YieldFrom {
        expr: ExprId<'ast>,
        span: Span,
    },
    Throw {
        expr: ExprId<'ast>,
        span: Span,
    },
    Cast {
        kind: CastKind,
        expr: ExprId<'ast>,
        span: Span,
    },
    Empty {
        expr: ExprId<'ast>,
        span: Span,
    },
    Isset {
        vars: ExprList<'ast>,
        span: Span,
    },
    Exit {
        expr: Option<ExprId<'ast>>,
        span: Span,
    },
    Closure {
        is_static: bool,
        by_ref: bool,
        params: Params<'ast>,
        uses: &'ast [ClosureUse<'ast>],
        return_type: Option<&'ast Type<'ast>>,
        body: Block<'ast>,
        span: Span,
    },
    ArrowFunction {
        is_static: bool,
        by_ref: bool,
        params: Params<'ast>,
        return_type: Option<&'ast Type<'ast>>,
        expr: ExprId<'ast>,
        span: Span,
    },
    Clone {
        expr: ExprId<'ast>,
        span: Span,
    },
    /// The `...` in a first-class callable such as `strlen(...)`.
    VariadicPlaceholder {
        span: Span,
    },
    /// A skipped slot in a destructuring pattern: `[, $b] = $pair`.
    Omitted {
        span: Span,
    },
    Error {
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClosureUse<'ast> {
    pub var: &'ast Token,
    pub by_ref: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CastKind {
    Int,
    Bool,
    Float,
    String,
    Array,
    Object,
    Unset,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchArm<'ast> {
    /// `None` for the `default` arm.
    pub conditions: Option<ExprList<'ast>>,
    pub body: ExprId<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
    PreInc,
    PreDec,
    ErrorSuppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    And,
    Or,
    Xor,
    Coalesce,
    EqEq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Spaceship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Coalesce,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Arg<'ast> {
    pub name: Option<&'ast Token>,
    pub value: ExprId<'ast>,
    pub unpack: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArrayItem<'ast> {
    pub key: Option<ExprId<'ast>>,
    pub value: ExprId<'ast>,
    pub by_ref: bool,
    pub unpack: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PropertyEntry<'ast> {
    pub name: &'ast Token,
    pub default: Option<ExprId<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum ClassMember<'ast> {
    Property {
        modifiers: Modifiers<'ast>,
        ty: Option<&'ast Type<'ast>>,
        entries: &'ast [PropertyEntry<'ast>],
        span: Span,
    },
    HookedProperty {
        modifiers: Modifiers<'ast>,
        ty: Option<&'ast Type<'ast>>,
        name: &'ast Token,
        default: Option<ExprId<'ast>>,
        hooks: &'ast [PropertyHook<'ast>],
        span: Span,
    },
    Method {
        modifiers: Modifiers<'ast>,
        name: &'ast Token,
        by_ref: bool,
        params: Params<'ast>,
        return_type: Option<&'ast Type<'ast>>,
        /// `None` for abstract and interface methods.
        body: Option<Block<'ast>>,
        span: Span,
    },
    Const {
        modifiers: Modifiers<'ast>,
        consts: &'ast [ClassConst<'ast>],
        span: Span,
    },
    TraitUse {
        traits: Names<'ast>,
        adaptations: &'ast [TraitAdaptation<'ast>],
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Case<'ast> {
    /// `None` for `default:`.
    pub condition: Option<ExprId<'ast>>,
    pub body: Block<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClassConst<'ast> {
    pub name: &'ast Token,
    pub value: ExprId<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum PropertyHookBody<'ast> {
    Statements(Block<'ast>),
    Expr(ExprId<'ast>),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PropertyHook<'ast> {
    /// `get` or `set`.
    pub name: &'ast Token,
    pub params: Params<'ast>,
    pub body: PropertyHookBody<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TraitMethodRef<'ast> {
    pub trait_name: Option<Name<'ast>>,
    pub method: &'ast Token,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum TraitAdaptation<'ast> {
    Precedence {
        method: TraitMethodRef<'ast>,
        insteadof: Names<'ast>,
        span: Span,
    },
    Alias {
        method: TraitMethodRef<'ast>,
        alias: Option<&'ast Token>,
        visibility: Option<&'ast Token>,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Catch<'ast> {
    pub types: Names<'ast>,
    pub var: Option<&'ast Token>,
    pub body: Block<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Name<'ast> {
    pub parts: &'ast [Token],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum Type<'ast> {
    Simple(Name<'ast>),
    Nullable(&'ast Type<'ast>),
    Union(&'ast [Type<'ast>]),
    Intersection(&'ast [Type<'ast>]),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeclareItem<'ast> {
    pub key: &'ast Token,
    pub value: ExprId<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MagicConstKind {
    Line,
    File,
    Dir,
    Function,
    Class,
    Trait,
    Method,
    Namespace,
    Property,
}

/// Expands to a match that pulls `span` out of every listed variant.
macro_rules! span_of {
    ($value:expr, $ty:ident: $($variant:ident),+ $(,)?) => {
        match $value {
            $($ty::$variant { span, .. })|+ => *span,
        }
    };
}

impl<'ast> Stmt<'ast> {
    pub fn span(&self) -> Span {
        span_of!(
            self,
            Stmt:
            Echo, InlineHtml, Expression, Return, If, While, DoWhile, For, Foreach, Switch,
            Break, Continue, Block, Function, Class, Interface, Trait, Try, Global, Static,
            Unset, Const, Declare, Namespace, Use, Nop, Error
        )
    }
}

impl<'ast> Expr<'ast> {
    pub fn span(&self) -> Span {
        span_of!(
            self,
            Expr:
            Assign, AssignRef, AssignOp, Binary, Unary, PostInc, PostDec, Call, Array,
            ArrayDimFetch, PropertyFetch, NullsafePropertyFetch, StaticPropertyFetch,
            MethodCall, NullsafeMethodCall, StaticCall, ClassConstFetch, New,
            AnonymousClass, Variable, Identifier, Integer, Float, String,
            InterpolatedString, MagicConst, Ternary, Match, InstanceOf, Print, Yield,
            YieldFrom, Throw, Cast, Empty, Isset, Exit, Closure, ArrowFunction, Clone,
            VariadicPlaceholder, Omitted, Error
        )
    }

    /// Whether the expression may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Variable { .. }
                | Expr::ArrayDimFetch { .. }
                | Expr::PropertyFetch { .. }
                | Expr::StaticPropertyFetch { .. }
                | Expr::Array { .. }
        )
    }
}
