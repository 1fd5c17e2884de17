use crate::parser::span::Span;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        self.span.as_str(source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize)]
pub enum TokenKind {
    // Keywords
    Function,
    Fn,
    Class,
    Interface,
    Trait,
    Extends,
    Implements,
    If,
    Else,
    ElseIf,
    EndIf,
    Return,
    Echo,
    Print,
    While,
    EndWhile,
    Do,
    For,
    EndFor,
    Foreach,
    EndForeach,
    As,
    Switch,
    EndSwitch,
    Case,
    Default,
    Break,
    Continue,
    Insteadof,
    Try,
    Catch,
    Finally,
    Throw,
    Public,
    Protected,
    Private,
    Static,
    Abstract,
    Final,
    Readonly,
    Namespace,
    Use,
    Global,
    New,
    Clone,
    InstanceOf,
    Array,
    Const,
    Exit,
    Empty,
    Isset,
    Unset,
    List,
    Yield,
    YieldFrom,
    Declare,
    Match,

    // Magic constants
    Line,
    File,
    Dir,
    ClassC,
    TraitC,
    MethodC,
    FuncC,
    NsC,
    PropertyC,

    // Casts
    IntCast,
    FloatCast,
    StringCast,
    ArrayCast,
    ObjectCast,
    BoolCast,
    UnsetCast,

    // Identifiers & literals
    Identifier,
    QualifiedName,
    Variable,
    LNumber,
    DNumber,
    /// Single-quoted string, quotes included.
    ConstantString,
    /// Double-quoted string, quotes included. May contain interpolation.
    DoubleQuotedString,
    /// `<<<LABEL ... LABEL`, the whole construct.
    Heredoc,
    /// `<<<'LABEL' ... LABEL`, the whole construct.
    Nowdoc,
    InlineHtml,

    // Comments
    Comment,
    DocComment,

    // Symbols
    Arrow,
    NullSafeArrow,
    DoubleArrow,
    DoubleColon,
    Ellipsis,

    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Dot,
    Pow,
    Inc,
    Dec,

    Eq,
    PlusEq,
    MinusEq,
    MulEq,
    DivEq,
    ModEq,
    ConcatEq,
    PowEq,
    AndEq,
    OrEq,
    XorEq,
    SlEq,
    SrEq,
    CoalesceEq,

    EqEq,
    EqEqEq,
    Bang,
    BangEq,
    BangEqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Spaceship,

    Ampersand,
    Pipe,
    Caret,
    BitNot,
    Sl,
    Sr,

    AmpersandAmpersand,
    PipePipe,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Question,
    Coalesce,
    At,
    Dollar,

    SemiColon,
    Colon,
    Comma,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,

    OpenTag,
    OpenTagEcho,
    CloseTag,

    Eof,
    Error,
}

impl TokenKind {
    /// Keywords that may still be used as member, constant or method names.
    pub fn is_semi_reserved(self) -> bool {
        matches!(
            self,
            TokenKind::Function
                | TokenKind::Fn
                | TokenKind::Class
                | TokenKind::Interface
                | TokenKind::Trait
                | TokenKind::Extends
                | TokenKind::Implements
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::ElseIf
                | TokenKind::EndIf
                | TokenKind::Return
                | TokenKind::Echo
                | TokenKind::Print
                | TokenKind::While
                | TokenKind::EndWhile
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::EndFor
                | TokenKind::Foreach
                | TokenKind::EndForeach
                | TokenKind::As
                | TokenKind::Switch
                | TokenKind::EndSwitch
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Insteadof
                | TokenKind::Try
                | TokenKind::Catch
                | TokenKind::Finally
                | TokenKind::Throw
                | TokenKind::Public
                | TokenKind::Protected
                | TokenKind::Private
                | TokenKind::Static
                | TokenKind::Abstract
                | TokenKind::Final
                | TokenKind::Readonly
                | TokenKind::Namespace
                | TokenKind::Use
                | TokenKind::Global
                | TokenKind::New
                | TokenKind::Clone
                | TokenKind::InstanceOf
                | TokenKind::Array
                | TokenKind::Const
                | TokenKind::Exit
                | TokenKind::Empty
                | TokenKind::Isset
                | TokenKind::Unset
                | TokenKind::List
                | TokenKind::Yield
                | TokenKind::Declare
                | TokenKind::Match
                | TokenKind::LogicalAnd
                | TokenKind::LogicalOr
                | TokenKind::LogicalXor
                | TokenKind::Line
                | TokenKind::File
                | TokenKind::Dir
                | TokenKind::ClassC
                | TokenKind::TraitC
                | TokenKind::MethodC
                | TokenKind::FuncC
                | TokenKind::NsC
                | TokenKind::PropertyC
        )
    }

    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            TokenKind::Public
                | TokenKind::Protected
                | TokenKind::Private
                | TokenKind::Static
                | TokenKind::Abstract
                | TokenKind::Final
                | TokenKind::Readonly
        )
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::MulEq
                | TokenKind::DivEq
                | TokenKind::ModEq
                | TokenKind::ConcatEq
                | TokenKind::PowEq
                | TokenKind::AndEq
                | TokenKind::OrEq
                | TokenKind::XorEq
                | TokenKind::SlEq
                | TokenKind::SrEq
                | TokenKind::CoalesceEq
        )
    }
}
