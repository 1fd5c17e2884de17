use std::fmt;

/// Line and column (both 1-based) of the construct that failed to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A jump label was referenced but never bound
    UndefinedLabel { label: u32, at: SourcePos },
    /// `break`/`continue` outside a loop, or with a depth beyond the nesting
    InvalidBreak {
        keyword: &'static str,
        depth: u32,
        at: SourcePos,
    },
    Duplicate {
        what: &'static str,
        name: String,
        at: SourcePos,
    },
    /// Two used traits define the same method and no `insteadof` picks one
    TraitConflict {
        class: String,
        method: String,
        traits: (String, String),
        at: SourcePos,
    },
    /// Inheritance, interface or abstract-method rule violated while linking
    Inheritance { message: String, at: SourcePos },
    /// Construct that cannot be compiled in this position
    Invalid { message: String, at: SourcePos },
}

impl CompileError {
    pub fn position(&self) -> SourcePos {
        match self {
            CompileError::UndefinedLabel { at, .. }
            | CompileError::InvalidBreak { at, .. }
            | CompileError::Duplicate { at, .. }
            | CompileError::TraitConflict { at, .. }
            | CompileError::Inheritance { at, .. }
            | CompileError::Invalid { at, .. } => *at,
        }
    }

    pub fn invalid(message: impl Into<String>, at: SourcePos) -> Self {
        CompileError::Invalid {
            message: message.into(),
            at,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UndefinedLabel { label, at } => {
                write!(f, "Undefined jump label {} at {}", label, at)
            }
            CompileError::InvalidBreak { keyword, depth, at } if *depth <= 1 => {
                write!(f, "'{}' not in the 'loop' or 'switch' context at {}", keyword, at)
            }
            CompileError::InvalidBreak { keyword, depth, at } => {
                write!(f, "Cannot '{}' {} levels at {}", keyword, depth, at)
            }
            CompileError::Duplicate { what, name, at } => {
                write!(f, "Cannot redeclare {} {} at {}", what, name, at)
            }
            CompileError::TraitConflict {
                class,
                method,
                traits,
                at,
            } => write!(
                f,
                "Trait method {}::{} has not been applied as {}::{}, because of collision with {}::{} at {}",
                traits.1, method, class, method, traits.0, method, at
            ),
            CompileError::Inheritance { message, at } | CompileError::Invalid { message, at } => {
                write!(f, "{} at {}", message, at)
            }
        }
    }
}

impl std::error::Error for CompileError {}
