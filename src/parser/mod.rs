pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;

pub use span::Span;

use bumpalo::Bump;

/// Parses a complete source file into an arena-allocated AST.
/// Syntax errors are collected in `Program::errors`; parsing never aborts.
pub fn parse<'ast>(source: &[u8], arena: &'ast Bump) -> ast::Program<'ast> {
    let lexer = lexer::Lexer::new(source);
    let mut parser = parser::Parser::new(lexer, arena);
    parser.parse_program()
}
