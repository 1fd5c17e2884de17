use crate::parser::ast::{Name, ParseError, Program};
use crate::parser::lexer::{
    Lexer,
    token::{Token, TokenKind},
};
use bumpalo::Bump;

use crate::parser::span::Span;

mod control_flow;
mod definitions;
mod expr;
mod stmt;
mod strings;
mod types;

pub struct Parser<'src, 'ast> {
    pub(super) lexer: Lexer<'src>,
    pub(super) source: &'src [u8],
    pub(super) arena: &'ast Bump,
    pub(super) current_token: Token,
    pub(super) next_token: Token,
    pub(super) errors: std::vec::Vec<ParseError>,
}

impl<'src, 'ast> Parser<'src, 'ast> {
    pub fn new(lexer: Lexer<'src>, arena: &'ast Bump) -> Self {
        let source = lexer.source();
        let mut parser = Self {
            lexer,
            source,
            arena,
            current_token: Token {
                kind: TokenKind::Eof,
                span: Span::default(),
            },
            next_token: Token {
                kind: TokenKind::Eof,
                span: Span::default(),
            },
            errors: Vec::new(),
        };
        parser.bump();
        parser.bump();
        parser
    }

    fn bump(&mut self) {
        self.current_token = self.next_token;
        loop {
            let token = self.lexer.next().unwrap_or(Token {
                kind: TokenKind::Eof,
                span: Span::new(self.source.len(), self.source.len()),
            });
            if !matches!(token.kind, TokenKind::Comment | TokenKind::DocComment) {
                self.next_token = token;
                break;
            }
        }
    }

    fn error(&mut self, message: &'static str) {
        self.errors.push(ParseError {
            span: self.current_token.span,
            message,
        });
    }

    /// Consumes the current token when it is `kind`.
    fn eat(&mut self, kind: TokenKind) -> bool {
        let found = self.current_token.kind == kind;
        if found {
            self.bump();
        }
        found
    }

    /// Span from `start` up to the current token.
    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.current_token.span.start)
    }

    /// Consumes `kind` or records `message` without consuming anything.
    fn expect(&mut self, kind: TokenKind, message: &'static str) -> bool {
        if self.current_token.kind == kind {
            self.bump();
            true
        } else {
            self.error(message);
            false
        }
    }

    fn expect_semicolon(&mut self) {
        match self.current_token.kind {
            TokenKind::SemiColon => self.bump(),
            // A close tag or the end of input terminates the statement
            TokenKind::CloseTag | TokenKind::Eof => {}
            _ => {
                self.error("Missing semicolon");
                self.sync_to_statement_end();
            }
        }
    }

    fn text(&self, token: &Token) -> &'src [u8] {
        token.span.as_str(self.source)
    }

    fn is_identifier_like(&self) -> bool {
        self.current_token.kind == TokenKind::Identifier
            || self.current_token.kind.is_semi_reserved()
    }

    pub(super) fn parse_name(&mut self) -> Name<'ast> {
        let start = self.current_token.span.start;
        let mut parts = Vec::new();
        if matches!(
            self.current_token.kind,
            TokenKind::Identifier | TokenKind::QualifiedName | TokenKind::Static
        ) || self.current_token.kind.is_semi_reserved()
        {
            parts.push(self.current_token);
            self.bump();
        } else {
            self.error("Expected name");
        }
        let end = parts.last().map(|t| t.span.end).unwrap_or(start);
        Name {
            parts: self.arena.alloc_slice_copy(&parts),
            span: Span::new(start, end),
        }
    }

    pub(super) fn parse_name_list(&mut self) -> &'ast [Name<'ast>] {
        let mut names = Vec::new();
        loop {
            names.push(self.parse_name());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.arena.alloc_slice_copy(&names)
    }

    pub fn parse_program(&mut self) -> Program<'ast> {
        let mut statements = Vec::new();

        while self.current_token.kind != TokenKind::Eof {
            let before = self.current_token.span.start;
            statements.push(self.parse_top_stmt());
            if self.current_token.span.start == before && self.current_token.kind != TokenKind::Eof {
                // No progress: skip the offending token
                self.error("Unexpected token");
                self.bump();
            }
        }

        let span = if let (Some(first), Some(last)) = (statements.first(), statements.last()) {
            Span::new(first.span().start, last.span().end)
        } else {
            Span::default()
        };

        Program {
            statements: self.arena.alloc_slice_copy(&statements),
            errors: self.arena.alloc_slice_copy(&self.errors),
            span,
        }
    }

    fn sync_to_statement_end(&mut self) {
        while !matches!(
            self.current_token.kind,
            TokenKind::SemiColon | TokenKind::CloseBrace | TokenKind::CloseTag | TokenKind::Eof
        ) {
            self.bump();
        }
        if self.current_token.kind == TokenKind::SemiColon {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::{Expr, Program, Stmt};
    use crate::parser::parse;
    use bumpalo::Bump;

    /// First real statement; the open tag parses to a `Nop`.
    fn first_stmt<'ast>(program: &Program<'ast>) -> &'ast Stmt<'ast> {
        program
            .statements
            .iter()
            .copied()
            .find(|stmt| !matches!(stmt, Stmt::Nop { .. }))
            .expect("a statement")
    }

    #[test]
    fn parses_assignment_precedence() {
        let arena = Bump::new();
        let program = parse(b"<?php $a = 1 + 2 * 3;", &arena);
        assert!(program.errors.is_empty());
        let Stmt::Expression { expr, .. } = first_stmt(&program) else {
            panic!("expected expression statement");
        };
        let Expr::Assign { expr: rhs, .. } = expr else {
            panic!("expected assignment");
        };
        assert!(matches!(rhs, Expr::Binary { op: crate::parser::ast::BinaryOp::Plus, .. }));
    }

    #[test]
    fn parses_comma_lists_with_statement_spans() {
        let arena = Bump::new();
        let source = b"<?php global $a, $b, $c;";
        let program = parse(source, &arena);
        assert!(program.errors.is_empty(), "{:?}", program.errors);
        let stmt = first_stmt(&program);
        let Stmt::Global { vars, .. } = stmt else {
            panic!("expected global statement");
        };
        assert_eq!(vars.len(), 3);
        assert_eq!(stmt.span().as_str(source), b"global $a, $b, $c;");
    }

    #[test]
    fn reports_missing_semicolon() {
        let arena = Bump::new();
        let program = parse(b"<?php $a = 1 $b = 2;", &arena);
        assert_eq!(program.errors[0].message, "Missing semicolon");
    }

    #[test]
    fn parses_class_with_trait_adaptations() {
        let arena = Bump::new();
        let program = parse(
            b"<?php class C { use A, B { A::hello insteadof B; B::hello as protected hi; } }",
            &arena,
        );
        assert!(program.errors.is_empty(), "{:?}", program.errors);
        assert!(matches!(first_stmt(&program), Stmt::Class { .. }));
    }

    #[test]
    fn parses_interpolated_string_parts() {
        let arena = Bump::new();
        let program = parse(br#"<?php echo "a $b {$c->d} e";"#, &arena);
        assert!(program.errors.is_empty(), "{:?}", program.errors);
        let Stmt::Echo { exprs, .. } = first_stmt(&program) else {
            panic!("expected echo");
        };
        let Expr::InterpolatedString { parts, .. } = exprs[0] else {
            panic!("expected interpolated string");
        };
        assert_eq!(parts.len(), 5);
    }

    #[test]
    fn parses_match_and_arrow_function() {
        let arena = Bump::new();
        let program = parse(
            b"<?php $f = fn($x) => match(true) { $x > 1 => 'big', default => 'small' };",
            &arena,
        );
        assert!(program.errors.is_empty(), "{:?}", program.errors);
    }
}
