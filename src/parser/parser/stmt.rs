use super::Parser;
use crate::parser::ast::{ClassConst, DeclareItem, Expr, ParseError, StaticVar, Stmt, StmtId};
use crate::parser::lexer::token::TokenKind;
use crate::parser::span::Span;

impl<'src, 'ast> Parser<'src, 'ast> {
    pub(super) fn parse_top_stmt(&mut self) -> StmtId<'ast> {
        self.parse_stmt()
    }

    pub(super) fn parse_stmt(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        match self.current_token.kind {
            TokenKind::OpenTag | TokenKind::CloseTag | TokenKind::SemiColon => {
                self.bump();
                self.arena.alloc(Stmt::Nop {
                    span: Span::new(start, start),
                })
            }
            TokenKind::OpenTagEcho => {
                self.bump();
                self.parse_echo_list(start)
            }
            TokenKind::InlineHtml => {
                let value = self.arena.alloc_slice_copy(self.text(&self.current_token));
                let span = self.current_token.span;
                self.bump();
                self.arena.alloc(Stmt::InlineHtml { value, span })
            }
            TokenKind::OpenBrace => {
                let statements = self.parse_block();
                self.arena.alloc(Stmt::Block {
                    statements,
                    span: self.span_from(start),
                })
            }
            TokenKind::Echo => {
                self.bump();
                self.parse_echo_list(start)
            }
            TokenKind::Return => {
                self.bump();
                let expr = if matches!(
                    self.current_token.kind,
                    TokenKind::SemiColon | TokenKind::CloseTag | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expr(0))
                };
                self.expect_semicolon();
                self.arena.alloc(Stmt::Return {
                    expr,
                    span: self.span_from(start),
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break | TokenKind::Continue => self.parse_break_continue(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Function
                if matches!(self.next_token.kind, TokenKind::Identifier)
                    || (self.next_token.kind == TokenKind::Ampersand) =>
            {
                self.parse_function_decl()
            }
            TokenKind::Abstract | TokenKind::Final | TokenKind::Readonly | TokenKind::Class => {
                self.parse_class_decl()
            }
            TokenKind::Namespace => self.parse_namespace(),
            TokenKind::Use => self.parse_use(),
            TokenKind::Interface => self.parse_interface_decl(),
            TokenKind::Trait => self.parse_trait_decl(),
            TokenKind::Global => {
                self.bump();
                let mut vars = Vec::new();
                loop {
                    if self.current_token.kind == TokenKind::Variable {
                        let span = self.current_token.span;
                        vars.push(&*self.arena.alloc(Expr::Variable {
                            name: Span::new(span.start + 1, span.end),
                            span,
                        }));
                        self.bump();
                    } else {
                        self.error("Expected variable after global");
                        break;
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect_semicolon();
                self.arena.alloc(Stmt::Global {
                    vars: self.arena.alloc_slice_copy(&vars),
                    span: self.span_from(start),
                })
            }
            TokenKind::Static if self.next_token.kind == TokenKind::Variable => {
                self.bump();
                let mut vars = Vec::new();
                while self.current_token.kind == TokenKind::Variable {
                    let span = self.current_token.span;
                    let var = &*self.arena.alloc(Expr::Variable {
                        name: Span::new(span.start + 1, span.end),
                        span,
                    });
                    self.bump();
                    let default = if self.current_token.kind == TokenKind::Eq {
                        self.bump();
                        Some(self.parse_expr(0))
                    } else {
                        None
                    };
                    vars.push(StaticVar { var, default, span });
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect_semicolon();
                self.arena.alloc(Stmt::Static {
                    vars: self.arena.alloc_slice_copy(&vars),
                    span: self.span_from(start),
                })
            }
            TokenKind::Unset => {
                self.bump();
                self.expect(TokenKind::OpenParen, "Expected '(' after unset");
                let mut vars = Vec::new();
                while !matches!(self.current_token.kind, TokenKind::CloseParen | TokenKind::Eof) {
                    vars.push(self.parse_expr(0));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::CloseParen, "Expected ')' after unset arguments");
                self.expect_semicolon();
                self.arena.alloc(Stmt::Unset {
                    vars: self.arena.alloc_slice_copy(&vars),
                    span: self.span_from(start),
                })
            }
            TokenKind::Const => {
                self.bump();
                let consts = self.parse_const_list();
                self.expect_semicolon();
                self.arena.alloc(Stmt::Const {
                    consts,
                    span: self.span_from(start),
                })
            }
            TokenKind::Declare => self.parse_declare(),
            _ => {
                let expr = self.parse_expr(0);
                self.expect_semicolon();
                self.arena.alloc(Stmt::Expression {
                    expr,
                    span: self.span_from(start),
                })
            }
        }
    }

    fn parse_echo_list(&mut self, start: usize) -> StmtId<'ast> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr(0));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_semicolon();
        self.arena.alloc(Stmt::Echo {
            exprs: self.arena.alloc_slice_copy(&exprs),
            span: self.span_from(start),
        })
    }

    /// Parses `{ stmt* }`.
    pub(super) fn parse_block(&mut self) -> &'ast [StmtId<'ast>] {
        if !self.expect(TokenKind::OpenBrace, "Expected '{'") {
            return &[];
        }
        let mut statements = Vec::new();
        while !matches!(self.current_token.kind, TokenKind::CloseBrace | TokenKind::Eof) {
            let before = self.current_token.span.start;
            statements.push(self.parse_stmt());
            if self.current_token.span.start == before
                && !matches!(self.current_token.kind, TokenKind::CloseBrace | TokenKind::Eof)
            {
                self.error("Unexpected token");
                self.bump();
            }
        }
        self.expect(TokenKind::CloseBrace, "Expected '}'");
        self.arena.alloc_slice_copy(&statements)
    }

    /// Body of a control structure: a block or a single statement.
    pub(super) fn parse_body(&mut self) -> &'ast [StmtId<'ast>] {
        if self.current_token.kind == TokenKind::OpenBrace {
            self.parse_block()
        } else {
            let stmt = self.parse_stmt();
            self.arena.alloc_slice_copy(&[stmt])
        }
    }

    /// Statements up to one of the `terminators` (alternative syntax).
    pub(super) fn parse_stmts_until(&mut self, terminators: &[TokenKind]) -> &'ast [StmtId<'ast>] {
        let mut statements = Vec::new();
        while !terminators.contains(&self.current_token.kind)
            && self.current_token.kind != TokenKind::Eof
        {
            let before = self.current_token.span.start;
            statements.push(self.parse_stmt());
            if self.current_token.span.start == before {
                self.error("Unexpected token");
                self.bump();
            }
        }
        self.arena.alloc_slice_copy(&statements)
    }

    pub(super) fn parse_const_list(&mut self) -> &'ast [ClassConst<'ast>] {
        let mut consts = Vec::new();
        loop {
            // Typed class constants: `const int X = 1;`
            if self.is_identifier_like() && self.next_token.kind != TokenKind::Eq {
                self.bump();
            }
            if !self.is_identifier_like() {
                self.error("Expected constant name");
                break;
            }
            let name = self.arena.alloc(self.current_token);
            let start = name.span.start;
            self.bump();
            self.expect(TokenKind::Eq, "Expected '=' in constant declaration");
            let value = self.parse_expr(0);
            consts.push(ClassConst {
                name,
                value,
                span: Span::new(start, value.span().end),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.arena.alloc_slice_copy(&consts)
    }

    fn parse_declare(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen, "Expected '(' after declare");
        let mut declares = Vec::new();
        while self.current_token.kind == TokenKind::Identifier {
            let key = self.arena.alloc(self.current_token);
            self.bump();
            self.expect(TokenKind::Eq, "Expected '=' in declare");
            let value = self.parse_expr(0);
            declares.push(DeclareItem {
                key,
                value,
                span: Span::new(key.span.start, value.span().end),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "Expected ')' after declare");
        let body: &'ast [StmtId<'ast>] = if self.current_token.kind == TokenKind::OpenBrace {
            self.parse_block()
        } else {
            self.expect_semicolon();
            &[]
        };
        self.arena.alloc(Stmt::Declare {
            declares: self.arena.alloc_slice_copy(&declares),
            body,
            span: self.span_from(start),
        })
    }

    fn parse_namespace(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let name = if matches!(
            self.current_token.kind,
            TokenKind::Identifier | TokenKind::QualifiedName
        ) {
            Some(self.parse_name())
        } else {
            None
        };
        let body = if self.current_token.kind == TokenKind::OpenBrace {
            Some(self.parse_block())
        } else {
            self.expect_semicolon();
            None
        };
        self.arena.alloc(Stmt::Namespace {
            name,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_use(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        if matches!(self.current_token.kind, TokenKind::Function | TokenKind::Const) {
            self.bump();
        }
        let mut uses = Vec::new();
        loop {
            uses.push(self.parse_name());
            if self.current_token.kind == TokenKind::As {
                self.bump();
                self.parse_name();
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if self.current_token.kind == TokenKind::OpenBrace {
            self.errors.push(ParseError {
                span: self.current_token.span,
                message: "Group use declarations are not supported",
            });
            self.sync_to_statement_end();
        } else {
            self.expect_semicolon();
        }
        self.arena.alloc(Stmt::Use {
            uses: self.arena.alloc_slice_copy(&uses),
            span: self.span_from(start),
        })
    }
}
