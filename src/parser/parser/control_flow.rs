use super::Parser;
use crate::parser::ast::{Case, Catch, ExprId, Stmt, StmtId};
use crate::parser::lexer::token::TokenKind;
use crate::parser::span::Span;

impl<'src, 'ast> Parser<'src, 'ast> {
    fn parse_paren_expr(&mut self) -> ExprId<'ast> {
        self.expect(TokenKind::OpenParen, "Expected '('");
        let expr = self.parse_expr(0);
        self.expect(TokenKind::CloseParen, "Expected ')'");
        expr
    }

    pub(super) fn parse_if(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let condition = self.parse_paren_expr();

        if self.current_token.kind == TokenKind::Colon {
            return self.parse_if_alt(start, condition);
        }

        let then_block = self.parse_body();
        let else_block = match self.current_token.kind {
            TokenKind::ElseIf => {
                let nested = self.parse_if();
                Some(&*self.arena.alloc_slice_copy(&[nested]))
            }
            TokenKind::Else if self.next_token.kind == TokenKind::If => {
                self.bump();
                let nested = self.parse_if();
                Some(&*self.arena.alloc_slice_copy(&[nested]))
            }
            TokenKind::Else => {
                self.bump();
                Some(self.parse_body())
            }
            _ => None,
        };

        self.arena.alloc(Stmt::If {
            condition,
            then_block,
            else_block,
            span: self.span_from(start),
        })
    }

    fn parse_if_alt(&mut self, start: usize, condition: ExprId<'ast>) -> StmtId<'ast> {
        self.bump();
        let then_block =
            self.parse_stmts_until(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf]);
        let else_block = match self.current_token.kind {
            TokenKind::ElseIf => {
                let elseif_start = self.current_token.span.start;
                self.bump();
                let cond = self.parse_paren_expr();
                let nested = self.parse_if_alt(elseif_start, cond);
                return self.arena.alloc(Stmt::If {
                    condition,
                    then_block,
                    else_block: Some(self.arena.alloc_slice_copy(&[nested])),
                    span: self.span_from(start),
                });
            }
            TokenKind::Else => {
                self.bump();
                self.expect(TokenKind::Colon, "Expected ':' after else");
                let block = self.parse_stmts_until(&[TokenKind::EndIf]);
                Some(block)
            }
            _ => None,
        };
        self.expect(TokenKind::EndIf, "Expected endif");
        self.expect_semicolon();
        self.arena.alloc(Stmt::If {
            condition,
            then_block,
            else_block,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_while(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let condition = self.parse_paren_expr();
        let body = if self.current_token.kind == TokenKind::Colon {
            self.bump();
            let body = self.parse_stmts_until(&[TokenKind::EndWhile]);
            self.expect(TokenKind::EndWhile, "Expected endwhile");
            self.expect_semicolon();
            body
        } else {
            self.parse_body()
        };
        self.arena.alloc(Stmt::While {
            condition,
            body,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_do_while(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let body = self.parse_body();
        self.expect(TokenKind::While, "Expected 'while' after do body");
        let condition = self.parse_paren_expr();
        self.expect_semicolon();
        self.arena.alloc(Stmt::DoWhile {
            body,
            condition,
            span: self.span_from(start),
        })
    }

    fn parse_expr_list_until(&mut self, end: TokenKind) -> &'ast [ExprId<'ast>] {
        let mut exprs = Vec::new();
        while self.current_token.kind != end && self.current_token.kind != TokenKind::Eof {
            exprs.push(self.parse_expr(0));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(end, "Unexpected token in for header");
        self.arena.alloc_slice_copy(&exprs)
    }

    pub(super) fn parse_for(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen, "Expected '(' after for");
        let init = self.parse_expr_list_until(TokenKind::SemiColon);
        let condition = self.parse_expr_list_until(TokenKind::SemiColon);
        let loop_expr = self.parse_expr_list_until(TokenKind::CloseParen);
        let body = if self.current_token.kind == TokenKind::Colon {
            self.bump();
            let body = self.parse_stmts_until(&[TokenKind::EndFor]);
            self.expect(TokenKind::EndFor, "Expected endfor");
            self.expect_semicolon();
            body
        } else {
            self.parse_body()
        };
        self.arena.alloc(Stmt::For {
            init,
            condition,
            loop_expr,
            body,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_foreach(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen, "Expected '(' after foreach");
        let expr = self.parse_expr(0);
        self.expect(TokenKind::As, "Expected 'as' in foreach");

        let mut by_ref = self.eat_ampersand();
        let mut value_var = self.parse_foreach_target();
        let mut key_var = None;
        if self.current_token.kind == TokenKind::DoubleArrow {
            self.bump();
            key_var = Some(value_var);
            by_ref = self.eat_ampersand();
            value_var = self.parse_foreach_target();
        }
        self.expect(TokenKind::CloseParen, "Expected ')' after foreach header");

        let body = if self.current_token.kind == TokenKind::Colon {
            self.bump();
            let body = self.parse_stmts_until(&[TokenKind::EndForeach]);
            self.expect(TokenKind::EndForeach, "Expected endforeach");
            self.expect_semicolon();
            body
        } else {
            self.parse_body()
        };

        self.arena.alloc(Stmt::Foreach {
            expr,
            key_var,
            value_var,
            by_ref,
            body,
            span: self.span_from(start),
        })
    }

    fn eat_ampersand(&mut self) -> bool {
        if self.current_token.kind == TokenKind::Ampersand {
            self.bump();
            true
        } else {
            false
        }
    }

    fn parse_foreach_target(&mut self) -> ExprId<'ast> {
        if self.current_token.kind == TokenKind::List {
            let start = self.current_token.span.start;
            self.bump();
            return self.parse_array_literal(start, TokenKind::CloseParen);
        }
        self.parse_expr(50)
    }

    pub(super) fn parse_switch(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let condition = self.parse_paren_expr();

        let alt = self.current_token.kind == TokenKind::Colon;
        if alt {
            self.bump();
        } else {
            self.expect(TokenKind::OpenBrace, "Expected '{' after switch");
        }
        let end_kind = if alt {
            TokenKind::EndSwitch
        } else {
            TokenKind::CloseBrace
        };

        let mut cases = Vec::new();
        while self.current_token.kind != end_kind && self.current_token.kind != TokenKind::Eof {
            let case_start = self.current_token.span.start;
            let case_condition = match self.current_token.kind {
                TokenKind::Case => {
                    self.bump();
                    Some(self.parse_expr(0))
                }
                TokenKind::Default => {
                    self.bump();
                    None
                }
                _ => {
                    self.error("Expected case or default in switch");
                    self.bump();
                    continue;
                }
            };
            if matches!(self.current_token.kind, TokenKind::Colon | TokenKind::SemiColon) {
                self.bump();
            } else {
                self.error("Expected ':' after case");
            }
            let body = self.parse_stmts_until(&[TokenKind::Case, TokenKind::Default, end_kind]);
            cases.push(Case {
                condition: case_condition,
                body,
                span: Span::new(case_start, self.current_token.span.start),
            });
        }
        self.expect(end_kind, "Expected end of switch");
        if alt {
            self.expect_semicolon();
        }

        self.arena.alloc(Stmt::Switch {
            condition,
            cases: self.arena.alloc_slice_copy(&cases),
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_break_continue(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        let is_break = self.current_token.kind == TokenKind::Break;
        self.bump();
        let level = if self.current_token.kind == TokenKind::LNumber {
            Some(self.parse_expr(0))
        } else {
            None
        };
        self.expect_semicolon();
        let span = self.span_from(start);
        if is_break {
            self.arena.alloc(Stmt::Break { level, span })
        } else {
            self.arena.alloc(Stmt::Continue { level, span })
        }
    }

    pub(super) fn parse_try(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let body = self.parse_block();

        let mut catches = Vec::new();
        while self.current_token.kind == TokenKind::Catch {
            let catch_start = self.current_token.span.start;
            self.bump();
            self.expect(TokenKind::OpenParen, "Expected '(' after catch");
            let mut types = Vec::new();
            loop {
                types.push(self.parse_name());
                if self.current_token.kind == TokenKind::Pipe {
                    self.bump();
                } else {
                    break;
                }
            }
            let var = if self.current_token.kind == TokenKind::Variable {
                let tok = self.arena.alloc(self.current_token);
                self.bump();
                Some(&*tok)
            } else {
                None
            };
            self.expect(TokenKind::CloseParen, "Expected ')' after catch");
            let catch_body = self.parse_block();
            catches.push(Catch {
                types: self.arena.alloc_slice_copy(&types),
                var,
                body: catch_body,
                span: Span::new(catch_start, self.current_token.span.start),
            });
        }

        let finally = if self.current_token.kind == TokenKind::Finally {
            self.bump();
            Some(self.parse_block())
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            self.error("Cannot use try without catch or finally");
        }

        self.arena.alloc(Stmt::Try {
            body,
            catches: self.arena.alloc_slice_copy(&catches),
            finally,
            span: self.span_from(start),
        })
    }
}

