use super::Parser;
use crate::parser::ast::{
    ClassMember, Name, Param, PropertyEntry, PropertyHook, PropertyHookBody, Stmt, StmtId,
    TraitAdaptation, TraitMethodRef,
};
use crate::parser::lexer::token::{Token, TokenKind};
use crate::parser::span::Span;

impl<'src, 'ast> Parser<'src, 'ast> {
    pub(super) fn parse_function_decl(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let by_ref = self.current_token.kind == TokenKind::Ampersand;
        if by_ref {
            self.bump();
        }
        let name = self.arena.alloc(self.current_token);
        self.bump();
        let params = self.parse_parameter_list();
        let return_type = self.parse_return_type();
        let body = self.parse_block();
        self.arena.alloc(Stmt::Function {
            name,
            by_ref,
            params,
            return_type,
            body,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_parameter_list(&mut self) -> &'ast [Param<'ast>] {
        if !self.expect(TokenKind::OpenParen, "Expected '(' before parameters") {
            return &[];
        }
        let mut params = Vec::new();
        while !matches!(self.current_token.kind, TokenKind::CloseParen | TokenKind::Eof) {
            params.push(self.parse_param());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "Expected ')' after parameters");
        self.arena.alloc_slice_copy(&params)
    }

    fn parse_param(&mut self) -> Param<'ast> {
        let start = self.current_token.span.start;
        let mut modifiers = Vec::new();
        while self.current_token.kind.is_modifier() {
            modifiers.push(self.current_token);
            self.bump();
        }

        let ty = if matches!(
            self.current_token.kind,
            TokenKind::Variable | TokenKind::Ampersand | TokenKind::Ellipsis
        ) {
            None
        } else {
            self.parse_type().map(|t| &*self.arena.alloc(t))
        };

        let by_ref = self.current_token.kind == TokenKind::Ampersand;
        if by_ref {
            self.bump();
        }
        let variadic = self.current_token.kind == TokenKind::Ellipsis;
        if variadic {
            self.bump();
        }

        let name = self.arena.alloc(self.current_token);
        if self.current_token.kind == TokenKind::Variable {
            self.bump();
        } else {
            self.error("Expected parameter variable");
        }

        let default = if self.current_token.kind == TokenKind::Eq {
            self.bump();
            Some(self.parse_expr(0))
        } else {
            None
        };

        Param {
            name,
            ty,
            default,
            by_ref,
            variadic,
            modifiers: self.arena.alloc_slice_copy(&modifiers),
            span: self.span_from(start),
        }
    }

    pub(super) fn parse_class_decl(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        let mut modifiers = Vec::new();
        while matches!(
            self.current_token.kind,
            TokenKind::Abstract | TokenKind::Final | TokenKind::Readonly
        ) {
            modifiers.push(self.current_token);
            self.bump();
        }
        self.expect(TokenKind::Class, "Expected 'class'");
        let name = self.arena.alloc(self.current_token);
        self.bump();

        let extends = if self.current_token.kind == TokenKind::Extends {
            self.bump();
            Some(self.parse_name())
        } else {
            None
        };
        let implements = if self.current_token.kind == TokenKind::Implements {
            self.bump();
            self.parse_name_list()
        } else {
            &[]
        };
        let members = self.parse_class_body();

        self.arena.alloc(Stmt::Class {
            name,
            modifiers: self.arena.alloc_slice_copy(&modifiers),
            extends,
            implements,
            members,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_interface_decl(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let name = self.arena.alloc(self.current_token);
        self.bump();
        let extends = if self.current_token.kind == TokenKind::Extends {
            self.bump();
            self.parse_name_list()
        } else {
            &[]
        };
        let members = self.parse_class_body();
        self.arena.alloc(Stmt::Interface {
            name,
            extends,
            members,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_trait_decl(&mut self) -> StmtId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let name = self.arena.alloc(self.current_token);
        self.bump();
        let members = self.parse_class_body();
        self.arena.alloc(Stmt::Trait {
            name,
            members,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_class_body(&mut self) -> &'ast [ClassMember<'ast>] {
        if !self.expect(TokenKind::OpenBrace, "Expected '{' to open class body") {
            return &[];
        }
        let mut members = Vec::new();
        while !matches!(self.current_token.kind, TokenKind::CloseBrace | TokenKind::Eof) {
            let before = self.current_token.span.start;
            if let Some(member) = self.parse_class_member() {
                members.push(member);
            }
            if self.current_token.span.start == before {
                self.error("Unexpected token in class body");
                self.bump();
            }
        }
        self.expect(TokenKind::CloseBrace, "Expected '}' to close class body");
        self.arena.alloc_slice_copy(&members)
    }

    fn parse_class_member(&mut self) -> Option<ClassMember<'ast>> {
        let start = self.current_token.span.start;

        if self.current_token.kind == TokenKind::Use {
            return Some(self.parse_trait_use());
        }

        let mut modifiers = Vec::new();
        while self.current_token.kind.is_modifier() {
            modifiers.push(self.current_token);
            self.bump();
        }
        let modifiers = self.arena.alloc_slice_copy(&modifiers);

        match self.current_token.kind {
            TokenKind::Const => {
                self.bump();
                let consts = self.parse_const_list();
                self.expect_semicolon();
                Some(ClassMember::Const {
                    modifiers,
                    consts,
                    span: self.span_from(start),
                })
            }
            TokenKind::Function => {
                self.bump();
                let by_ref = self.current_token.kind == TokenKind::Ampersand;
                if by_ref {
                    self.bump();
                }
                if !self.is_identifier_like() {
                    self.error("Expected method name");
                    return None;
                }
                let name = self.arena.alloc(self.current_token);
                self.bump();
                let params = self.parse_parameter_list();
                let return_type = self.parse_return_type();
                let body = if self.current_token.kind == TokenKind::OpenBrace {
                    Some(self.parse_block())
                } else {
                    self.expect_semicolon();
                    None
                };
                Some(ClassMember::Method {
                    modifiers,
                    name,
                    by_ref,
                    params,
                    return_type,
                    body,
                    span: self.span_from(start),
                })
            }
            _ => {
                let ty = if self.current_token.kind == TokenKind::Variable {
                    None
                } else {
                    self.parse_type().map(|t| &*self.arena.alloc(t))
                };
                if self.current_token.kind != TokenKind::Variable {
                    self.error("Expected property name");
                    self.sync_to_statement_end();
                    return None;
                }
                let first = self.arena.alloc(self.current_token);
                self.bump();
                let first_default = if self.current_token.kind == TokenKind::Eq {
                    self.bump();
                    Some(self.parse_expr(0))
                } else {
                    None
                };

                if self.current_token.kind == TokenKind::OpenBrace {
                    let hooks = self.parse_property_hooks();
                    return Some(ClassMember::HookedProperty {
                        modifiers,
                        ty,
                        name: first,
                        default: first_default,
                        hooks,
                        span: self.span_from(start),
                    });
                }

                let mut entries = vec![PropertyEntry {
                    name: first,
                    default: first_default,
                    span: first.span,
                }];
                while self.current_token.kind == TokenKind::Comma {
                    self.bump();
                    if self.current_token.kind != TokenKind::Variable {
                        self.error("Expected property name");
                        break;
                    }
                    let name = self.arena.alloc(self.current_token);
                    self.bump();
                    let default = if self.current_token.kind == TokenKind::Eq {
                        self.bump();
                        Some(self.parse_expr(0))
                    } else {
                        None
                    };
                    entries.push(PropertyEntry {
                        name,
                        default,
                        span: name.span,
                    });
                }
                self.expect_semicolon();
                Some(ClassMember::Property {
                    modifiers,
                    ty,
                    entries: self.arena.alloc_slice_copy(&entries),
                    span: self.span_from(start),
                })
            }
        }
    }

    fn parse_property_hooks(&mut self) -> &'ast [PropertyHook<'ast>] {
        self.bump();
        let mut hooks = Vec::new();
        while !matches!(self.current_token.kind, TokenKind::CloseBrace | TokenKind::Eof) {
            let start = self.current_token.span.start;
            while self.current_token.kind.is_modifier() {
                self.bump();
            }
            if self.current_token.kind == TokenKind::Ampersand {
                self.bump();
            }
            if self.current_token.kind != TokenKind::Identifier {
                self.error("Expected property hook name");
                self.bump();
                continue;
            }
            let name = self.arena.alloc(self.current_token);
            self.bump();
            let params = if self.current_token.kind == TokenKind::OpenParen {
                self.parse_parameter_list()
            } else {
                &[]
            };
            let body = match self.current_token.kind {
                TokenKind::DoubleArrow => {
                    self.bump();
                    let expr = self.parse_expr(0);
                    self.expect_semicolon();
                    PropertyHookBody::Expr(expr)
                }
                TokenKind::OpenBrace => PropertyHookBody::Statements(self.parse_block()),
                _ => {
                    self.error("Expected property hook body");
                    self.sync_to_statement_end();
                    continue;
                }
            };
            hooks.push(PropertyHook {
                name,
                params,
                body,
                span: self.span_from(start),
            });
        }
        self.expect(TokenKind::CloseBrace, "Expected '}' after property hooks");
        self.arena.alloc_slice_copy(&hooks)
    }

    fn parse_trait_use(&mut self) -> ClassMember<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let traits = self.parse_name_list();
        let mut adaptations = Vec::new();

        if self.current_token.kind == TokenKind::OpenBrace {
            self.bump();
            while !matches!(self.current_token.kind, TokenKind::CloseBrace | TokenKind::Eof) {
                let adapt_start = self.current_token.span.start;
                let method = self.parse_trait_method_ref();
                match self.current_token.kind {
                    TokenKind::Insteadof => {
                        self.bump();
                        let insteadof = self.parse_name_list();
                        adaptations.push(TraitAdaptation::Precedence {
                            method,
                            insteadof,
                            span: Span::new(adapt_start, self.current_token.span.start),
                        });
                    }
                    TokenKind::As => {
                        self.bump();
                        let visibility = if matches!(
                            self.current_token.kind,
                            TokenKind::Public | TokenKind::Protected | TokenKind::Private
                        ) {
                            let tok: &'ast Token = self.arena.alloc(self.current_token);
                            self.bump();
                            Some(tok)
                        } else {
                            None
                        };
                        let alias = if self.is_identifier_like() {
                            let tok: &'ast Token = self.arena.alloc(self.current_token);
                            self.bump();
                            Some(tok)
                        } else {
                            None
                        };
                        adaptations.push(TraitAdaptation::Alias {
                            method,
                            alias,
                            visibility,
                            span: Span::new(adapt_start, self.current_token.span.start),
                        });
                    }
                    _ => {
                        self.error("Expected 'insteadof' or 'as' in trait adaptation");
                        self.sync_to_statement_end();
                        continue;
                    }
                }
                self.expect_semicolon();
            }
            self.expect(TokenKind::CloseBrace, "Expected '}' after trait adaptations");
        } else {
            self.expect_semicolon();
        }

        ClassMember::TraitUse {
            traits,
            adaptations: self.arena.alloc_slice_copy(&adaptations),
            span: self.span_from(start),
        }
    }

    fn parse_trait_method_ref(&mut self) -> TraitMethodRef<'ast> {
        let start = self.current_token.span.start;
        let (trait_name, method_token): (Option<Name<'ast>>, Token) =
            if self.next_token.kind == TokenKind::DoubleColon {
                let name = self.parse_name();
                self.bump();
                let tok = self.current_token;
                self.bump();
                (Some(name), tok)
            } else {
                let tok = self.current_token;
                self.bump();
                (None, tok)
            };
        TraitMethodRef {
            trait_name,
            method: self.arena.alloc(method_token),
            span: self.span_from(start),
        }
    }
}
