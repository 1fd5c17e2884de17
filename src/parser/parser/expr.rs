use super::Parser;
use crate::parser::ast::{
    Arg, ArrayItem, AssignOp, BinaryOp, CastKind, ClosureUse, Expr, ExprId, MagicConstKind,
    MatchArm, UnaryOp,
};
use crate::parser::lexer::token::{Token, TokenKind};
use crate::parser::span::Span;

/// Binding power of prefix `!`.
const BP_NOT: u8 = 18;
/// Binding power of the other prefix operators and casts.
const BP_UNARY: u8 = 20;
/// Binds tighter than every infix operator.
const BP_PRIMARY: u8 = 22;

fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    // (left bp, right bp); right-associative operators have equal powers
    Some(match kind {
        TokenKind::LogicalOr => (1, 2),
        TokenKind::LogicalXor => (2, 3),
        TokenKind::LogicalAnd => (3, 4),
        TokenKind::Question => (5, 6),
        TokenKind::Coalesce => (6, 6),
        TokenKind::PipePipe => (7, 8),
        TokenKind::AmpersandAmpersand => (8, 9),
        TokenKind::Pipe => (9, 10),
        TokenKind::Caret => (10, 11),
        TokenKind::Ampersand => (11, 12),
        TokenKind::EqEq
        | TokenKind::BangEq
        | TokenKind::EqEqEq
        | TokenKind::BangEqEq
        | TokenKind::Spaceship => (12, 13),
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => (13, 14),
        TokenKind::Dot => (14, 15),
        TokenKind::Sl | TokenKind::Sr => (15, 16),
        TokenKind::Plus | TokenKind::Minus => (16, 17),
        TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => (17, 18),
        TokenKind::InstanceOf => (19, 20),
        TokenKind::Pow => (21, 21),
        _ => return None,
    })
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::LogicalOr | TokenKind::PipePipe => BinaryOp::Or,
        TokenKind::LogicalAnd | TokenKind::AmpersandAmpersand => BinaryOp::And,
        TokenKind::LogicalXor => BinaryOp::Xor,
        TokenKind::Coalesce => BinaryOp::Coalesce,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::Ampersand => BinaryOp::BitAnd,
        TokenKind::EqEq => BinaryOp::EqEq,
        TokenKind::BangEq => BinaryOp::NotEq,
        TokenKind::EqEqEq => BinaryOp::Identical,
        TokenKind::BangEqEq => BinaryOp::NotIdentical,
        TokenKind::Spaceship => BinaryOp::Spaceship,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::Dot => BinaryOp::Concat,
        TokenKind::Sl => BinaryOp::ShiftLeft,
        TokenKind::Sr => BinaryOp::ShiftRight,
        TokenKind::Plus => BinaryOp::Plus,
        TokenKind::Minus => BinaryOp::Minus,
        TokenKind::Asterisk => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Pow => BinaryOp::Pow,
        _ => return None,
    })
}

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::PlusEq => AssignOp::Plus,
        TokenKind::MinusEq => AssignOp::Minus,
        TokenKind::MulEq => AssignOp::Mul,
        TokenKind::DivEq => AssignOp::Div,
        TokenKind::ModEq => AssignOp::Mod,
        TokenKind::PowEq => AssignOp::Pow,
        TokenKind::ConcatEq => AssignOp::Concat,
        TokenKind::AndEq => AssignOp::BitAnd,
        TokenKind::OrEq => AssignOp::BitOr,
        TokenKind::XorEq => AssignOp::BitXor,
        TokenKind::SlEq => AssignOp::ShiftLeft,
        TokenKind::SrEq => AssignOp::ShiftRight,
        TokenKind::CoalesceEq => AssignOp::Coalesce,
        _ => return None,
    })
}

impl<'src, 'ast> Parser<'src, 'ast> {
    pub(super) fn parse_expr(&mut self, min_bp: u8) -> ExprId<'ast> {
        let mut left = self.parse_unary();

        loop {
            let kind = self.current_token.kind;

            // Assignment binds to any assignable left-hand side, whatever the
            // surrounding precedence: `!$a = f()` assigns before negating.
            if kind.is_assignment() && left.is_assignable() {
                left = self.parse_assignment(left);
                continue;
            }

            let Some((lbp, rbp)) = infix_binding_power(kind) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.bump();

            left = match kind {
                TokenKind::Question => self.parse_ternary_rest(left),
                TokenKind::InstanceOf => {
                    let class = self.parse_class_reference();
                    self.arena.alloc(Expr::InstanceOf {
                        expr: left,
                        class,
                        span: left.span().to(class.span()),
                    })
                }
                _ => {
                    let right = self.parse_expr(rbp);
                    let op = binary_op(kind).unwrap_or(BinaryOp::Plus);
                    self.arena.alloc(Expr::Binary {
                        left,
                        op,
                        right,
                        span: left.span().to(right.span()),
                    })
                }
            };
        }

        left
    }

    fn parse_assignment(&mut self, var: ExprId<'ast>) -> ExprId<'ast> {
        let kind = self.current_token.kind;
        self.bump();
        if kind == TokenKind::Eq && self.current_token.kind == TokenKind::Ampersand {
            self.bump();
            let expr = self.parse_expr(4);
            return self.arena.alloc(Expr::AssignRef {
                var,
                expr,
                span: var.span().to(expr.span()),
            });
        }
        let expr = self.parse_expr(4);
        let span = var.span().to(expr.span());
        match assign_op(kind) {
            Some(op) => self.arena.alloc(Expr::AssignOp { var, op, expr, span }),
            None => self.arena.alloc(Expr::Assign { var, expr, span }),
        }
    }

    fn parse_ternary_rest(&mut self, condition: ExprId<'ast>) -> ExprId<'ast> {
        let if_true = if self.current_token.kind == TokenKind::Colon {
            None
        } else {
            Some(self.parse_expr(0))
        };
        self.expect(TokenKind::Colon, "Expected ':' in ternary expression");
        let if_false = self.parse_expr(6);
        self.arena.alloc(Expr::Ternary {
            condition,
            if_true,
            if_false,
            span: condition.span().to(if_false.span()),
        })
    }

    fn prefix(&mut self, op: UnaryOp, bp: u8) -> ExprId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        let expr = self.parse_expr(bp);
        self.arena.alloc(Expr::Unary {
            op,
            expr,
            span: Span::new(start, expr.span().end),
        })
    }

    fn parse_unary(&mut self) -> ExprId<'ast> {
        let start = self.current_token.span.start;
        let cast = match self.current_token.kind {
            TokenKind::Bang => return self.prefix(UnaryOp::Not, BP_NOT),
            TokenKind::Minus => return self.prefix(UnaryOp::Minus, BP_UNARY),
            TokenKind::Plus => return self.prefix(UnaryOp::Plus, BP_UNARY),
            TokenKind::BitNot => return self.prefix(UnaryOp::BitNot, BP_UNARY),
            TokenKind::At => return self.prefix(UnaryOp::ErrorSuppress, BP_UNARY),
            TokenKind::Inc => return self.prefix(UnaryOp::PreInc, BP_UNARY),
            TokenKind::Dec => return self.prefix(UnaryOp::PreDec, BP_UNARY),
            TokenKind::IntCast => Some(CastKind::Int),
            TokenKind::FloatCast => Some(CastKind::Float),
            TokenKind::StringCast => Some(CastKind::String),
            TokenKind::BoolCast => Some(CastKind::Bool),
            TokenKind::ArrayCast => Some(CastKind::Array),
            TokenKind::ObjectCast => Some(CastKind::Object),
            TokenKind::UnsetCast => Some(CastKind::Unset),
            _ => None,
        };
        if let Some(kind) = cast {
            self.bump();
            let expr = self.parse_expr(BP_UNARY);
            return self.arena.alloc(Expr::Cast {
                kind,
                expr,
                span: Span::new(start, expr.span().end),
            });
        }

        match self.current_token.kind {
            TokenKind::New => {
                let new = self.parse_new();
                self.parse_postfix(new)
            }
            TokenKind::Clone => {
                self.bump();
                let expr = self.parse_expr(BP_PRIMARY);
                self.arena.alloc(Expr::Clone {
                    expr,
                    span: Span::new(start, expr.span().end),
                })
            }
            TokenKind::Print => {
                self.bump();
                let expr = self.parse_expr(4);
                self.arena.alloc(Expr::Print {
                    expr,
                    span: Span::new(start, expr.span().end),
                })
            }
            TokenKind::Yield => self.parse_yield(),
            TokenKind::YieldFrom => {
                self.bump();
                let expr = self.parse_expr(4);
                self.arena.alloc(Expr::YieldFrom {
                    expr,
                    span: Span::new(start, expr.span().end),
                })
            }
            TokenKind::Throw => {
                self.bump();
                let expr = self.parse_expr(0);
                self.arena.alloc(Expr::Throw {
                    expr,
                    span: Span::new(start, expr.span().end),
                })
            }
            TokenKind::Function | TokenKind::Fn => self.parse_closure(false, start),
            TokenKind::Static
                if matches!(self.next_token.kind, TokenKind::Function | TokenKind::Fn) =>
            {
                self.bump();
                self.parse_closure(true, start)
            }
            _ => {
                let primary = self.parse_primary();
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_yield(&mut self) -> ExprId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        if matches!(
            self.current_token.kind,
            TokenKind::SemiColon
                | TokenKind::CloseParen
                | TokenKind::CloseBracket
                | TokenKind::Comma
                | TokenKind::CloseTag
                | TokenKind::Eof
        ) {
            return self.arena.alloc(Expr::Yield {
                key: None,
                value: None,
                span: self.span_from(start),
            });
        }
        let first = self.parse_expr(4);
        if self.current_token.kind == TokenKind::DoubleArrow {
            self.bump();
            let value = self.parse_expr(4);
            return self.arena.alloc(Expr::Yield {
                key: Some(first),
                value: Some(value),
                span: Span::new(start, value.span().end),
            });
        }
        self.arena.alloc(Expr::Yield {
            key: None,
            value: Some(first),
            span: Span::new(start, first.span().end),
        })
    }

    fn identifier_expr(&mut self) -> ExprId<'ast> {
        let span = self.current_token.span;
        self.bump();
        self.arena.alloc(Expr::Identifier { name: span, span })
    }

    fn variable_expr(&mut self) -> ExprId<'ast> {
        let span = self.current_token.span;
        self.bump();
        self.arena.alloc(Expr::Variable {
            name: Span::new(span.start + 1, span.end),
            span,
        })
    }

    /// Right-hand side of `instanceof` or the class in `new`.
    fn parse_class_reference(&mut self) -> ExprId<'ast> {
        match self.current_token.kind {
            TokenKind::Identifier | TokenKind::QualifiedName | TokenKind::Static => {
                self.identifier_expr()
            }
            TokenKind::Variable => {
                let mut expr = self.variable_expr();
                loop {
                    match self.current_token.kind {
                        TokenKind::Arrow | TokenKind::NullSafeArrow => {
                            self.bump();
                            let property = self.parse_member_name();
                            expr = self.arena.alloc(Expr::PropertyFetch {
                                target: expr,
                                property,
                                span: expr.span().to(property.span()),
                            });
                        }
                        TokenKind::DoubleColon if self.next_token.kind == TokenKind::Variable => {
                            self.bump();
                            let property = self.variable_expr();
                            expr = self.arena.alloc(Expr::StaticPropertyFetch {
                                class: expr,
                                property,
                                span: expr.span().to(property.span()),
                            });
                        }
                        TokenKind::OpenBracket => {
                            self.bump();
                            let dim = self.parse_expr(0);
                            let end = self.current_token.span.end;
                            self.expect(TokenKind::CloseBracket, "Expected ']'");
                            expr = self.arena.alloc(Expr::ArrayDimFetch {
                                array: expr,
                                dim: Some(dim),
                                span: Span::new(expr.span().start, end),
                            });
                        }
                        _ => break,
                    }
                }
                expr
            }
            TokenKind::OpenParen => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseParen, "Expected ')'");
                expr
            }
            _ => {
                self.error("Expected class name");
                self.arena.alloc(Expr::Error {
                    span: self.current_token.span,
                })
            }
        }
    }

    fn parse_new(&mut self) -> ExprId<'ast> {
        let start = self.current_token.span.start;
        self.bump();

        if self.current_token.kind == TokenKind::Class {
            let class_start = self.current_token.span.start;
            self.bump();
            let args = if self.current_token.kind == TokenKind::OpenParen {
                self.parse_call_arguments()
            } else {
                &[]
            };
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
            let span = Span::new(class_start, self.current_token.span.start);
            let class = self.arena.alloc(Expr::AnonymousClass {
                extends,
                implements,
                members,
                span,
            });
            return self.arena.alloc(Expr::New {
                class,
                args,
                span: Span::new(start, span.end),
            });
        }

        let class = self.parse_class_reference();
        let args = if self.current_token.kind == TokenKind::OpenParen {
            self.parse_call_arguments()
        } else {
            &[]
        };
        self.arena.alloc(Expr::New {
            class,
            args,
            span: self.span_from(start),
        })
    }

    /// Property or method name after `->`.
    fn parse_member_name(&mut self) -> ExprId<'ast> {
        match self.current_token.kind {
            TokenKind::Variable => self.variable_expr(),
            TokenKind::OpenBrace => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseBrace, "Expected '}'");
                expr
            }
            _ if self.is_identifier_like() => self.identifier_expr(),
            _ => {
                self.error("Expected member name");
                self.arena.alloc(Expr::Error {
                    span: self.current_token.span,
                })
            }
        }
    }

    fn parse_postfix(&mut self, mut expr: ExprId<'ast>) -> ExprId<'ast> {
        loop {
            let start = expr.span().start;
            match self.current_token.kind {
                TokenKind::OpenBracket => {
                    self.bump();
                    let dim = if self.current_token.kind == TokenKind::CloseBracket {
                        None
                    } else {
                        Some(self.parse_expr(0))
                    };
                    let end = self.current_token.span.end;
                    self.expect(TokenKind::CloseBracket, "Expected ']'");
                    expr = self.arena.alloc(Expr::ArrayDimFetch {
                        array: expr,
                        dim,
                        span: Span::new(start, end),
                    });
                }
                TokenKind::Arrow | TokenKind::NullSafeArrow => {
                    let nullsafe = self.current_token.kind == TokenKind::NullSafeArrow;
                    self.bump();
                    let name = self.parse_member_name();
                    if self.current_token.kind == TokenKind::OpenParen {
                        let args = self.parse_call_arguments();
                        let span = self.span_from(start);
                        expr = if nullsafe {
                            self.arena.alloc(Expr::NullsafeMethodCall {
                                target: expr,
                                method: name,
                                args,
                                span,
                            })
                        } else {
                            self.arena.alloc(Expr::MethodCall {
                                target: expr,
                                method: name,
                                args,
                                span,
                            })
                        };
                    } else {
                        let span = Span::new(start, name.span().end);
                        expr = if nullsafe {
                            self.arena.alloc(Expr::NullsafePropertyFetch {
                                target: expr,
                                property: name,
                                span,
                            })
                        } else {
                            self.arena.alloc(Expr::PropertyFetch {
                                target: expr,
                                property: name,
                                span,
                            })
                        };
                    }
                }
                TokenKind::DoubleColon => {
                    self.bump();
                    match self.current_token.kind {
                        TokenKind::Variable => {
                            let property = self.variable_expr();
                            if self.current_token.kind == TokenKind::OpenParen {
                                let args = self.parse_call_arguments();
                                expr = self.arena.alloc(Expr::StaticCall {
                                    class: expr,
                                    method: property,
                                    args,
                                    span: self.span_from(start),
                                });
                            } else {
                                expr = self.arena.alloc(Expr::StaticPropertyFetch {
                                    class: expr,
                                    property,
                                    span: Span::new(start, property.span().end),
                                });
                            }
                        }
                        TokenKind::OpenBrace => {
                            self.bump();
                            let method = self.parse_expr(0);
                            self.expect(TokenKind::CloseBrace, "Expected '}'");
                            let args = self.parse_call_arguments();
                            expr = self.arena.alloc(Expr::StaticCall {
                                class: expr,
                                method,
                                args,
                                span: self.span_from(start),
                            });
                        }
                        _ if self.is_identifier_like() => {
                            let name = self.identifier_expr();
                            if self.current_token.kind == TokenKind::OpenParen {
                                let args = self.parse_call_arguments();
                                expr = self.arena.alloc(Expr::StaticCall {
                                    class: expr,
                                    method: name,
                                    args,
                                    span: self.span_from(start),
                                });
                            } else {
                                expr = self.arena.alloc(Expr::ClassConstFetch {
                                    class: expr,
                                    constant: name,
                                    span: Span::new(start, name.span().end),
                                });
                            }
                        }
                        _ => {
                            self.error("Expected member after '::'");
                            break;
                        }
                    }
                }
                TokenKind::OpenParen => {
                    let args = self.parse_call_arguments();
                    expr = self.arena.alloc(Expr::Call {
                        func: expr,
                        args,
                        span: self.span_from(start),
                    });
                }
                TokenKind::Inc if expr.is_assignable() => {
                    let end = self.current_token.span.end;
                    self.bump();
                    expr = self.arena.alloc(Expr::PostInc {
                        var: expr,
                        span: Span::new(start, end),
                    });
                }
                TokenKind::Dec if expr.is_assignable() => {
                    let end = self.current_token.span.end;
                    self.bump();
                    expr = self.arena.alloc(Expr::PostDec {
                        var: expr,
                        span: Span::new(start, end),
                    });
                }
                _ => break,
            }
        }
        expr
    }

    pub(super) fn parse_call_arguments(&mut self) -> &'ast [Arg<'ast>] {
        if !self.expect(TokenKind::OpenParen, "Expected '('") {
            return &[];
        }
        let mut args = Vec::new();
        while !matches!(self.current_token.kind, TokenKind::CloseParen | TokenKind::Eof) {
            let start = self.current_token.span.start;
            if self.current_token.kind == TokenKind::Ellipsis
                && self.next_token.kind == TokenKind::CloseParen
            {
                let span = self.current_token.span;
                self.bump();
                args.push(Arg {
                    name: None,
                    value: self.arena.alloc(Expr::VariadicPlaceholder { span }),
                    unpack: false,
                    span,
                });
                break;
            }

            let mut name: Option<&'ast Token> = None;
            let mut unpack = false;
            if self.is_identifier_like() && self.next_token.kind == TokenKind::Colon {
                name = Some(self.arena.alloc(self.current_token));
                self.bump();
                self.bump();
            } else if self.current_token.kind == TokenKind::Ellipsis {
                unpack = true;
                self.bump();
            }

            let value = self.parse_expr(0);
            args.push(Arg {
                name,
                value,
                unpack,
                span: Span::new(start, value.span().end),
            });

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "Expected ')' after arguments");
        self.arena.alloc_slice_copy(&args)
    }

    /// Parses `[...]`, `array(...)` or `list(...)`; the current token is the opener.
    pub(super) fn parse_array_literal(&mut self, start: usize, close: TokenKind) -> ExprId<'ast> {
        self.bump();
        let mut items = Vec::new();
        while self.current_token.kind != close && self.current_token.kind != TokenKind::Eof {
            let item_start = self.current_token.span.start;
            if self.current_token.kind == TokenKind::Comma {
                let span = Span::new(item_start, item_start);
                items.push(ArrayItem {
                    key: None,
                    value: self.arena.alloc(Expr::Omitted { span }),
                    by_ref: false,
                    unpack: false,
                    span,
                });
                self.bump();
                continue;
            }
            if self.current_token.kind == TokenKind::Ellipsis {
                self.bump();
                let value = self.parse_expr(0);
                items.push(ArrayItem {
                    key: None,
                    value,
                    by_ref: false,
                    unpack: true,
                    span: Span::new(item_start, value.span().end),
                });
            } else {
                let mut by_ref = self.eat_ref();
                let mut key = None;
                let mut value = self.parse_expr(0);
                if !by_ref && self.current_token.kind == TokenKind::DoubleArrow {
                    self.bump();
                    key = Some(value);
                    by_ref = self.eat_ref();
                    value = self.parse_expr(0);
                }
                items.push(ArrayItem {
                    key,
                    value,
                    by_ref,
                    unpack: false,
                    span: Span::new(item_start, value.span().end),
                });
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_token.span.end;
        self.expect(close, "Unterminated array literal");
        self.arena.alloc(Expr::Array {
            items: self.arena.alloc_slice_copy(&items),
            span: Span::new(start, end),
        })
    }

    fn eat_ref(&mut self) -> bool {
        if self.current_token.kind == TokenKind::Ampersand {
            self.bump();
            true
        } else {
            false
        }
    }

    fn parse_closure(&mut self, is_static: bool, start: usize) -> ExprId<'ast> {
        let is_arrow = self.current_token.kind == TokenKind::Fn;
        self.bump();
        let by_ref = self.eat_ref();
        let params = self.parse_parameter_list();

        if is_arrow {
            let return_type = self.parse_return_type();
            self.expect(TokenKind::DoubleArrow, "Expected '=>' in arrow function");
            let expr = self.parse_expr(4);
            return self.arena.alloc(Expr::ArrowFunction {
                is_static,
                by_ref,
                params,
                return_type,
                expr,
                span: Span::new(start, expr.span().end),
            });
        }

        let mut uses = Vec::new();
        if self.current_token.kind == TokenKind::Use {
            self.bump();
            self.expect(TokenKind::OpenParen, "Expected '(' after use");
            while !matches!(self.current_token.kind, TokenKind::CloseParen | TokenKind::Eof) {
                let use_start = self.current_token.span.start;
                let by_ref = self.eat_ref();
                if self.current_token.kind != TokenKind::Variable {
                    self.error("Expected variable in closure use list");
                    break;
                }
                let var = self.arena.alloc(self.current_token);
                self.bump();
                uses.push(ClosureUse {
                    var,
                    by_ref,
                    span: Span::new(use_start, var.span.end),
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::CloseParen, "Expected ')' after closure use list");
        }
        let return_type = self.parse_return_type();
        let body = self.parse_block();
        self.arena.alloc(Expr::Closure {
            is_static,
            by_ref,
            params,
            uses: self.arena.alloc_slice_copy(&uses),
            return_type,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_match(&mut self) -> ExprId<'ast> {
        let start = self.current_token.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen, "Expected '(' after match");
        let condition = self.parse_expr(0);
        self.expect(TokenKind::CloseParen, "Expected ')' after match subject");
        self.expect(TokenKind::OpenBrace, "Expected '{' to open match arms");

        let mut arms = Vec::new();
        while !matches!(self.current_token.kind, TokenKind::CloseBrace | TokenKind::Eof) {
            let arm_start = self.current_token.span.start;
            let conditions = if self.current_token.kind == TokenKind::Default {
                self.bump();
                if self.current_token.kind == TokenKind::Comma {
                    self.bump();
                }
                None
            } else {
                let mut conds = Vec::new();
                while !matches!(self.current_token.kind, TokenKind::DoubleArrow | TokenKind::Eof) {
                    conds.push(self.parse_expr(0));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                Some(&*self.arena.alloc_slice_copy(&conds))
            };
            self.expect(TokenKind::DoubleArrow, "Expected '=>' in match arm");
            let body = self.parse_expr(0);
            arms.push(MatchArm {
                conditions,
                body,
                span: Span::new(arm_start, body.span().end),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_token.span.end;
        self.expect(TokenKind::CloseBrace, "Expected '}' to close match");
        self.arena.alloc(Expr::Match {
            condition,
            arms: self.arena.alloc_slice_copy(&arms),
            span: Span::new(start, end),
        })
    }

    fn parse_primary(&mut self) -> ExprId<'ast> {
        let token = self.current_token;
        let start = token.span.start;
        let span = token.span;

        match token.kind {
            TokenKind::Variable => self.variable_expr(),
            TokenKind::Dollar => {
                self.error("Variable variables are not supported");
                self.bump();
                self.arena.alloc(Expr::Error { span })
            }
            TokenKind::LNumber => {
                self.bump();
                let digits: std::vec::Vec<u8> =
                    self.text(&token).iter().copied().filter(|b| *b != b'_').collect();
                self.arena.alloc(Expr::Integer {
                    value: self.arena.alloc_slice_copy(&digits),
                    span,
                })
            }
            TokenKind::DNumber => {
                self.bump();
                let digits: std::vec::Vec<u8> =
                    self.text(&token).iter().copied().filter(|b| *b != b'_').collect();
                self.arena.alloc(Expr::Float {
                    value: self.arena.alloc_slice_copy(&digits),
                    span,
                })
            }
            TokenKind::ConstantString => {
                self.bump();
                self.single_quoted_string(span)
            }
            TokenKind::DoubleQuotedString => {
                self.bump();
                self.double_quoted_string(span)
            }
            TokenKind::Heredoc | TokenKind::Nowdoc => {
                self.bump();
                self.heredoc_string(span, token.kind == TokenKind::Nowdoc)
            }
            TokenKind::OpenBracket => self.parse_array_literal(start, TokenKind::CloseBracket),
            TokenKind::Array | TokenKind::List
                if self.next_token.kind == TokenKind::OpenParen =>
            {
                self.bump();
                self.parse_array_literal(start, TokenKind::CloseParen)
            }
            TokenKind::OpenParen => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseParen, "Expected ')'");
                expr
            }
            TokenKind::Isset => {
                self.bump();
                self.expect(TokenKind::OpenParen, "Expected '(' after isset");
                let mut vars = Vec::new();
                while !matches!(self.current_token.kind, TokenKind::CloseParen | TokenKind::Eof) {
                    vars.push(self.parse_expr(0));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.current_token.span.end;
                self.expect(TokenKind::CloseParen, "Expected ')' after isset");
                self.arena.alloc(Expr::Isset {
                    vars: self.arena.alloc_slice_copy(&vars),
                    span: Span::new(start, end),
                })
            }
            TokenKind::Empty => {
                self.bump();
                self.expect(TokenKind::OpenParen, "Expected '(' after empty");
                let expr = self.parse_expr(0);
                let end = self.current_token.span.end;
                self.expect(TokenKind::CloseParen, "Expected ')' after empty");
                self.arena.alloc(Expr::Empty {
                    expr,
                    span: Span::new(start, end),
                })
            }
            TokenKind::Exit => {
                self.bump();
                let mut expr = None;
                if self.current_token.kind == TokenKind::OpenParen {
                    self.bump();
                    if self.current_token.kind != TokenKind::CloseParen {
                        expr = Some(self.parse_expr(0));
                    }
                    self.expect(TokenKind::CloseParen, "Expected ')' after exit");
                }
                self.arena.alloc(Expr::Exit {
                    expr,
                    span: self.span_from(start),
                })
            }
            TokenKind::Match if self.next_token.kind == TokenKind::OpenParen => self.parse_match(),
            TokenKind::Line
            | TokenKind::File
            | TokenKind::Dir
            | TokenKind::ClassC
            | TokenKind::TraitC
            | TokenKind::MethodC
            | TokenKind::FuncC
            | TokenKind::NsC
            | TokenKind::PropertyC => {
                self.bump();
                let kind = match token.kind {
                    TokenKind::Line => MagicConstKind::Line,
                    TokenKind::File => MagicConstKind::File,
                    TokenKind::Dir => MagicConstKind::Dir,
                    TokenKind::ClassC => MagicConstKind::Class,
                    TokenKind::TraitC => MagicConstKind::Trait,
                    TokenKind::MethodC => MagicConstKind::Method,
                    TokenKind::FuncC => MagicConstKind::Function,
                    TokenKind::NsC => MagicConstKind::Namespace,
                    _ => MagicConstKind::Property,
                };
                self.arena.alloc(Expr::MagicConst { kind, span })
            }
            TokenKind::Identifier | TokenKind::QualifiedName | TokenKind::Static => {
                self.identifier_expr()
            }
            kind if kind.is_semi_reserved() && self.next_token.kind == TokenKind::OpenParen => {
                // Keywords like `list` or `match` used as ordinary function names
                self.identifier_expr()
            }
            _ => {
                self.error("Syntax error, unexpected token");
                self.arena.alloc(Expr::Error { span })
            }
        }
    }
}
