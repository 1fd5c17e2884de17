use super::Parser;
use crate::parser::ast::Type;
use crate::parser::lexer::token::TokenKind;

impl<'src, 'ast> Parser<'src, 'ast> {
    fn parse_type_atom(&mut self) -> Option<Type<'ast>> {
        match self.current_token.kind {
            TokenKind::OpenParen => {
                // DNF types: (A&B)|null
                self.bump();
                let inner = self.parse_type()?;
                self.expect(TokenKind::CloseParen, "Expected ')' in type");
                Some(inner)
            }
            TokenKind::Identifier
            | TokenKind::QualifiedName
            | TokenKind::Array
            | TokenKind::Static => Some(Type::Simple(self.parse_name())),
            _ => None,
        }
    }

    pub(super) fn parse_type(&mut self) -> Option<Type<'ast>> {
        if self.current_token.kind == TokenKind::Question {
            self.bump();
            let inner = self.parse_type_atom()?;
            return Some(Type::Nullable(self.arena.alloc(inner)));
        }

        let first = self.parse_type_atom()?;
        match self.current_token.kind {
            TokenKind::Pipe => {
                let mut types = vec![first];
                while self.current_token.kind == TokenKind::Pipe {
                    self.bump();
                    types.push(self.parse_type_atom()?);
                }
                Some(Type::Union(self.arena.alloc_slice_copy(&types)))
            }
            // `&` followed by a variable or `...` is a by-ref parameter, not an intersection
            TokenKind::Ampersand
                if !matches!(
                    self.next_token.kind,
                    TokenKind::Variable | TokenKind::Ellipsis
                ) =>
            {
                let mut types = vec![first];
                while self.current_token.kind == TokenKind::Ampersand
                    && !matches!(self.next_token.kind, TokenKind::Variable | TokenKind::Ellipsis)
                {
                    self.bump();
                    types.push(self.parse_type_atom()?);
                }
                Some(Type::Intersection(self.arena.alloc_slice_copy(&types)))
            }
            _ => Some(first),
        }
    }

    pub(super) fn parse_return_type(&mut self) -> Option<&'ast Type<'ast>> {
        if self.current_token.kind != TokenKind::Colon {
            return None;
        }
        self.bump();
        match self.parse_type() {
            Some(t) => Some(self.arena.alloc(t)),
            None => {
                self.error("Expected return type");
                None
            }
        }
    }
}
