use super::Parser;
use crate::parser::ast::{Expr, ExprId};
use crate::parser::lexer::{Lexer, is_ident_char, is_ident_start};
use crate::parser::lexer::token::TokenKind;
use crate::parser::span::Span;

fn push_utf8(out: &mut Vec<u8>, code: u32) {
    if let Some(ch) = char::from_u32(code) {
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    }
}

/// Decodes one escape sequence starting at the backslash `src[0]`.
/// Returns the number of bytes consumed.
fn decode_escape(src: &[u8], out: &mut Vec<u8>) -> usize {
    let Some(&next) = src.get(1) else {
        out.push(b'\\');
        return 1;
    };
    match next {
        b'n' => out.push(b'\n'),
        b't' => out.push(b'\t'),
        b'r' => out.push(b'\r'),
        b'v' => out.push(0x0b),
        b'e' => out.push(0x1b),
        b'f' => out.push(0x0c),
        b'\\' => out.push(b'\\'),
        b'$' => out.push(b'$'),
        b'"' => out.push(b'"'),
        b'0'..=b'7' => {
            let mut value: u32 = 0;
            let mut len = 1;
            while len <= 3 && src.get(len).is_some_and(|b| (b'0'..=b'7').contains(b)) {
                value = value * 8 + u32::from(src[len] - b'0');
                len += 1;
            }
            out.push(value as u8);
            return len;
        }
        b'x' if src.get(2).is_some_and(|b| b.is_ascii_hexdigit()) => {
            let mut value: u32 = 0;
            let mut len = 2;
            while len < 4 && src.get(len).is_some_and(|b| b.is_ascii_hexdigit()) {
                value = value * 16 + (src[len] as char).to_digit(16).unwrap_or(0);
                len += 1;
            }
            out.push(value as u8);
            return len;
        }
        b'u' if src.get(2) == Some(&b'{') => {
            if let Some(close) = src[3..].iter().position(|b| *b == b'}') {
                let hex = &src[3..3 + close];
                if let Some(code) = std::str::from_utf8(hex)
                    .ok()
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                {
                    push_utf8(out, code);
                    return 4 + close;
                }
            }
            out.extend_from_slice(b"\\u");
        }
        other => {
            out.push(b'\\');
            out.push(other);
        }
    }
    2
}

impl<'src, 'ast> Parser<'src, 'ast> {
    pub(super) fn single_quoted_string(&mut self, span: Span) -> ExprId<'ast> {
        let raw = &self.source[span.start + 1..span.end.saturating_sub(1).max(span.start + 1)];
        let mut value = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'\\' && matches!(raw.get(i + 1), Some(b'\'') | Some(b'\\')) {
                value.push(raw[i + 1]);
                i += 2;
            } else {
                value.push(raw[i]);
                i += 1;
            }
        }
        self.arena.alloc(Expr::String {
            value: self.arena.alloc_slice_copy(&value),
            span,
        })
    }

    pub(super) fn double_quoted_string(&mut self, span: Span) -> ExprId<'ast> {
        let end = span.end.saturating_sub(1).max(span.start + 1);
        let parts = self.parse_interpolated(span.start + 1, end, 0, true);
        self.finish_string(parts, span)
    }

    pub(super) fn heredoc_string(&mut self, span: Span, nowdoc: bool) -> ExprId<'ast> {
        let src = self.source;
        // Header: <<< [ws] ["']LABEL["'] newline
        let mut pos = span.start + 3;
        while matches!(src[pos], b' ' | b'\t') {
            pos += 1;
        }
        if matches!(src[pos], b'"' | b'\'') {
            pos += 1;
        }
        let label_start = pos;
        while pos < span.end && is_ident_char(src[pos]) {
            pos += 1;
        }
        let label_len = pos - label_start;
        while pos < span.end && src[pos] != b'\n' {
            pos += 1;
        }
        let body_start = (pos + 1).min(span.end);

        // Closing line: [indent] LABEL; the body ends before its newline
        let closing_label_start = span.end - label_len;
        let mut closing_line_start = closing_label_start;
        while closing_line_start > body_start && matches!(src[closing_line_start - 1], b' ' | b'\t') {
            closing_line_start -= 1;
        }
        let indent = closing_label_start - closing_line_start;
        let body_end = closing_line_start.saturating_sub(1).max(body_start);

        let parts = if nowdoc {
            let mut value = Vec::new();
            let mut at_line_start = true;
            let mut i = body_start;
            while i < body_end {
                if at_line_start {
                    let mut skipped = 0;
                    while skipped < indent && i < body_end && matches!(src[i], b' ' | b'\t') {
                        i += 1;
                        skipped += 1;
                    }
                    at_line_start = false;
                    continue;
                }
                if src[i] == b'\n' {
                    at_line_start = true;
                }
                value.push(src[i]);
                i += 1;
            }
            let expr: ExprId<'ast> = self.arena.alloc(Expr::String {
                value: self.arena.alloc_slice_copy(&value),
                span,
            });
            vec![expr]
        } else {
            self.parse_interpolated(body_start, body_end, indent, true)
        };
        self.finish_string(parts, span)
    }

    fn finish_string(&mut self, parts: Vec<ExprId<'ast>>, span: Span) -> ExprId<'ast> {
        match parts.as_slice() {
            [] => self.arena.alloc(Expr::String { value: &[], span }),
            [Expr::String { value, .. }] => {
                let value: &'ast [u8] = *value;
                self.arena.alloc(Expr::String { value, span })
            }
            _ => self.arena.alloc(Expr::InterpolatedString {
                parts: self.arena.alloc_slice_copy(&parts),
                span,
            }),
        }
    }

    fn literal_part(&mut self, value: &mut Vec<u8>, at: usize, parts: &mut Vec<ExprId<'ast>>) {
        if value.is_empty() {
            return;
        }
        parts.push(self.arena.alloc(Expr::String {
            value: self.arena.alloc_slice_copy(value),
            span: Span::new(at, at),
        }));
        value.clear();
    }

    /// Splits the string body `source[start..end]` into literal and
    /// expression parts, stripping `indent` columns at each line start.
    fn parse_interpolated(
        &mut self,
        start: usize,
        end: usize,
        indent: usize,
        escapes: bool,
    ) -> Vec<ExprId<'ast>> {
        let src = self.source;
        let mut parts = Vec::new();
        let mut literal = Vec::new();
        let mut at_line_start = indent > 0;
        let mut pos = start;

        while pos < end {
            if at_line_start {
                let mut skipped = 0;
                while skipped < indent && pos < end && matches!(src[pos], b' ' | b'\t') {
                    pos += 1;
                    skipped += 1;
                }
                at_line_start = false;
                continue;
            }
            let b = src[pos];
            match b {
                b'\\' if escapes => {
                    pos += decode_escape(&src[pos..end], &mut literal);
                }
                b'$' if pos + 1 < end && is_ident_start(src[pos + 1]) => {
                    self.literal_part(&mut literal, pos, &mut parts);
                    let (expr, next) = self.simple_interpolation(pos, end);
                    parts.push(expr);
                    pos = next;
                }
                b'$' if pos + 1 < end && src[pos + 1] == b'{' => {
                    self.literal_part(&mut literal, pos, &mut parts);
                    let name_start = pos + 2;
                    let mut name_end = name_start;
                    while name_end < end && is_ident_char(src[name_end]) {
                        name_end += 1;
                    }
                    if src.get(name_end) != Some(&b'}') {
                        self.errors.push(crate::parser::ast::ParseError {
                            span: Span::new(pos, name_end),
                            message: "Unsupported ${expr} interpolation",
                        });
                    }
                    parts.push(self.arena.alloc(Expr::Variable {
                        name: Span::new(name_start, name_end),
                        span: Span::new(pos, name_end + 1),
                    }));
                    pos = (name_end + 1).min(end);
                }
                b'{' if pos + 1 < end && src[pos + 1] == b'$' => {
                    self.literal_part(&mut literal, pos, &mut parts);
                    let mut sub = Parser::new(Lexer::scripting_at(src, pos + 1), self.arena);
                    let expr = sub.parse_expr(0);
                    let close = sub.current_token;
                    self.errors.append(&mut sub.errors);
                    if close.kind == TokenKind::CloseBrace {
                        pos = close.span.end;
                    } else {
                        self.errors.push(crate::parser::ast::ParseError {
                            span: close.span,
                            message: "Expected '}' in string interpolation",
                        });
                        pos = end;
                    }
                    parts.push(expr);
                }
                b'\n' => {
                    literal.push(b);
                    at_line_start = indent > 0;
                    pos += 1;
                }
                _ => {
                    literal.push(b);
                    pos += 1;
                }
            }
        }
        self.literal_part(&mut literal, end, &mut parts);
        parts
    }

    /// `$name`, `$name[key]`, `$name->prop` inside a string.
    fn simple_interpolation(&mut self, start: usize, end: usize) -> (ExprId<'ast>, usize) {
        let src = self.source;
        let mut pos = start + 1;
        while pos < end && is_ident_char(src[pos]) {
            pos += 1;
        }
        let var: ExprId<'ast> = self.arena.alloc(Expr::Variable {
            name: Span::new(start + 1, pos),
            span: Span::new(start, pos),
        });

        if pos < end && src[pos] == b'[' {
            let key_start = pos + 1;
            let mut key_end = key_start;
            while key_end < end && src[key_end] != b']' {
                key_end += 1;
            }
            if key_end < end {
                let key_bytes = &src[key_start..key_end];
                let key_span = Span::new(key_start, key_end);
                let key: ExprId<'ast> = if key_bytes.first() == Some(&b'$') {
                    self.arena.alloc(Expr::Variable {
                        name: Span::new(key_start + 1, key_end),
                        span: key_span,
                    })
                } else if !key_bytes.is_empty()
                    && (key_bytes[0].is_ascii_digit() || key_bytes[0] == b'-')
                    && key_bytes[1..].iter().all(|b| b.is_ascii_digit())
                    && !(key_bytes.len() > 1 && key_bytes[0] == b'0')
                {
                    self.arena.alloc(Expr::Integer {
                        value: self.arena.alloc_slice_copy(key_bytes),
                        span: key_span,
                    })
                } else {
                    let trimmed = key_bytes
                        .strip_prefix(b"'")
                        .and_then(|k| k.strip_suffix(b"'"))
                        .unwrap_or(key_bytes);
                    self.arena.alloc(Expr::String {
                        value: self.arena.alloc_slice_copy(trimmed),
                        span: key_span,
                    })
                };
                let expr = self.arena.alloc(Expr::ArrayDimFetch {
                    array: var,
                    dim: Some(key),
                    span: Span::new(start, key_end + 1),
                });
                return (expr, key_end + 1);
            }
        }

        let arrow_len = if src[pos..end].starts_with(b"->") {
            2
        } else if src[pos..end].starts_with(b"?->") {
            3
        } else {
            0
        };
        if arrow_len > 0 && pos + arrow_len < end && is_ident_start(src[pos + arrow_len]) {
            let name_start = pos + arrow_len;
            let mut name_end = name_start;
            while name_end < end && is_ident_char(src[name_end]) {
                name_end += 1;
            }
            let name_span = Span::new(name_start, name_end);
            let property = self.arena.alloc(Expr::Identifier {
                name: name_span,
                span: name_span,
            });
            let span = Span::new(start, name_end);
            let expr = if arrow_len == 3 {
                self.arena.alloc(Expr::NullsafePropertyFetch {
                    target: var,
                    property,
                    span,
                })
            } else {
                self.arena.alloc(Expr::PropertyFetch {
                    target: var,
                    property,
                    span,
                })
            };
            return (expr, name_end);
        }

        (var, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::decode_escape;

    #[test]
    fn decodes_octal_hex_and_unicode_escapes() {
        let mut out = Vec::new();
        assert_eq!(decode_escape(b"\\101", &mut out), 4);
        assert_eq!(decode_escape(b"\\x41", &mut out), 4);
        assert_eq!(decode_escape(b"\\u{263A}", &mut out), 8);
        assert_eq!(out, "AA\u{263A}".as_bytes());
    }

    #[test]
    fn keeps_unknown_escapes_verbatim() {
        let mut out = Vec::new();
        decode_escape(b"\\q", &mut out);
        assert_eq!(out, b"\\q");
    }
}
