pub mod token;

use crate::parser::span::Span;
use memchr::{memchr, memchr2};
use token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq)]
enum LexerState {
    /// Outside of `<?php ... ?>`, everything is inline HTML.
    Initial,
    Scripting,
}

fn keyword_lookup(text: &[u8]) -> TokenKind {
    let lower = text.to_ascii_lowercase();
    match lower.as_slice() {
        b"or" => TokenKind::LogicalOr,
        b"and" => TokenKind::LogicalAnd,
        b"xor" => TokenKind::LogicalXor,
        b"exit" | b"die" => TokenKind::Exit,
        b"function" => TokenKind::Function,
        b"fn" => TokenKind::Fn,
        b"const" => TokenKind::Const,
        b"return" => TokenKind::Return,
        b"yield" => TokenKind::Yield,
        b"try" => TokenKind::Try,
        b"catch" => TokenKind::Catch,
        b"finally" => TokenKind::Finally,
        b"throw" => TokenKind::Throw,
        b"if" => TokenKind::If,
        b"elseif" => TokenKind::ElseIf,
        b"endif" => TokenKind::EndIf,
        b"else" => TokenKind::Else,
        b"insteadof" => TokenKind::Insteadof,
        b"while" => TokenKind::While,
        b"endwhile" => TokenKind::EndWhile,
        b"do" => TokenKind::Do,
        b"for" => TokenKind::For,
        b"endfor" => TokenKind::EndFor,
        b"foreach" => TokenKind::Foreach,
        b"endforeach" => TokenKind::EndForeach,
        b"declare" => TokenKind::Declare,
        b"instanceof" => TokenKind::InstanceOf,
        b"as" => TokenKind::As,
        b"switch" => TokenKind::Switch,
        b"endswitch" => TokenKind::EndSwitch,
        b"case" => TokenKind::Case,
        b"default" => TokenKind::Default,
        b"break" => TokenKind::Break,
        b"continue" => TokenKind::Continue,
        b"echo" => TokenKind::Echo,
        b"print" => TokenKind::Print,
        b"class" => TokenKind::Class,
        b"interface" => TokenKind::Interface,
        b"trait" => TokenKind::Trait,
        b"extends" => TokenKind::Extends,
        b"implements" => TokenKind::Implements,
        b"new" => TokenKind::New,
        b"clone" => TokenKind::Clone,
        b"var" | b"public" => TokenKind::Public,
        b"protected" => TokenKind::Protected,
        b"private" => TokenKind::Private,
        b"final" => TokenKind::Final,
        b"abstract" => TokenKind::Abstract,
        b"static" => TokenKind::Static,
        b"readonly" => TokenKind::Readonly,
        b"namespace" => TokenKind::Namespace,
        b"use" => TokenKind::Use,
        b"global" => TokenKind::Global,
        b"isset" => TokenKind::Isset,
        b"empty" => TokenKind::Empty,
        b"unset" => TokenKind::Unset,
        b"list" => TokenKind::List,
        b"array" => TokenKind::Array,
        b"match" => TokenKind::Match,
        b"__class__" => TokenKind::ClassC,
        b"__trait__" => TokenKind::TraitC,
        b"__function__" => TokenKind::FuncC,
        b"__method__" => TokenKind::MethodC,
        b"__line__" => TokenKind::Line,
        b"__file__" => TokenKind::File,
        b"__dir__" => TokenKind::Dir,
        b"__namespace__" => TokenKind::NsC,
        b"__property__" => TokenKind::PropertyC,
        _ => TokenKind::Identifier,
    }
}

fn cast_lookup(text: &[u8]) -> Option<TokenKind> {
    let lower = text.to_ascii_lowercase();
    Some(match lower.as_slice() {
        b"int" | b"integer" => TokenKind::IntCast,
        b"float" | b"double" | b"real" => TokenKind::FloatCast,
        b"string" | b"binary" => TokenKind::StringCast,
        b"array" => TokenKind::ArrayCast,
        b"object" => TokenKind::ObjectCast,
        b"bool" | b"boolean" => TokenKind::BoolCast,
        b"unset" => TokenKind::UnsetCast,
        _ => return None,
    })
}

pub(crate) fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

pub(crate) fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Splits PHP source into tokens. String literals and heredocs are
/// returned whole; the parser breaks interpolated strings into parts.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    input: &'src [u8],
    cursor: usize,
    state: LexerState,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src [u8]) -> Self {
        let mut cursor = 0;
        if input.starts_with(b"#!") {
            cursor = memchr(b'\n', input).map(|pos| pos + 1).unwrap_or(input.len());
        }
        Self {
            input,
            cursor,
            state: LexerState::Initial,
        }
    }

    /// A lexer that starts inside PHP code at `offset`, used to re-enter
    /// expressions embedded in interpolated strings.
    pub fn scripting_at(input: &'src [u8], offset: usize) -> Self {
        Self {
            input,
            cursor: offset,
            state: LexerState::Scripting,
        }
    }

    pub fn source(&self) -> &'src [u8] {
        self.input
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.cursor).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.input.get(self.cursor + n).copied()
    }

    fn rest(&self) -> &'src [u8] {
        &self.input[self.cursor.min(self.input.len())..]
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: Span::new(start, self.cursor),
        }
    }

    fn lex_inline_html(&mut self) -> Option<Token> {
        let start = self.cursor;
        if start >= self.input.len() {
            return None;
        }
        let mut pos = start;
        loop {
            match memchr(b'<', &self.input[pos..]) {
                Some(off) => {
                    let at = pos + off;
                    let tail = &self.input[at..];
                    if tail.len() >= 5 && tail[..5].eq_ignore_ascii_case(b"<?php") {
                        if at > start {
                            self.cursor = at;
                            return Some(self.token(TokenKind::InlineHtml, start));
                        }
                        self.cursor = at + 5;
                        if matches!(self.peek(), Some(b'\n') | Some(b' ') | Some(b'\t')) {
                            self.cursor += 1;
                        } else if self.peek() == Some(b'\r') {
                            self.cursor += 1;
                            if self.peek() == Some(b'\n') {
                                self.cursor += 1;
                            }
                        }
                        self.state = LexerState::Scripting;
                        return Some(self.token(TokenKind::OpenTag, start));
                    }
                    if tail.starts_with(b"<?=") {
                        if at > start {
                            self.cursor = at;
                            return Some(self.token(TokenKind::InlineHtml, start));
                        }
                        self.cursor = at + 3;
                        self.state = LexerState::Scripting;
                        return Some(self.token(TokenKind::OpenTagEcho, start));
                    }
                    pos = at + 1;
                }
                None => {
                    self.cursor = self.input.len();
                    return Some(self.token(TokenKind::InlineHtml, start));
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.cursor += 1;
            } else {
                break;
            }
        }
    }

    fn consume_line_comment(&mut self, start: usize) -> Token {
        loop {
            let rest = self.rest();
            match memchr2(b'\n', b'?', rest) {
                Some(off) if rest[off] == b'?' => {
                    if rest.get(off + 1) == Some(&b'>') {
                        self.cursor += off;
                        break;
                    }
                    self.cursor += off + 1;
                }
                Some(off) => {
                    self.cursor += off;
                    break;
                }
                None => {
                    self.cursor = self.input.len();
                    break;
                }
            }
        }
        self.token(TokenKind::Comment, start)
    }

    fn consume_block_comment(&mut self, start: usize) -> Token {
        let is_doc = self.rest().starts_with(b"/**") && self.peek_at(3) != Some(b'/');
        self.cursor += 2;
        loop {
            match memchr(b'*', self.rest()) {
                Some(off) => {
                    self.cursor += off + 1;
                    if self.peek() == Some(b'/') {
                        self.cursor += 1;
                        break;
                    }
                }
                None => {
                    self.cursor = self.input.len();
                    break;
                }
            }
        }
        let kind = if is_doc {
            TokenKind::DocComment
        } else {
            TokenKind::Comment
        };
        self.token(kind, start)
    }

    fn consume_attribute(&mut self, start: usize) -> Token {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            self.cursor += 1;
            match b {
                b'[' => depth += 1,
                b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                b'\'' | b'"' => self.skip_quoted(b),
                _ => {}
            }
        }
        self.token(TokenKind::Comment, start)
    }

    /// Skips a quoted string whose opening quote was already consumed.
    fn skip_quoted(&mut self, quote: u8) {
        while let Some(b) = self.peek() {
            self.cursor += 1;
            if b == b'\\' {
                self.cursor += 1;
            } else if b == quote {
                return;
            }
        }
    }

    fn consume_number(&mut self, start: usize) -> Token {
        let rest = self.rest();
        if rest.len() > 1 && rest[0] == b'0' && matches!(rest[1], b'x' | b'X' | b'b' | b'B' | b'o' | b'O') {
            self.cursor += 2;
            while let Some(b) = self.peek() {
                if b.is_ascii_hexdigit() || b == b'_' {
                    self.cursor += 1;
                } else {
                    break;
                }
            }
            return self.token(TokenKind::LNumber, start);
        }

        let mut is_float = false;
        self.consume_digits();
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.cursor += 1;
            self.consume_digits();
        } else if self.peek() == Some(b'.') && self.input[start] != b'.' {
            // "1." is a valid float literal, but "1.." is not concatenation material
            if !matches!(self.peek_at(1), Some(b'.')) && !self.peek_at(1).is_some_and(is_ident_start) {
                is_float = true;
                self.cursor += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let sign = matches!(self.peek_at(1), Some(b'+') | Some(b'-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                self.cursor += digit_at;
                self.consume_digits();
            }
        }
        let kind = if is_float {
            TokenKind::DNumber
        } else {
            TokenKind::LNumber
        };
        self.token(kind, start)
    }

    fn consume_digits(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || (b == b'_' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
                self.cursor += 1;
            } else {
                break;
            }
        }
    }

    fn consume_identifier(&mut self) {
        while let Some(b) = self.peek() {
            if is_ident_char(b) {
                self.cursor += 1;
            } else {
                break;
            }
        }
    }

    fn consume_double_quoted(&mut self, start: usize) -> Token {
        self.cursor += 1;
        while let Some(b) = self.peek() {
            match b {
                b'\\' => self.cursor += 2,
                b'"' => {
                    self.cursor += 1;
                    return self.token(TokenKind::DoubleQuotedString, start);
                }
                b'{' if self.peek_at(1) == Some(b'$') => self.skip_embedded_braces(),
                _ => self.cursor += 1,
            }
        }
        self.cursor = self.input.len();
        self.token(TokenKind::Error, start)
    }

    /// Skips `{$ ... }` inside a string, honouring nested braces and quotes.
    fn skip_embedded_braces(&mut self) {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            self.cursor += 1;
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                b'\'' | b'"' => self.skip_quoted(b),
                _ => {}
            }
        }
    }

    fn consume_heredoc(&mut self, start: usize) -> Token {
        self.cursor += 3;
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.cursor += 1;
        }
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => {
                self.cursor += 1;
                Some(q)
            }
            _ => None,
        };
        let label_start = self.cursor;
        self.consume_identifier();
        let label = &self.input[label_start..self.cursor];
        if label.is_empty() {
            return self.token(TokenKind::Error, start);
        }
        if quote.is_some() {
            self.cursor += 1;
        }
        let kind = if quote == Some(b'\'') {
            TokenKind::Nowdoc
        } else {
            TokenKind::Heredoc
        };

        // Scan line by line for the closing label.
        let mut line_start = match memchr(b'\n', self.rest()) {
            Some(off) => self.cursor + off + 1,
            None => {
                self.cursor = self.input.len();
                return self.token(TokenKind::Error, start);
            }
        };
        loop {
            let mut p = line_start;
            while p < self.input.len() && matches!(self.input[p], b' ' | b'\t') {
                p += 1;
            }
            if self.input[p..].starts_with(label)
                && !self.input.get(p + label.len()).is_some_and(|b| is_ident_char(*b))
            {
                self.cursor = p + label.len();
                return self.token(kind, start);
            }
            match memchr(b'\n', &self.input[line_start..]) {
                Some(off) => line_start += off + 1,
                None => {
                    self.cursor = self.input.len();
                    return self.token(TokenKind::Error, start);
                }
            }
        }
    }

    fn try_cast(&mut self, start: usize) -> Option<Token> {
        let mut p = self.cursor + 1;
        while p < self.input.len() && matches!(self.input[p], b' ' | b'\t') {
            p += 1;
        }
        let word_start = p;
        while p < self.input.len() && self.input[p].is_ascii_alphabetic() {
            p += 1;
        }
        let word = &self.input[word_start..p];
        while p < self.input.len() && matches!(self.input[p], b' ' | b'\t') {
            p += 1;
        }
        if self.input.get(p) != Some(&b')') {
            return None;
        }
        let kind = cast_lookup(word)?;
        self.cursor = p + 1;
        Some(self.token(kind, start))
    }

    fn lex_scripting(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let start = self.cursor;
        let b = self.peek()?;

        let three = |s: &Self, pat: &[u8]| s.rest().starts_with(pat);

        let kind = match b {
            b'$' => {
                if self.peek_at(1).is_some_and(is_ident_start) {
                    self.cursor += 1;
                    self.consume_identifier();
                    TokenKind::Variable
                } else {
                    self.cursor += 1;
                    TokenKind::Dollar
                }
            }
            b'0'..=b'9' => return Some(self.consume_number(start)),
            b'.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                return Some(self.consume_number(start));
            }
            b'\\' if self.peek_at(1).is_some_and(is_ident_start) => {
                self.cursor += 1;
                self.consume_qualified();
                TokenKind::QualifiedName
            }
            c if is_ident_start(c) => {
                self.consume_identifier();
                if self.peek() == Some(b'\\') && self.peek_at(1).is_some_and(is_ident_start) {
                    self.consume_qualified();
                    TokenKind::QualifiedName
                } else {
                    let kind = keyword_lookup(&self.input[start..self.cursor]);
                    if kind == TokenKind::Yield {
                        let mut p = self.cursor;
                        while p < self.input.len() && self.input[p].is_ascii_whitespace() {
                            p += 1;
                        }
                        let tail = &self.input[p..];
                        if tail.len() >= 4
                            && tail[..4].eq_ignore_ascii_case(b"from")
                            && !tail.get(4).is_some_and(|b| is_ident_char(*b))
                        {
                            self.cursor = p + 4;
                            return Some(self.token(TokenKind::YieldFrom, start));
                        }
                    }
                    kind
                }
            }
            b'\'' => {
                self.cursor += 1;
                self.skip_quoted(b'\'');
                TokenKind::ConstantString
            }
            b'"' => return Some(self.consume_double_quoted(start)),
            b'#' if self.peek_at(1) == Some(b'[') => return Some(self.consume_attribute(start)),
            b'#' => return Some(self.consume_line_comment(start)),
            b'/' if self.peek_at(1) == Some(b'/') => return Some(self.consume_line_comment(start)),
            b'/' if self.peek_at(1) == Some(b'*') => return Some(self.consume_block_comment(start)),
            b'<' if three(self, b"<<<") => return Some(self.consume_heredoc(start)),
            b'?' if self.peek_at(1) == Some(b'>') => {
                self.cursor += 2;
                if self.peek() == Some(b'\n') {
                    self.cursor += 1;
                } else if self.rest().starts_with(b"\r\n") {
                    self.cursor += 2;
                }
                self.state = LexerState::Initial;
                TokenKind::CloseTag
            }
            b'(' => {
                if let Some(tok) = self.try_cast(start) {
                    return Some(tok);
                }
                self.cursor += 1;
                TokenKind::OpenParen
            }
            _ => {
                let (kind, len) = self.operator();
                self.cursor += len;
                kind
            }
        };
        Some(self.token(kind, start))
    }

    fn consume_qualified(&mut self) {
        loop {
            self.consume_identifier();
            if self.peek() == Some(b'\\') && self.peek_at(1).is_some_and(is_ident_start) {
                self.cursor += 1;
            } else {
                break;
            }
        }
    }

    fn operator(&self) -> (TokenKind, usize) {
        let rest = self.rest();
        const TABLE: &[(&[u8], TokenKind)] = &[
            (b"<=>", TokenKind::Spaceship),
            (b"===", TokenKind::EqEqEq),
            (b"!==", TokenKind::BangEqEq),
            (b"**=", TokenKind::PowEq),
            (b"??=", TokenKind::CoalesceEq),
            (b"<<=", TokenKind::SlEq),
            (b">>=", TokenKind::SrEq),
            (b"?->", TokenKind::NullSafeArrow),
            (b"...", TokenKind::Ellipsis),
            (b"->", TokenKind::Arrow),
            (b"=>", TokenKind::DoubleArrow),
            (b"::", TokenKind::DoubleColon),
            (b"++", TokenKind::Inc),
            (b"--", TokenKind::Dec),
            (b"**", TokenKind::Pow),
            (b"+=", TokenKind::PlusEq),
            (b"-=", TokenKind::MinusEq),
            (b"*=", TokenKind::MulEq),
            (b"/=", TokenKind::DivEq),
            (b"%=", TokenKind::ModEq),
            (b".=", TokenKind::ConcatEq),
            (b"&=", TokenKind::AndEq),
            (b"|=", TokenKind::OrEq),
            (b"^=", TokenKind::XorEq),
            (b"==", TokenKind::EqEq),
            (b"!=", TokenKind::BangEq),
            (b"<>", TokenKind::BangEq),
            (b"<=", TokenKind::LtEq),
            (b">=", TokenKind::GtEq),
            (b"<<", TokenKind::Sl),
            (b">>", TokenKind::Sr),
            (b"&&", TokenKind::AmpersandAmpersand),
            (b"||", TokenKind::PipePipe),
            (b"??", TokenKind::Coalesce),
            (b"+", TokenKind::Plus),
            (b"-", TokenKind::Minus),
            (b"*", TokenKind::Asterisk),
            (b"/", TokenKind::Slash),
            (b"%", TokenKind::Percent),
            (b".", TokenKind::Dot),
            (b"=", TokenKind::Eq),
            (b"!", TokenKind::Bang),
            (b"<", TokenKind::Lt),
            (b">", TokenKind::Gt),
            (b"&", TokenKind::Ampersand),
            (b"|", TokenKind::Pipe),
            (b"^", TokenKind::Caret),
            (b"~", TokenKind::BitNot),
            (b"?", TokenKind::Question),
            (b"@", TokenKind::At),
            (b";", TokenKind::SemiColon),
            (b":", TokenKind::Colon),
            (b",", TokenKind::Comma),
            (b"{", TokenKind::OpenBrace),
            (b"}", TokenKind::CloseBrace),
            (b")", TokenKind::CloseParen),
            (b"[", TokenKind::OpenBracket),
            (b"]", TokenKind::CloseBracket),
        ];
        for (pat, kind) in TABLE {
            if rest.starts_with(pat) {
                return (*kind, pat.len());
            }
        }
        (TokenKind::Error, 1)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.cursor >= self.input.len() {
            return None;
        }
        match self.state {
            LexerState::Initial => self.lex_inline_html(),
            LexerState::Scripting => self.lex_scripting(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src.as_bytes())
            .filter(|t| t.kind != TokenKind::Comment)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_open_tag_and_variables() {
        assert_eq!(
            kinds("<?php $a = 1;"),
            vec![
                TokenKind::OpenTag,
                TokenKind::Variable,
                TokenKind::Eq,
                TokenKind::LNumber,
                TokenKind::SemiColon
            ]
        );
    }

    #[test]
    fn lexes_casts_and_yield_from() {
        assert_eq!(
            kinds("<?php (int) $x; yield  from $g;"),
            vec![
                TokenKind::OpenTag,
                TokenKind::IntCast,
                TokenKind::Variable,
                TokenKind::SemiColon,
                TokenKind::YieldFrom,
                TokenKind::Variable,
                TokenKind::SemiColon
            ]
        );
    }

    #[test]
    fn double_quoted_string_with_embedded_quotes_is_one_token() {
        let src = br#"<?php "a {$x["k"]} b";"#;
        let toks: Vec<_> = Lexer::new(src).collect();
        assert_eq!(toks[1].kind, TokenKind::DoubleQuotedString);
        assert_eq!(toks[2].kind, TokenKind::SemiColon);
    }

    #[test]
    fn heredoc_spans_to_closing_label() {
        let src = b"<?php $s = <<<EOT\n  hello\n  EOT;\n";
        let toks: Vec<_> = Lexer::new(src).collect();
        assert_eq!(toks[3].kind, TokenKind::Heredoc);
        assert_eq!(toks[4].kind, TokenKind::SemiColon);
    }

    #[test]
    fn inline_html_around_tags() {
        assert_eq!(
            kinds("hi <?php echo 1; ?>bye"),
            vec![
                TokenKind::InlineHtml,
                TokenKind::OpenTag,
                TokenKind::Echo,
                TokenKind::LNumber,
                TokenKind::SemiColon,
                TokenKind::CloseTag,
                TokenKind::InlineHtml
            ]
        );
    }
}
