//! Lexical scanner for batch text.
//!
//! Every parser in this crate works on the token stream produced here and
//! slices the original text by token spans, so statement text handed to
//! the storage engine is always the user's own spelling.

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Keyword or bare identifier.
    Word,
    /// `@name`.
    Variable,
    /// `@@name`.
    SystemVariable,
    /// Integer or decimal number.
    Number,
    /// Single-quoted string, optionally `N`-prefixed.
    String,
    /// `[name]` or `"name"`.
    QuotedIdent,
    /// `-- ...` or `/* ... */`.
    Comment,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `.`
    Dot,
    /// Comparison operator: `=`, `<>`, `!=`, `<`, `>`, `<=`, `>=`.
    Comparison,
    /// Any other punctuation or operator character.
    Symbol,
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Start byte offset.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Token {
    /// Source text of the token.
    #[must_use]
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    /// Whether this is the keyword `kw` (case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, src: &str, kw: &str) -> bool {
        self.kind == TokenKind::Word && self.text(src).eq_ignore_ascii_case(kw)
    }

    /// Whether this is one of the given keywords.
    #[must_use]
    pub fn is_any_keyword(&self, src: &str, kws: &[&str]) -> bool {
        kws.iter().any(|kw| self.is_keyword(src, kw))
    }

    /// Whether the token carries meaning (not a comment).
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.kind != TokenKind::Comment
    }
}

/// Tokenize `src`. Whitespace is dropped; comments are kept as tokens.
///
/// Unterminated strings, identifiers and block comments run to the end of
/// the input instead of failing, so callers always get a token stream.
#[must_use]
pub fn tokenize(src: &str) -> Vec<Token> {
    Scanner::new(src).collect()
}

/// Tokenize and drop comments.
#[must_use]
pub fn significant_tokens(src: &str) -> Vec<Token> {
    tokenize(src).into_iter().filter(Token::is_significant).collect()
}

/// Source text covered by a non-empty token run.
pub(crate) fn span<'a>(src: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &src[first.start..last.end],
        _ => "",
    }
}

/// Drop trailing `;` tokens.
pub(crate) fn trim_semicolons(tokens: &[Token]) -> &[Token] {
    let end = tokens
        .iter()
        .rposition(|t| t.kind != TokenKind::Semicolon)
        .map_or(0, |i| i + 1);
    &tokens[..end]
}

/// Split a token run at commas outside parentheses.
pub(crate) fn split_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn text_from(&self, start: usize) -> &str {
        &self.src[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.src[self.pos..].chars().next() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.src[self.pos..].chars().next() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Consume a single-quoted string starting at the opening quote.
    /// Doubled quotes and backslash-escaped quotes do not terminate it.
    fn string(&mut self) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' if self.peek(1) == Some(b'\'') => self.pos += 2,
                b'\'' if self.peek(1) == Some(b'\'') => self.pos += 2,
                b'\'' => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn delimited(&mut self, close: u8) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            self.pos += 1;
            if b == close {
                if self.peek(0) == Some(close) {
                    self.pos += 1;
                } else {
                    return;
                }
            }
        }
    }

    fn block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '#'
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let start = self.pos;
        let b = self.peek(0)?;

        let kind = match b {
            b'-' if self.peek(1) == Some(b'-') => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            b'/' if self.peek(1) == Some(b'*') => {
                self.block_comment();
                TokenKind::Comment
            }
            b'\'' => {
                self.string();
                TokenKind::String
            }
            b'N' | b'n' if self.peek(1) == Some(b'\'') => {
                self.pos += 1;
                self.string();
                TokenKind::String
            }
            b'[' => {
                self.delimited(b']');
                TokenKind::QuotedIdent
            }
            b'"' => {
                self.delimited(b'"');
                TokenKind::QuotedIdent
            }
            b'@' if self.peek(1) == Some(b'@') => {
                self.pos += 2;
                self.take_while(is_ident_char);
                TokenKind::SystemVariable
            }
            b'@' => {
                self.pos += 1;
                self.take_while(is_ident_char);
                TokenKind::Variable
            }
            b'0'..=b'9' => {
                self.take_while(|c| c.is_ascii_digit() || c == '.');
                if matches!(self.peek(0), Some(b'e' | b'E'))
                    && self.peek(1).is_some_and(|d| d.is_ascii_digit() || d == b'-' || d == b'+')
                {
                    self.pos += 2;
                    self.take_while(|c| c.is_ascii_digit());
                }
                TokenKind::Number
            }
            b'.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => {
                self.pos += 1;
                self.take_while(|c| c.is_ascii_digit());
                TokenKind::Number
            }
            b';' => {
                self.pos += 1;
                TokenKind::Semicolon
            }
            b',' => {
                self.pos += 1;
                TokenKind::Comma
            }
            b'(' => {
                self.pos += 1;
                TokenKind::LParen
            }
            b')' => {
                self.pos += 1;
                TokenKind::RParen
            }
            b'.' => {
                self.pos += 1;
                TokenKind::Dot
            }
            b'<' | b'>' | b'=' | b'!' => {
                self.pos += 1;
                match (b, self.peek(0)) {
                    (b'<', Some(b'=' | b'>')) | (b'>' | b'!', Some(b'=')) => self.pos += 1,
                    _ => {}
                }
                if self.text_from(start) == "!" {
                    TokenKind::Symbol
                } else {
                    TokenKind::Comparison
                }
            }
            _ => {
                let c = self.src[self.pos..].chars().next()?;
                if is_ident_char(c) {
                    self.take_while(is_ident_char);
                    TokenKind::Word
                } else {
                    self.pos += c.len_utf8();
                    TokenKind::Symbol
                }
            }
        };

        Some(Token {
            kind,
            start,
            end: self.pos,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, &str)> {
        tokenize(src).iter().map(|t| (t.kind, t.text(src))).collect()
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            kinds("SELECT @id, 'a;b' FROM t;"),
            vec![
                (TokenKind::Word, "SELECT"),
                (TokenKind::Variable, "@id"),
                (TokenKind::Comma, ","),
                (TokenKind::String, "'a;b'"),
                (TokenKind::Word, "FROM"),
                (TokenKind::Word, "t"),
                (TokenKind::Semicolon, ";"),
            ]
        );
    }

    #[test]
    fn test_split_commas_respects_parens() {
        let src = "@a DECIMAL(10, 2), @b INT";
        let tokens = significant_tokens(src);
        let parts: Vec<_> = split_commas(&tokens).iter().map(|p| span(src, p)).collect();
        assert_eq!(parts, vec!["@a DECIMAL(10, 2)", "@b INT"]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds("'it''s' 'a\\'b' N'x'"),
            vec![
                (TokenKind::String, "'it''s'"),
                (TokenKind::String, "'a\\'b'"),
                (TokenKind::String, "N'x'"),
            ]
        );
    }

    #[test]
    fn test_comparisons() {
        let ops: Vec<_> = kinds("a>=b<=c<>d!=e=f<g>h")
            .into_iter()
            .filter(|(k, _)| *k == TokenKind::Comparison)
            .map(|(_, t)| t)
            .collect();
        assert_eq!(ops, vec![">=", "<=", "<>", "!=", "=", "<", ">"]);
    }

    #[test]
    fn test_comments_and_identifiers() {
        assert_eq!(
            kinds("-- x; y\n[my table] /* ; */ \"c\" @@ROWCOUNT"),
            vec![
                (TokenKind::Comment, "-- x; y"),
                (TokenKind::QuotedIdent, "[my table]"),
                (TokenKind::Comment, "/* ; */"),
                (TokenKind::QuotedIdent, "\"c\""),
                (TokenKind::SystemVariable, "@@ROWCOUNT"),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 .5 1e10 x1"),
            vec![
                (TokenKind::Number, "1"),
                (TokenKind::Number, "2.5"),
                (TokenKind::Number, ".5"),
                (TokenKind::Number, "1e10"),
                (TokenKind::Word, "x1"),
            ]
        );
    }

    #[test]
    fn test_unterminated_input_does_not_fail() {
        assert_eq!(kinds("'abc"), vec![(TokenKind::String, "'abc")]);
        assert_eq!(kinds("/* abc"), vec![(TokenKind::Comment, "/* abc")]);
    }

    #[test]
    fn test_unicode_words() {
        assert_eq!(
            kinds("SELECT naïve"),
            vec![(TokenKind::Word, "SELECT"), (TokenKind::Word, "naïve")]
        );
    }
}
