//! Block nesting tracker shared by the splitter and the block parsers.

use crate::scanner::{Token, TokenKind};

/// An open construct that is closed by `END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    If,
    /// `delimited` turns true once the condition's `BEGIN`/`DO` was seen.
    While { delimited: bool },
    Begin,
    Case,
}

/// What a token did to the nesting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Opened(Frame),
    /// The `BEGIN`/`DO` ending a WHILE condition.
    Delimited,
    Closed(Frame),
    None,
}

/// Tracks parentheses and `IF`/`WHILE`/`BEGIN`/`CASE` ... `END` nesting.
///
/// IF and WHILE only open a block at statement start, so
/// `DROP TABLE IF EXISTS t` stays flat.
#[derive(Debug, Clone)]
pub(crate) struct Nesting {
    frames: Vec<Frame>,
    parens: usize,
    at_start: bool,
}

impl Nesting {
    pub(crate) fn new() -> Self {
        Self {
            frames: Vec::new(),
            parens: 0,
            at_start: true,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn parens(&self) -> usize {
        self.parens
    }

    pub(crate) fn is_top_level(&self) -> bool {
        self.frames.is_empty() && self.parens == 0
    }

    pub(crate) fn top(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    /// Feed `tokens[i]`. Comments must already be filtered out.
    pub(crate) fn feed(&mut self, src: &str, tokens: &[Token], i: usize) -> Event {
        let tok = tokens[i];
        let at_start = std::mem::replace(&mut self.at_start, false);

        match tok.kind {
            TokenKind::LParen => {
                self.parens += 1;
                Event::None
            }
            TokenKind::RParen => {
                self.parens = self.parens.saturating_sub(1);
                Event::None
            }
            TokenKind::Semicolon => {
                self.at_start = true;
                Event::None
            }
            TokenKind::Word => self.feed_word(src, tokens, i, at_start),
            _ => Event::None,
        }
    }

    fn feed_word(&mut self, src: &str, tokens: &[Token], i: usize, at_start: bool) -> Event {
        let tok = tokens[i];
        let open = |this: &mut Self, frame: Frame| {
            this.frames.push(frame);
            Event::Opened(frame)
        };

        if at_start && tok.is_keyword(src, "IF") {
            return open(self, Frame::If);
        }
        if at_start && tok.is_keyword(src, "WHILE") {
            return open(self, Frame::While { delimited: false });
        }
        if tok.is_any_keyword(src, &["BEGIN", "DO"]) {
            if let Some(Frame::While { delimited }) = self.frames.last_mut() {
                if !*delimited && self.parens == 0 {
                    *delimited = true;
                    self.at_start = true;
                    return Event::Delimited;
                }
            }
            let transaction = tokens
                .get(i + 1)
                .is_some_and(|next| next.is_any_keyword(src, &["TRAN", "TRANSACTION", "DISTRIBUTED"]));
            if at_start && tok.is_keyword(src, "BEGIN") && !transaction {
                self.at_start = true;
                return open(self, Frame::Begin);
            }
            return Event::None;
        }
        if tok.is_keyword(src, "CASE") {
            return open(self, Frame::Case);
        }
        if tok.is_keyword(src, "END") {
            return match self.frames.pop() {
                Some(frame) => Event::Closed(frame),
                None => Event::None,
            };
        }
        if tok.is_any_keyword(src, &["THEN", "ELSE"]) && self.top() != Some(Frame::Case) {
            self.at_start = true;
        }
        Event::None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scanner::significant_tokens;

    fn events(src: &str) -> Vec<Event> {
        let tokens = significant_tokens(src);
        let mut nesting = Nesting::new();
        (0..tokens.len())
            .map(|i| nesting.feed(src, &tokens, i))
            .filter(|e| *e != Event::None)
            .collect()
    }

    #[test]
    fn test_if_only_at_statement_start() {
        assert!(events("DROP TABLE IF EXISTS t").is_empty());
        assert_eq!(
            events("IF @a = 1 THEN SELECT 1 END"),
            vec![Event::Opened(Frame::If), Event::Closed(Frame::If)]
        );
    }

    #[test]
    fn test_while_delimiter_is_not_a_block() {
        assert_eq!(
            events("WHILE @i < 3 BEGIN SET @i = @i + 1 END"),
            vec![
                Event::Opened(Frame::While { delimited: false }),
                Event::Delimited,
                Event::Closed(Frame::While { delimited: true }),
            ]
        );
    }

    #[test]
    fn test_case_and_transaction() {
        assert_eq!(
            events("SELECT CASE WHEN 1 = 1 THEN 'a' END; BEGIN TRANSACTION"),
            vec![Event::Opened(Frame::Case), Event::Closed(Frame::Case)]
        );
    }

    #[test]
    fn test_nested_if_after_then() {
        let src = "IF @a = 1 THEN IF @b = 2 THEN SELECT 1 END END";
        let tokens = significant_tokens(src);
        let mut nesting = Nesting::new();
        let mut max = 0;
        for i in 0..tokens.len() {
            nesting.feed(src, &tokens, i);
            max = max.max(nesting.depth());
        }
        assert_eq!(max, 2);
        assert!(nesting.is_top_level());
    }
}
