use crate::errors::CypherError;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Bare or backtick-quoted identifier. Keywords are bare identifiers.
    Ident { name: String, quoted: bool },
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    DotDot,
    Colon,
    Semicolon,
    Pipe,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    PlusEq,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    RegexMatch,
    Dollar,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// True for an unquoted identifier equal to `word`, ignoring case.
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident { name, quoted: false } if name.eq_ignore_ascii_case(word))
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident { name, .. } => Some(name),
            _ => None,
        }
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, CypherError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(idx, _)| *idx)
            .unwrap_or(self.src.len())
    }

    fn run(mut self) -> Result<Vec<Token>, CypherError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let Some(c) = self.peek() else { break };
            let start = self.offset();
            let kind = match c {
                '\'' | '"' => self.string(c)?,
                '`' => self.quoted_ident()?,
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.ident(),
                _ => self.punct()?,
            };
            tokens.push(Token {
                kind,
                start,
                end: self.offset(),
            });
        }
        Ok(tokens)
    }

    fn skip_trivia(&mut self) -> Result<(), CypherError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.offset();
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(CypherError::syntax("unterminated comment", start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, CypherError> {
        let start = self.offset();
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(CypherError::syntax("unterminated string literal", start));
            };
            self.pos += 1;
            if c == quote {
                return Ok(TokenKind::Str(out));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(escaped) = self.peek() else {
                return Err(CypherError::syntax("unterminated string literal", start));
            };
            self.pos += 1;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                '\\' | '\'' | '"' => out.push(escaped),
                'u' => {
                    let digits: String = (0..4).filter_map(|i| self.peek_at(i)).collect();
                    let code = u32::from_str_radix(&digits, 16)
                        .ok()
                        .filter(|_| digits.len() == 4)
                        .and_then(char::from_u32)
                        .ok_or_else(|| CypherError::syntax("invalid unicode escape", start))?;
                    self.pos += 4;
                    out.push(code);
                }
                other => {
                    return Err(CypherError::syntax(
                        format!("invalid escape sequence \\{other}"),
                        start,
                    ));
                }
            }
        }
    }

    fn quoted_ident(&mut self) -> Result<TokenKind, CypherError> {
        let start = self.offset();
        self.pos += 1;
        let mut name = String::new();
        loop {
            match self.peek() {
                Some('`') if self.peek_at(1) == Some('`') => {
                    name.push('`');
                    self.pos += 2;
                }
                Some('`') => {
                    self.pos += 1;
                    return Ok(TokenKind::Ident { name, quoted: true });
                }
                Some(c) => {
                    name.push(c);
                    self.pos += 1;
                }
                None => return Err(CypherError::syntax("unterminated identifier", start)),
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, CypherError> {
        let start = self.offset();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            float = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                float = true;
                self.pos += 1 + sign;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text = &self.src[start..self.offset()];
        if float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| CypherError::syntax(format!("invalid number `{text}`"), start))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| CypherError::syntax(format!("integer `{text}` out of range"), start))
        }
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.offset();
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        TokenKind::Ident {
            name: self.src[start..self.offset()].to_string(),
            quoted: false,
        }
    }

    fn punct(&mut self) -> Result<TokenKind, CypherError> {
        let start = self.offset();
        let Some(c) = self.peek() else {
            return Err(CypherError::syntax("unexpected end of input", start));
        };
        let next = self.peek_at(1);
        let (kind, width) = match (c, next) {
            ('<', Some('>')) => (TokenKind::Neq, 2),
            ('!', Some('=')) => (TokenKind::Neq, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('=', Some('~')) => (TokenKind::RegexMatch, 2),
            ('+', Some('=')) => (TokenKind::PlusEq, 2),
            ('.', Some('.')) => (TokenKind::DotDot, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('.', _) => (TokenKind::Dot, 1),
            (':', _) => (TokenKind::Colon, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('|', _) => (TokenKind::Pipe, 1),
            ('=', _) => (TokenKind::Eq, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('$', _) => (TokenKind::Dollar, 1),
            (other, _) => {
                return Err(CypherError::syntax(
                    format!("unexpected character `{other}`"),
                    start,
                ));
            }
        };
        self.pos += width;
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn arrows_split_into_punctuation() {
        assert_eq!(
            kinds("<-->"),
            vec![
                TokenKind::Lt,
                TokenKind::Minus,
                TokenKind::Minus,
                TokenKind::Gt
            ]
        );
    }

    #[test]
    fn numbers_and_ranges() {
        assert_eq!(
            kinds("1..3 2.5 1e3"),
            vec![
                TokenKind::Int(1),
                TokenKind::DotDot,
                TokenKind::Int(3),
                TokenKind::Float(2.5),
                TokenKind::Float(1000.0)
            ]
        );
    }

    #[test]
    fn strings_unescape_and_track_offsets() {
        let tokens = tokenize("RETURN 'it\\'s'").expect("tokenize");
        assert_eq!(tokens[1].kind, TokenKind::Str("it's".into()));
        assert_eq!(tokens[1].start, 7);
        assert!(tokens[0].is_keyword("return"));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("// note\n1 /* x */ 2").len(), 2);
    }

    #[test]
    fn unterminated_string_reports_offset() {
        match tokenize("RETURN 'abc") {
            Err(CypherError::Syntax { offset, .. }) => assert_eq!(offset, 7),
            other => panic!("unexpected {other:?}"),
        }
    }
}
