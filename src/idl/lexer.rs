//! Tokenizer for Avro IDL

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier, possibly dotted (`com.x.Order`). Back-quoted identifiers
    /// are never treated as keywords.
    Ident { text: String, quoted: bool },
    /// `@name`, the start of an annotation
    At(String),
    Str(String),
    /// Raw numeric literal, parsed as JSON when needed
    Number(String),
    Punct(char),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident { text, .. } => write!(f, "identifier '{}'", text),
            TokenKind::At(name) => write!(f, "annotation '@{}'", name),
            TokenKind::Str(s) => write!(f, "string \"{}\"", s),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Punct(c) => write!(f, "'{}'", c),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// Doc comment immediately preceding this token
    pub doc: Option<String>,
}

/// Lexing failure with position
#[derive(Debug)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    pending_doc: Option<String>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            pending_doc: None,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> LexError {
        LexError {
            line,
            column,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                    doc: self.pending_doc.take(),
                });
                return Ok(tokens);
            };

            let kind = match c {
                '"' => TokenKind::Str(self.string(line, column)?),
                '`' => {
                    self.bump();
                    let mut text = String::new();
                    loop {
                        match self.bump() {
                            Some('`') => break,
                            Some(ch) => text.push(ch),
                            None => return Err(self.error(line, column, "unterminated back-quoted identifier")),
                        }
                    }
                    TokenKind::Ident { text, quoted: true }
                }
                '@' => {
                    self.bump();
                    let mut name = String::new();
                    while let Some(ch) = self.peek() {
                        if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                            name.push(ch);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(self.error(line, column, "expected annotation name after '@'"));
                    }
                    TokenKind::At(name)
                }
                c if c.is_ascii_digit() || c == '-' => TokenKind::Number(self.number()),
                c if c.is_alphabetic() || c == '_' => TokenKind::Ident {
                    text: self.ident(),
                    quoted: false,
                },
                '{' | '}' | '(' | ')' | '[' | ']' | '<' | '>' | ',' | ';' | '=' | ':' | '?' => {
                    self.bump();
                    TokenKind::Punct(c)
                }
                other => return Err(self.error(line, column, format!("unexpected character '{}'", other))),
            };

            tokens.push(Token {
                kind,
                line,
                column,
                doc: self.pending_doc.take(),
            });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let (line, column) = (self.line, self.column);
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.next() {
                        Some('/') => {
                            while let Some(c) = self.bump() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            self.bump();
                            self.bump();
                            let mut body = String::new();
                            loop {
                                match self.bump() {
                                    Some('*') if self.peek() == Some('/') => {
                                        self.bump();
                                        break;
                                    }
                                    Some(c) => body.push(c),
                                    None => return Err(self.error(line, column, "unterminated comment")),
                                }
                            }
                            // "/**/" is an empty plain comment, not a doc comment
                            if let Some(doc) = body.strip_prefix('*') {
                                self.pending_doc = Some(clean_doc(doc));
                            }
                        }
                        _ => return Err(self.error(line, column, "unexpected character '/'")),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, line: usize, column: usize) -> Result<String, LexError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('u') => {
                            let mut hex = String::with_capacity(4);
                            for _ in 0..4 {
                                match self.bump() {
                                    Some(h) => hex.push(h),
                                    None => return Err(self.error(line, column, "unterminated string")),
                                }
                            }
                            u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| self.error(line, column, format!("invalid escape \\u{}", hex)))?
                        }
                        Some(other) => other,
                        None => return Err(self.error(line, column, "unterminated string")),
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
                None => return Err(self.error(line, column, "unterminated string")),
            }
        }
    }

    fn number(&mut self) -> String {
        let mut raw = String::new();
        if self.peek() == Some('-') {
            raw.push('-');
            self.bump();
        }
        while let Some(c) = self.peek() {
            let sign_after_exponent = matches!(c, '+' | '-') && raw.ends_with(['e', 'E']);
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E') || sign_after_exponent {
                raw.push(c);
                self.bump();
            } else {
                break;
            }
        }
        raw
    }

    fn ident(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else if c == '.' {
                // only part of the name when another identifier follows
                let mut lookahead = self.chars.clone();
                lookahead.next();
                match lookahead.next() {
                    Some(n) if n.is_alphabetic() || n == '_' => {
                        text.push('.');
                        self.bump();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        text
    }
}

/// Strip comment decoration: leading `*` on each line and surrounding blanks
fn clean_doc(body: &str) -> String {
    body.lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed.strip_prefix('*').map(str::trim_start).unwrap_or(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_dotted_identifiers_and_punctuation() {
        assert_eq!(
            kinds("com.x.Order? id;"),
            vec![
                TokenKind::Ident { text: "com.x.Order".into(), quoted: false },
                TokenKind::Punct('?'),
                TokenKind::Ident { text: "id".into(), quoted: false },
                TokenKind::Punct(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_doc_comment_attaches_to_next_token() {
        let tokens = tokenize("// plain\n/** The order\n  * id */ int id;").unwrap();
        assert_eq!(tokens[0].doc.as_deref(), Some("The order\nid"));
        assert_eq!(tokens[0].line, 3);
        assert!(tokens[1].doc.is_none());
    }

    #[test]
    fn test_annotations_strings_and_numbers() {
        assert_eq!(
            kinds(r#"@java-class("a\"b") -1.5e+3 `error`"#),
            vec![
                TokenKind::At("java-class".into()),
                TokenKind::Punct('('),
                TokenKind::Str("a\"b".into()),
                TokenKind::Punct(')'),
                TokenKind::Number("-1.5e+3".into()),
                TokenKind::Ident { text: "error".into(), quoted: true },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_comment_reports_position() {
        let err = tokenize("int x;\n  /* never closed").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
        assert_eq!(err.message, "unterminated comment");
    }
}
