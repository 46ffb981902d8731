//! Tokenizer for inline expressions.
//!
//! Recognised forms:
//! - literals: `"text"`, `'text'`, `42`, `-1.5`, `true`, `false`, `null`
//! - references: `#name`, `#name(args)`, `Owner#name(args)`
//! - generators: `::name(args)`, `Owner::name(args)`
//! - operators: `->`, `AND`, `OR`, `==`, `!=`, `>`, `>=`, `<`, `<=`, `;`
//! - keywords: `IF`, `DO`, `ELSE` (case-insensitive)

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Value;
use crate::error::{LexError, LexErrorReason};

/// Start of a member reference.
pub const REFERENCE_START: &str = "#";
/// Start of a generator reference.
pub const GENERATOR_START: &str = "::";

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `;` evaluate both sides, keep the right result
    Sequence,
    /// `OR`
    Or,
    /// `AND`
    And,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `->` pipe the left result into the right reference
    Chain,
}

impl Operator {
    /// Binding strength; always greater than zero.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Sequence => 1,
            Operator::Or => 4,
            Operator::And => 5,
            Operator::Greater
            | Operator::GreaterOrEqual
            | Operator::Less
            | Operator::LessOrEqual => 6,
            Operator::Equals | Operator::NotEquals => 7,
            Operator::Chain => 11,
        }
    }

    /// Source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Sequence => ";",
            Operator::Or => "OR",
            Operator::And => "AND",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Chain => "->",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Reserved words of the conditional construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyword {
    /// `IF`
    If,
    /// `DO`
    Do,
    /// `ELSE`
    Else,
}

/// Grouping punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Punctuation {
    /// `(`
    Open,
    /// `)`
    Close,
}

/// Payload shared by reference and generator tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceToken {
    /// Static owner (`Owner#name`); `None` means the active handler.
    pub owner: Option<String>,
    /// Member name.
    pub name: String,
    /// Argument list; `None` when written without parentheses.
    pub args: Option<Vec<Token>>,
}

impl ReferenceToken {
    /// Spelling used in diagnostics.
    pub fn display_name(&self, generator: bool) -> String {
        let sep = if generator { GENERATOR_START } else { REFERENCE_START };
        match &self.owner {
            Some(owner) => format!("{}{}{}", owner, sep, self.name),
            None => format!("{}{}", sep, self.name),
        }
    }
}

/// Token classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Raw literal value.
    Literal(Value),
    /// Member reference.
    Reference(ReferenceToken),
    /// Generator reference.
    Generator(ReferenceToken),
    /// Binary operator.
    Operator(Operator),
    /// Parenthesis.
    Punctuation(Punctuation),
    /// IF/DO/ELSE.
    Keyword(Keyword),
}

/// Classified lexical unit with its byte position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Classification and payload.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub position: usize,
}

/// Split a raw expression into tokens.
pub fn tokenize(raw: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(raw);
    let mut tokens = Vec::new();
    loop {
        lexer.skip_ws();
        if lexer.eof() {
            break;
        }
        tokens.push(lexer.read_token()?);
    }
    Ok(tokens)
}

type LexResult<T> = std::result::Result<T, LexError>;

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn starts_with(&self, text: &str) -> bool {
        self.src[self.index..].starts_with(text)
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_token(&mut self) -> LexResult<Token> {
        let start = self.index;
        let ch = self
            .current()
            .ok_or_else(|| self.error(LexErrorReason::UnknownSymbol('\0')))?;

        let kind = match ch {
            b'#' => TokenKind::Reference(self.read_reference(None, start)?),
            b':' if self.peek_char() == Some(b':') => {
                TokenKind::Generator(self.read_generator(None, start)?)
            }
            b'"' | b'\'' => TokenKind::Literal(self.read_string()?),
            b'0'..=b'9' => TokenKind::Literal(self.read_number()?),
            b'-' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => {
                TokenKind::Literal(self.read_number()?)
            }
            b'(' => {
                self.advance();
                TokenKind::Punctuation(Punctuation::Open)
            }
            b')' => {
                self.advance();
                TokenKind::Punctuation(Punctuation::Close)
            }
            c if is_word_start(c) => self.read_word(start)?,
            _ => TokenKind::Operator(self.read_operator()?),
        };

        Ok(Token {
            kind,
            position: start,
        })
    }

    fn read_operator(&mut self) -> LexResult<Operator> {
        // Two-character spellings first so `>=` is not read as `>`.
        const SYMBOLS: [(&str, Operator); 8] = [
            ("->", Operator::Chain),
            ("==", Operator::Equals),
            ("!=", Operator::NotEquals),
            (">=", Operator::GreaterOrEqual),
            ("<=", Operator::LessOrEqual),
            (">", Operator::Greater),
            ("<", Operator::Less),
            (";", Operator::Sequence),
        ];
        for (symbol, op) in SYMBOLS {
            if self.starts_with(symbol) {
                self.index += symbol.len();
                return Ok(op);
            }
        }
        let ch = self.src[self.index..].chars().next().unwrap_or('\0');
        Err(self.error(LexErrorReason::UnknownSymbol(ch)))
    }

    fn read_word(&mut self, start: usize) -> LexResult<TokenKind> {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.');

        if self.starts_with(REFERENCE_START) {
            return Ok(TokenKind::Reference(
                self.read_reference(Some(word), start)?,
            ));
        }
        if self.starts_with(GENERATOR_START) {
            return Ok(TokenKind::Generator(
                self.read_generator(Some(word), start)?,
            ));
        }

        match word.as_str() {
            "true" => return Ok(TokenKind::Literal(Value::Bool(true))),
            "false" => return Ok(TokenKind::Literal(Value::Bool(false))),
            "null" => return Ok(TokenKind::Literal(Value::Null)),
            _ => {}
        }

        match word.to_ascii_uppercase().as_str() {
            "AND" => Ok(TokenKind::Operator(Operator::And)),
            "OR" => Ok(TokenKind::Operator(Operator::Or)),
            "IF" => Ok(TokenKind::Keyword(Keyword::If)),
            "DO" => Ok(TokenKind::Keyword(Keyword::Do)),
            "ELSE" => Ok(TokenKind::Keyword(Keyword::Else)),
            _ => Err(LexError {
                position: start,
                reason: LexErrorReason::UnexpectedIdentifier(word),
            }),
        }
    }

    fn read_reference(&mut self, owner: Option<String>, start: usize) -> LexResult<ReferenceToken> {
        self.index += REFERENCE_START.len();
        self.read_member(owner, start)
    }

    fn read_generator(&mut self, owner: Option<String>, start: usize) -> LexResult<ReferenceToken> {
        self.index += GENERATOR_START.len();
        self.read_member(owner, start)
    }

    fn read_member(&mut self, owner: Option<String>, start: usize) -> LexResult<ReferenceToken> {
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        if name.is_empty() {
            return Err(LexError {
                position: start,
                reason: LexErrorReason::MissingReferenceName,
            });
        }

        let args = if self.current() == Some(b'(') {
            Some(self.read_arguments()?)
        } else {
            None
        };

        Ok(ReferenceToken { owner, name, args })
    }

    fn read_arguments(&mut self) -> LexResult<Vec<Token>> {
        let open = self.index;
        self.advance(); // consume '('
        let mut args = Vec::new();
        let unterminated = LexError {
            position: open,
            reason: LexErrorReason::UnterminatedArguments,
        };

        self.skip_ws();
        if self.current() == Some(b')') {
            self.advance();
            return Ok(args);
        }

        loop {
            self.skip_ws();
            if self.eof() {
                return Err(unterminated);
            }
            let arg = self.read_token()?;
            match arg.kind {
                TokenKind::Literal(_) | TokenKind::Reference(_) | TokenKind::Generator(_) => {
                    args.push(arg)
                }
                _ => {
                    return Err(LexError {
                        position: arg.position,
                        reason: LexErrorReason::UnknownSymbol(
                            self.src[arg.position..].chars().next().unwrap_or('\0'),
                        ),
                    });
                }
            }

            self.skip_ws();
            match self.current() {
                Some(b',') => self.advance(),
                Some(b')') => {
                    self.advance();
                    return Ok(args);
                }
                None => return Err(unterminated),
                Some(_) => {
                    let ch = self.src[self.index..].chars().next().unwrap_or('\0');
                    return Err(self.error(LexErrorReason::UnknownSymbol(ch)));
                }
            }
        }
    }

    fn read_string(&mut self) -> LexResult<Value> {
        let start = self.index;
        let quote = self.current().unwrap_or(b'"');
        self.advance();
        let mut buf = String::new();
        while let Some(ch) = self.src[self.index..].chars().next() {
            self.index += ch.len_utf8();
            match ch {
                c if c as u32 == quote as u32 => return Ok(Value::Str(buf)),
                '\\' => {
                    let escaped = self.src[self.index..].chars().next().ok_or(LexError {
                        position: start,
                        reason: LexErrorReason::UnterminatedString,
                    })?;
                    self.index += escaped.len_utf8();
                    let value = match escaped {
                        '"' => '"',
                        '\'' => '\'',
                        '\\' => '\\',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => {
                            return Err(self.error(LexErrorReason::InvalidEscape(other)));
                        }
                    };
                    buf.push(value);
                }
                other => buf.push(other),
            }
        }
        Err(LexError {
            position: start,
            reason: LexErrorReason::UnterminatedString,
        })
    }

    fn read_number(&mut self) -> LexResult<Value> {
        let start = self.index;
        if self.current() == Some(b'-') {
            self.advance();
        }
        let text_end = {
            while let Some(ch) = self.current() {
                if ch.is_ascii_alphanumeric() || ch == b'.' || ch == b'_' {
                    self.advance();
                } else {
                    break;
                }
            }
            self.index
        };
        let text = &self.src[start..text_end];
        let malformed = || LexError {
            position: start,
            reason: LexErrorReason::MalformedNumber(text.to_string()),
        };

        if text.contains('.') {
            let valid = text
                .trim_start_matches('-')
                .split_once('.')
                .is_some_and(|(int, frac)| {
                    !int.is_empty()
                        && !frac.is_empty()
                        && int.bytes().all(|c| c.is_ascii_digit())
                        && frac.bytes().all(|c| c.is_ascii_digit())
                });
            if !valid {
                return Err(malformed());
            }
            text.parse::<f64>().map(Value::Float).map_err(|_| malformed())
        } else {
            text.parse::<i64>().map(Value::Int).map_err(|_| malformed())
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.index;
        while let Some(ch) = self.current() {
            if pred(ch) {
                self.advance();
            } else {
                break;
            }
        }
        self.src[start..self.index].to_string()
    }

    fn error(&self, reason: LexErrorReason) -> LexError {
        LexError {
            position: self.index,
            reason,
        }
    }
}

fn is_word_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}
