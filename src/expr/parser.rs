//! Precedence-climbing parser over expression tokens.

use super::ast::Syntax;
use super::token::{Keyword, Punctuation, ReferenceToken, Token, TokenKind, tokenize};
use crate::error::{ParseError, ParseErrorCode, ParseResult};

/// Lex and parse raw expression text into a [`Syntax`] tree.
pub fn parse_str(raw: &str) -> ParseResult<Syntax> {
    let tokens = tokenize(raw)?;
    parse(&tokens, raw.len())
}

/// Parse a token sequence. `end` is reported as the position of
/// errors that occur after the last token.
pub fn parse(tokens: &[Token], end: usize) -> ParseResult<Syntax> {
    let mut parser = Parser::new(tokens, end);
    let tree = parser.parse_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::new(ParseErrorCode::UndefinedToken, extra.position));
    }
    Ok(tree)
}

struct Parser<'t> {
    tokens: &'t [Token],
    index: usize,
    end: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], end: usize) -> Self {
        Self {
            tokens,
            index: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.index);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn parse_expr(&mut self) -> ParseResult<Syntax> {
        let first = self.parse_term()?;
        self.climb(first, 0)
    }

    /// Fold operators binding tighter than `current` into `previous`.
    fn climb(&mut self, previous: Syntax, current: u8) -> ParseResult<Syntax> {
        let Some(Token {
            kind: TokenKind::Operator(op),
            position,
        }) = self.peek()
        else {
            return Ok(previous);
        };

        let next = op.precedence();
        if current >= next {
            return Ok(previous);
        }
        let (op, position) = (*op, *position);
        self.next();

        let term = self.parse_term()?;
        let right = self.climb(term, next)?;
        self.climb(
            Syntax::Operation {
                op,
                left: Box::new(previous),
                right: Box::new(right),
                position,
            },
            current,
        )
    }

    fn parse_term(&mut self) -> ParseResult<Syntax> {
        let token = self
            .next()
            .ok_or_else(|| ParseError::new(ParseErrorCode::UnexpectedEnd, self.end))?;

        match &token.kind {
            TokenKind::Punctuation(Punctuation::Open) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Punctuation(Punctuation::Close),
                        ..
                    }) => Ok(inner),
                    _ => Err(ParseError::new(
                        ParseErrorCode::UnclosedParenthesis,
                        token.position,
                    )),
                }
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(token.position),
            TokenKind::Literal(value) => Ok(Syntax::Literal {
                value: value.clone(),
                position: token.position,
            }),
            TokenKind::Reference(reference) => Ok(reference_syntax(reference, false, token.position)),
            TokenKind::Generator(reference) => Ok(reference_syntax(reference, true, token.position)),
            _ => Err(ParseError::new(ParseErrorCode::UndefinedToken, token.position)),
        }
    }

    fn parse_if(&mut self, position: usize) -> ParseResult<Syntax> {
        let guard = self.parse_if_operand()?;

        match self.next() {
            Some(Token {
                kind: TokenKind::Keyword(Keyword::Do),
                ..
            }) => {}
            other => {
                let at = other.map_or(self.end, |t| t.position);
                return Err(ParseError::new(ParseErrorCode::MissingDoStatement, at));
            }
        }

        let body = self.parse_if_operand()?;
        let mut branches = vec![(guard, body)];
        let mut otherwise = None;

        if matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Keyword(Keyword::Else))
        ) {
            self.next();
            if let Some(Token {
                kind: TokenKind::Keyword(Keyword::If),
                position,
            }) = self.peek()
            {
                let nested_at = *position;
                self.next();
                // ELSE IF chains flatten into a single conditional.
                match self.parse_if(nested_at)? {
                    Syntax::Conditional {
                        branches: nested,
                        otherwise: nested_else,
                        ..
                    } => {
                        branches.extend(nested);
                        otherwise = nested_else;
                    }
                    other => otherwise = Some(Box::new(other)),
                }
            } else {
                otherwise = Some(Box::new(self.parse_if_operand()?));
            }
        }

        Ok(Syntax::Conditional {
            branches,
            otherwise,
            position,
        })
    }

    fn parse_if_operand(&mut self) -> ParseResult<Syntax> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Keyword(Keyword::If),
                ..
            }) => self.parse_expr(),
            Some(Token {
                kind: TokenKind::Keyword(_),
                position,
            }) => Err(ParseError::new(ParseErrorCode::IllegalIfArgument, *position)),
            None => Err(ParseError::new(
                ParseErrorCode::IllegalIfArgument,
                self.position(),
            )),
            Some(_) => self.parse_expr(),
        }
    }
}

fn reference_syntax(reference: &ReferenceToken, generator: bool, position: usize) -> Syntax {
    Syntax::Reference {
        owner: reference.owner.clone(),
        name: reference.name.clone(),
        args: reference
            .args
            .as_ref()
            .map(|args| args.iter().map(argument_syntax).collect()),
        generator,
        position,
    }
}

fn argument_syntax(token: &Token) -> Syntax {
    match &token.kind {
        TokenKind::Reference(reference) => reference_syntax(reference, false, token.position),
        TokenKind::Generator(reference) => reference_syntax(reference, true, token.position),
        TokenKind::Literal(value) => Syntax::Literal {
            value: value.clone(),
            position: token.position,
        },
        // The tokenizer only admits literals and references inside argument lists.
        _ => Syntax::Literal {
            value: super::Value::Null,
            position: token.position,
        },
    }
}
