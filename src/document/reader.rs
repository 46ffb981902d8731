use super::{Document, Sexpr};
use crate::error::{LoadError, LoadResult};

/// Read document text into top-level forms.
pub fn read_document(source: &str) -> LoadResult<Document> {
    let mut reader = Reader::new(source);
    let mut forms = Vec::new();
    loop {
        reader.skip_ws();
        if reader.eof() {
            break;
        }
        if reader.current() == Some(b')') {
            return Err(reader.error("unbalanced ')'"));
        }
        forms.push(reader.read_expr()?);
    }
    Ok(Document {
        forms,
        source: source.to_string(),
    })
}

struct Reader<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Reader<'a> {
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

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else if ch == b';' {
                while let Some(ch) = self.current() {
                    self.advance();
                    if ch == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_expr(&mut self) -> LoadResult<Sexpr> {
        self.skip_ws();
        match self.current() {
            None => Err(self.error("unexpected end of input")),
            Some(b'(') => self.read_list(),
            Some(b'"') => self.read_string(),
            Some(b':') => self.read_keyword(),
            Some(b'-' | b'+' | b'0'..=b'9') => self.read_number_or_symbol(),
            Some(_) => self.read_symbol_or_bool(),
        }
    }

    fn read_list(&mut self) -> LoadResult<Sexpr> {
        let open = self.index;
        self.advance();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.current() {
                None => {
                    return Err(LoadError::Syntax(format!(
                        "list opened at byte {} is never closed",
                        open
                    )));
                }
                Some(b')') => {
                    self.advance();
                    return Ok(Sexpr::List(items));
                }
                Some(_) => items.push(self.read_expr()?),
            }
        }
    }

    fn read_string(&mut self) -> LoadResult<Sexpr> {
        self.advance();
        let start = self.index;
        let mut buf = String::new();
        let mut run = start;
        while let Some(ch) = self.current() {
            match ch {
                b'"' => {
                    buf.push_str(&self.src[run..self.index]);
                    self.advance();
                    return Ok(Sexpr::String(buf));
                }
                b'\\' => {
                    buf.push_str(&self.src[run..self.index]);
                    self.advance();
                    let escaped = self.current().ok_or_else(|| self.error("incomplete escape"))?;
                    let value = match escaped {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'n' => '\n',
                        b't' => '\t',
                        other => {
                            return Err(self.error(&format!("unknown escape \\{}", other as char)));
                        }
                    };
                    buf.push(value);
                    self.advance();
                    run = self.index;
                }
                _ => self.advance(),
            }
        }
        Err(LoadError::Syntax(format!(
            "string starting at byte {} is never closed",
            start - 1
        )))
    }

    fn read_keyword(&mut self) -> LoadResult<Sexpr> {
        self.advance();
        let text = self.take_symbol();
        if text.is_empty() {
            return Err(self.error("empty keyword"));
        }
        Ok(Sexpr::Keyword(text.to_string()))
    }

    fn read_number_or_symbol(&mut self) -> LoadResult<Sexpr> {
        let start = self.index;
        if matches!(self.current(), Some(b'-' | b'+')) {
            self.advance();
        }
        let mut has_digit = false;
        while self.current().is_some_and(|ch| ch.is_ascii_digit()) {
            has_digit = true;
            self.advance();
        }
        let mut is_float = false;
        if has_digit && self.current() == Some(b'.') && self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.current().is_some_and(|ch| ch.is_ascii_digit()) {
                self.advance();
            }
        }

        if !has_digit || self.current().is_some_and(is_symbol_char) {
            self.index = start;
            return self.read_symbol_or_bool();
        }

        let text = &self.src[start..self.index];
        if is_float {
            text.parse::<f64>()
                .map(Sexpr::Float)
                .map_err(|_| self.error("invalid float literal"))
        } else {
            text.parse::<i64>()
                .map(Sexpr::Integer)
                .map_err(|_| self.error("invalid integer literal"))
        }
    }

    fn read_symbol_or_bool(&mut self) -> LoadResult<Sexpr> {
        let text = self.take_symbol();
        match text {
            "" => Err(self.error("unexpected character")),
            "true" => Ok(Sexpr::Boolean(true)),
            "false" => Ok(Sexpr::Boolean(false)),
            _ => Ok(Sexpr::Symbol(text.to_string())),
        }
    }

    fn take_symbol(&mut self) -> &'a str {
        let start = self.index;
        while self.current().is_some_and(is_symbol_char) {
            self.advance();
        }
        &self.src[start..self.index]
    }

    fn error(&self, message: &str) -> LoadError {
        LoadError::Syntax(format!("{} at byte {}", message, self.index))
    }
}

fn is_symbol_char(ch: u8) -> bool {
    match ch {
        b'(' | b')' | b'"' | b';' => false,
        c => !c.is_ascii_whitespace(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Vec<Sexpr> {
        read_document(src).expect("read").forms
    }

    #[test]
    fn reads_nested_forms() {
        let forms = read("(tree Main :level 10 (branch A :when \"#x()\"))");
        assert_eq!(forms.len(), 1);
        assert!(forms[0].is_form("tree"));
        let items = forms[0].as_list().unwrap();
        assert_eq!(items[2], Sexpr::Keyword("level".into()));
        assert_eq!(items[3], Sexpr::Integer(10));
        assert!(items[4].is_form("branch"));
    }

    #[test]
    fn strings_keep_utf8_and_escapes() {
        let forms = read(r#"("héllo \"you\"\n")"#);
        assert_eq!(
            forms[0],
            Sexpr::List(vec![Sexpr::String("héllo \"you\"\n".into())])
        );
    }

    #[test]
    fn comments_and_atoms() {
        let forms = read("; header\n(a -1 2.5 true -x 3rd) ; trailing");
        assert_eq!(
            forms[0],
            Sexpr::List(vec![
                Sexpr::Symbol("a".into()),
                Sexpr::Integer(-1),
                Sexpr::Float(2.5),
                Sexpr::Boolean(true),
                Sexpr::Symbol("-x".into()),
                Sexpr::Symbol("3rd".into()),
            ])
        );
    }

    #[test]
    fn reports_unbalanced_input() {
        assert!(matches!(read_document("(tree A"), Err(LoadError::Syntax(_))));
        assert!(matches!(read_document("(tree A))"), Err(LoadError::Syntax(_))));
        assert!(matches!(read_document("(a \"open)"), Err(LoadError::Syntax(_))));
    }

    #[test]
    fn display_round_trips_shape() {
        let forms = read("(tree Main :keys (\"Menu\"))");
        assert_eq!(forms[0].to_string(), "(tree Main :keys (\"Menu\"))");
    }
}
