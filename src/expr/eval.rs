//! Recursive-descent interpreter for scalar arithmetic expressions.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unexpected token at offset {0}")]
    Unexpected(usize),
    #[error("unbalanced parentheses")]
    Unbalanced,
    #[error("unknown identifier '{0}'")]
    UnknownIdent(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("empty expression")]
    Empty,
}

/// Evaluates an arithmetic expression over named scalar variables.
///
/// Grammar: `expr := term (('+'|'-') term)*`, `term := factor (('*'|'/')
/// factor)*`, `factor := number | ident | '-' factor | '(' expr ')'`.
pub fn evaluate(source: &str, lookup: &dyn Fn(&str) -> Option<f64>) -> Result<f64, EvalError> {
    let mut parser = Parser {
        src: source.as_bytes(),
        pos: 0,
        lookup,
    };
    parser.skip_ws();
    if parser.at_end() {
        return Err(EvalError::Empty);
    }
    let value = parser.expr()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(EvalError::Unexpected(parser.pos));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<f64>,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn term(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    acc *= self.factor()?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    acc /= rhs;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, EvalError> {
        self.skip_ws();
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(EvalError::Unbalanced);
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.ident(),
            _ => Err(EvalError::Unexpected(self.pos)),
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii digits");
        text.parse::<f64>().map_err(|_| EvalError::Unexpected(start))
    }

    fn ident(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii identifier");
        (self.lookup)(name).ok_or_else(|| EvalError::UnknownIdent(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn env(name: &str) -> Option<f64> {
        match name {
            "x" => Some(2.0),
            "y" => Some(3.0),
            "x1" => Some(10.0),
            _ => None,
        }
    }

    #[rstest]
    #[case("1 + 2*3", 7.0)]
    #[case("(1 + 2)*3", 9.0)]
    #[case("x + y", 5.0)]
    #[case("x1 - x", 8.0)]
    #[case("-x * y", -6.0)]
    #[case("10 / x / 2.5", 2.0)]
    #[case("2", 2.0)]
    fn arithmetic(#[case] source: &str, #[case] expected: f64) {
        assert_eq!(evaluate(source, &env).unwrap(), expected);
    }

    #[test]
    fn unknown_identifier_is_reported() {
        assert_eq!(
            evaluate("x + radius", &env),
            Err(EvalError::UnknownIdent("radius".into()))
        );
    }

    #[test]
    fn zero_division_is_reported() {
        assert_eq!(evaluate("1 / (x - 2)", &env), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(matches!(
            evaluate("1 + 2 )", &env),
            Err(EvalError::Unexpected(_))
        ));
    }
}
