//! Textual expression utilities: tokenization, whole-token search and
//! replacement, and a small arithmetic interpreter for evaluator functions.
//!
//! Replacement never touches the source string in place. The string is first
//! split into spans classified as identifier or filler, then reassembled;
//! this rules out the index-shifting bugs of repeated substring surgery.

mod eval;

pub use eval::{evaluate, EvalError};

/// Characters allowed inside an identifier token.
#[inline]
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A classified run of characters within an expression string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<'a> {
    pub text: &'a str,
    pub is_ident: bool,
}

/// Splits the source into maximal identifier / non-identifier runs.
pub fn tokenize(source: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;

    for (pos, c) in source.char_indices() {
        let kind = is_ident_char(c);
        match current {
            Some(k) if k == kind => {}
            Some(k) => {
                spans.push(Span {
                    text: &source[start..pos],
                    is_ident: k,
                });
                start = pos;
                current = Some(kind);
            }
            None => current = Some(kind),
        }
    }
    if let Some(k) = current {
        spans.push(Span {
            text: &source[start..],
            is_ident: k,
        });
    }
    spans
}

/// Checks whether `what` occurs in `source` as a standalone lexeme, i.e. with
/// non-identifier characters or the string boundary on both sides.
pub fn is_lexeme(source: &str, what: &str) -> bool {
    if what.is_empty() {
        return false;
    }
    tokenize(source)
        .iter()
        .any(|s| s.is_ident && s.text == what)
}

/// Replaces every standalone occurrence of `what` by `with`, leaving partial
/// identifier matches untouched.
pub fn replace_lexeme(source: &str, what: &str, with: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for span in tokenize(source) {
        if span.is_ident && span.text == what {
            out.push_str(with);
        } else {
            out.push_str(span.text);
        }
    }
    out
}

/// All distinct identifiers referenced by the expression, excluding numeric
/// literals, in order of first appearance.
pub fn referenced_idents(source: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for span in tokenize(source) {
        if !span.is_ident || span.text.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if !seen.iter().any(|s| s == span.text) {
            seen.push(span.text.to_owned());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("x1 + x", "x", "length", "x1 + length")]
    #[case("x + x*x2", "x", "y", "y + y*x2")]
    #[case("radius*2", "radius", "r", "r*2")]
    #[case("radius*2", "rad", "r", "radius*2")]
    #[case("a_b + ab", "ab", "c", "a_b + c")]
    #[case("x", "x", "y", "y")]
    #[case("", "x", "y", "")]
    fn whole_token_replacement(
        #[case] source: &str,
        #[case] what: &str,
        #[case] with: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(replace_lexeme(source, what, with), expected);
    }

    #[rstest]
    #[case("x1 + x", "x", true)]
    #[case("x1 + x2", "x", false)]
    #[case("len(x)", "len", true)]
    #[case("", "x", false)]
    #[case("x", "", false)]
    fn lexeme_detection(#[case] source: &str, #[case] what: &str, #[case] expected: bool) {
        assert_eq!(is_lexeme(source, what), expected);
    }

    #[test]
    fn idents_skip_numbers() {
        assert_eq!(
            referenced_idents("2*pi*r + 10"),
            vec!["pi".to_owned(), "r".to_owned()]
        );
    }

    #[test]
    fn tokenizer_round_trips() {
        let src = "a1 + (b_2 * 3.5) - c";
        let rebuilt: String = tokenize(src).iter().map(|s| s.text).collect();
        assert_eq!(rebuilt, src);
    }
}
