//! A module implementing lexical analysis (tokenization) of one shell line.

use regex::Regex;
use std::sync::LazyLock;

/// The three interchangeable string delimiters.
pub const QUOTES: [char; 3] = ['"', '\'', '`'];

/// A word is a run of plain characters and quoted runs; a quoted run may hold
/// whitespace, pipes and backslash-escaped characters. A missing closing
/// quote lets the run extend to the end of the line.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:[^\s"`'|]|"(?:\\.|[^"])*"?|`(?:\\.|[^`])*`?|'(?:\\.|[^'])*'?)+|\|"#)
        .expect("token regex is valid")
});

/// Represents a token resulting from lexical analysis.
///
/// Quote characters are kept in the token text: they are only stripped when
/// the token is resolved to a value, so completion still sees what was typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A plain word, possibly containing quoted runs (`title="The Hobbit"`).
    Word(String),
    /// A word that starts with a quote character (`"The Hobbit"`).
    Quoted(String),
    /// The pipe operator, `|`.
    PipeOp,
}

impl Token {
    /// Raw text of the token as typed.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Quoted(s) => s,
            Token::PipeOp => "|",
        }
    }
}

pub fn is_quote(ch: char) -> bool {
    QUOTES.contains(&ch)
}

/// The main entry point function to perform lexical analysis.
///
/// Never fails: every character of the line either belongs to a token or is
/// whitespace separating tokens.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    TOKEN_RE
        .find_iter(line)
        .map(|m| {
            let text = m.as_str();
            if text == "|" {
                Token::PipeOp
            } else if text.starts_with(is_quote) {
                Token::Quoted(text.to_string())
            } else {
                Token::Word(text.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    fn quoted(s: &str) -> Token {
        Token::Quoted(s.to_string())
    }

    #[test]
    fn test_split_on_whitespace() {
        assert_eq!(
            split_into_tokens("  echo   hello\tworld "),
            vec![word("echo"), word("hello"), word("world")]
        );
        assert!(split_into_tokens("   ").is_empty());
    }

    #[test]
    fn test_quoted_runs_are_atomic() {
        assert_eq!(
            split_into_tokens(r#"create_book title="The Hobbit" 'a | b' `x y`"#),
            vec![
                word("create_book"),
                word(r#"title="The Hobbit""#),
                quoted("'a | b'"),
                quoted("`x y`"),
            ]
        );
    }

    #[test]
    fn test_pipe_is_a_token_even_without_spaces() {
        assert_eq!(
            split_into_tokens("echo 5|echo _ | test"),
            vec![
                word("echo"),
                word("5"),
                Token::PipeOp,
                word("echo"),
                word("_"),
                Token::PipeOp,
                word("test"),
            ]
        );
    }

    #[test]
    fn test_escaped_quote_stays_inside_run() {
        assert_eq!(
            split_into_tokens(r#"echo "say \"hi\" now""#),
            vec![word("echo"), quoted(r#""say \"hi\" now""#)]
        );
    }

    #[test]
    fn test_unterminated_quote_runs_to_end_of_line() {
        assert_eq!(
            split_into_tokens("echo 'not closed | still quoted"),
            vec![word("echo"), quoted("'not closed | still quoted")]
        );
    }

    #[test]
    fn test_json_literal_stays_one_word() {
        assert_eq!(
            split_into_tokens(r#"idx ^[0,[1,2]] 1 ^'{"a": 1}'"#),
            vec![
                word("idx"),
                word("^[0,[1,2]]"),
                word("1"),
                word(r#"^'{"a": 1}'"#)
            ]
        );
    }
}
