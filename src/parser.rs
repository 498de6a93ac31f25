//! Splits a token stream into pipeline stages.
//!
//! Each stage keeps its positional arguments (command word first) apart from
//! its `name=value` arguments. Quoted text and JSON literals may carry `=`
//! freely. Argument order problems are recorded as warnings on the stage,
//! never as errors.

use crate::lexer::{self, Token};
use std::fmt;

/// Keyword arguments of a stage, in the order they were typed.
///
/// A repeated key keeps its original position and takes the latest value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordArgs {
    entries: Vec<(String, String)>,
}

impl KeywordArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key`, or overwrites its value in place if it is already there.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Raw (unresolved) value typed for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key/value pairs in typing order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The most recently inserted key and its value.
    pub fn last(&self) -> Option<(&str, &str)> {
        self.entries.last().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Advisory problems found while classifying arguments. They never stop a
/// stage from running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// A positional argument was typed after a `name=value` argument.
    PositionalAfterKeyword { arg: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::PositionalAfterKeyword { arg } => write!(
                f,
                "positional parameters should be before keyword parameters (got '{}')",
                arg
            ),
        }
    }
}

/// One command invocation of a pipeline, with its raw (unresolved) arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStage {
    /// Positional arguments; the first one names the command.
    pub args: Vec<String>,
    pub kwargs: KeywordArgs,
    /// Whether the last classified argument was a keyword argument.
    pub last_was_keyword: bool,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedStage {
    /// Name of the command this stage invokes, if any was typed.
    pub fn command(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// A stage without a command name, e.g. the right side of a trailing `|`.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

enum Argument {
    Positional(String),
    Keyword(String, String),
}

/// Splits a word once at the first `=`. The word stays positional when the
/// left side is empty, or when the `=` is part of a quoted run or of a JSON
/// literal.
fn classify(token: &Token) -> Argument {
    let text = match token {
        Token::Quoted(text) => return Argument::Positional(text.clone()),
        Token::Word(text) => text,
        Token::PipeOp => return Argument::Positional("|".to_string()),
    };

    match text.split_once('=') {
        Some((lhs, rhs))
            if !lhs.is_empty() && !lhs.starts_with('^') && !lhs.contains(lexer::is_quote) =>
        {
            Argument::Keyword(lhs.to_string(), rhs.to_string())
        }
        _ => Argument::Positional(text.clone()),
    }
}

struct StageBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl StageBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        StageBuilder { tokens, pos: 0 }
    }

    fn build_stages(mut self) -> Vec<ParsedStage> {
        if self.tokens.is_empty() {
            return Vec::new();
        }
        self.parse_pipeline()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse a pipeline: stage ('|' stage)*
    fn parse_pipeline(&mut self) -> Vec<ParsedStage> {
        let mut stages = vec![self.parse_stage()];

        while let Some(Token::PipeOp) = self.peek() {
            self.consume();
            stages.push(self.parse_stage());
        }

        stages
    }

    /// Parse one stage: everything up to the next pipe or the end of line.
    fn parse_stage(&mut self) -> ParsedStage {
        let mut stage = ParsedStage::default();

        while let Some(token) = self.peek() {
            if *token == Token::PipeOp {
                break;
            }
            let token = match self.consume() {
                Some(token) => token,
                None => break,
            };

            match classify(&token) {
                Argument::Positional(arg) => {
                    if !stage.kwargs.is_empty() {
                        stage
                            .warnings
                            .push(ParseWarning::PositionalAfterKeyword { arg: arg.clone() });
                    }
                    stage.args.push(arg);
                    stage.last_was_keyword = false;
                }
                Argument::Keyword(key, value) => {
                    stage.kwargs.insert(key, value);
                    stage.last_was_keyword = true;
                }
            }
        }

        stage
    }
}

/// Groups tokens into pipeline stages and classifies each stage's arguments.
///
/// Empty stages (leading, trailing or doubled pipes) are kept so the caller
/// can report them; a line without tokens has no stages at all.
pub fn construct_stages(tokens: Vec<Token>) -> Vec<ParsedStage> {
    StageBuilder::from(tokens).build_stages()
}

/// Lexes and parses a whole line.
pub fn parse_line(line: &str) -> Vec<ParsedStage> {
    construct_stages(lexer::split_into_tokens(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(stage: &ParsedStage) -> Vec<&str> {
        stage.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_keywords_and_positionals() {
        let stages =
            parse_line(r#"create_book title="The Hobbit" author=Tolkien year=1937 price=9.99"#);
        assert_eq!(stages.len(), 1);
        let stage = &stages[0];
        assert_eq!(args(stage), vec!["create_book"]);
        let kwargs: Vec<_> = stage.kwargs.iter().collect();
        assert_eq!(
            kwargs,
            vec![
                ("title", r#""The Hobbit""#),
                ("author", "Tolkien"),
                ("year", "1937"),
                ("price", "9.99"),
            ]
        );
        assert!(stage.last_was_keyword);
        assert!(stage.warnings.is_empty());
    }

    #[test]
    fn test_positional_after_keyword_warns_but_is_kept() {
        let stages = parse_line("set key=a b");
        let stage = &stages[0];
        assert_eq!(args(stage), vec!["set", "b"]);
        assert_eq!(stage.kwargs.get("key"), Some("a"));
        assert!(!stage.last_was_keyword);
        assert_eq!(
            stage.warnings,
            vec![ParseWarning::PositionalAfterKeyword {
                arg: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_equal_sign_inside_literals_stays_positional() {
        let stages = parse_line(r#"echo =x "a=b" ^{"k":"v=w"} 'q'=r"#);
        assert_eq!(
            args(&stages[0]),
            vec!["echo", "=x", r#""a=b""#, r#"^{"k":"v=w"}"#, "'q'=r"]
        );
        assert!(stages[0].kwargs.is_empty());
    }

    #[test]
    fn test_empty_keyword_values() {
        let stages = parse_line(r#"cmd a= b="""#);
        assert_eq!(stages[0].kwargs.get("a"), Some(""));
        assert_eq!(stages[0].kwargs.get("b"), Some(r#""""#));
    }

    #[test]
    fn test_repeated_keyword_keeps_position_takes_last_value() {
        let stages = parse_line("cmd a=1 b=2 a=3");
        let kwargs: Vec<_> = stages[0].kwargs.iter().collect();
        assert_eq!(kwargs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_pipeline_segmentation_keeps_empty_stages() {
        let stages = parse_line("echo 5 | echo _ |");
        assert_eq!(stages.len(), 3);
        assert_eq!(args(&stages[1]), vec!["echo", "_"]);
        assert!(stages[2].is_empty());

        let stages = parse_line("| a || b");
        let commands: Vec<_> = stages.iter().map(ParsedStage::command).collect();
        assert_eq!(commands, vec![None, Some("a"), None, Some("b")]);
    }

    #[test]
    fn test_blank_line_has_no_stages() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   \t").is_empty());
    }
}
