//! Tab completion.
//!
//! [`complete`] works like a readline completer: it is asked for candidate
//! `state` (0, 1, 2, ...) of the word starting at `begidx` until it returns
//! `None`. What is proposed depends on where the cursor is: a command name,
//! a parameter name, or a variable name after `$`.

use crate::coerce::ParamType;
use crate::command::{CommandDescriptor, CompletionContext};
use crate::env::Environment;
use crate::parser::{self, ParsedStage};
use crate::registry::Registry;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::cell::RefCell;
use std::rc::Rc;

/// Upper bound on the candidates collected from one completion request.
const MAX_CANDIDATES: usize = 1024;

/// Candidate number `state` for the word `text` starting at byte `begidx`
/// of `line`, or `None` once the candidates are exhausted.
pub fn complete(
    registry: &Registry,
    env: &Environment,
    line: &str,
    begidx: usize,
    text: &str,
    state: usize,
) -> Option<String> {
    let trimmed = line.trim_start();
    let begidx = begidx.saturating_sub(line.len() - trimmed.len());
    let line = trimmed;

    let root = || {
        registry
            .names()
            .filter(|name| name.starts_with(text))
            .nth(state)
            .map(str::to_string)
    };

    if begidx == 0 {
        return root();
    }

    let stages = parser::parse_line(line);
    let Some(stage) = stages.last() else {
        return root();
    };
    let Some((command, args)) = stage.args.split_first() else {
        return root();
    };
    let Some(descriptor) = registry.get(command) else {
        return root();
    };

    let ends_with_space = line.ends_with(char::is_whitespace);
    if args.is_empty() && stage.kwargs.is_empty() && !ends_with_space {
        // still typing the command name of a later stage
        return root();
    }

    if let Some(hook) = descriptor.completion_hook() {
        let ctx = CompletionContext {
            registry,
            env,
            descriptor,
        };
        return hook.complete(&ctx, state, args, &stage.kwargs);
    }

    let mut param_names = unbound_params(descriptor, stage);

    if args.is_empty() && stage.kwargs.is_empty() {
        return param_names.nth(state);
    }

    if stage.last_was_keyword && !ends_with_space {
        let (_, value) = stage.kwargs.last()?;
        return match value.strip_prefix('$') {
            Some(prefix) => variable(env, prefix, state),
            None => None,
        };
    }

    let partial = args.last().map(String::as_str).unwrap_or("");
    if !ends_with_space {
        if let Some(prefix) = partial.strip_prefix('$') {
            return variable(env, prefix, state);
        }
    }

    let skip = if ends_with_space {
        args.len()
    } else {
        args.len().saturating_sub(1)
    };
    param_names
        .skip(skip)
        .filter(|name| ends_with_space || name.starts_with(partial))
        .nth(state)
}

/// Every candidate [`complete`] would return for this word, in order.
pub fn candidates(
    registry: &Registry,
    env: &Environment,
    line: &str,
    begidx: usize,
    text: &str,
) -> Vec<String> {
    (0..MAX_CANDIDATES)
        .map_while(|state| complete(registry, env, line, begidx, text, state))
        .collect()
}

/// Names of the parameters not yet given as keywords. Variadic parameters
/// cannot be given by name and are left out.
fn unbound_params<'a>(
    descriptor: &'a CommandDescriptor,
    stage: &'a ParsedStage,
) -> impl Iterator<Item = String> + 'a {
    descriptor
        .params()
        .iter()
        .filter(|p| p.ty != ParamType::Variadic)
        .filter(|p| !stage.kwargs.contains_key(&p.name))
        .map(|p| p.name.clone())
}

fn variable(env: &Environment, prefix: &str, state: usize) -> Option<String> {
    env.names()
        .filter(|name| name.starts_with(prefix))
        .nth(state)
        .map(str::to_string)
}

/// Byte offset where the word under the cursor starts: just after the last
/// whitespace, pipe, `=` or `$`.
fn word_start(line: &str) -> usize {
    line.char_indices()
        .rev()
        .find(|&(_, c)| c.is_whitespace() || matches!(c, '|' | '=' | '$'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

/// Rustyline helper offering [`candidates`] on tab.
///
/// Shares the registry and the environment with the interpreter, so
/// commands registered and variables set during the session are proposed.
pub struct ShellHelper {
    registry: Rc<Registry>,
    env: Rc<RefCell<Environment>>,
}

impl ShellHelper {
    pub fn new(registry: Rc<Registry>, env: Rc<RefCell<Environment>>) -> Self {
        Self { registry, env }
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        let start = word_start(line);
        let env = self.env.borrow();
        let found = candidates(&self.registry, &env, line, start, &line[start..]);
        tracing::trace!(line, start, count = found.len(), "completion");

        let pairs = found
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}
