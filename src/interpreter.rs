use crate::builtin::register_builtins;
use crate::coerce::{ParamType, coerce};
use crate::command::{Args, CommandDescriptor, CommandError, Context, ParamSpec};
use crate::completion::ShellHelper;
use crate::env::{Environment, JsonFallback};
use crate::error::ShellError;
use crate::parser::{self, ParsedStage};
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::value::Value;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use serde_json::Value as JsonValue;
use std::cell::{Ref, RefCell, RefMut};
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

/// What survives from one line to the next.
struct Session {
    previous_line: Option<String>,
    last_result: Value,
    running: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            previous_line: None,
            last_result: Value::None,
            running: true,
        }
    }
}

/// Parses lines, dispatches each stage to its registered command and threads
/// results through pipelines.
///
/// The interpreter owns the [`Registry`], the [`Environment`] and the session
/// state (previous line, last result). Everything shown to the user goes to
/// its output writer, stdout unless replaced with
/// [`Interpreter::with_output`].
///
/// Example
/// ```
/// use command_shell::{Interpreter, MemWriter, Value};
/// let (out, captured) = MemWriter::with_handle();
/// let mut sh = Interpreter::default().with_output(out);
/// sh.run_line("set X 10").unwrap();
/// sh.run_line("echo $X").unwrap();
/// assert_eq!(sh.last_result(), &Value::Int(10));
/// assert_eq!(captured.text(), "< 10\n10\n< 10\n");
/// ```
pub struct Interpreter {
    registry: Rc<Registry>,
    env: Rc<RefCell<Environment>>,
    session: Session,
    out: Box<dyn Write>,
    json_fallback: Option<Box<JsonFallback>>,
    history: Option<PathBuf>,
}

impl Interpreter {
    /// Create an interpreter with a custom set of commands and a default
    /// environment.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Rc::new(registry),
            env: Rc::new(RefCell::new(Environment::new())),
            session: Session::new(),
            out: Box::new(io::stdout()),
            json_fallback: None,
            history: None,
        }
    }

    /// Send user-visible output to `out` instead of stdout.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn with_environment(self, env: Environment) -> Self {
        *self.env.borrow_mut() = env;
        self
    }

    /// Load editor history from `path` when the REPL starts and save it
    /// back when it ends.
    pub fn with_history(mut self, path: impl Into<PathBuf>) -> Self {
        self.history = Some(path.into());
        self
    }

    /// Add a command, replacing any command of the same name.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Option<Rc<CommandDescriptor>> {
        Rc::make_mut(&mut self.registry).register(descriptor)
    }

    /// Conversion used by `saveenv` for values without a JSON form.
    pub fn set_json_fallback<F>(&mut self, fallback: F)
    where
        F: Fn(&Value) -> Option<JsonValue> + 'static,
    {
        self.json_fallback = Some(Box::new(fallback));
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn env(&self) -> Ref<'_, Environment> {
        self.env.borrow()
    }

    pub fn env_mut(&self) -> RefMut<'_, Environment> {
        self.env.borrow_mut()
    }

    /// Result of the last stage that ran, `_` on the next line.
    pub fn last_result(&self) -> &Value {
        &self.session.last_result
    }

    /// `false` once a command asked to exit.
    pub fn is_running(&self) -> bool {
        self.session.running
    }

    /// Run one line the way the REPL does.
    ///
    /// A blank line runs the previous non-empty line again. Errors are
    /// reported on the output and only stop the line; the result is echoed
    /// as `< <repr>`. Fails only when the output cannot be written.
    pub fn run_line(&mut self, line: &str) -> io::Result<()> {
        let line = if line.trim().is_empty() {
            match &self.session.previous_line {
                Some(previous) => previous.clone(),
                None => return Ok(()),
            }
        } else {
            line.to_string()
        };

        let stages = parser::parse_line(&line);
        tracing::debug!(line = %line, stages = stages.len(), "running line");
        if self.env.borrow().is_debug() {
            writeln!(self.out, "stages: {:?}", stages)?;
        }

        match self.execute_pipeline(&stages) {
            Ok(()) => {}
            Err(ShellError::Io(e)) => return Err(e),
            Err(e @ ShellError::TrailingPipe) => writeln!(self.out, "warning: {}", e)?,
            Err(e) => writeln!(self.out, "error: {}", e)?,
        }

        writeln!(self.out, "< {}", self.session.last_result.repr())?;
        self.session.previous_line = Some(line);
        Ok(())
    }

    /// Run the stages of one line left to right. Each stage's result becomes
    /// the last result; a failing stage leaves `none` behind and stops the
    /// line.
    pub fn execute_pipeline(&mut self, stages: &[ParsedStage]) -> Result<(), ShellError> {
        for (idx, stage) in stages.iter().enumerate() {
            if stage.is_empty() {
                return Err(ShellError::TrailingPipe);
            }
            match self.execute_stage(stage, idx > 0) {
                Ok(value) => self.session.last_result = value,
                Err(e) => {
                    self.session.last_result = Value::None;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Resolve, bind and coerce the arguments of `stage`, then call its
    /// command. `piped` stages get the previous result as an extra
    /// positional argument unless one of their arguments is `_`.
    pub fn execute_stage(&mut self, stage: &ParsedStage, piped: bool) -> Result<Value, ShellError> {
        let name = stage.command().ok_or(ShellError::TrailingPipe)?;
        let registry = Rc::clone(&self.registry);
        let descriptor = registry
            .get(name)
            .ok_or_else(|| ShellError::UnknownCommand(name.to_string()))?;
        tracing::debug!(command = name, piped, "dispatching stage");

        let mut env = self.env.borrow_mut();
        let silent = env.is_silent();
        let debug = env.is_debug();

        if !silent {
            for warning in &stage.warnings {
                writeln!(self.out, "warning: {}", warning)?;
            }
        }
        if debug {
            let kwargs: Vec<_> = stage.kwargs.iter().collect();
            writeln!(self.out, "method: {}", descriptor.signature())?;
            writeln!(self.out, "raw: {:?} {:?}", &stage.args[1..], kwargs)?;
        }

        let mut notices = Vec::new();
        let args = {
            let mut resolver = Resolver::new(&env, &self.session.last_result);
            let args = bind_arguments(
                descriptor,
                stage,
                &mut resolver,
                piped.then_some(&self.session.last_result),
                silent,
                &mut notices,
            );
            let warnings = resolver
                .take_warnings()
                .into_iter()
                .map(|warning| format!("warning: {}", warning));
            notices.splice(0..0, warnings);
            args
        };
        for notice in &notices {
            writeln!(self.out, "{}", notice)?;
        }
        let args = args?;

        tracing::trace!(command = name, ?args, "bound arguments");
        if debug {
            let named: Vec<_> = args.named().collect();
            writeln!(self.out, "parsed: {:?} {:?}", named, args.rest())?;
        }

        let mut ctx = Context::new(&mut env, &registry, &mut *self.out)
            .with_json_fallback(self.json_fallback.as_deref());
        let result = descriptor.call(args, &mut ctx);
        if ctx.exit_requested() {
            self.session.running = false;
        }
        drop(ctx);

        match result {
            Ok(value) => Ok(value),
            Err(CommandError::InvalidArgument(message)) => Err(ShellError::InvalidArgument {
                command: name.to_string(),
                message,
            }),
            Err(CommandError::Failed(e)) => {
                tracing::debug!(command = name, error = %e, "command failed");
                writeln!(self.out, "command error: {:#}", e)?;
                Ok(Value::Error(format!("{:#}", e)))
            }
        }
    }

    /// The Read-Eval-Print Loop.
    ///
    /// Ends on `exit`, end of input or an editor failure; Ctrl-C only
    /// abandons the line being typed.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl: Editor<ShellHelper, DefaultHistory> = Editor::new()?;
        rl.set_helper(Some(ShellHelper::new(
            Rc::clone(&self.registry),
            Rc::clone(&self.env),
        )));
        if let Some(path) = &self.history {
            if let Err(e) = rl.load_history(path) {
                tracing::info!(path = %path.display(), error = %e, "no history loaded");
            }
        }

        while self.session.running {
            let prompt = self.env.borrow().prompt();
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.run_line(&line)?;
                }
                Err(ReadlineError::Interrupted) => {
                    writeln!(self.out)?;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    writeln!(self.out, "error: {}", err)?;
                    break;
                }
            }
        }

        if let Some(path) = &self.history {
            if let Err(e) = rl.save_history(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save history");
            }
        }
        writeln!(self.out, "\nbye!")?;
        Ok(())
    }
}

impl Default for Interpreter {
    /// An interpreter knowing only the builtin commands.
    fn default() -> Self {
        let mut registry = Registry::new();
        register_builtins(&mut registry);
        Self::new(registry)
    }
}

fn coerce_or_keep(param: &ParamSpec, value: Value, notices: &mut Vec<String>) -> Value {
    match coerce(&param.ty, &value) {
        Ok(coerced) => coerced,
        Err(e) => {
            notices.push(format!("error: invalid value for {}: {}", param.name, e));
            value
        }
    }
}

/// Keywords bind first, then positionals fill the remaining parameters in
/// order. A variadic parameter takes every remaining positional; positionals
/// past the declared parameters end up in [`Args::rest`] uncoerced.
fn bind_arguments(
    descriptor: &CommandDescriptor,
    stage: &ParsedStage,
    resolver: &mut Resolver<'_>,
    piped_input: Option<&Value>,
    silent: bool,
    notices: &mut Vec<String>,
) -> Result<Args, ShellError> {
    let mut args = Args::new(descriptor.name());

    for (raw_key, raw_value) in stage.kwargs.iter() {
        let key = resolver.resolve_key(raw_key);
        let value = resolver.resolve(raw_value)?;
        let param = descriptor
            .params()
            .iter()
            .find(|p| p.name == key && p.ty != ParamType::Variadic);
        match param {
            Some(param) => {
                let value = coerce_or_keep(param, value, notices);
                args.bind(key, value);
            }
            None if silent => {}
            None => notices.push(format!(
                "warning: unknown parameter '{}' for {}",
                key,
                descriptor.name()
            )),
        }
    }

    let mut positionals = Vec::with_capacity(stage.args.len());
    for raw in stage.args.iter().skip(1) {
        positionals.push(resolver.resolve(raw)?);
    }
    if let Some(input) = piped_input {
        if !resolver.used_last_result() {
            positionals.push(input.clone());
        }
    }

    let mut positionals = positionals.into_iter();
    for param in descriptor.params() {
        if args.get(&param.name).is_some() {
            continue;
        }
        if param.ty == ParamType::Variadic {
            for value in positionals.by_ref() {
                args.push_rest(value);
            }
            continue;
        }
        match positionals.next() {
            Some(value) => {
                let value = coerce_or_keep(param, value, notices);
                args.bind(param.name.clone(), value);
            }
            None => match &param.default {
                Some(default) => args.bind(param.name.clone(), default.clone()),
                None => {
                    return Err(ShellError::MissingArgument {
                        command: descriptor.name().to_string(),
                        param: param.name.clone(),
                    });
                }
            },
        }
    }
    for value in positionals {
        args.push_rest(value);
    }

    Ok(args)
}
