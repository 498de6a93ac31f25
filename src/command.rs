//! What a command is: its descriptor, the arguments it receives and the
//! context it runs in.
//!
//! Handlers are plain closures or anything implementing [`Handler`]. They
//! get an [`Args`] already bound to their declared parameters and a
//! [`Context`] giving access to the environment, the registry and the
//! output.

use crate::coerce::ParamType;
use crate::env::{Environment, JsonFallback};
use crate::parser::KeywordArgs;
use crate::registry::Registry;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use thiserror::Error;

/// Error returned by a command handler.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The handler rejected one of its arguments. Reported to the user and
    /// the rest of the line is skipped.
    #[error("{0}")]
    InvalidArgument(String),

    /// Any other failure. Reported and captured as the stage's result
    /// ([`Value::Error`]); the pipeline goes on.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// One declared parameter of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.ty, &self.default) {
            (ParamType::Variadic, _) => write!(f, "*{}", self.name),
            (ty, Some(default)) => write!(f, "{}: {} = {}", self.name, ty, default.repr()),
            (ty, None) => write!(f, "{}: {}", self.name, ty),
        }
    }
}

/// Arguments bound to a command's parameters, after resolution and coercion.
///
/// Every declared parameter is present (given, or its default); values typed
/// past the declared parameters, or swallowed by a variadic one, are in
/// [`Args::rest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    command: String,
    values: Vec<(String, Value)>,
    rest: Vec<Value>,
}

impl Args {
    /// Empty arguments for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Bind (or rebind) a named argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value.into());
        self
    }

    /// Bind `name` to `value`, keeping the position of an earlier binding.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Append a value that belongs to no named parameter.
    pub fn push_rest(&mut self, value: Value) {
        self.rest.push(value);
    }

    /// Name of the command being called.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Bound parameters in declaration order.
    pub fn named(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    fn expect(&self, name: &str) -> Result<&Value, CommandError> {
        self.get(name).ok_or_else(|| {
            CommandError::InvalidArgument(format!("missing argument '{}'", name))
        })
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> CommandError {
        CommandError::InvalidArgument(format!(
            "argument '{}' expected {}, got {} {}",
            name,
            expected,
            found.type_name(),
            found.repr()
        ))
    }

    /// The bound value, `None` when the parameter is absent.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_default()
    }

    /// Typed accessors. A missing or differently typed argument is a
    /// [`CommandError::InvalidArgument`].
    pub fn str(&self, name: &str) -> Result<&str, CommandError> {
        match self.expect(name)? {
            Value::Str(s) => Ok(s),
            other => Err(self.mismatch(name, "str", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, CommandError> {
        match self.expect(name)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.mismatch(name, "int", other)),
        }
    }

    /// Accepts integers too.
    pub fn float(&self, name: &str) -> Result<f64, CommandError> {
        match self.expect(name)? {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(self.mismatch(name, "float", other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, CommandError> {
        match self.expect(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.mismatch(name, "bool", other)),
        }
    }

    /// JSON form of any argument that has one.
    pub fn json(&self, name: &str) -> Result<JsonValue, CommandError> {
        let value = self.expect(name)?;
        value
            .to_json()
            .ok_or_else(|| self.mismatch(name, "json", value))
    }
}

/// What a running command can see and touch.
pub struct Context<'a> {
    pub env: &'a mut Environment,
    pub registry: &'a Registry,
    pub out: &'a mut dyn Write,
    pub json_fallback: Option<&'a JsonFallback>,
    exit_requested: bool,
}

impl<'a> Context<'a> {
    pub fn new(env: &'a mut Environment, registry: &'a Registry, out: &'a mut dyn Write) -> Self {
        Self {
            env,
            registry,
            out,
            json_fallback: None,
            exit_requested: false,
        }
    }

    /// Serializer used by commands that save values which have no native
    /// JSON form.
    pub fn with_json_fallback(mut self, fallback: Option<&'a JsonFallback>) -> Self {
        self.json_fallback = fallback;
        self
    }

    /// Ask the REPL to stop once the current line is done.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// Whether a command asked the REPL to stop.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}

/// Object-safe trait for anything that can run as a command.
///
/// Implemented by builtins via a blanket impl and by plain closures.
pub trait Handler {
    fn call(&self, args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError>;
}

impl<F> Handler for F
where
    F: Fn(Args, &mut Context<'_>) -> Result<Value, CommandError>,
{
    fn call(&self, args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        self(args, ctx)
    }
}

/// What a completion hook gets to look at.
pub struct CompletionContext<'a> {
    pub registry: &'a Registry,
    pub env: &'a Environment,
    pub descriptor: &'a CommandDescriptor,
}

/// Per-command tab completion, replacing the generic parameter-name
/// completion. Returns the `state`-th candidate, `None` once exhausted.
pub trait CompletionHook {
    fn complete(
        &self,
        ctx: &CompletionContext<'_>,
        state: usize,
        args: &[String],
        kwargs: &KeywordArgs,
    ) -> Option<String>;
}

impl<F> CompletionHook for F
where
    F: Fn(&CompletionContext<'_>, usize, &[String], &KeywordArgs) -> Option<String>,
{
    fn complete(
        &self,
        ctx: &CompletionContext<'_>,
        state: usize,
        args: &[String],
        kwargs: &KeywordArgs,
    ) -> Option<String> {
        self(ctx, state, args, kwargs)
    }
}

/// A registered command: name, parameter schema, help and handler.
///
/// Built once with the builder methods and never changed afterwards.
///
/// ```
/// use command_shell::{CommandDescriptor, ParamType, Value};
///
/// let greet = CommandDescriptor::new("hello", |args, _ctx| {
///     Ok(Value::from(format!("Hello {}!", args.str("name")?)))
/// })
/// .param("name", ParamType::String)
/// .returns(ParamType::String)
/// .help("Say hello");
/// assert_eq!(greet.signature(), "hello(name: str) -> str");
/// ```
#[derive(Clone)]
pub struct CommandDescriptor {
    name: String,
    params: Vec<ParamSpec>,
    returns: ParamType,
    help: String,
    handler: Rc<dyn Handler>,
    completion: Option<Rc<dyn CompletionHook>>,
}

impl CommandDescriptor {
    /// A command with no parameters, returning `any`, run by a closure.
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Args, &mut Context<'_>) -> Result<Value, CommandError> + 'static,
    {
        Self::from_handler(name, handler)
    }

    /// Same as [`CommandDescriptor::new`] for any [`Handler`].
    pub fn from_handler(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ParamType::Any,
            help: String::new(),
            handler: Rc::new(handler),
            completion: None,
        }
    }

    /// Declare the next parameter. Declaration order is positional order.
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    /// Declare a parameter that takes `default` when not given.
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            ty,
            default: Some(default.into()),
        });
        self
    }

    pub fn returns(mut self, ty: ParamType) -> Self {
        self.returns = ty;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Replace parameter-name completion for this command.
    pub fn completion<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CompletionContext<'_>, usize, &[String], &KeywordArgs) -> Option<String> + 'static,
    {
        self.completion = Some(Rc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn return_type(&self) -> &ParamType {
        &self.returns
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn completion_hook(&self) -> Option<&dyn CompletionHook> {
        self.completion.as_deref()
    }

    /// `name(param: type, ...) -> type`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ParamSpec::to_string).collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.returns)
    }

    /// Run the handler with already bound arguments.
    pub fn call(&self, args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        self.handler.call(args, ctx)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_lists_defaults_and_variadics() {
        let cmd = CommandDescriptor::new("idx", |_args, _ctx| Ok(Value::None))
            .param("d", ParamType::Json)
            .param("idxs", ParamType::Variadic)
            .param_with_default("strict", ParamType::Boolean, false);
        assert_eq!(
            cmd.signature(),
            "idx(d: json, *idxs, strict: bool = false) -> any"
        );
    }

    #[test]
    fn test_typed_accessors() {
        let args = Args::new("create_book")
            .with("title", "The Hobbit")
            .with("year", 1937)
            .with("price", 9.99);
        assert_eq!(args.str("title").unwrap(), "The Hobbit");
        assert_eq!(args.int("year").unwrap(), 1937);
        assert_eq!(args.float("price").unwrap(), 9.99);
        assert_eq!(args.float("year").unwrap(), 1937.0);

        let err = args.int("title").unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument 'title' expected int, got str \"The Hobbit\""
        );
        assert!(matches!(
            args.str("missing"),
            Err(CommandError::InvalidArgument(_))
        ));
        assert_eq!(args.value("missing"), Value::None);
    }

    #[test]
    fn test_closure_handler_runs_with_context() {
        let cmd = CommandDescriptor::new("remember", |args, ctx| {
            let value = args.value("value");
            ctx.env.set_var("REMEMBERED", value.clone());
            writeln!(ctx.out, "ok").map_err(anyhow::Error::from)?;
            Ok(value)
        })
        .param("value", ParamType::Any);

        let registry = Registry::default();
        let mut env = Environment::empty();
        let mut out = Vec::new();
        let mut ctx = Context::new(&mut env, &registry, &mut out);
        let result = cmd.call(Args::new("remember").with("value", 3), &mut ctx);
        assert_eq!(result.unwrap(), Value::Int(3));
        assert_eq!(env.get_var("REMEMBERED"), Some(&Value::Int(3)));
        assert_eq!(String::from_utf8(out).unwrap(), "ok\n");
    }
}
