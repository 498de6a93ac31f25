use crate::coerce::ParamType;
use crate::command::{Args, CommandDescriptor, CommandError, CompletionContext, Context, Handler};
use crate::env::DEFAULT_ENV_FILE;
use crate::parser::KeywordArgs;
use crate::registry::Registry;
use crate::resolver::is_falsey_str;
use crate::value::Value;
use anyhow::{Context as _, anyhow};
use serde_json::{Map, Value as JsonValue};
use std::marker::PhantomData;

/// Built-in commands known to the shell at compile time.
///
/// Each builtin describes its own parameters and runs in-process against the
/// interpreter's [`Context`].
pub(crate) trait BuiltinCommand {
    /// Canonical name of the command, e.g. "echo" or "set".
    fn name() -> &'static str;

    /// Adds parameters, return type and help to the bare descriptor.
    fn describe(cmd: CommandDescriptor) -> CommandDescriptor;

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError>;
}

/// Adapter turning a [`BuiltinCommand`] type into a [`Handler`].
pub(crate) struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> Handler for Factory<T> {
    fn call(&self, args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        T::execute(args, ctx)
    }
}

fn descriptor<T: BuiltinCommand + 'static>() -> CommandDescriptor {
    T::describe(CommandDescriptor::from_handler(
        T::name(),
        Factory::<T>::default(),
    ))
}

/// Register every builtin into `registry`.
pub fn register_builtins(registry: &mut Registry) {
    registry.register(descriptor::<Help>());
    registry.register(descriptor::<Inspect>());
    registry.register(descriptor::<Set>());
    registry.register(descriptor::<Echo>());
    registry.register(descriptor::<DumpEnv>());
    registry.register(descriptor::<SaveEnv>());
    registry.register(descriptor::<LoadEnv>());
    registry.register(descriptor::<Test>());
    registry.register(descriptor::<Idx>());
    registry.register(descriptor::<Key>());
    registry.register(descriptor::<Exit>());
}

fn write_out(ctx: &mut Context<'_>, text: &str) -> Result<(), CommandError> {
    writeln!(ctx.out, "{}", text).context("failed to write output")?;
    Ok(())
}

fn unknown_command(name: &str) -> CommandError {
    CommandError::InvalidArgument(format!("unknown command: '{}'", name))
}

/// List every command, or show one command's signature and help.
pub struct Help;

impl Help {
    /// Completes the command name argument.
    fn complete(
        ctx: &CompletionContext<'_>,
        state: usize,
        args: &[String],
        _kwargs: &KeywordArgs,
    ) -> Option<String> {
        if args.len() > 1 {
            return None;
        }
        let prefix = args.last().map(String::as_str).unwrap_or("");
        ctx.registry
            .names()
            .filter(|name| name.starts_with(prefix))
            .nth(state)
            .map(str::to_string)
    }
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param_with_default("name", ParamType::optional(ParamType::String), Value::None)
            .returns(ParamType::Any)
            .help("Get help for how to use the shell, or for the command NAME")
            .completion(Help::complete)
    }

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        match args.value("name") {
            Value::None => {
                let lines: Vec<String> = ctx
                    .registry
                    .iter()
                    .map(|cmd| format!("- {}", cmd.signature()))
                    .collect();
                write_out(ctx, "Available commands:")?;
                for line in lines {
                    write_out(ctx, &line)?;
                }
            }
            name => {
                let name = name.to_string();
                let (signature, help) = match ctx.registry.get(&name) {
                    Some(cmd) => (cmd.signature(), cmd.help_text().to_string()),
                    None => return Err(unknown_command(&name)),
                };
                write_out(ctx, &signature)?;
                if !help.is_empty() {
                    write_out(ctx, &format!("    {}", help))?;
                }
            }
        }
        Ok(Value::None)
    }
}

/// Show the declared parameter types of a command.
pub struct Inspect;

impl BuiltinCommand for Inspect {
    fn name() -> &'static str {
        "inspect"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param("name", ParamType::String)
            .returns(ParamType::Json)
            .help("Map each parameter of the command NAME to its declared type")
    }

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let name = args.str("name")?;
        let cmd = ctx.registry.get(name).ok_or_else(|| unknown_command(name))?;

        let mut types = Map::new();
        for param in cmd.params() {
            types.insert(param.name.clone(), JsonValue::String(param.ty.to_string()));
        }
        types.insert(
            "return".to_string(),
            JsonValue::String(cmd.return_type().to_string()),
        );
        Ok(Value::Json(JsonValue::Object(types)))
    }
}

/// Store a value in the environment.
pub struct Set;

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param("key", ParamType::String)
            .param("value", ParamType::Any)
            .returns(ParamType::Any)
            .help("Set the variable KEY to VALUE and return VALUE")
    }

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let key = args.str("key")?;
        let value = args.value("value");
        ctx.env.set_var(key, value.clone());
        Ok(value)
    }
}

/// Print a value and return it.
pub struct Echo;

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param("value", ParamType::Any)
            .returns(ParamType::Any)
            .help("Print the value and also return it")
    }

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let value = args.value("value");
        write_out(ctx, &value.to_string())?;
        Ok(value)
    }
}

pub struct DumpEnv;

impl BuiltinCommand for DumpEnv {
    fn name() -> &'static str {
        "dumpenv"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.returns(ParamType::Json).help("Dump the environment")
    }

    fn execute(_args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let vars: Map<String, JsonValue> = ctx
            .env
            .vars()
            .map(|(k, v)| (k.to_string(), v.to_json_lossy()))
            .collect();
        Ok(Value::Json(JsonValue::Object(vars)))
    }
}

pub struct SaveEnv;

impl BuiltinCommand for SaveEnv {
    fn name() -> &'static str {
        "saveenv"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param_with_default("name", ParamType::String, DEFAULT_ENV_FILE)
            .returns(ParamType::String)
            .help("Save the current environment to a json file and return its name")
    }

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let name = args.str("name")?;
        ctx.env
            .save_file(name, ctx.json_fallback)
            .map_err(anyhow::Error::from)?;
        Ok(Value::from(name))
    }
}

pub struct LoadEnv;

impl BuiltinCommand for LoadEnv {
    fn name() -> &'static str {
        "loadenv"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param_with_default("name", ParamType::String, DEFAULT_ENV_FILE)
            .param_with_default("overwrite", ParamType::Boolean, false)
            .returns(ParamType::Any)
            .help(
                "Load an environment from a json file. Replaces the current environment when \
                 OVERWRITE is true, otherwise merges into it",
            )
    }

    fn execute(args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let name = args.str("name")?;
        let overwrite = args.bool("overwrite")?;
        ctx.env
            .load_file(name, overwrite)
            .map_err(anyhow::Error::from)?;
        Ok(Value::None)
    }
}

/// Truthiness check: only the empty string, `false` and `False` are false.
pub struct Test;

impl BuiltinCommand for Test {
    fn name() -> &'static str {
        "test"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param("value", ParamType::Any)
            .returns(ParamType::Boolean)
            .help("Convert any value to a boolean. The only false values are empty strings, `false` and `False`")
    }

    fn execute(args: Args, _ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let falsey = match args.value("value") {
            Value::Bool(b) => !b,
            Value::Str(s) => is_falsey_str(&s),
            _ => false,
        };
        Ok(Value::Bool(!falsey))
    }
}

/// Descend into nested JSON arrays.
pub struct Idx;

impl BuiltinCommand for Idx {
    fn name() -> &'static str {
        "idx"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param("d", ParamType::Json)
            .param("idxs", ParamType::Variadic)
            .returns(ParamType::Any)
            .help(
                "Index into the list D with each of IDXS in turn, stopping at the first \
                 non-list item. `idx ^[0,[1,2]] 1 0` returns 1",
            )
    }

    fn execute(args: Args, _ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let mut current = args.json("d")?;
        for idx in args.rest() {
            let JsonValue::Array(items) = &current else {
                break;
            };
            let i = match idx {
                Value::Int(i) => *i,
                other => {
                    return Err(CommandError::InvalidArgument(format!(
                        "index must be an int, got {} {}",
                        other.type_name(),
                        other.repr()
                    )));
                }
            };
            let len = items.len() as i64;
            let pos = if i < 0 { len + i } else { i };
            current = usize::try_from(pos)
                .ok()
                .and_then(|pos| items.get(pos))
                .cloned()
                .ok_or_else(|| anyhow!("list index {} out of range (len {})", i, len))?;
        }
        Ok(Value::from_json(current))
    }
}

/// Descend into nested JSON objects.
pub struct Key;

impl BuiltinCommand for Key {
    fn name() -> &'static str {
        "key"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.param("d", ParamType::Json)
            .param("keys", ParamType::Variadic)
            .returns(ParamType::Any)
            .help(
                "Look up each of KEYS in turn in the object D, stopping at the first \
                 non-object item. `key ^{\"a\":0} a` returns 0",
            )
    }

    fn execute(args: Args, _ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        let mut current = args.json("d")?;
        for key in args.rest() {
            let JsonValue::Object(map) = &current else {
                break;
            };
            current = map.get(&key.to_string()).cloned().unwrap_or(JsonValue::Null);
        }
        Ok(Value::from_json(current))
    }
}

pub struct Exit;

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn describe(cmd: CommandDescriptor) -> CommandDescriptor {
        cmd.returns(ParamType::Any).help("Exit from the REPL loop")
    }

    fn execute(_args: Args, ctx: &mut Context<'_>) -> Result<Value, CommandError> {
        ctx.request_exit();
        Ok(Value::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use serde_json::json;

    fn builtins() -> Registry {
        let mut registry = Registry::new();
        register_builtins(&mut registry);
        registry
    }

    fn run<T: BuiltinCommand>(args: Args, env: &mut Environment) -> (Value, String) {
        let registry = builtins();
        let mut out = Vec::new();
        let mut ctx = Context::new(env, &registry, &mut out);
        let value = T::execute(args, &mut ctx).unwrap();
        (value, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_echo_prints_and_returns() {
        let mut env = Environment::new();
        let (value, out) = run::<Echo>(Args::new("echo").with("value", "hello world"), &mut env);
        assert_eq!(value, Value::from("hello world"));
        assert_eq!(out, "hello world\n");
    }

    #[test]
    fn test_set_stores_value() {
        let mut env = Environment::new();
        let (value, _) = run::<Set>(Args::new("set").with("key", "X").with("value", 10), &mut env);
        assert_eq!(value, Value::Int(10));
        assert_eq!(env.get_var("X"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_test_falsey_values() {
        let mut env = Environment::new();
        let mut check = |v: Value| run::<Test>(Args::new("test").with("value", v), &mut env).0;
        assert_eq!(check(Value::from("")), Value::Bool(false));
        assert_eq!(check(Value::from("False")), Value::Bool(false));
        assert_eq!(check(Value::Bool(false)), Value::Bool(false));
        assert_eq!(check(Value::from("no")), Value::Bool(true));
        assert_eq!(check(Value::Int(0)), Value::Bool(true));
        assert_eq!(check(Value::None), Value::Bool(true));
    }

    #[test]
    fn test_idx_descends_lists() {
        let mut env = Environment::new();
        let mut args = Args::new("idx").with("d", json!([0, [1, 2]]));
        args.push_rest(Value::Int(1));
        args.push_rest(Value::Int(0));
        args.push_rest(Value::Int(12));
        let (value, _) = run::<Idx>(args, &mut env);
        assert_eq!(value, Value::Int(1));

        let mut args = Args::new("idx").with("d", json!([0, [1, 2]]));
        args.push_rest(Value::Int(-1));
        let (value, _) = run::<Idx>(args, &mut env);
        assert_eq!(value, Value::Json(json!([1, 2])));
    }

    #[test]
    fn test_idx_out_of_range_fails() {
        let registry = builtins();
        let mut env = Environment::new();
        let mut out = Vec::new();
        let mut ctx = Context::new(&mut env, &registry, &mut out);
        let mut args = Args::new("idx").with("d", json!([0]));
        args.push_rest(Value::Int(3));
        let err = Idx::execute(args, &mut ctx).unwrap_err();
        assert!(matches!(err, CommandError::Failed(_)));
    }

    #[test]
    fn test_key_descends_objects() {
        let mut env = Environment::new();
        let mut args = Args::new("key").with("d", json!({"a": {"b": 0}}));
        args.push_rest(Value::from("a"));
        args.push_rest(Value::from("b"));
        args.push_rest(Value::from("c"));
        let (value, _) = run::<Key>(args, &mut env);
        assert_eq!(value, Value::Int(0));

        let mut args = Args::new("key").with("d", json!({"a": 0}));
        args.push_rest(Value::from("missing"));
        let (value, _) = run::<Key>(args, &mut env);
        assert_eq!(value, Value::None);
    }

    #[test]
    fn test_inspect_lists_types() {
        let mut env = Environment::new();
        let (value, _) = run::<Inspect>(Args::new("inspect").with("name", "loadenv"), &mut env);
        assert_eq!(
            value,
            Value::Json(json!({"name": "str", "overwrite": "bool", "return": "any"}))
        );
    }

    #[test]
    fn test_help_lists_commands() {
        let mut env = Environment::new();
        let (_, out) = run::<Help>(Args::new("help").with("name", Value::None), &mut env);
        assert!(out.starts_with("Available commands:\n"));
        assert!(out.contains("- set(key: str, value: any) -> any\n"));
        assert!(out.contains("- idx(d: json, *idxs) -> any\n"));

        let (_, out) = run::<Help>(Args::new("help").with("name", "echo"), &mut env);
        assert_eq!(
            out,
            "echo(value: any) -> any\n    Print the value and also return it\n"
        );
    }

    #[test]
    fn test_help_completes_command_names() {
        let registry = builtins();
        let env = Environment::new();
        let help = registry.get("help").unwrap();
        let ctx = CompletionContext {
            registry: &registry,
            env: &env,
            descriptor: help,
        };
        let hook = help.completion_hook().unwrap();
        let args = vec!["s".to_string()];
        let kwargs = KeywordArgs::new();
        assert_eq!(hook.complete(&ctx, 0, &args, &kwargs), Some("saveenv".into()));
        assert_eq!(hook.complete(&ctx, 1, &args, &kwargs), Some("set".into()));
        assert_eq!(hook.complete(&ctx, 2, &args, &kwargs), None);
    }

    #[test]
    fn test_exit_requests_termination() {
        let registry = builtins();
        let mut env = Environment::new();
        let mut out = Vec::new();
        let mut ctx = Context::new(&mut env, &registry, &mut out);
        Exit::execute(Args::new("exit"), &mut ctx).unwrap();
        assert!(ctx.exit_requested());
    }
}
