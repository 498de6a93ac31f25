use command_shell::value::Foreign;
use command_shell::{
    Captured, CommandDescriptor, Environment, Interpreter, MemWriter, ParamType, Registry, Value,
};
use serde_json::json;
use std::fmt;
use std::io::Write;

fn shell() -> (Interpreter, Captured) {
    let (out, captured) = MemWriter::with_handle();
    (Interpreter::default().with_output(out), captured)
}

#[derive(Debug)]
struct BookId(u32);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "book#{}", self.0)
    }
}

fn library_shell() -> (Interpreter, Captured) {
    let (mut sh, captured) = shell();
    sh.register(
        CommandDescriptor::new("create_book", |args, ctx| {
            let title = args.str("title")?;
            let year = args.int("year")?;
            writeln!(ctx.out, "created {} ({})", title, year).map_err(anyhow::Error::from)?;
            Ok(Foreign::new(BookId(7)).into())
        })
        .param("title", ParamType::String)
        .param_with_default("year", ParamType::Integer, 2000)
        .returns(ParamType::Any)
        .help("Create a book"),
    );
    (sh, captured)
}

#[test]
fn test_set_then_echo_variable() {
    let (mut sh, out) = shell();
    sh.run_line("set X 10").unwrap();
    sh.run_line("echo $X").unwrap();
    assert_eq!(out.text(), "< 10\n10\n< 10\n");
}

#[test]
fn test_builtin_falsey_words() {
    let (mut sh, _out) = shell();
    for (line, expected) in [
        (r#"test """#, false),
        ("test False", false),
        ("test false", false),
        ("test no", true),
        ("test 0", true),
        ("test ^[]", true),
    ] {
        sh.run_line(line).unwrap();
        assert_eq!(sh.last_result(), &Value::Bool(expected), "{}", line);
    }
}

#[test]
fn test_nested_json_access() {
    let (mut sh, _out) = shell();
    sh.run_line("idx ^[0,[1,2]] 1 0").unwrap();
    assert_eq!(sh.last_result(), &Value::Int(1));

    sh.run_line(r#"key ^'{"a": {"b": [3]}}' a b | idx _ 0"#).unwrap();
    assert_eq!(sh.last_result(), &Value::Int(3));
}

#[test]
fn test_last_result_carries_over_lines() {
    let (mut sh, out) = shell();
    sh.run_line("echo ^[1,2]").unwrap();
    sh.run_line("set LIST _").unwrap();
    assert_eq!(sh.env().get_var("LIST"), Some(&Value::Json(json!([1, 2]))));
    assert!(out.text().ends_with("< [1,2]\n"));
}

#[test]
fn test_registered_command_gets_typed_arguments() {
    let (mut sh, out) = library_shell();
    sh.run_line("create_book 'The Hobbit' 1937 | set BOOK").unwrap();
    let text = out.text();
    assert!(text.starts_with("created The Hobbit (1937)\n< "));
    assert!(text.ends_with("BookId(book#7)\n"));
    let env = sh.env();
    let book = env.get_var("BOOK").unwrap();
    match book {
        Value::Foreign(f) => assert_eq!(f.downcast_ref::<BookId>().unwrap().0, 7),
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn test_defaults_fill_missing_parameters() {
    let (mut sh, out) = library_shell();
    sh.run_line("create_book title=Dune").unwrap();
    assert!(out.text().starts_with("created Dune (2000)\n"));
}

#[test]
fn test_help_and_inspect_describe_commands() {
    let (mut sh, out) = library_shell();
    sh.run_line("help create_book").unwrap();
    assert_eq!(
        out.take(),
        "create_book(title: str, year: int = 2000) -> any\n    Create a book\n< none\n"
    );

    sh.run_line("inspect create_book").unwrap();
    assert_eq!(
        sh.last_result(),
        &Value::Json(json!({"title": "str", "year": "int", "return": "any"}))
    );

    sh.run_line("help nope").unwrap();
    assert_eq!(out.take().lines().next(), Some("error: help: unknown command: 'nope'"));
}

#[test]
fn test_saveenv_loadenv_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let path = path.to_str().unwrap();

    let (mut sh, _out) = shell();
    sh.run_line("set COUNT 3").unwrap();
    sh.run_line("set NAME 'Bilbo Baggins'").unwrap();
    sh.run_line(r#"set NESTED ^{"a":[1,null]}"#).unwrap();
    sh.run_line(&format!("saveenv {}", path)).unwrap();
    assert_eq!(sh.last_result(), &Value::from(path));

    let (mut fresh, _out) = shell();
    fresh.run_line("set ONLY_HERE 1").unwrap();
    fresh.run_line(&format!("loadenv {} overwrite=True", path)).unwrap();
    assert_eq!(*fresh.env(), *sh.env());
}

#[test]
fn test_loadenv_merges_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.json");
    std::fs::write(&path, r#"{"PROMPT": "$ ", "USER": "frodo"}"#).unwrap();

    let (mut sh, _out) = shell();
    sh.run_line("set KEEP 1").unwrap();
    sh.run_line(&format!("loadenv '{}'", path.display())).unwrap();
    let env = sh.env();
    assert_eq!(env.prompt(), "$ ");
    assert_eq!(env.get_var("USER"), Some(&Value::from("frodo")));
    assert_eq!(env.get_var("KEEP"), Some(&Value::Int(1)));
}

#[test]
fn test_saveenv_needs_fallback_for_foreign_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.json");
    let save = format!("saveenv '{}'", path.display());

    let (mut sh, out) = library_shell();
    sh.run_line("create_book Dune | set BOOK").unwrap();
    sh.run_line(&save).unwrap();
    assert!(out.take().contains("command error: "));
    assert!(!path.exists());

    sh.set_json_fallback(|value| match value {
        Value::Foreign(f) => Some(json!(f.to_string())),
        _ => None,
    });
    sh.run_line(&save).unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["BOOK"], json!("book#7"));
}

#[test]
fn test_custom_registry_without_builtins() {
    let mut registry = Registry::new();
    registry.register(
        CommandDescriptor::new("double", |args, _ctx| Ok(Value::Int(args.int("n")? * 2)))
            .param("n", ParamType::Integer),
    );
    let (out, captured) = MemWriter::with_handle();
    let mut sh = Interpreter::new(registry)
        .with_environment(Environment::empty())
        .with_output(out);

    sh.run_line("double 4 | double").unwrap();
    assert_eq!(sh.last_result(), &Value::Int(16));
    sh.run_line("echo 1").unwrap();
    assert!(captured.text().contains("error: unknown command: 'echo'\n"));
}
