//! An embeddable, line-oriented command shell.
//!
//! Lines are split into pipeline stages, each stage names a registered
//! command and passes it positional and `name=value` arguments. Arguments
//! are resolved (`_`, `$var`, quoted strings, `^json` literals, numbers) and
//! coerced to the types the command declares before its handler runs. The
//! result of one stage feeds the next.
//!
//! The main entry point is [`Interpreter`], which runs single lines or a
//! full REPL on top of rustyline. Commands are described with
//! [`CommandDescriptor`] and live in a [`Registry`]; the public modules
//! [`command`] and [`env`] expose the types handlers work with.

mod builtin;
pub mod coerce;
pub mod command;
pub mod completion;
pub mod env;
pub mod error;
mod interpreter;
mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod value;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

pub use builtin::register_builtins;
pub use coerce::ParamType;
pub use command::{Args, CommandDescriptor, CommandError, Context, Handler};
pub use env::Environment;
pub use error::ShellError;
pub use io_adapters::{Captured, MemWriter};
pub use registry::Registry;
pub use value::Value;
