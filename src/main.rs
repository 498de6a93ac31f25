use anyhow::Context;
use argh::FromArgs;
use command_shell::Interpreter;
use command_shell::env::{DEBUG, PROMPT, SILENT};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Interactive command shell with typed arguments, pipelines and variables.
struct Options {
    #[argh(option)]
    /// environment file merged into the environment at startup.
    env: Option<PathBuf>,

    #[argh(option)]
    /// prompt shown before every line.
    prompt: Option<String>,

    #[argh(switch)]
    /// do not print warnings about undefined variables and argument order.
    silent: bool,

    #[argh(switch)]
    /// print parsed stages and bound arguments before running commands.
    debug: bool,

    #[argh(option)]
    /// file the line editor history is loaded from and saved to.
    history: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// log more about what the shell is doing (to stderr).
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();
    init_tracing(options.verbose);

    let mut sh = Interpreter::default();
    {
        let mut env = sh.env_mut();
        if let Some(path) = &options.env {
            env.load_file(path, false)
                .with_context(|| format!("can't load environment from {}", path.display()))?;
        }
        if let Some(prompt) = options.prompt {
            env.set_var(PROMPT, prompt);
        }
        if options.silent {
            env.set_var(SILENT, true);
        }
        if options.debug {
            env.set_var(DEBUG, true);
        }
    }
    if let Some(path) = options.history {
        sh = sh.with_history(path);
    }

    tracing::info!(commands = sh.registry().len(), "starting repl");
    sh.repl().context("line editor failed")?;
    Ok(())
}
