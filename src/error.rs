use thiserror::Error;

/// Failures that stop the current line. None of them ends the REPL.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("unknown command: '{0}'")]
    UnknownCommand(String),

    #[error("trailing piping found in command")]
    TrailingPipe,

    #[error("invalid json literal '{literal}': {source}")]
    InvalidJson {
        literal: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{command}: missing required argument '{param}'")]
    MissingArgument { command: String, param: String },

    #[error("{command}: {message}")]
    InvalidArgument { command: String, message: String },

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}
