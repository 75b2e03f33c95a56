use thiserror::Error;

/// Errors raised while launching external commands
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{program} binary not found")]
    NotFound { program: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub(crate) fn from_spawn(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            BuildError::NotFound {
                program: program.to_string(),
            }
        } else {
            BuildError::Spawn {
                program: program.to_string(),
                source,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
