// rust/tracker-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {

    #[error("Invalid tracker configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to spawn tracker process '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tracker handshake failed: {message}")]
    Protocol {
        message: String,
    },

    #[error("I/O error during {phase}: {source}")]
    Io {
        phase: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Tracker process has not been started")]
    NotStarted,

    #[error("Tracker process was already started")]
    AlreadyStarted,

    #[error("Platform detection failed: unsupported {kind} '{name}'")]
    UnsupportedPlatform {
        kind: &'static str,
        name: String,
    },

    #[error("Resource extraction failed: '{path}' was not found")]
    NotFound {
        path: String,
    },

    #[error("Resource extraction failed: invalid name '{path}': {message}")]
    InvalidName {
        path: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, TrackerError>;

// Convenience constructors
impl TrackerError {

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn io(phase: &'static str, source: std::io::Error) -> Self {
        Self::Io { phase, source }
    }

    pub fn unsupported_os(name: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            kind: "os",
            name: name.into(),
        }
    }

    pub fn unsupported_arch(name: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            kind: "architecture",
            name: name.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn invalid_name(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidName {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error came out of the handshake with the tracker.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}
