use thiserror::Error;

/// Result type for VBAN-CMD operations
pub type Result<T> = std::result::Result<T, VbanError>;

/// Errors that can occur when talking to a remote Voicemeeter instance
#[derive(Error, Debug)]
pub enum VbanError {
    /// Invalid construction parameters (baud rate, channel, stream name, kind)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Hostname resolution failure or snapshot receive timeout.
    ///
    /// The session is unusable afterwards and must be rebuilt.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A parameter, batch key or value that cannot be addressed
    #[error("Value error: {0}")]
    Value(String),

    /// No profile with the requested name is loaded
    #[error("No profile with name '{name}' is loaded into memory\nKnown profiles: {known:?}")]
    ProfileNotFound {
        /// The name that was requested
        name: String,
        /// Every profile name currently loaded
        known: Vec<String>,
    },

    /// Datagram failed header or length validation
    #[error("Decode error: {0}")]
    Decode(String),

    /// Operation requires `login` to have completed
    #[error("Not connected")]
    NotConnected,

    /// Event channel receive error
    #[error("Channel error: {0}")]
    Channel(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML profile parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VbanError {
    /// True for errors that leave the session unusable
    pub fn is_connection(&self) -> bool {
        matches!(self, VbanError::Connection(_))
    }

    /// Failure text without the variant prefix for connection errors
    pub(crate) fn reason(&self) -> String {
        match self {
            VbanError::Connection(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strips_connection_prefix() {
        let timeout = VbanError::Connection("timeout waiting for RT packet".to_string());
        assert_eq!(timeout.reason(), "timeout waiting for RT packet");
        assert_eq!(
            VbanError::Connection(timeout.reason()).to_string(),
            "Connection error: timeout waiting for RT packet"
        );

        let io = VbanError::from(std::io::Error::new(std::io::ErrorKind::Other, "refused"));
        assert_eq!(io.reason(), "I/O error: refused");
    }
}
