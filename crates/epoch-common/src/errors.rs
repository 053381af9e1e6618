use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("unknown channel handle: {0}")]
    UnknownHandle(u64),

    #[error("transport closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no active {0} channel")]
    NotJoined(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EpochError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("realtime.project_ref is empty".into());
        assert_eq!(
            err.to_string(),
            "config validation error: realtime.project_ref is empty"
        );
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(
            TransportError::NotConnected.to_string(),
            "transport is not connected"
        );
        assert_eq!(
            TransportError::UnknownHandle(7).to_string(),
            "unknown channel handle: 7"
        );
        assert_eq!(TransportError::Closed.to_string(), "transport closed");
    }

    #[test]
    fn sync_error_display() {
        let err = SyncError::NotJoined("team".into());
        assert_eq!(err.to_string(), "no active team channel");
    }

    #[test]
    fn epoch_error_from_transport() {
        let err: EpochError = TransportError::Closed.into();
        assert!(matches!(err, EpochError::Transport(_)));
        assert_eq!(err.to_string(), "transport closed");
    }

    #[test]
    fn epoch_error_from_config() {
        let err: EpochError = ConfigError::ParseError("bad toml".into()).into();
        assert!(matches!(err, EpochError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn epoch_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EpochError = json_err.into();
        assert!(matches!(err, EpochError::Json(_)));
    }

    #[test]
    fn epoch_error_other() {
        let err = EpochError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
