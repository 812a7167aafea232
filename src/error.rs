use std::net::SocketAddr;
use thiserror::Error;

/// Failures while creating, loading or exporting RSA key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("RSA key generation failed: {0}")]
    Generation(String),
    #[error("key cannot be encoded or decoded: {0}")]
    KeyFormat(String),
    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-connection protocol failures. None of these ever leave the accept loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("packet could not be decrypted with the configured key")]
    Decryption,
    #[error("malformed vote packet: {0}")]
    MalformedPacket(&'static str),
    #[error("username {0:?} contains characters outside [A-Za-z0-9_]")]
    InvalidUsername(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {addr:?}")]
    InvalidAddress { addr: String },
    #[error("invalid private key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("buffer size must be greater than zero")]
    ZeroBuffer,
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind vote listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("vote listener task failed: {0}")]
    Task(String),
}

/// Raised by a [`CommandSink`](crate::sink::CommandSink) that could not deliver a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("command sink unavailable: {0}")]
    Unavailable(String),
    #[error("command sink did not accept the command within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);
