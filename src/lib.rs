//! Vote notification listener.
//!
//! Server-list sites announce votes by opening a TCP connection and sending a
//! single RSA block encrypted with the server's public key. This crate binds
//! that port, decrypts and validates the vote, expands the configured reward
//! commands and hands them to the host's command sink.
//!
//! The protocol has no sender authentication and no replay protection: anyone
//! holding the public key can produce votes, and a captured packet can be
//! sent again.

pub mod config;
pub mod error;
pub mod key_management;
pub mod listener;
pub mod listener_stats;
pub mod logging;
pub mod service;
pub mod sink;
pub mod template;
pub mod vote_codec;


pub use config::{ListenerConfig, ListenerSettings};
pub use error::{AuditError, ConfigError, KeyError, ListenerError, ProtocolError, SinkError};
pub use key_management::KeyPair;
pub use listener::{ListenerState, VoteListener};
pub use listener_stats::StatsSnapshot;
pub use service::VotifierService;
pub use sink::{AuditSink, CommandSink, NoAudit, TracingAuditSink};
pub use template::DispatchMode;
pub use vote_codec::VoteRecord;
