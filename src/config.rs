use crate::error::ConfigError;
use crate::key_management::KeyPair;
use crate::template::DispatchMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8192;
/// One 2048-bit RSA block.
pub const DEFAULT_BUFFER_SIZE: u32 = 256;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 5;

/// Listener settings as supplied by the host, before validation.
///
/// The host decides where these come from; every field has a default so a
/// partial document deserializes. `Debug` never prints the private key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    pub enabled: bool,
    pub ip: String,
    pub port: u16,
    pub commands: Vec<String>,
    /// PEM encoded RSA private key (PKCS#8 or PKCS#1).
    pub private_key: String,
    pub buffer_size: u32,
    /// Per-connection read deadline. Unset means a silent peer can hold the
    /// accept loop indefinitely.
    pub read_timeout_secs: Option<u64>,
    pub dispatch_timeout_secs: u64,
    pub dispatch_mode: DispatchMode,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ip: Ipv4Addr::UNSPECIFIED.to_string(),
            port: DEFAULT_PORT,
            commands: Vec::new(),
            private_key: String::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout_secs: None,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            dispatch_mode: DispatchMode::default(),
        }
    }
}

impl fmt::Debug for ListenerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let private_key = if self.private_key.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("ListenerSettings")
            .field("enabled", &self.enabled)
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("commands", &self.commands)
            .field("private_key", &format_args!("{private_key}"))
            .field("buffer_size", &self.buffer_size)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("dispatch_timeout_secs", &self.dispatch_timeout_secs)
            .field("dispatch_mode", &self.dispatch_mode)
            .finish()
    }
}

impl ListenerSettings {
    /// Validate and turn the raw settings into a [`ListenerConfig`].
    pub fn resolve(&self) -> Result<ListenerConfig, ConfigError> {
        let ip = if self.ip.trim().is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            self.ip
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidAddress { addr: self.ip.clone() })?
        };

        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBuffer);
        }

        let key = KeyPair::from_private_pem(&self.private_key)?;

        Ok(ListenerConfig {
            enabled: self.enabled,
            addr: SocketAddr::new(ip, self.port),
            commands: self.commands.clone(),
            key: Arc::new(key),
            buffer_size: self.buffer_size as usize,
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            dispatch_timeout: Duration::from_secs(self.dispatch_timeout_secs),
            dispatch_mode: self.dispatch_mode,
        })
    }
}

/// Validated listener configuration. Never mutated after construction;
/// reconfiguring means handing a new value to the service.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub enabled: bool,
    pub addr: SocketAddr,
    pub commands: Vec<String>,
    pub key: Arc<KeyPair>,
    pub buffer_size: usize,
    pub read_timeout: Option<Duration>,
    pub dispatch_timeout: Duration,
    pub dispatch_mode: DispatchMode,
}

impl ListenerConfig {
    /// Enabled configuration with default buffer and timeouts and no commands.
    pub fn new(addr: SocketAddr, key: Arc<KeyPair>) -> Self {
        Self {
            enabled: true,
            addr,
            commands: Vec::new(),
            key,
            buffer_size: DEFAULT_BUFFER_SIZE as usize,
            read_timeout: None,
            dispatch_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
            dispatch_mode: DispatchMode::default(),
        }
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyError;
    use crate::key_management::test_keys;

    fn settings_with_key() -> ListenerSettings {
        ListenerSettings {
            private_key: test_keys::shared().private_key_pem().unwrap(),
            ..ListenerSettings::default()
        }
    }

    #[test]
    fn defaults_match_the_protocol() {
        let settings = ListenerSettings::default();
        assert!(!settings.enabled);
        assert_eq!(settings.port, 8192);
        assert_eq!(settings.buffer_size, 256);
        assert_eq!(settings.ip, "0.0.0.0");
        assert_eq!(settings.dispatch_mode, DispatchMode::Separate);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let settings: ListenerSettings = serde_json::from_str(
            r#"{"enabled": true, "port": 9000, "commands": ["say {username}"], "dispatch_mode": "batched"}"#,
        )
        .unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.commands, vec!["say {username}"]);
        assert_eq!(settings.buffer_size, 256);
        assert_eq!(settings.dispatch_mode, DispatchMode::Batched);
        assert_eq!(settings.read_timeout_secs, None);
    }

    #[test]
    fn resolves_into_a_listener_config() {
        let settings = ListenerSettings {
            enabled: true,
            ip: "127.0.0.1".into(),
            port: 8193,
            commands: vec!["say hi".into()],
            read_timeout_secs: Some(3),
            ..settings_with_key()
        };

        let config = settings.resolve().unwrap();
        assert!(config.enabled);
        assert_eq!(config.addr, "127.0.0.1:8193".parse::<SocketAddr>().unwrap());
        assert_eq!(config.commands, vec!["say hi"]);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(5));
        assert_eq!(config.key.public_key(), test_keys::shared().public_key());
    }

    #[test]
    fn empty_ip_binds_every_interface() {
        let settings = ListenerSettings { ip: String::new(), ..settings_with_key() };
        let config = settings.resolve().unwrap();
        assert!(config.addr.ip().is_unspecified());
    }

    #[test]
    fn rejects_bad_address_zero_buffer_and_bad_key() {
        let bad_ip = ListenerSettings { ip: "not-an-ip".into(), ..settings_with_key() };
        assert!(matches!(bad_ip.resolve(), Err(ConfigError::InvalidAddress { .. })));

        let zero = ListenerSettings { buffer_size: 0, ..settings_with_key() };
        assert!(matches!(zero.resolve(), Err(ConfigError::ZeroBuffer)));

        let no_key = ListenerSettings::default();
        assert!(matches!(
            no_key.resolve(),
            Err(ConfigError::InvalidKey(KeyError::KeyFormat(_)))
        ));
    }

    #[test]
    fn debug_output_hides_the_private_key() {
        let settings = settings_with_key();
        let printed = format!("{settings:?}");

        assert!(printed.contains("private_key: <redacted>"));
        assert!(!printed.contains("PRIVATE KEY"));
        assert!(!printed.contains(&settings.private_key[40..80]));
        assert!(format!("{:?}", ListenerSettings::default()).contains("private_key: <unset>"));
    }

    #[test]
    fn builder_helpers() {
        let config = ListenerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(test_keys::shared().clone()),
        )
        .with_commands(["a", "b"])
        .with_buffer_size(512)
        .with_dispatch_mode(DispatchMode::Batched)
        .disabled();

        assert!(!config.enabled);
        assert_eq!(config.commands, vec!["a", "b"]);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.dispatch_mode, DispatchMode::Batched);
    }
}
