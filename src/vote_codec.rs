//! Decoding of the encrypted single-block vote packet.
//!
//! Wire format: one RSA block (PKCS#1 v1.5) whose plaintext is
//! `VOTE <serviceName> <username> <address> <timestamp> ...`, fields separated
//! by any ASCII whitespace. Anything after the fourth field is ignored.

use crate::error::ProtocolError;
use crate::key_management::KeyPair;
use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use std::fmt;

pub const VOTE_MARKER: &[u8] = b"VOTE";

/// A decoded vote. Only constructible with a username that passes
/// [`is_valid_username`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    service_name: String,
    username: String,
    address: String,
    timestamp: String,
}

impl VoteRecord {
    pub fn new(
        service_name: impl Into<String>,
        username: impl Into<String>,
        address: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let username = username.into();
        if !is_valid_username(&username) {
            return Err(ProtocolError::InvalidUsername(username));
        }
        Ok(Self {
            service_name: service_name.into(),
            username,
            address: address.into(),
            timestamp: timestamp.into(),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Value for a `{name}` placeholder in a command template.
    ///
    /// The snake_case spellings are the ones older command configurations use.
    pub fn placeholder(&self, name: &str) -> Option<&str> {
        match name {
            "serviceName" | "service_name" => Some(&self.service_name),
            "username" => Some(&self.username),
            "address" => Some(&self.address),
            "timestamp" | "time_stamp" => Some(&self.timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for VoteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) has voted on {}",
            self.username, self.address, self.service_name
        )
    }
}

/// `^[A-Za-z0-9_]+$`
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Decrypt and parse one raw packet.
///
/// Only the first key-sized block is decrypted; shorter input is reported as
/// truncated rather than handed to the RSA primitive.
pub fn decode(raw: &[u8], key: &KeyPair) -> Result<VoteRecord, ProtocolError> {
    let block = key.block_size();
    if raw.is_empty() {
        return Err(ProtocolError::MalformedPacket("empty packet"));
    }
    if raw.len() < block {
        return Err(ProtocolError::MalformedPacket("truncated packet"));
    }

    let plaintext = key
        .decrypt_pkcs1v15(&raw[..block])
        .map_err(|_| ProtocolError::Decryption)?;

    parse_plaintext(&plaintext)
}

/// Parse a decrypted vote body.
pub fn parse_plaintext(plaintext: &[u8]) -> Result<VoteRecord, ProtocolError> {
    let marker = plaintext
        .windows(VOTE_MARKER.len())
        .position(|window| window == VOTE_MARKER)
        .ok_or(ProtocolError::MalformedPacket("missing VOTE marker"))?;

    let body = &plaintext[marker + VOTE_MARKER.len()..];
    let mut fields = body
        .split(|b| b.is_ascii_whitespace())
        .filter(|field| !field.is_empty());

    let mut next_field = || -> Result<String, ProtocolError> {
        let field = fields
            .next()
            .ok_or(ProtocolError::MalformedPacket("fewer than four fields"))?;
        String::from_utf8(field.to_vec())
            .map_err(|_| ProtocolError::MalformedPacket("field is not valid UTF-8"))
    };

    let service_name = next_field()?;
    let username = next_field()?;
    let address = next_field()?;
    let timestamp = next_field()?;

    VoteRecord::new(service_name, username, address, timestamp)
}

/// Encrypt an arbitrary plaintext the way a vote site does.
pub fn seal(plaintext: &[u8], public_key: &RsaPublicKey) -> Result<Vec<u8>, rsa::Error> {
    public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
}

/// Build the encrypted packet a vote site would send for `record`.
pub fn encode(record: &VoteRecord, public_key: &RsaPublicKey) -> Result<Vec<u8>, rsa::Error> {
    let plaintext = format!(
        "VOTE\n{}\n{}\n{}\n{}\n",
        record.service_name, record.username, record.address, record.timestamp
    );
    seal(plaintext.as_bytes(), public_key)
}
