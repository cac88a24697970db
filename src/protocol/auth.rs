//! Shared-secret session handshake
//!
//! ```text
//! server -> *2 CHALLENGE <32 random bytes>
//! client -> *2 AUTH <HMAC-SHA256(authkey, challenge)>
//! server -> +WELCOME            (or -ERR authentication failed, then close)
//! ```
//!
//! The secret itself never crosses the wire.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::protocol::connection::{Connection, ConnectionError};
use crate::protocol::resp::{Value, MAX_FRAME_LEN};

type HmacSha256 = Hmac<Sha256>;

pub const CHALLENGE: &str = "CHALLENGE";
pub const AUTH: &str = "AUTH";
pub const WELCOME: &str = "WELCOME";
pub const NONCE_LEN: usize = 32;
/// Frame limit while the peer is still unauthenticated
pub const HANDSHAKE_FRAME_LEN: usize = 4 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication rejected by peer")]
    Rejected,

    #[error("peer sent '{0}' before authenticating")]
    NotAuthenticated(String),

    #[error("unexpected handshake frame: {0:?}")]
    Unexpected(Value),

    #[error("connection closed during handshake")]
    Closed,

    #[error("unusable authkey")]
    InvalidKey,

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

fn keyed(authkey: &[u8]) -> Result<HmacSha256, AuthError> {
    HmacSha256::new_from_slice(authkey).map_err(|_| AuthError::InvalidKey)
}

/// Digest a client must present for `challenge`
pub fn respond(authkey: &[u8], challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = keyed(authkey)?;
    mac.update(challenge);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of a client's digest
pub fn verify(authkey: &[u8], challenge: &[u8], response: &[u8]) -> bool {
    match keyed(authkey) {
        Ok(mut mac) => {
            mac.update(challenge);
            mac.verify_slice(response).is_ok()
        }
        Err(_) => false,
    }
}

/// Short, non-reversible identifier of a secret, safe to log
pub fn fingerprint(authkey: &[u8]) -> String {
    hex::encode(&Sha256::digest(authkey)[..6])
}

/// Server side: challenge the peer and check its answer.
///
/// On failure the peer has already been told why; the caller only needs to
/// drop the connection.
pub async fn accept(conn: &mut Connection, authkey: &[u8]) -> Result<(), AuthError> {
    conn.set_max_frame_len(HANDSHAKE_FRAME_LEN);
    let challenge: [u8; NONCE_LEN] = rand::random();
    conn.write_frame(&Value::Array(Some(vec![
        Value::bulk(CHALLENGE),
        Value::bulk(challenge.to_vec()),
    ])))
    .await?;

    let frame = conn.read_frame().await?.ok_or(AuthError::Closed)?;
    let items = match frame {
        Value::Array(Some(items)) => items,
        other => {
            conn.write_frame(&Value::error("ERR expected AUTH")).await?;
            return Err(AuthError::Unexpected(other));
        }
    };

    let verb = items
        .first()
        .and_then(Value::as_bytes)
        .map(|b| String::from_utf8_lossy(b).to_uppercase())
        .unwrap_or_default();
    if verb != AUTH {
        conn.write_frame(&Value::error("NOAUTH authentication required"))
            .await?;
        return Err(AuthError::NotAuthenticated(verb));
    }

    let digest = match items.as_slice() {
        [_, Value::BulkString(Some(digest))] => digest.as_slice(),
        _ => &[][..],
    };
    if !verify(authkey, &challenge, digest) {
        conn.write_frame(&Value::error("ERR authentication failed"))
            .await?;
        return Err(AuthError::Rejected);
    }

    conn.write_frame(&Value::SimpleString(WELCOME.to_string()))
        .await?;
    conn.set_max_frame_len(MAX_FRAME_LEN);
    Ok(())
}

/// Client side: answer the server's challenge
pub async fn login(conn: &mut Connection, authkey: &[u8]) -> Result<(), AuthError> {
    let frame = conn.read_frame().await?.ok_or(AuthError::Closed)?;
    let challenge = match &frame {
        Value::Array(Some(items)) => match items.as_slice() {
            [verb, Value::BulkString(Some(nonce))]
                if verb.as_bytes() == Some(CHALLENGE.as_bytes()) =>
            {
                Some(nonce.clone())
            }
            _ => None,
        },
        _ => None,
    };
    let Some(challenge) = challenge else {
        return Err(AuthError::Unexpected(frame));
    };

    let digest = respond(authkey, &challenge)?;
    let reply = conn
        .request(&Value::Array(Some(vec![Value::bulk(AUTH), Value::bulk(digest)])))
        .await?;

    match reply {
        Value::SimpleString(s) if s == WELCOME => Ok(()),
        Value::Error(_) => Err(AuthError::Rejected),
        other => Err(AuthError::Unexpected(other)),
    }
}
