//! Bearer-token identity.
//!
//! A token is minted at login/registration and presented again at websocket
//! handshake. Verification is the only gate into the chat core: no identity,
//! no connection.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// An authenticated end user. Immutable for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    exp: i64,
}

#[derive(Clone)]
pub struct IdentityVerifier {
    secret: String,
}

impl IdentityVerifier {
    pub fn new(secret: &str) -> IdentityVerifier {
        IdentityVerifier { secret: secret.to_string() }
    }

    /// Mint a bearer token for an identity, valid for seven days.
    pub fn issue(&self, identity: &Identity) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: identity.id.clone(),
            username: identity.username.clone(),
            exp: OffsetDateTime::now_utc().unix_timestamp() + TOKEN_TTL_SECS,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
    }

    /// Validate a presented token and recover the identity it was minted for.
    pub fn verify(&self, token: &str) -> Result<Identity, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(Identity { id: data.claims.sub, username: data.claims.username })
    }
}
