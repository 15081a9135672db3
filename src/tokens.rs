//! The per-profile token cache.
//!
//! Tokens are written by whatever performed the login; this module only reads
//! them and checks they have not expired.

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("profile '{profile}' has no cached tokens at {path}, log in first")]
    ProfileNotFound { profile: String, path: Utf8PathBuf },
    #[error("profile '{profile}' has no token for resource server '{resource_server}', log in with the scopes it requires")]
    NoToken {
        profile: String,
        resource_server: String,
    },
    #[error("the token for '{resource_server}' expired at {expired_at}, log in again")]
    Expired {
        resource_server: String,
        expired_at: String,
    },
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp, in seconds
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Token {
    #[inline]
    pub fn is_fresh_at(&self, now: i64) -> bool {
        self.expires_at > now
    }

    pub fn expires_at_rfc3339(&self) -> String {
        format_timestamp(self.expires_at)
    }
}

pub fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}

#[inline]
pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// `<config_dir>/tokens/<profile>.json`
pub fn token_path(config_dir: &Utf8Path, profile: &str) -> Utf8PathBuf {
    config_dir.join("tokens").join(format!("{profile}.json"))
}

fn validate_profile(profile: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!profile.is_empty(), "the profile name can't be empty");
    anyhow::ensure!(
        !profile.starts_with('.') && !profile.contains(['/', '\\']),
        "invalid profile name '{profile}'"
    );
    Ok(())
}

#[derive(serde::Deserialize)]
struct TokenFile {
    #[serde(default)]
    tokens: BTreeMap<String, Token>,
}

/// The cached tokens for one profile, keyed by resource server
#[derive(Debug)]
pub struct TokenStore {
    profile: String,
    tokens: BTreeMap<String, Token>,
}

impl TokenStore {
    pub fn load(config_dir: &Utf8Path, profile: &str) -> anyhow::Result<Self> {
        validate_profile(profile)?;

        let path = token_path(config_dir, profile);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(TokenError::ProfileNotFound {
                    profile: profile.to_owned(),
                    path,
                }
                .into());
            }
            Err(err) => return Err(err).with_context(|| format!("unable to read {path}")),
        };

        let file: TokenFile = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse token cache {path}"))?;

        tracing::debug!(profile, %path, count = file.tokens.len(), "loaded token cache");

        Ok(Self::from_tokens(profile, file.tokens))
    }

    pub fn from_tokens(profile: &str, tokens: BTreeMap<String, Token>) -> Self {
        Self {
            profile: profile.to_owned(),
            tokens,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Token)> {
        self.tokens.iter().map(|(rs, tok)| (rs.as_str(), tok))
    }

    pub fn get(&self, resource_server: &str) -> Result<&Token, TokenError> {
        self.tokens
            .get(resource_server)
            .ok_or_else(|| TokenError::NoToken {
                profile: self.profile.clone(),
                resource_server: resource_server.to_owned(),
            })
    }

    /// The access token for `resource_server`, if it is still fresh
    pub fn access_token(&self, resource_server: &str) -> Result<&str, TokenError> {
        self.access_token_at(resource_server, now())
    }

    pub fn access_token_at(&self, resource_server: &str, now: i64) -> Result<&str, TokenError> {
        let token = self.get(resource_server)?;
        if !token.is_fresh_at(now) {
            return Err(TokenError::Expired {
                resource_server: resource_server.to_owned(),
                expired_at: token.expires_at_rfc3339(),
            });
        }
        Ok(&token.access_token)
    }
}
