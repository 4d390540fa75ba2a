//! Identity module
//!
//! Bearer credentials are resolved to an [`Identity`] once, when a channel
//! opens or an HTTP request arrives. Nothing downstream re-authenticates.

use crate::storage::{IdentityGrant, Role, UserId};
use crate::{Error, Result};
use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;
use std::borrow::Cow;
use std::collections::HashMap;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id
    pub user_id: UserId,
    /// Role granted by the identity provider
    pub role: Role,
    /// Name shown on typing indicators
    pub display_name: Option<String>,
}

impl Identity {
    /// Create an identity without a display name
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            display_name: None,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Read-only observer of every inquiry
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// External identity collaborator
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token; [`Error::Unauthorized`] when it is unknown
    fn authenticate(&self, token: &str) -> Result<Identity>;
}

/// Token table loaded from settings
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    grants: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    /// Build from configured grants
    pub fn new(grants: &[IdentityGrant]) -> Self {
        let grants = grants
            .iter()
            .map(|grant| {
                (
                    grant.token.clone(),
                    Identity {
                        user_id: grant.user_id,
                        role: grant.role,
                        display_name: grant.display_name.clone(),
                    },
                )
            })
            .collect();
        Self { grants }
    }

    /// Add or replace a token
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.grants.insert(token.into(), identity);
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn authenticate(&self, token: &str) -> Result<Identity> {
        self.grants.get(token).cloned().ok_or(Error::Unauthorized)
    }
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Token from a `token=<token>` query parameter
pub fn query_token(query: Option<&str>) -> Option<Cow<'_, str>> {
    query_param(query, "token")
}

/// First non-empty value of `key` in a raw query string, percent-decoded
///
/// A value that does not decode to UTF-8 counts as absent.
pub fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<Cow<'a, str>> {
    let (_, raw) = query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)?;
    let value = urlencoding::decode(raw).ok()?;
    (!value.is_empty()).then_some(value)
}
