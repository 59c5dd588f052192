//! Session lookup capability.
//!
//! The engine never owns a session store. It asks an injected
//! [`SessionLookup`] for the caller's backend session token and forwards it
//! as a cookie.

use axum::http::{header, request::Parts};

/// Answers "which backend session belongs to this caller, if any".
pub trait SessionLookup: Send + Sync {
    fn session_token(&self, request: &Parts) -> Option<String>;
}

/// Never supplies a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

impl SessionLookup for NoSession {
    fn session_token(&self, _request: &Parts) -> Option<String> {
        None
    }
}

/// Reads the session token from a named cookie on the inbound request.
#[derive(Debug, Clone)]
pub struct CookieSession {
    cookie_name: String,
}

impl CookieSession {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

impl SessionLookup for CookieSession {
    fn session_token(&self, request: &Parts) -> Option<String> {
        request
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, token)| token.trim_matches('"').to_string())
            .filter(|token| !token.is_empty())
    }
}

impl<F> SessionLookup for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync,
{
    fn session_token(&self, request: &Parts) -> Option<String> {
        self(request)
    }
}
