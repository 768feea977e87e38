use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use uuid::Uuid;

pub const ADMIN_COOKIE: &str = "wcs_staging_admin";

const MAX_ADMIN_SESSIONS: usize = 64;

/// Gate for the administrative capability. Holders of the admin token may
/// read the page and change the stored site url. Browsers log in with the
/// token once and then carry a random session id, never the token itself.
pub struct AdminAuth {
    token: String,
    generated: bool,
    secure_cookie: bool,
    sessions: Mutex<VecDeque<String>>,
}

impl AdminAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            generated: false,
            secure_cookie: false,
            sessions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn generate() -> Self {
        Self {
            generated: true,
            ..Self::new(Uuid::new_v4().simple().to_string())
        }
    }

    pub fn from_config(token: Option<&str>) -> Self {
        match token.map(str::trim).filter(|value| !value.is_empty()) {
            Some(token) => Self::new(token),
            None => Self::generate(),
        }
    }

    /// Marks session cookies `Secure`; set when the site is served over https.
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn was_generated(&self) -> bool {
        self.generated
    }

    pub fn token_matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.token.as_bytes(), candidate.trim().as_bytes())
    }

    /// JSON clients must present the token as a bearer header; cookies alone
    /// do not authorize the API.
    pub fn bearer_authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(AUTHORIZATION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.trim().strip_prefix("Bearer "))
            .any(|token| self.token_matches(token))
    }

    pub fn cookie_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(session) = cookie_value(headers, ADMIN_COOKIE) else {
            return false;
        };
        self.lock_sessions()
            .iter()
            .any(|known| constant_time_eq(known.as_bytes(), session.as_bytes()))
    }

    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        self.bearer_authorized(headers) || self.cookie_authorized(headers)
    }

    /// Issues a fresh session id. The oldest session is dropped once the
    /// cap is reached.
    pub fn start_session(&self) -> String {
        let session = Uuid::new_v4().simple().to_string();
        let mut sessions = self.lock_sessions();
        while sessions.len() >= MAX_ADMIN_SESSIONS {
            sessions.pop_front();
        }
        sessions.push_back(session.clone());
        session
    }

    /// Forgets the session carried by `headers`, if any.
    pub fn end_session(&self, headers: &HeaderMap) -> bool {
        let Some(session) = cookie_value(headers, ADMIN_COOKIE) else {
            return false;
        };
        let mut sessions = self.lock_sessions();
        let before = sessions.len();
        sessions.retain(|known| known != &session);
        sessions.len() != before
    }

    pub fn session_cookie(&self, session: &str) -> String {
        format!(
            "{ADMIN_COOKIE}={session}; Path=/; HttpOnly; SameSite=Strict{}",
            self.secure_suffix()
        )
    }

    pub fn cleared_cookie(&self) -> String {
        format!(
            "{ADMIN_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0{}",
            self.secure_suffix()
        )
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure_cookie { "; Secure" } else { "" }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    lhs.iter()
        .zip(rhs)
        .fold(0u8, |acc, (left, right)| acc | (left ^ right))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        headers
    }

    fn session_headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(cookie).expect("cookie header should be valid"),
        );
        headers
    }

    #[test]
    fn bearer_and_session_cookie_are_accepted() {
        let auth = AdminAuth::new("s3cret");
        let session = auth.start_session();
        assert!(auth.is_authorized(&headers(&[("authorization", "Bearer s3cret")])));
        assert!(auth.is_authorized(&session_headers(&format!(
            "theme=dark; wcs_staging_admin={session}"
        ))));
        assert!(!auth.is_authorized(&headers(&[("authorization", "Bearer nope")])));
        assert!(!auth.is_authorized(&headers(&[("authorization", "Basic s3cret")])));
        assert!(!auth.is_authorized(&HeaderMap::new()));
    }

    #[test]
    fn raw_token_is_not_a_session() {
        let auth = AdminAuth::new("s3cret");
        auth.start_session();
        assert!(!auth.cookie_authorized(&headers(&[("cookie", "wcs_staging_admin=s3cret")])));
    }

    #[test]
    fn cookie_does_not_authorize_bearer_only_paths() {
        let auth = AdminAuth::new("s3cret");
        let session = auth.start_session();
        let cookie_only = session_headers(&format!("wcs_staging_admin={session}"));
        assert!(auth.cookie_authorized(&cookie_only));
        assert!(!auth.bearer_authorized(&cookie_only));
    }

    #[test]
    fn ended_and_evicted_sessions_stop_working() {
        let auth = AdminAuth::new("s3cret");
        let first = auth.start_session();
        let first_cookie = session_headers(&format!("wcs_staging_admin={first}"));
        for _ in 0..MAX_ADMIN_SESSIONS {
            auth.start_session();
        }
        assert!(!auth.cookie_authorized(&first_cookie));

        let session = auth.start_session();
        let cookie = session_headers(&format!("wcs_staging_admin={session}"));
        assert!(auth.end_session(&cookie));
        assert!(!auth.cookie_authorized(&cookie));
        assert!(!auth.end_session(&cookie));
    }

    #[test]
    fn secure_attribute_follows_site_scheme() {
        let plain = AdminAuth::new("s3cret");
        assert!(!plain.session_cookie("abc").contains("Secure"));

        let secure = AdminAuth::new("s3cret").with_secure_cookies(true);
        assert!(secure.session_cookie("abc").ends_with("; Secure"));
        assert!(secure.cleared_cookie().contains("Max-Age=0; Secure"));
    }

    #[test]
    fn missing_token_config_generates_one() {
        let auth = AdminAuth::from_config(Some("   "));
        assert!(auth.was_generated());
        assert_eq!(auth.token().len(), 32);
        assert!(!AdminAuth::from_config(Some("given")).was_generated());
    }

    #[test]
    fn token_comparison_requires_exact_match() {
        let auth = AdminAuth::new("abc");
        assert!(auth.token_matches("abc"));
        assert!(!auth.token_matches("abcd"));
        assert!(!auth.token_matches("abd"));
        assert!(!auth.token_matches(""));
    }
}
