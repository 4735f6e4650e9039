//! Session credentials copied from a logged-in browser.

use std::fmt;

use crate::SyncError;

pub const DEFAULT_TOKEN_COOKIE: &str = "XSRF-TOKEN";
pub const DEFAULT_TOKEN_HEADER: &str = "X-XSRF-TOKEN";

/// The browser's cookie header plus the token the vendor expects echoed
/// back in a custom request header.
#[derive(Clone)]
pub struct SessionAuth {
    cookie_header: String,
    token: String,
    token_header: String,
}

impl SessionAuth {
    /// Pull the token out of `cookie_header` (`a=1; XSRF-TOKEN=abc; b=2`).
    ///
    /// A missing or empty cookie is fatal: no request is worth sending
    /// without it.
    pub fn from_cookie_header(
        cookie_header: &str,
        token_cookie: &str,
        token_header: &str,
    ) -> Result<Self, SyncError> {
        let token = find_cookie(cookie_header, token_cookie)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::MissingToken {
                cookie: token_cookie.to_string(),
            })?;
        Ok(Self {
            cookie_header: cookie_header.trim().to_string(),
            token: token.to_string(),
            token_header: token_header.to_string(),
        })
    }

    pub fn cookie_header(&self) -> &str {
        &self.cookie_header
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_header(&self) -> &str {
        &self.token_header
    }
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuth")
            .field("token_header", &self.token_header)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_found_among_other_cookies() {
        let auth = SessionAuth::from_cookie_header(
            "ASP.NET_SessionId=s1; XSRF-TOKEN=abc123; theme=dark",
            DEFAULT_TOKEN_COOKIE,
            DEFAULT_TOKEN_HEADER,
        )
        .unwrap();
        assert_eq!(auth.token(), "abc123");
        assert_eq!(auth.token_header(), "X-XSRF-TOKEN");
        assert!(auth.cookie_header().starts_with("ASP.NET_SessionId"));
    }

    #[test]
    fn quoted_value_unwrapped() {
        let auth = SessionAuth::from_cookie_header("XSRF-TOKEN=\"q\"", "XSRF-TOKEN", "X").unwrap();
        assert_eq!(auth.token(), "q");
    }

    #[test]
    fn name_must_match_exactly() {
        let err =
            SessionAuth::from_cookie_header("MY-XSRF-TOKEN=abc", "XSRF-TOKEN", "X").unwrap_err();
        assert!(matches!(err, SyncError::MissingToken { ref cookie } if cookie == "XSRF-TOKEN"));
    }

    #[test]
    fn empty_value_is_missing() {
        assert!(SessionAuth::from_cookie_header("XSRF-TOKEN=; a=b", "XSRF-TOKEN", "X").is_err());
        assert!(SessionAuth::from_cookie_header("", "XSRF-TOKEN", "X").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let auth = SessionAuth::from_cookie_header("XSRF-TOKEN=secret", "XSRF-TOKEN", "X").unwrap();
        assert!(!format!("{auth:?}").contains("secret"));
    }

    #[test]
    fn value_may_contain_equals() {
        let auth = SessionAuth::from_cookie_header("XSRF-TOKEN=a=b==", "XSRF-TOKEN", "X").unwrap();
        assert_eq!(auth.token(), "a=b==");
    }
}
