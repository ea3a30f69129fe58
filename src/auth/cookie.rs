//! The session cookie: issuing, clearing and reading it.

use http::HeaderMap;
use http::header::COOKIE;

use crate::config::Environment;

pub const SESSION_COOKIE_NAME: &str = "X-Session-Token";

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
        }
    }
}

/// Attributes the session cookie carries in a given environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
}

impl CookieOptions {
    /// Production: `Secure`, `SameSite=Strict`, scoped to the apex domain.
    /// Development: plain HTTP on localhost, `SameSite=Lax`, host-only.
    pub fn for_environment(environment: Environment, apex_domain: Option<&str>) -> Self {
        if environment.is_production() {
            Self {
                secure: true,
                same_site: SameSite::Strict,
                domain: apex_domain.filter(|d| !d.is_empty()).map(str::to_string),
            }
        } else {
            Self {
                secure: false,
                same_site: SameSite::Lax,
                domain: None,
            }
        }
    }

    fn attributes(&self) -> String {
        let mut attrs = String::from("Path=/; HttpOnly");
        if self.secure {
            attrs.push_str("; Secure");
        }
        attrs.push_str("; SameSite=");
        attrs.push_str(self.same_site.as_str());
        if let Some(domain) = &self.domain {
            attrs.push_str("; Domain=");
            attrs.push_str(domain);
        }
        attrs
    }
}

/// `Set-Cookie` value issuing a session token. No `Max-Age`: the server-side
/// expiration is the only lifetime that matters.
pub fn build_session_cookie(token: &str, options: &CookieOptions) -> String {
    format!("{}={}; {}", SESSION_COOKIE_NAME, token, options.attributes())
}

/// `Set-Cookie` value telling the browser to drop the session cookie.
pub fn build_clear_cookie(options: &CookieOptions) -> String {
    format!("{}=; {}; Max-Age=-1", SESSION_COOKIE_NAME, options.attributes())
}

/// Read the session token out of the request's `Cookie` headers.
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_production_cookie() {
        let options = CookieOptions::for_environment(Environment::Production, Some("example.com"));
        assert_eq!(
            build_session_cookie("abc123", &options),
            "X-Session-Token=abc123; Path=/; HttpOnly; Secure; SameSite=Strict; Domain=example.com"
        );
    }

    #[test]
    fn test_development_cookie() {
        let options =
            CookieOptions::for_environment(Environment::Development, Some("example.com"));
        let cookie = build_session_cookie("abc123", &options);
        assert_eq!(cookie, "X-Session-Token=abc123; Path=/; HttpOnly; SameSite=Lax");
        assert!(!cookie.contains("Secure"));
        assert!(!cookie.contains("Domain"));
        assert!(!cookie.contains("Max-Age"));
    }

    #[test]
    fn test_clear_cookie() {
        let options = CookieOptions::for_environment(Environment::Production, Some("example.com"));
        let cookie = build_clear_cookie(&options);
        assert!(cookie.starts_with("X-Session-Token=;"));
        assert!(cookie.ends_with("Max-Age=-1"));
        assert!(cookie.contains("Domain=example.com"));
    }

    #[test]
    fn test_session_token_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; X-Session-Token=feedface; lang=en"),
        );
        assert_eq!(session_token_from_headers(&headers).as_deref(), Some("feedface"));
    }

    #[test]
    fn test_session_token_across_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("X-Session-Token=cafe"));
        assert_eq!(session_token_from_headers(&headers).as_deref(), Some("cafe"));
    }

    #[test]
    fn test_missing_or_empty_session_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token_from_headers(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("X-Session-Token=; other=1"));
        assert_eq!(session_token_from_headers(&headers), None);
    }
}
