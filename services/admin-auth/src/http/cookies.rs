//! Session credential transport: cookie and bearer header.

use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use serde::Deserialize;

/// Default cookie carrying the session credential.
pub const SESSION_COOKIE_NAME: &str = "admin_session";

/// SameSite cookie policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Strict same-site policy
    #[default]
    Strict,
    /// Lax same-site policy
    Lax,
    /// No same-site restriction (requires Secure)
    None,
}

impl SameSite {
    /// Convert to cookie attribute string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes of the session cookie. It is always `HttpOnly`.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    /// Cookie name
    pub name: String,
    /// Cookie path
    pub path: String,
    /// Secure cookie (HTTPS only)
    pub secure: bool,
    /// SameSite policy
    pub same_site: SameSite,
    /// Lifetime in seconds, matching the session TTL
    pub max_age_secs: i64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: SESSION_COOKIE_NAME.to_string(),
            path: "/".to_string(),
            secure: true,
            same_site: SameSite::Strict,
            max_age_secs: 86_400,
        }
    }
}

impl CookieSettings {
    fn render(&self, value: &str, max_age_secs: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}; SameSite={}; HttpOnly",
            self.name,
            value,
            self.path,
            max_age_secs,
            self.same_site.as_str()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that stores `credential`.
    #[must_use]
    pub fn issue(&self, credential: &str) -> String {
        self.render(credential, self.max_age_secs)
    }

    /// `Set-Cookie` value that removes the cookie.
    #[must_use]
    pub fn clear(&self) -> String {
        self.render("", 0)
    }
}

/// Append a `Set-Cookie` header.
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        headers.append(SET_COOKIE, value);
    }
}

/// Credential from the session cookie, falling back to `Authorization: Bearer`.
#[must_use]
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_value(headers, cookie_name).or_else(|| bearer_token(headers))
}

fn cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| name.trim() == cookie_name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_same_site_as_str() {
        assert_eq!(SameSite::Strict.as_str(), "Strict");
        assert_eq!(SameSite::Lax.as_str(), "Lax");
        assert_eq!(SameSite::None.as_str(), "None");
    }

    #[test]
    fn issued_cookie_carries_security_attributes() {
        let cookie = CookieSettings::default().issue("abc");
        assert_eq!(
            cookie,
            "admin_session=abc; Path=/; Max-Age=86400; SameSite=Strict; HttpOnly; Secure"
        );
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let settings = CookieSettings {
            secure: false,
            same_site: SameSite::Lax,
            ..CookieSettings::default()
        };
        assert_eq!(
            settings.clear(),
            "admin_session=; Path=/; Max-Age=0; SameSite=Lax; HttpOnly"
        );
    }

    #[test]
    fn credential_prefers_cookie() {
        let map = headers(&[
            (COOKIE, "theme=dark; admin_session=from-cookie"),
            (AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(
            extract_credential(&map, SESSION_COOKIE_NAME).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn credential_falls_back_to_bearer() {
        let map = headers(&[(COOKIE, "admin_session="), (AUTHORIZATION, "bearer tok")]);
        assert_eq!(extract_credential(&map, SESSION_COOKIE_NAME).as_deref(), Some("tok"));

        let map = headers(&[(AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_credential(&map, SESSION_COOKIE_NAME), None);
        assert_eq!(extract_credential(&HeaderMap::new(), SESSION_COOKIE_NAME), None);
    }
}
