use std::collections::{BTreeMap, HashSet};
use std::fmt;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::constants::{
    AUTH_COOKIE_MARKERS, AUTH_COOKIE_PREFIX, COOKIE_CHUNK_SIZE, COOKIE_VALUE_BASE64_PREFIX,
};
use crate::models::Session;

/// Whether a cookie belongs to the auth subsystem
pub fn is_auth_cookie(name: &str) -> bool {
    name.starts_with(AUTH_COOKIE_PREFIX)
        || AUTH_COOKIE_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
}

/// Cookies sent with a request
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect();

        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }

    pub fn auth_cookie_names(&self) -> impl Iterator<Item = &str> {
        self.names().filter(|name| is_auth_cookie(name))
    }

    /// Names holding `name` on this request: the bare cookie or its chunks
    pub fn chunk_names(&self, name: &str) -> Vec<String> {
        self.names()
            .filter(|candidate| {
                *candidate == name
                    || candidate
                        .strip_prefix(name)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .is_some_and(|index| index.parse::<usize>().is_ok())
            })
            .map(str::to_string)
            .collect()
    }

    /// Value of `name`, reassembled from `<name>.0`, `<name>.1`, ... if chunked
    pub fn combined(&self, name: &str) -> Option<String> {
        if let Some(value) = self.get(name) {
            return Some(value.to_string());
        }

        let mut value = String::new();
        for index in 0.. {
            match self.get(&format!("{}.{}", name, index)) {
                Some(chunk) => value.push_str(chunk),
                None => break,
            }
        }

        (!value.is_empty()).then_some(value)
    }
}

/// A `Set-Cookie` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    /// Seconds; zero removes the cookie
    pub max_age: i64,
    pub http_only: bool,
    pub secure: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age,
            http_only: true,
            secure: false,
        }
    }

    /// Expire `name` immediately
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "", 0)
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn is_removal(&self) -> bool {
        self.max_age <= 0
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path=/; Max-Age={}; SameSite=Lax",
            self.name, self.value, self.max_age
        )?;
        if self.is_removal() {
            write!(f, "; Expires=Thu, 01 Jan 1970 00:00:00 GMT")?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        Ok(())
    }
}

/// Names already given a `Set-Cookie` in `headers`
pub fn set_cookie_names(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split_once('=').map(|(name, _)| name.trim().to_string()))
        .collect()
}

/// Names expired (`Max-Age=0`) by a `Set-Cookie` in `headers`
pub fn removed_cookie_names(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| {
            value
                .split(';')
                .any(|attr| attr.trim().eq_ignore_ascii_case("Max-Age=0"))
        })
        .filter_map(|value| value.split_once('=').map(|(name, _)| name.trim().to_string()))
        .collect()
}

/// Append `cookies` to `headers`
pub fn apply(headers: &mut HeaderMap, cookies: &[SetCookie]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(_) => tracing::error!("Dropping unencodable cookie {}", cookie.name),
        }
    }
}

/// Turn `response` into a [`Response`] carrying `cookies`
pub fn with_cookies(response: impl IntoResponse, cookies: &[SetCookie]) -> Response {
    let mut response = response.into_response();
    apply(response.headers_mut(), cookies);
    response
}

/// Session cookie content found on a request
#[derive(Debug)]
pub enum SessionCookie {
    Absent,
    Valid(Session),
    /// Present but not decodable
    Corrupt,
}

/// Encode `session` as `(name, value)` pairs, chunked when too long
pub fn encode_session(name: &str, session: &Session) -> serde_json::Result<Vec<(String, String)>> {
    let json = serde_json::to_vec(session)?;
    let value = format!(
        "{}{}",
        COOKIE_VALUE_BASE64_PREFIX,
        URL_SAFE_NO_PAD.encode(json)
    );

    if value.len() <= COOKIE_CHUNK_SIZE {
        return Ok(vec![(name.to_string(), value)]);
    }

    // The encoded value is ASCII, so byte chunks are char boundaries.
    Ok(value
        .as_bytes()
        .chunks(COOKIE_CHUNK_SIZE)
        .enumerate()
        .map(|(index, chunk)| {
            (
                format!("{}.{}", name, index),
                String::from_utf8_lossy(chunk).into_owned(),
            )
        })
        .collect())
}

/// Decode the session stored under `name`
///
/// Accepts `base64-` prefixed and raw JSON values, bare or chunked.
pub fn decode_session(jar: &CookieJar, name: &str) -> SessionCookie {
    let Some(value) = jar.combined(name) else {
        return SessionCookie::Absent;
    };

    let json = match value.strip_prefix(COOKIE_VALUE_BASE64_PREFIX) {
        Some(encoded) => match URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')) {
            Ok(bytes) => bytes,
            Err(_) => return SessionCookie::Corrupt,
        },
        None => match urlencoding::decode(&value) {
            Ok(decoded) => decoded.into_owned().into_bytes(),
            Err(_) => return SessionCookie::Corrupt,
        },
    };

    match serde_json::from_slice::<Session>(&json) {
        Ok(session) => SessionCookie::Valid(session.normalized()),
        Err(_) => SessionCookie::Corrupt,
    }
}
