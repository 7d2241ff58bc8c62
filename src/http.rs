//! Request and response values flowing through the controller

use crate::error::{CampusError, CampusResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Body of the synthesized 503 response
pub const OFFLINE_BODY: &str = "Offline - No cached version available";

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CampusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(CampusError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// An intercepted outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Shorthand for a body-less GET
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    /// Parse an absolute URL into a request
    pub fn parse(method: Method, url: &str) -> CampusResult<Self> {
        let url = Url::parse(url).map_err(|e| CampusError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(method, url))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Cache key of this request
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method, &self.url)
    }
}

/// Normalized cache key: method plus URL without fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method, url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A complete HTTP response: status, headers and body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "hex_body")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Substitute for an allow-listed API call with neither network nor cache
    pub fn empty_json_array() -> Self {
        Self::new(200, "[]").with_header("Content-Type", "application/json")
    }

    /// Substitute for any other request with neither network nor cache
    pub fn offline_unavailable() -> Self {
        Self::new(503, OFFLINE_BODY).with_header("Content-Type", "text/plain")
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup (first match)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Response bodies are persisted as hex strings inside JSON entries
mod hex_body {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Post".parse::<Method>().unwrap(), Method::Post);
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn key_ignores_fragment_and_normalizes_host() {
        let a = Request::parse(Method::Get, "HTTP://Campus.Example:80/student/dashboard#top").unwrap();
        let b = Request::parse(Method::Get, "http://campus.example/student/dashboard").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "GET http://campus.example/student/dashboard");
    }

    #[test]
    fn key_distinguishes_method_and_query() {
        let get = Request::parse(Method::Get, "http://campus.example/api/quiz?id=1").unwrap();
        let head = Request::parse(Method::Head, "http://campus.example/api/quiz?id=1").unwrap();
        let other = Request::parse(Method::Get, "http://campus.example/api/quiz?id=2").unwrap();
        assert_ne!(get.key(), head.key());
        assert_ne!(get.key(), other.key());
    }

    #[test]
    fn fallback_responses() {
        let api = Response::empty_json_array();
        assert_eq!(api.status, 200);
        assert_eq!(api.header("content-type"), Some("application/json"));
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&api.body).unwrap();
        assert!(parsed.is_empty());

        let offline = Response::offline_unavailable();
        assert_eq!(offline.status, 503);
        assert_eq!(offline.text(), OFFLINE_BODY);
        assert!(!offline.is_ok());
    }

    #[test]
    fn response_body_serializes_as_hex() {
        let response = Response::new(200, vec![0u8, 255, 16]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["body"], "00ff10");
        let back: Response = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, vec![0u8, 255, 16]);
    }
}
