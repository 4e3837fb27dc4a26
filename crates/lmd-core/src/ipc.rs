//! Query protocol spoken between the daemon and its clients.
//!
//! Each request and each response is a single JSON document terminated by a
//! newline. The `type` tag selects the endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup of character trigrams, either by exact key or by regular expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Char3GramsRequest {
    /// Exact trigram or regex pattern.
    pub q: String,
    /// Interpret `q` as a regular expression.
    #[serde(default)]
    pub regex: bool,
    /// Optional per-request deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A `(ngram, count)` match pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharNGramMatch {
    pub ngram: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Char3GramsResponse {
    pub request: Char3GramsRequest,
    /// Total number of character trigrams counted.
    pub total: u64,
    pub matches: Vec<CharNGramMatch>,
}

/// Hierarchical token-trigram lookup. Empty `second`/`third` mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrigramsRequest {
    pub first: String,
    #[serde(default)]
    pub second: String,
    #[serde(default)]
    pub third: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// The part of the token-trigram tree reachable at the requested depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrigramMatches {
    /// Only `first` given: second → third → count.
    Seconds(BTreeMap<String, BTreeMap<String, u64>>),
    /// `first` and `second` given: third → count.
    Thirds(BTreeMap<String, u64>),
    /// All three tokens given.
    Count(u64),
}

impl TrigramMatches {
    /// True if the lookup found nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            TrigramMatches::Seconds(m) => m.is_empty(),
            TrigramMatches::Thirds(m) => m.is_empty(),
            TrigramMatches::Count(n) => *n == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrigramsResponse {
    pub request: TrigramsRequest,
    /// Grand total of token trigrams as persisted by the last update run.
    pub total: u64,
    pub matches: TrigramMatches,
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request or invalid regex; the caller must fix the request.
    BadRequest,
    /// The request's deadline passed before the lookup finished.
    DeadlineExceeded,
    /// The daemon failed while producing a response.
    Internal,
}

/// IPC request from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Character trigram lookup.
    Char3Grams(Char3GramsRequest),
    /// Token trigram lookup.
    Trigrams(TrigramsRequest),
    /// Shutdown the daemon.
    Shutdown,
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Char3Grams(Char3GramsResponse),
    Trigrams(TrigramsResponse),
    /// Operation succeeded.
    Ok,
    /// Error occurred.
    Error { kind: ErrorKind, message: String },
}

impl Request {
    /// Serialize request to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize request from JSON.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

impl Response {
    /// Serialize response to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Response::Error {
            kind: ErrorKind::BadRequest,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Response::Error {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// Get the socket path for IPC communication.
pub fn socket_path() -> std::path::PathBuf {
    crate::paths::socket_path()
}
