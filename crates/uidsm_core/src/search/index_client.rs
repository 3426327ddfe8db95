//! Client for the external search-index service.
//!
//! # Responsibility
//! - Push encoded records to the index with `PUT {base}/{type}/{id}`.
//! - Remove records with `DELETE {base}/{type}/{id}`.
//!
//! # Invariants
//! - A response is accepted only with a 2xx status and a non-empty body.
//! - The request body is the single tagged object produced by the codec.

use crate::codec::{encode_one, CodecError, CodecOptions, DispatchTable};
use crate::dto::EntityDto;
use crate::model::entity::{EntityId, EntityKind};
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type SearchIndexResult<T> = Result<T, SearchIndexError>;

/// Search-index failure.
#[derive(Debug)]
pub enum SearchIndexError {
    /// Base URL cannot be parsed or uses an unsupported scheme.
    InvalidUrl(String),
    /// Request could not be sent or the response could not be read.
    Transport(reqwest::Error),
    /// Service answered with a non-success status.
    Rejected { status: u16, endpoint: String },
    /// Service answered with an empty body.
    EmptyResponse { endpoint: String },
    /// Record could not be encoded for the request body.
    Encode(CodecError),
}

impl Display for SearchIndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(message) => write!(f, "invalid search index url: {message}"),
            Self::Transport(err) => write!(f, "search index transport failure: {err}"),
            Self::Rejected { status, endpoint } => {
                write!(f, "search index rejected `{endpoint}` with status {status}")
            }
            Self::EmptyResponse { endpoint } => {
                write!(f, "search index returned an empty body for `{endpoint}`")
            }
            Self::Encode(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SearchIndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SearchIndexError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

impl From<CodecError> for SearchIndexError {
    fn from(value: CodecError) -> Self {
        Self::Encode(value)
    }
}

/// Index/de-index operations keyed by type name and id.
pub trait SearchIndexer: Send + Sync {
    fn index(&self, record: &EntityDto) -> SearchIndexResult<()>;
    fn deindex(&self, kind: EntityKind, id: EntityId) -> SearchIndexResult<()>;
}

/// Indexer used when no search service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexer;

impl SearchIndexer for NoopIndexer {
    fn index(&self, _record: &EntityDto) -> SearchIndexResult<()> {
        Ok(())
    }

    fn deindex(&self, _kind: EntityKind, _id: EntityId) -> SearchIndexResult<()> {
        Ok(())
    }
}

/// Blocking HTTP client for the search-index service.
#[derive(Debug, Clone)]
pub struct HttpSearchIndexClient {
    base_url: Url,
    client: Client,
}

impl HttpSearchIndexClient {
    /// Creates a client for the service rooted at `base_url`.
    ///
    /// # Errors
    /// - `InvalidUrl` when `base_url` is not an absolute http(s) URL.
    /// - `Transport` when the HTTP client cannot be built.
    pub fn new(base_url: &str) -> SearchIndexResult<Self> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resource URL of one indexed record.
    pub fn endpoint(&self, kind: EntityKind, id: EntityId) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            kind.type_tag(),
            id
        )
    }
}

impl SearchIndexer for HttpSearchIndexClient {
    fn index(&self, record: &EntityDto) -> SearchIndexResult<()> {
        let endpoint = self.endpoint(record.kind(), record.id());
        let mut body = Vec::new();
        encode_one(
            record,
            &mut body,
            &CodecOptions::default(),
            DispatchTable::global(),
        )?;

        let response = self
            .client
            .put(endpoint.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        check_response(status, &text, &endpoint)?;
        debug!("event=search_index module=search status=ok endpoint={endpoint}");
        Ok(())
    }

    fn deindex(&self, kind: EntityKind, id: EntityId) -> SearchIndexResult<()> {
        let endpoint = self.endpoint(kind, id);
        let response = self.client.delete(endpoint.as_str()).send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        check_response(status, &text, &endpoint)?;
        debug!("event=search_deindex module=search status=ok endpoint={endpoint}");
        Ok(())
    }
}

fn parse_base_url(value: &str) -> SearchIndexResult<Url> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed)
        .map_err(|err| SearchIndexError::InvalidUrl(format!("`{trimmed}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SearchIndexError::InvalidUrl(format!(
            "`{trimmed}`: unsupported scheme `{other}`"
        ))),
    }
}

/// Treats non-success statuses and empty bodies uniformly as failures.
fn check_response(status: u16, body: &str, endpoint: &str) -> SearchIndexResult<()> {
    if !(200..300).contains(&status) {
        warn!("event=search_request module=search status=error http_status={status} endpoint={endpoint}");
        return Err(SearchIndexError::Rejected {
            status,
            endpoint: endpoint.to_string(),
        });
    }
    if body.trim().is_empty() {
        warn!("event=search_request module=search status=error error_code=empty_body endpoint={endpoint}");
        return Err(SearchIndexError::EmptyResponse {
            endpoint: endpoint.to_string(),
        });
    }
    Ok(())
}
