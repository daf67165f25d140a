use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::accounts::{RawAccountRecord, SELECTED_FIELDS};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

pub const NEXT_LINK_FIELD: &str = "@odata.nextLink";
const SKIP_TOKEN_PARAMS: [&str; 2] = ["$skiptoken", "skiptoken"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub max_page_size: u32,
    pub skip_token: Option<String>,
}

/// Paged read access to the account directory.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_page(&self, request: &PageRequest) -> AppResult<Value>;
}

/// Where the record array may sit inside a page payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Field(&'static str),
    Payload,
}

/// Envelope candidates in the order they are tried; the first one present wins.
pub const ENVELOPE_STRATEGIES: [ExtractionStrategy; 4] = [
    ExtractionStrategy::Field("result"),
    ExtractionStrategy::Field("value"),
    ExtractionStrategy::Field("data"),
    ExtractionStrategy::Payload,
];

/// Applied to the chosen envelope; a populated `value` replaces it.
pub const NESTED_STRATEGY: ExtractionStrategy = ExtractionStrategy::Field("value");

impl ExtractionStrategy {
    pub fn apply<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        match self {
            ExtractionStrategy::Field(name) => payload.get(*name).filter(|v| !v.is_null()),
            ExtractionStrategy::Payload => Some(payload).filter(|v| !v.is_null()),
        }
    }
}

/// Pulls the record array out of a page, whatever envelope it arrived in.
/// Anything that is not array-shaped normalizes to no records.
pub fn extract_records(page: &Value) -> Vec<RawAccountRecord> {
    let Some(mut envelope) = ENVELOPE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.apply(page))
    else {
        return Vec::new();
    };

    if let Some(nested) = NESTED_STRATEGY.apply(envelope).filter(|v| is_truthy(v)) {
        envelope = nested;
    }

    match envelope {
        Value::Array(items) => items.iter().cloned().map(RawAccountRecord::new).collect(),
        _ => Vec::new(),
    }
}

/// Continuation of a page: `None` when there is no next link, `Some(None)`
/// when the link carries no usable skip token.
pub fn continuation(page: &Value) -> Option<Option<String>> {
    let link = page.get(NEXT_LINK_FIELD).and_then(Value::as_str)?;
    if link.is_empty() {
        return None;
    }
    Some(skip_token_from_link(link))
}

pub fn skip_token_from_link(link: &str) -> Option<String> {
    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(err) => {
            warn!(?err, link, "continuation link is not a valid URL");
            return None;
        }
    };
    SKIP_TOKEN_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Walks every page of the directory, always starting from the first one.
pub struct PagedFetcher {
    directory: Arc<dyn AccountDirectory>,
    page_size: u32,
}

impl PagedFetcher {
    pub fn new(directory: Arc<dyn AccountDirectory>, page_size: u32) -> Self {
        Self {
            directory,
            page_size: page_size.max(1),
        }
    }

    pub async fn fetch_all(&self) -> AppResult<Vec<RawAccountRecord>> {
        let mut records = Vec::new();
        let mut request = PageRequest {
            max_page_size: self.page_size,
            skip_token: None,
        };
        let mut pages = 0_usize;
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self
                .directory
                .get_page(&request)
                .await
                .map_err(|err| AppError::FetchAborted(err.to_string()))?;
            pages += 1;
            let extracted = extract_records(&page);
            debug!(page = pages, records = extracted.len(), "directory page received");
            records.extend(extracted);

            match continuation(&page) {
                None => break,
                Some(None) => {
                    warn!(page = pages, "next link without skip token; treating as exhausted");
                    break;
                }
                Some(Some(token)) => {
                    if !seen_tokens.insert(token.clone()) {
                        warn!(page = pages, "continuation token already followed; treating as exhausted");
                        break;
                    }
                    request.skip_token = Some(token);
                }
            }
        }

        info!(pages, accounts = records.len(), "retrieved accounts");
        Ok(records)
    }
}

/// OData-style HTTP directory: `GET {base}/{entity_set}` with the page size
/// negotiated through the `Prefer` header.
pub struct HttpAccountDirectory {
    http: Client,
    collection_url: Url,
    access_token: Option<SecretString>,
}

impl HttpAccountDirectory {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let base = config
            .directory_api_base
            .as_deref()
            .ok_or_else(|| AppError::Config("DIRECTORY_API_BASE is not configured".into()))?;
        let mut collection_url = Url::parse(base.trim_end_matches('/'))
            .map_err(|err| AppError::Config(format!("invalid directory base URL: {err}")))?;
        collection_url
            .path_segments_mut()
            .map_err(|_| AppError::Config("invalid directory base URL".into()))?
            .pop_if_empty()
            .push(&config.directory_entity_set);

        let http = Client::builder()
            .user_agent("territory-map/0.1.0")
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            http,
            collection_url,
            access_token: config.directory_access_token.clone(),
        })
    }

    fn page_url(&self, request: &PageRequest) -> Url {
        let mut url = self.collection_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("$select", &SELECTED_FIELDS.join(","));
            if let Some(token) = &request.skip_token {
                pairs.append_pair("$skiptoken", token);
            }
        }
        url
    }
}

#[async_trait]
impl AccountDirectory for HttpAccountDirectory {
    async fn get_page(&self, request: &PageRequest) -> AppResult<Value> {
        let mut builder = self
            .http
            .get(self.page_url(request))
            .header(header::ACCEPT, "application/json")
            .header(
                "Prefer",
                format!("odata.maxpagesize={}", request.max_page_size),
            );
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
