//! Blocking HTTP [`ActivitySource`] for the Garmin Connect web endpoints.
//!
//! A [`ConnectClient`] holds one cookie session. [`ActivitySource::authenticate`]
//! walks the single sign-on handshake, after which listing and downloads reuse
//! the session cookies.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use fitmirror_core::{
    canonical_json, ActivityPage, ActivitySource, Credentials, FetchOutcome, FetchPlan,
    PlannedFetch, RemoteActivity, Representation, SourceError,
};

mod settings;

pub use settings::ConnectSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid connect setting: {0}")]
    InvalidSetting(String),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

static RESPONSE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"response_url\s*=\s*'(.*)';").expect("response_url regex"));

pub struct ConnectClient {
    http: Client,
    settings: ConnectSettings,
}

impl ConnectClient {
    pub fn new(settings: ConnectSettings) -> Result<Self, ConnectError> {
        let http = Client::builder()
            .cookie_store(true)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ConnectSettings {
        &self.settings
    }

    fn plan(&self, representation: Representation) -> Option<FetchPlan> {
        if representation.is_canonical() {
            return Some(FetchPlan::LocalTransform(canonical_json));
        }
        self.settings
            .representations
            .get(&representation)
            .cloned()
            .map(FetchPlan::RemoteTemplate)
    }

    fn get(&self, url: &str) -> Result<Response, SourceError> {
        self.http
            .get(url)
            .send()
            .map_err(|e| SourceError::Transient(format!("GET {url}: {e}")))
    }

    fn download(&self, url: &str) -> FetchOutcome {
        let response = match self.get(url) {
            Ok(response) => response,
            Err(err) => return FetchOutcome::Failed(err),
        };
        let status = response.status();
        if status.is_success() {
            return match response.bytes() {
                Ok(body) => FetchOutcome::Fetched(body.to_vec()),
                Err(e) => FetchOutcome::Failed(SourceError::Transient(format!(
                    "reading {url}: {e}"
                ))),
            };
        }
        if is_not_available(status) {
            debug!(target: "fitmirror::connect", %url, %status, "no such export");
            return FetchOutcome::NotAvailable;
        }
        FetchOutcome::Failed(status_error(status, url))
    }
}

// The export endpoints answer 500 for formats an activity cannot produce.
fn is_not_available(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::INTERNAL_SERVER_ERROR
}

fn status_error(status: StatusCode, url: &str) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Auth(format!("{url} answered {status}"))
        }
        _ => SourceError::Transient(format!("{url} answered {status}")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEnvelope {
    results: SearchResults,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    #[serde(default)]
    activities: Vec<SearchHit>,
    total_found: usize,
}

#[derive(Deserialize)]
struct SearchHit {
    activity: Value,
}

fn parse_listing(body: &[u8]) -> Result<ActivityPage, SourceError> {
    let envelope: SearchEnvelope = serde_json::from_slice(body)
        .map_err(|e| SourceError::UnexpectedResponse(format!("activity listing: {e}")))?;
    Ok(ActivityPage {
        items: envelope
            .results
            .activities
            .into_iter()
            .map(|hit| hit.activity)
            .collect(),
        total_found: envelope.results.total_found,
    })
}

impl ActivitySource for ConnectClient {
    fn authenticate(&self, credentials: &Credentials) -> Result<(), SourceError> {
        let params = [
            ("service", self.settings.login_service.as_str()),
            ("clientId", self.settings.client_id.as_str()),
            ("consumeServiceTicket", "false"),
        ];
        let login_url = self.settings.login_url.as_str();

        // The login form hands out the session cookies the POST needs.
        let page = self
            .http
            .get(login_url)
            .query(&params)
            .send()
            .map_err(|e| SourceError::Transient(format!("GET {login_url}: {e}")))?;
        if !page.status().is_success() {
            return Err(status_error(page.status(), login_url));
        }

        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("embed", "true"),
            ("_eventId", "submit"),
        ];
        let reply = self
            .http
            .post(login_url)
            .query(&params)
            .form(&form)
            .send()
            .map_err(|e| SourceError::Transient(format!("POST {login_url}: {e}")))?;
        if !reply.status().is_success() {
            return Err(status_error(reply.status(), login_url));
        }
        let body = reply
            .text()
            .map_err(|e| SourceError::Transient(format!("reading login reply: {e}")))?;

        if body.contains("Invalid") {
            warn!(target: "fitmirror::connect", user = %credentials.username, "login rejected");
            return Err(SourceError::Auth("invalid username or password".into()));
        }
        if !body.contains("SUCCESS") {
            return Err(SourceError::Auth("login ended in an unknown state".into()));
        }
        let ticket_url = RESPONSE_URL
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace("\\/", "/"))
            .ok_or_else(|| SourceError::Auth("login ended in an unknown state".into()))?;

        let ticket = self.get(&ticket_url)?;
        if !ticket.status().is_success() {
            return Err(status_error(ticket.status(), &ticket_url));
        }
        info!(target: "fitmirror::connect", user = %credentials.username, "signed in");
        Ok(())
    }

    fn list_activities(&self, offset: usize, count: usize) -> Result<ActivityPage, SourceError> {
        let url = self.settings.listing_url(offset, count);
        let response = self.get(&url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url));
        }
        let body = response
            .bytes()
            .map_err(|e| SourceError::Transient(format!("reading {url}: {e}")))?;
        parse_listing(&body)
    }

    fn fetch(&self, activity: &RemoteActivity, representation: Representation) -> FetchOutcome {
        let Some(plan) = self.plan(representation) else {
            debug!(target: "fitmirror::connect", %representation, "no download template");
            return FetchOutcome::NotAvailable;
        };
        match plan.resolve(activity) {
            Ok(PlannedFetch::Bytes(bytes)) => FetchOutcome::Fetched(bytes),
            Ok(PlannedFetch::Url(url)) => self.download(&url),
            Err(err) => FetchOutcome::Failed(err),
        }
    }
}
