//! Builds and sends one HTTP request against the target service.
//!
//! The executor is stateless apart from the shared `reqwest::Client`, so one
//! instance is shared by every task of every run.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, error};

use crate::catalog::EndpointConfig;
use crate::errors::RequestError;

/// Identifying `User-Agent` attached to every request.
pub const USER_AGENT_VALUE: &str = "AnimalShelter-LoadTester/1.0";

const ANIMAL_NAMES: &[&str] = &[
    "Barsik", "Sharik", "Murzik", "Rex", "Pushok", "Tuzik", "Vaska", "Zhuchka",
];
const ANIMAL_TYPES: &[&str] = &["cat", "dog", "hamster", "parrot", "turtle"];
const HEALTH_STATUSES: &[&str] = &["healthy", "in treatment", "rehabilitation", "quarantine"];

/// Synthetic payload posted to endpoints that need a body.
#[derive(Debug, Clone, Serialize)]
pub struct AnimalRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub age: u8,
    pub health: String,
}

impl AnimalRecord {
    /// Generates a random animal from the fixed vocabularies.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            name: pick(ANIMAL_NAMES, rng),
            kind: pick(ANIMAL_TYPES, rng),
            age: rng.gen_range(1..=15),
            health: pick(HEALTH_STATUSES, rng),
        }
    }
}

fn pick<R: Rng + ?Sized>(words: &[&str], rng: &mut R) -> String {
    words.choose(rng).copied().unwrap_or_default().to_string()
}

/// Sends requests for catalogue endpoints to one base URL.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl RequestExecutor {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an endpoint path.
    pub fn url_for(&self, endpoint: &EndpointConfig) -> String {
        if endpoint.path.starts_with('/') {
            format!("{}{}", self.base_url, endpoint.path)
        } else {
            format!("{}/{}", self.base_url, endpoint.path)
        }
    }

    /// Builds the request for an endpoint, attaching a generated body when required.
    pub fn build_request(
        &self,
        endpoint: &EndpointConfig,
    ) -> Result<reqwest::RequestBuilder, RequestError> {
        let method = parse_method(&endpoint.method);
        let url = self.url_for(endpoint);
        let sends_body = endpoint.needs_body
            && matches!(method, Method::POST | Method::PUT | Method::PATCH);

        let mut req = self
            .client
            .request(method, url)
            .header(USER_AGENT, USER_AGENT_VALUE);

        if sends_body {
            let record = AnimalRecord::random(&mut rand::thread_rng());
            let body = serde_json::to_vec(&record)?;
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }

        Ok(req)
    }

    /// Sends one request.
    ///
    /// # Returns
    /// The status code on a 2xx/3xx response; any transport error or status of
    /// 400 and above is a [`RequestError`].
    pub async fn execute(&self, endpoint: &EndpointConfig) -> Result<u16, RequestError> {
        let req = self.build_request(endpoint)?;
        let mut response = req.send().await?;
        let status = response.status().as_u16();

        // Drain the body so the connection can go back to the pool. A body cut
        // short is a transport failure even when the status was fine.
        while response.chunk().await?.is_some() {}

        if status >= 400 {
            return Err(RequestError::Status(status));
        }

        debug!(path = %endpoint.path, status_code = status, "Request completed");
        Ok(status)
    }
}

fn parse_method(method: &str) -> Method {
    match Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            error!(
                request_type = %method,
                "Unsupported request type, falling back to GET"
            );
            Method::GET
        }
    }
}
