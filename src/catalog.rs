//! Endpoint and load-profile catalogues offered to the control surface.
//!
//! Both lists are read-only after process start. A run references an endpoint
//! by its path; paths that are not in the catalogue are still accepted and sent
//! as plain `GET` requests.

use serde::Serialize;

use crate::load_models::ProfileKind;

/// One target endpoint the load tester knows how to call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointConfig {
    pub name: String,
    pub method: String,
    pub path: String,
    pub description: String,
    pub needs_body: bool,
}

impl EndpointConfig {
    pub fn new(name: &str, method: &str, path: &str, description: &str, needs_body: bool) -> Self {
        Self {
            name: name.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            description: description.to_string(),
            needs_body,
        }
    }

    /// Descriptor used for paths missing from the catalogue.
    pub fn ad_hoc_get(path: &str) -> Self {
        Self::new(path, "GET", path, "Endpoint not in catalogue", false)
    }
}

/// Human-facing description of a load profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ProfileKind,
}

/// The endpoint and profile catalogues, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub endpoints: Vec<EndpointConfig>,
    pub profiles: Vec<ProfileDescriptor>,
}

impl Catalog {
    pub fn new(endpoints: Vec<EndpointConfig>, profiles: Vec<ProfileDescriptor>) -> Self {
        Self {
            endpoints,
            profiles,
        }
    }

    /// Catalogue for the animal shelter service.
    pub fn animal_shelter() -> Self {
        let endpoints = vec![
            EndpointConfig::new("Home page", "GET", "/", "Shelter landing page", false),
            EndpointConfig::new("List animals", "GET", "/animals", "Fetch every animal", false),
            EndpointConfig::new(
                "Add animal",
                "POST",
                "/api/animals",
                "Register a new animal",
                true,
            ),
            EndpointConfig::new("Metrics", "GET", "/metrics", "Prometheus metrics", false),
            EndpointConfig::new("Docs", "GET", "/docs", "API documentation", false),
            EndpointConfig::new("Slow", "GET", "/slow", "Deliberately slow handler", false),
        ];

        let profiles = ProfileKind::all()
            .into_iter()
            .map(|kind| ProfileDescriptor {
                name: profile_title(kind).to_string(),
                description: profile_description(kind).to_string(),
                kind,
            })
            .collect();

        Self::new(endpoints, profiles)
    }

    /// Looks up an endpoint by path.
    pub fn find_endpoint(&self, path: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|ep| ep.path == path)
    }

    /// Resolves a path to a descriptor, falling back to a plain `GET`.
    pub fn resolve_endpoint(&self, path: &str) -> EndpointConfig {
        self.find_endpoint(path)
            .cloned()
            .unwrap_or_else(|| EndpointConfig::ad_hoc_get(path))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::animal_shelter()
    }
}

fn profile_title(kind: ProfileKind) -> &'static str {
    match kind {
        ProfileKind::Constant => "Constant load",
        ProfileKind::RampUp => "Gradual ramp-up",
        ProfileKind::Spike => "Spike",
        ProfileKind::Wave => "Wave",
        ProfileKind::Step => "Step",
        ProfileKind::Stress => "Stress test",
    }
}

fn profile_description(kind: ProfileKind) -> &'static str {
    match kind {
        ProfileKind::Constant => "Stable RPS for the whole test",
        ProfileKind::RampUp => "Smooth increase from 1 RPS to the configured maximum",
        ProfileKind::Spike => "Sharp jump to the maximum, then sustained load",
        ProfileKind::Wave => "Cyclic sine-shaped RPS oscillation",
        ProfileKind::Step => "Load increases in steps every 30 seconds",
        ProfileKind::Stress => "Extreme load with random bursts",
    }
}
