//! Validation client: async calls to the external validator service.
//!
//! Every call parses its input locally first, so malformed documents fail
//! before any request is sent. Non-2xx responses become
//! `ClientError::UploadFailed`; 2xx responses that aren't the expected JSON
//! become `ClientError::InvalidResponse`.

use std::collections::{BTreeMap, HashSet};

use reqwest::{header, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::GuideProfiles;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::resource::Document;
use crate::shape::ResponseShape;
use crate::slot::FileRef;
use crate::types::{ContentKind, OperationOutcome};

/// Key used for a version reported as plain text.
pub const PLAIN_VERSION_KEY: &str = "validator";

/// Everything the results view needs from one `/validate` round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub outcome: OperationOutcome,
    /// Profiles actually sent, after defaulting and de-duplication.
    pub profile_urls: Vec<String>,
    pub resource_text: String,
    pub content_kind: ContentKind,
}

/// HTTP client for the validator service.
#[derive(Debug, Clone)]
pub struct ValidatorClient {
    http: reqwest::Client,
    base: Url,
    config: ClientConfig,
}

impl ValidatorClient {
    /// Build a client for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the base URL can't carry paths,
    /// or `ClientError::Network` if the HTTP client can't be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url).map_err(|e| ClientError::InvalidUrl {
            url: config.base_url.clone(),
            message: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: config.base_url.clone(),
                message: "URL cannot have a path".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| ClientError::Network { source })?;

        Ok(Self { http, base, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Network { source })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, url = %response.url(), "validator returned an error status");
            return Err(ClientError::upload_failed(status));
        }
        Ok(response)
    }

    /// Register a StructureDefinition with the validator. Returns its canonical URL.
    ///
    /// # Errors
    ///
    /// Document errors (`NotAProfile`, `MissingProfileUrl`, ...) are returned
    /// without touching the network.
    pub async fn add_profile(&self, profile_text: &str) -> Result<String, ClientError> {
        let profile = Document::parse(profile_text)?;
        let url = profile.profile_url()?.to_string();

        let endpoint = self.endpoint(&["profiles"]);
        tracing::debug!(%endpoint, profile = %url, "registering profile");
        self.send(self.http.post(endpoint).body(profile_text.to_string()))
            .await?;
        Ok(url)
    }

    /// Validate a resource against the given profiles.
    ///
    /// With no profiles, the core FHIR profile for the resource's
    /// type is used. Duplicate URLs are sent once.
    pub async fn validate_with(
        &self,
        profile_urls: &[String],
        resource_text: &str,
    ) -> Result<ValidationResult, ClientError> {
        let resource = Document::parse(resource_text)?;
        let content_kind = resource.kind();

        let mut profile_urls = dedup_profile_urls(profile_urls);
        if profile_urls.is_empty() {
            profile_urls.push(resource.base_profile_url());
        }

        let endpoint = self.endpoint(&["validate"]);
        tracing::debug!(
            %endpoint,
            kind = %content_kind,
            profiles = %profile_urls.join(","),
            "validating resource"
        );
        let request = self
            .http
            .post(endpoint)
            .query(&[("profile", profile_urls.join(","))])
            .header(header::CONTENT_TYPE, content_kind.media_type())
            .body(resource_text.to_string());
        let body = read_json(self.send(request).await?).await?;
        let outcome: OperationOutcome =
            decode(body, ResponseShape::OperationOutcome, ClientError::not_an_outcome)?;

        Ok(ValidationResult {
            outcome,
            profile_urls,
            resource_text: resource_text.to_string(),
            content_kind,
        })
    }

    /// Known implementation guides: id -> versioned package locator.
    pub async fn get_implementation_guides(&self) -> Result<BTreeMap<String, String>, ClientError> {
        let endpoint = self.endpoint(&["igs"]);
        tracing::debug!(%endpoint, "listing implementation guides");
        let body = read_json(self.send(self.http.get(endpoint)).await?).await?;
        decode(body, ResponseShape::GuideLocators, ClientError::unparsable)
    }

    /// Load an implementation guide from the package registry into the validator.
    pub async fn load_implementation_guide(&self, id: &str) -> Result<GuideProfiles, ClientError> {
        let endpoint = self.endpoint(&["igs", id]);
        tracing::debug!(%endpoint, "loading implementation guide");
        let body = read_json(self.send(self.http.put(endpoint)).await?).await?;
        decode(body, ResponseShape::GuideProfiles, ClientError::unparsable)
    }

    /// Upload a gzipped package archive (`package.tgz`) into the validator.
    pub async fn load_package_file(&self, file: &FileRef) -> Result<GuideProfiles, ClientError> {
        let bytes = file
            .read_bytes()
            .await
            .map_err(|source| ClientError::FileRead {
                path: file.name().into(),
                source,
            })?;

        let endpoint = self.endpoint(&["igs"]);
        tracing::debug!(%endpoint, package = file.name(), size = bytes.len(), "uploading package");
        let request = self
            .http
            .post(endpoint)
            .header(header::CONTENT_ENCODING, "gzip")
            .body(bytes);
        let body = read_json(self.send(request).await?).await?;
        decode(body, ResponseShape::GuideProfiles, ClientError::unparsable)
    }

    /// Canonical profile URLs grouped by implementation guide id.
    pub async fn get_profiles_by_ig(&self) -> Result<BTreeMap<String, Vec<String>>, ClientError> {
        let endpoint = self.endpoint(&["profiles-by-ig"]);
        tracing::debug!(%endpoint, "listing profiles by implementation guide");
        let body = read_json(self.send(self.http.get(endpoint)).await?).await?;
        decode(body, ResponseShape::ProfilesByGuide, ClientError::unparsable)
    }

    /// Version identifiers of the validation engine.
    ///
    /// A plain-text answer is returned under [`PLAIN_VERSION_KEY`].
    pub async fn get_version(&self) -> Result<BTreeMap<String, String>, ClientError> {
        let endpoint = self.endpoint(&["version"]);
        tracing::debug!(%endpoint, "fetching validator version");
        let text = self
            .send(self.http.get(endpoint))
            .await?
            .text()
            .await
            .map_err(|source| ClientError::Network { source })?;

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::String(version)) => Ok(plain_version(&version)),
            Ok(body @ Value::Object(_)) => {
                decode(body, ResponseShape::VersionMap, ClientError::unparsable)
            }
            Ok(Value::Number(_)) => Ok(plain_version(&text)),
            Ok(_) => Err(ClientError::unparsable()),
            Err(_) if !text.trim().is_empty() => Ok(plain_version(&text)),
            Err(_) => Err(ClientError::unparsable()),
        }
    }
}

fn plain_version(text: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(PLAIN_VERSION_KEY.to_string(), text.trim().to_string())])
}

async fn read_json(response: reqwest::Response) -> Result<Value, ClientError> {
    let text = response
        .text()
        .await
        .map_err(|source| ClientError::Network { source })?;
    serde_json::from_str(&text).map_err(|_| ClientError::unparsable())
}

fn decode<T: DeserializeOwned>(
    body: Value,
    shape: ResponseShape,
    mismatch: fn() -> ClientError,
) -> Result<T, ClientError> {
    if let Err(violations) = shape.check(&body) {
        for violation in &violations {
            tracing::debug!(?shape, %violation, "unexpected response shape");
        }
        return Err(mismatch());
    }
    serde_json::from_value(body).map_err(|_| mismatch())
}

/// Drop repeated profile URLs, keeping the first occurrence of each.
pub fn dedup_profile_urls(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}
