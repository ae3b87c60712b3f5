//! Implementation guide profile catalog.
//!
//! Caches, per guide, the canonical profile URLs the guide contributes.
//! Entries are added once and never replaced or evicted, so concurrent
//! readers always see either no entry or the complete one.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::ValidatorClient;
use crate::error::ClientError;
use crate::slot::FileRef;

/// Profiles loaded from one implementation guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideProfiles {
    pub id: String,
    pub version: String,
    pub profiles: Vec<String>,
}

/// Extract the semantic version embedded in a guide locator.
///
/// Locators look like `hl7.fhir.us.core#3.1.0` or
/// `https://packages.fhir.org/hl7.fhir.us.core/3.1.0`; the last version found wins.
pub fn locator_version(locator: &str) -> Option<&str> {
    static VERSION: OnceLock<Option<Regex>> = OnceLock::new();
    let re = VERSION
        .get_or_init(|| {
            Regex::new(r"(?:^|[#/@|-])(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)(?:$|[/#?])").ok()
        })
        .as_ref()?;
    re.captures_iter(locator)
        .filter_map(|c| c.get(1))
        .last()
        .map(|m| m.as_str())
}

/// Cache key for a guide, suffixed with its version when known.
pub fn catalog_key(id: &str, version: Option<&str>) -> String {
    match version {
        Some(v) if !v.is_empty() => format!("{}#{}", id, v),
        _ => id.to_string(),
    }
}

/// Append-only cache of guide id -> profiles.
#[derive(Debug, Default)]
pub struct ProfileCatalog {
    entries: papaya::HashMap<String, Arc<GuideProfiles>>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached profiles for a guide id, or `id#version` key.
    pub fn get(&self, key: &str) -> Option<Arc<GuideProfiles>> {
        self.entries.pin().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.pin().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a loaded guide under both its id and `id#version`.
    ///
    /// The first entry stored for a key wins; later inserts return it.
    pub fn insert(&self, guide: GuideProfiles) -> Arc<GuideProfiles> {
        let versioned = catalog_key(&guide.id, Some(&guide.version));
        let id = guide.id.clone();
        let guide = Arc::new(guide);

        let entries = self.entries.pin();
        let stored = match entries.try_insert(id, guide.clone()) {
            Ok(stored) => stored.clone(),
            Err(occupied) => occupied.current.clone(),
        };
        if let Err(occupied) = entries.try_insert(versioned, guide) {
            tracing::debug!(key = %occupied.current.id, "guide version already cataloged");
        }
        stored
    }

    /// Profile URLs offered for a guide, empty if it isn't loaded.
    pub fn profile_options(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|g| g.profiles.clone())
            .unwrap_or_default()
    }

    /// Cached guide, or load it through the validator and cache it.
    pub async fn load(
        &self,
        client: &ValidatorClient,
        id: &str,
    ) -> Result<Arc<GuideProfiles>, ClientError> {
        if let Some(guide) = self.get(id) {
            tracing::debug!(guide = id, "profile catalog hit");
            return Ok(guide);
        }
        let guide = client.load_implementation_guide(id).await?;
        tracing::info!(
            guide = %guide.id,
            version = %guide.version,
            profiles = guide.profiles.len(),
            "loaded implementation guide"
        );
        Ok(self.insert(guide))
    }

    /// Upload a package archive and cache the guide it contains.
    pub async fn load_package(
        &self,
        client: &ValidatorClient,
        file: &FileRef,
    ) -> Result<Arc<GuideProfiles>, ClientError> {
        let guide = client.load_package_file(file).await?;
        tracing::info!(
            guide = %guide.id,
            version = %guide.version,
            package = file.name(),
            "loaded package"
        );
        Ok(self.insert(guide))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_core(version: &str, profiles: &[&str]) -> GuideProfiles {
        GuideProfiles {
            id: "hl7.fhir.us.core".into(),
            version: version.into(),
            profiles: profiles.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn locator_version_variants() {
        assert_eq!(locator_version("hl7.fhir.us.core#3.1.0"), Some("3.1.0"));
        assert_eq!(
            locator_version("https://packages.fhir.org/hl7.fhir.r4.core/4.0.1"),
            Some("4.0.1")
        );
        assert_eq!(
            locator_version("hl7.fhir.uv.ips#1.0.0-ballot"),
            Some("1.0.0-ballot")
        );
        assert_eq!(locator_version("hl7.fhir.us.core"), None);
        assert_eq!(locator_version("hl7.fhir.us.core#current"), None);
    }

    #[test]
    fn catalog_key_suffixes_version() {
        assert_eq!(catalog_key("a.b", Some("1.0.0")), "a.b#1.0.0");
        assert_eq!(catalog_key("a.b", Some("")), "a.b");
        assert_eq!(catalog_key("a.b", None), "a.b");
    }

    #[test]
    fn insert_is_first_write_wins() {
        let catalog = ProfileCatalog::new();
        let first = catalog.insert(us_core("3.1.0", &["http://p1"]));
        let second = catalog.insert(us_core("3.1.0", &["http://p2"]));

        assert_eq!(first, second);
        assert_eq!(catalog.profile_options("hl7.fhir.us.core"), vec!["http://p1"]);
        assert_eq!(
            catalog.profile_options("hl7.fhir.us.core#3.1.0"),
            vec!["http://p1"]
        );
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn newer_version_adds_versioned_key_only() {
        let catalog = ProfileCatalog::new();
        catalog.insert(us_core("3.1.0", &["http://old"]));
        catalog.insert(us_core("4.0.0", &["http://new"]));

        assert_eq!(catalog.profile_options("hl7.fhir.us.core"), vec!["http://old"]);
        assert_eq!(
            catalog.profile_options("hl7.fhir.us.core#4.0.0"),
            vec!["http://new"]
        );
    }

    #[test]
    fn unknown_guide_has_no_options() {
        let catalog = ProfileCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.profile_options("missing").is_empty());
        assert!(!catalog.contains("missing"));
    }
}
