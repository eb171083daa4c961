//! Wire types for the npm registry's JSON documents.
//!
//! A *packument* is the full metadata document for a package, covering all
//! published versions. The registry also exposes a CouchDB-style change
//! feed (`_changes`) and a full listing endpoint (`_all_docs`); the page
//! shapes for both live here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full metadata document for a package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Packument {
    pub name: String,

    /// Tag → version mapping; `latest` is the interesting one.
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,

    /// Version string → per-version metadata.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMeta>,

    /// Publish timestamps keyed by version (plus `created`/`modified`).
    /// Values stay raw JSON: unpublished packages carry an object entry
    /// here, and one odd value must not fail the whole document.
    #[serde(default)]
    pub time: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// License field is a string in modern packuments but an object in old
    /// ones; normalized through [`Packument::license_spdx`].
    #[serde(default)]
    pub license: Option<serde_json::Value>,
}

impl Packument {
    /// The version the `latest` dist-tag points at, if published.
    #[must_use]
    pub fn latest_version(&self) -> Option<&VersionMeta> {
        self.dist_tags
            .get("latest")
            .and_then(|v| self.versions.get(v))
    }

    /// Best-effort SPDX license identifier.
    #[must_use]
    pub fn license_spdx(&self) -> Option<String> {
        match &self.license {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Object(map)) => map
                .get("type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }

    /// Publish time of the given version, if recorded.
    #[must_use]
    pub fn published_at(&self, version: &str) -> Option<DateTime<Utc>> {
        self.time.get(version).and_then(parse_timestamp)
    }

    /// The document's `modified` timestamp, if recorded.
    #[must_use]
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.time.get("modified").and_then(parse_timestamp)
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
}

/// Metadata for a single published version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: String,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(rename = "optionalDependencies", default)]
    pub optional_dependencies: BTreeMap<String, String>,

    /// Supported operating systems; entries may be negated with `!`.
    #[serde(default)]
    pub os: Vec<String>,

    /// Supported CPU architectures; entries may be negated with `!`.
    #[serde(default)]
    pub cpu: Vec<String>,

    /// Supported libc flavors (glibc/musl); entries may be negated with `!`.
    #[serde(default)]
    pub libc: Vec<String>,

    #[serde(default)]
    pub dist: Option<DistInfo>,

    /// Either a deprecation message (string) or a boolean flag.
    #[serde(default)]
    pub deprecated: Option<serde_json::Value>,
}

impl VersionMeta {
    /// Unpacked size of this version's tarball in bytes (0 when the
    /// registry did not record one).
    #[must_use]
    pub fn unpacked_size(&self) -> u64 {
        self.dist.as_ref().and_then(|d| d.unpacked_size).unwrap_or(0)
    }

    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        match &self.deprecated {
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Bool(b)) => *b,
            _ => false,
        }
    }

    /// Runtime + optional dependency specs, the set the install-size
    /// traversal follows.
    pub fn install_dependencies(&self) -> impl Iterator<Item = (&String, &String)> {
        self.dependencies
            .iter()
            .chain(self.optional_dependencies.iter())
    }
}

/// Tarball distribution metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistInfo {
    #[serde(default)]
    pub tarball: Option<String>,

    #[serde(default)]
    pub shasum: Option<String>,

    #[serde(rename = "unpackedSize", default)]
    pub unpacked_size: Option<u64>,

    #[serde(rename = "fileCount", default)]
    pub file_count: Option<u32>,
}

/// One normalized entry from the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Monotonic feed sequence; the consumer cursor is the sole resumption
    /// point after a restart.
    pub seq: u64,
    pub name: String,
    pub deleted: bool,
}

/// Raw `_changes` page.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesPage {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    pub last_seq: u64,
}

/// Raw `_changes` row.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    pub seq: u64,
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Raw `_all_docs` page.
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsPage {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub rows: Vec<AllDocsRow>,
}

/// Raw `_all_docs` row.
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
}

/// Whether a document id is a registry-internal entry (design documents
/// and other underscore-prefixed ids) that must never reach consumers.
#[must_use]
pub fn is_internal_id(id: &str) -> bool {
    id.starts_with('_')
}
