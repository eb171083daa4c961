//! Search index collaborator.
//!
//! The index is consumed as an external service with upsert-by-key and
//! delete-by-key semantics; its query/ranking engine is not this crate's
//! concern. [`TypesenseIndex`] talks to a Typesense server over the HTTP
//! transport; [`MemoryIndex`] backs tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::registry::encode_name;

/// The enriched, searchable shape of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDocument {
    /// Document key; package names are unique registry-wide.
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub license: Option<String>,
    pub latest_version: String,
    pub version_count: usize,
    pub last_publish: Option<DateTime<Utc>>,
    /// Unpacked size of the latest version in bytes.
    pub unpacked_size: u64,
    /// Direct runtime dependencies of the latest version.
    pub dependency_count: usize,
    pub deprecated: bool,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("search index transport error: {0}")]
    Transport(String),

    #[error("search index error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("search index decode error: {0}")]
    Decode(String),
}

/// Upsert/delete-by-key surface of the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, document: &PackageDocument) -> Result<(), IndexError>;

    async fn delete(&self, name: &str) -> Result<(), IndexError>;

    /// Fetch the currently indexed document, `None` when absent.
    async fn get(&self, name: &str) -> Result<Option<PackageDocument>, IndexError>;
}

/// Typesense-backed index.
pub struct TypesenseIndex {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: String,
    collection: String,
}

impl TypesenseIndex {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            transport,
            base_url,
            api_key: api_key.into(),
            collection: collection.into(),
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/collections/{}/documents?action=upsert",
            self.base_url, self.collection
        )
    }

    fn document_url(&self, name: &str) -> String {
        format!(
            "{}/collections/{}/documents/{}",
            self.base_url,
            self.collection,
            encode_name(name)
        )
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "X-TYPESENSE-API-KEY".to_string(),
                self.api_key.clone(),
            ),
            (
                "Content-Type".to_string(),
                "application/json".to_string(),
            ),
        ]
    }

    async fn send(&self, request: HttpRequest) -> Result<crate::http::HttpResponse, IndexError> {
        self.transport
            .send(request)
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))
    }
}

#[async_trait]
impl SearchIndex for TypesenseIndex {
    async fn upsert(&self, document: &PackageDocument) -> Result<(), IndexError> {
        // Typesense keys documents by an `id` field.
        let mut body = serde_json::to_value(document)
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert(
                "id".to_string(),
                serde_json::Value::String(document.name.clone()),
            );
        }

        let response = self
            .send(HttpRequest {
                method: HttpMethod::Post,
                url: self.documents_url(),
                headers: self.headers(),
                body: body.to_string().into_bytes(),
            })
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(IndexError::Api {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            })
        }
    }

    async fn delete(&self, name: &str) -> Result<(), IndexError> {
        let response = self
            .send(HttpRequest {
                method: HttpMethod::Delete,
                url: self.document_url(name),
                headers: self.headers(),
                body: Vec::new(),
            })
            .await?;

        // Deleting an absent document is a no-op, matching idempotent
        // re-processing of delete events.
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(IndexError::Api {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            })
        }
    }

    async fn get(&self, name: &str) -> Result<Option<PackageDocument>, IndexError> {
        let response = self
            .send(HttpRequest {
                method: HttpMethod::Get,
                url: self.document_url(name),
                headers: self.headers(),
                body: Vec::new(),
            })
            .await?;

        match response.status {
            status if (200..300).contains(&status) => serde_json::from_slice(&response.body)
                .map(Some)
                .map_err(|e| IndexError::Decode(e.to_string())),
            404 => Ok(None),
            status => Err(IndexError::Api {
                status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

/// In-memory index for tests, dry runs and single-node experiments.
#[derive(Default, Clone)]
pub struct MemoryIndex {
    documents: Arc<Mutex<HashMap<String, PackageDocument>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert(&self, document: &PackageDocument) -> Result<(), IndexError> {
        self.documents
            .lock()
            .await
            .insert(document.name.clone(), document.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), IndexError> {
        self.documents.lock().await.remove(name);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<PackageDocument>, IndexError> {
        Ok(self.documents.lock().await.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;

    fn document(name: &str, version: &str) -> PackageDocument {
        PackageDocument {
            name: name.to_string(),
            description: Some("test package".to_string()),
            keywords: vec!["test".to_string()],
            license: Some("MIT".to_string()),
            latest_version: version.to_string(),
            version_count: 3,
            last_publish: None,
            unpacked_size: 1024,
            dependency_count: 2,
            deprecated: false,
        }
    }

    #[tokio::test]
    async fn memory_index_round_trips_documents() {
        let index = MemoryIndex::new();
        assert!(index.is_empty().await);

        index.upsert(&document("left-pad", "1.3.0")).await.unwrap();
        index.upsert(&document("left-pad", "2.0.0")).await.unwrap();
        assert_eq!(index.len().await, 1);

        let stored = index.get("left-pad").await.unwrap().expect("present");
        assert_eq!(stored.latest_version, "2.0.0");

        index.delete("left-pad").await.unwrap();
        assert!(index.get("left-pad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn typesense_upsert_posts_document_with_id_and_api_key() {
        let transport = MockTransport::new();
        transport.push_status(
            HttpMethod::Post,
            "https://search.test/collections/packages/documents?action=upsert",
            201,
        );

        let index = TypesenseIndex::new(
            Arc::new(transport.clone()),
            "https://search.test/",
            "secret",
            "packages",
        );
        index.upsert(&document("left-pad", "1.3.0")).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["id"], "left-pad");
        assert_eq!(body["latest_version"], "1.3.0");
        assert!(
            requests[0]
                .headers
                .iter()
                .any(|(k, v)| k == "X-TYPESENSE-API-KEY" && v == "secret")
        );
    }

    #[tokio::test]
    async fn typesense_delete_treats_404_as_noop() {
        let transport = MockTransport::new();
        transport.push_status(
            HttpMethod::Delete,
            "https://search.test/collections/packages/documents/ghost",
            404,
        );

        let index = TypesenseIndex::new(
            Arc::new(transport),
            "https://search.test",
            "secret",
            "packages",
        );
        index.delete("ghost").await.expect("404 delete is a no-op");
    }

    #[tokio::test]
    async fn typesense_get_returns_none_for_missing_documents() {
        let transport = MockTransport::new();
        transport.push_status(
            HttpMethod::Get,
            "https://search.test/collections/packages/documents/ghost",
            404,
        );

        let index = TypesenseIndex::new(
            Arc::new(transport),
            "https://search.test",
            "secret",
            "packages",
        );
        assert!(index.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn typesense_get_decodes_scoped_document_urls() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            "https://search.test/collections/packages/documents/@types%2Fnode",
            &serde_json::to_value(document("@types/node", "20.0.0")).unwrap(),
        );

        let index = TypesenseIndex::new(
            Arc::new(transport),
            "https://search.test",
            "secret",
            "packages",
        );
        let stored = index.get("@types/node").await.unwrap().expect("present");
        assert_eq!(stored.name, "@types/node");
    }

    #[tokio::test]
    async fn typesense_upsert_surfaces_api_errors() {
        let transport = MockTransport::new();
        transport.push_status(
            HttpMethod::Post,
            "https://search.test/collections/packages/documents?action=upsert",
            503,
        );

        let index = TypesenseIndex::new(
            Arc::new(transport),
            "https://search.test",
            "secret",
            "packages",
        );
        let err = index
            .upsert(&document("left-pad", "1.3.0"))
            .await
            .expect_err("5xx should error");
        assert!(matches!(err, IndexError::Api { status: 503, .. }));
    }
}
