// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collection trust orchestrator (C8).
//!
//! [CollectionTrust] sequences calls into the sibling components: fetch a
//! collection document, split its signature envelope
//! ([collection_model::envelope]), evaluate trust via
//! [collection_signing], enrich each package via
//! [collection_metadata_client], and commit checksums via
//! [collection_checksum_store]. It does no domain work of its own beyond
//! that sequencing and the bookkeeping of an ordered, in-memory collection
//! list.

use {
    base64::Engine,
    collection_model::{envelope, Collection, Package, SignedCollection},
    collection_signing::{CmsSignatureProvider, SignatureFormat, SignatureProvider, SignatureStatus, VerifierConfiguration},
    sha2::Digest,
    std::collections::HashMap,
    tokio::sync::Mutex,
};

#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("collection is untrusted")]
    Untrusted,

    #[error("collection's signature could not be verified: no trusted roots configured")]
    CannotVerifySignature,

    #[error("collection's signature is invalid: {0}")]
    InvalidSignature(String),

    #[error("collection has no signature and one is required")]
    MissingSignature,

    #[error("collection is unsigned and no trust confirmation mechanism was supplied")]
    TrustConfirmationRequired,

    #[error("failed fetching collection source {0}: {1}")]
    Fetch(String, String),

    #[error("collection document error: {0}")]
    Model(#[from] collection_model::ModelError),

    #[error("signature verification error: {0}")]
    Signing(#[from] collection_signing::SigningError),

    #[error("no collection is registered for source {0}")]
    UnknownSource(String),
}

pub type Result<T> = std::result::Result<T, TrustError>;

/// Where a collection document comes from, and the per-source trust
/// overrides that apply to it.
#[derive(Clone, Debug)]
pub struct CollectionSource {
    /// An `http(s)://` or `file://` URL.
    pub url: String,
    /// Position to insert at; out-of-range values are clamped, `None` appends.
    pub order: Option<usize>,
    /// Bypasses signature evaluation entirely, admitting the collection unconditionally.
    pub skip_signature_check: bool,
}

/// Policy controlling the trust decision state machine.
#[derive(Clone)]
pub struct TrustConfig {
    /// Whether an unsigned collection is admitted without asking `trust_confirmation`.
    pub unsigned_trust: bool,
    /// Whether a missing signature is rejected outright, regardless of `unsigned_trust`.
    pub require_signature: bool,
    pub verifier_config: VerifierConfiguration,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            unsigned_trust: false,
            require_signature: false,
            verifier_config: VerifierConfiguration::default(),
        }
    }
}

/// A package/target search hit scored by the number of collections it appears in.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResults {
    pub packages: Vec<(Package, usize)>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetMatchMode {
    Contains,
    ExactMatch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TargetSearchResults {
    pub packages: Vec<Package>,
}

struct Entry {
    source: CollectionSource,
    collection: SignedCollection,
}

/// Sequences C1-C7 into the six trust-orchestrator operations.
pub struct CollectionTrust {
    http: reqwest::Client,
    signature_provider: CmsSignatureProvider,
    checksum_store: collection_checksum_store::ChecksumStore,
    metadata_client: Option<collection_metadata_client::MetadataClient>,
    config: TrustConfig,
    entries: Mutex<Vec<Entry>>,
}

impl CollectionTrust {
    pub fn new(
        checksum_store: collection_checksum_store::ChecksumStore,
        metadata_client: Option<collection_metadata_client::MetadataClient>,
        config: TrustConfig,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            signature_provider: CmsSignatureProvider::default(),
            checksum_store,
            metadata_client,
            config,
            entries: Mutex::new(Vec::new()),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url).map_err(|e| TrustError::Fetch(url.to_string(), e.to_string()))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| TrustError::Fetch(url.to_string(), "not a valid file url".to_string()))?;
            std::fs::read(&path).map_err(|e| TrustError::Fetch(url.to_string(), e.to_string()))
        } else {
            let response = self
                .http
                .get(parsed)
                .send()
                .await
                .map_err(|e| TrustError::Fetch(url.to_string(), e.to_string()))?;
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| TrustError::Fetch(url.to_string(), e.to_string()))
        }
    }

    /// Split `data` into payload bytes and an optional detached signature,
    /// trying the manifest trailer form first and falling back to the
    /// inline JSON-object form.
    fn split_envelope(data: &[u8]) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        match envelope::split_manifest_envelope(data) {
            Ok((payload, sig)) => Ok((payload.to_vec(), Some(sig.signature))),
            Err(_) => {
                let (payload, signature) = envelope::split_signed_json(data)?;
                let signature_bytes = signature
                    .map(|s| base64::engine::general_purpose::STANDARD.decode(s.signature))
                    .transpose()
                    .map_err(|e| collection_model::ModelError::MalformedEnvelope(e.to_string()))?;
                Ok((payload, signature_bytes))
            }
        }
    }

    /// Returns the verified signing entity when `payload` carried a valid
    /// signature, or `None` when it was admitted unsigned (skip, auto-trust,
    /// or confirmation).
    fn evaluate_trust(
        &self,
        source: &CollectionSource,
        payload: &[u8],
        signature: Option<&[u8]>,
        trust_confirmation: Option<impl FnOnce() -> bool>,
    ) -> Result<Option<collection_model::SigningEntity>> {
        if source.skip_signature_check {
            return Ok(None);
        }

        match signature {
            None => {
                if self.config.require_signature {
                    return Err(TrustError::MissingSignature);
                }
                if self.config.unsigned_trust {
                    return Ok(None);
                }
                match trust_confirmation {
                    None => Err(TrustError::TrustConfirmationRequired),
                    Some(f) if f() => Ok(None),
                    Some(_) => Err(TrustError::Untrusted),
                }
            }
            Some(signature) => {
                let status = self.signature_provider.status(
                    signature,
                    payload,
                    &self.config.verifier_config,
                    SignatureFormat::Cms1_0_0,
                )?;

                match status {
                    SignatureStatus::Valid(entity) => Ok(Some(entity)),
                    SignatureStatus::CertificateNotTrusted if self.config.verifier_config.trusted_roots.is_empty() => {
                        Err(TrustError::CannotVerifySignature)
                    }
                    SignatureStatus::CertificateNotTrusted => Err(TrustError::InvalidSignature(
                        "certificate chain is not among the configured trusted roots".to_string(),
                    )),
                    SignatureStatus::CertificateInvalid(reason) => Err(TrustError::InvalidSignature(reason)),
                    SignatureStatus::DoesNotConformToSignatureFormat(reason) => Err(TrustError::InvalidSignature(reason)),
                    SignatureStatus::DigestMismatch => {
                        Err(TrustError::InvalidSignature("signed digest does not match the payload".to_string()))
                    }
                }
            }
        }
    }

    /// A deterministic stand-in for "the bytes admitted for this version":
    /// the SHA-256 of the version's canonical JSON encoding. There is no
    /// separate artifact download modeled in this subsystem, so this hashes
    /// the one piece of content actually in hand for each admitted version.
    fn version_checksum(version: &collection_model::Version) -> String {
        let encoded = serde_json::to_vec(version).expect("version always serializes");
        let digest = sha2::Sha256::digest(&encoded);
        hex::encode(digest)
    }

    async fn enrich_and_commit(&self, package: &Package) {
        let identity = match package.git_location() {
            Ok(location) => format!("{}/{}/{}", location.host, location.owner, location.repo),
            Err(e) => {
                log::warn!("package {} has no derivable identity, skipping enrichment: {e}", package.url);
                return;
            }
        };

        if let Some(client) = &self.metadata_client {
            if let Err(e) = client.get(&identity, &package.url).await {
                log::warn!("metadata enrichment failed for {identity}: {e}");
            }
        }

        for version in &package.versions {
            let checksum = Self::version_checksum(version);
            if let Err(e) = self.checksum_store.put(&identity, &version.version.to_string(), &checksum) {
                log::warn!("checksum commit failed for {identity}@{}: {e}", version.version);
            }
        }
    }

    /// Fetch, verify, and admit the collection at `source`.
    pub async fn add_collection(
        &self,
        source: CollectionSource,
        trust_confirmation: Option<impl FnOnce() -> bool>,
    ) -> Result<SignedCollection> {
        let data = self.fetch(&source.url).await?;
        let (payload, raw_signature) = Self::split_envelope(&data)?;

        let entity = self.evaluate_trust(&source, &payload, raw_signature.as_deref(), trust_confirmation)?;

        let collection = Collection::from_json(&payload)?;

        for package in &collection.packages {
            self.enrich_and_commit(package).await;
        }

        let signature = match (entity, raw_signature) {
            (Some(entity), Some(raw_signature)) => Some(collection_model::Signature {
                signature: base64::engine::general_purpose::STANDARD.encode(raw_signature),
                certificate: collection_model::SignatureCertificate {
                    subject: collection_model::Name {
                        common_name: entity.name,
                    },
                    issuer: collection_model::Name::default(),
                },
            }),
            _ => None,
        };

        let signed = SignedCollection {
            collection: collection.clone(),
            signature,
        };

        let mut entries = self.entries.lock().await;
        let index = source.order.unwrap_or(entries.len()).min(entries.len());
        entries.insert(
            index,
            Entry {
                source,
                collection: signed.clone(),
            },
        );

        Ok(signed)
    }

    pub async fn remove_collection(&self, source_url: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.source.url != source_url);
        if entries.len() == before {
            return Err(TrustError::UnknownSource(source_url.to_string()));
        }
        Ok(())
    }

    pub async fn list_collections(&self) -> Vec<Collection> {
        let entries = self.entries.lock().await;
        entries.iter().map(|e| e.collection.collection.clone()).collect()
    }

    /// Re-fetch every registered source, in its existing relative order,
    /// and replace the whole list with the freshly fetched collections.
    ///
    /// A source whose re-fetch now fails trust evaluation is dropped with
    /// a warning rather than left stale; a rejected collection is never
    /// part of the persisted snapshot. Refresh never has an interactive
    /// user on hand, so an unsigned collection that would otherwise need
    /// confirmation is simply dropped.
    pub async fn refresh_collections(&self) -> Vec<Collection> {
        let sources: Vec<CollectionSource> = {
            let mut entries = self.entries.lock().await;
            let sources = entries.iter().map(|e| e.source.clone()).collect();
            entries.clear();
            sources
        };

        for mut source in sources {
            let url = source.url.clone();
            source.order = None;
            if let Err(e) = self.add_collection(source, None::<fn() -> bool>).await {
                log::warn!("refresh of {url} failed, it will be absent until re-added: {e}");
            }
        }

        self.list_collections().await
    }

    pub async fn find_packages(&self, query: &str) -> SearchResults {
        let entries = self.entries.lock().await;
        let query = query.to_lowercase();

        let mut scores: HashMap<String, (Package, usize)> = HashMap::new();

        for entry in entries.iter() {
            for package in &entry.collection.collection.packages {
                let matches = package
                    .summary
                    .as_deref()
                    .map(|s| s.to_lowercase().contains(&query))
                    .unwrap_or(false)
                    || package.keywords.iter().any(|k| k.to_lowercase().contains(&query))
                    || package
                        .versions
                        .iter()
                        .flat_map(|v| &v.targets)
                        .any(|t| t.name.to_lowercase().contains(&query));

                if matches {
                    scores
                        .entry(package.url.clone())
                        .and_modify(|(_, count)| *count += 1)
                        .or_insert_with(|| (package.clone(), 1));
                }
            }
        }

        let mut packages: Vec<(Package, usize)> = scores.into_values().collect();
        packages.sort_by(|a, b| b.1.cmp(&a.1));

        SearchResults { packages }
    }

    pub async fn find_targets(&self, query: &str, mode: TargetMatchMode) -> TargetSearchResults {
        let entries = self.entries.lock().await;

        let packages = entries
            .iter()
            .flat_map(|e| e.collection.collection.packages.iter())
            .filter(|package| {
                package.versions.iter().flat_map(|v| &v.targets).any(|t| match mode {
                    TargetMatchMode::ExactMatch => t.name == query,
                    TargetMatchMode::Contains => t.name.contains(query),
                })
            })
            .cloned()
            .collect();

        TargetSearchResults { packages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_collection_json(name: &str) -> Vec<u8> {
        let collection = serde_json::json!({
            "name": name,
            "packages": [],
            "formatVersion": "v1_0",
            "generatedAt": "2024-01-01T00:00:00Z",
        });
        serde_json::to_vec(&collection).unwrap()
    }

    fn store(dir: &std::path::Path) -> collection_checksum_store::ChecksumStore {
        collection_checksum_store::ChecksumStore::new(dir.join("checksums"))
    }

    #[tokio::test]
    async fn unsigned_collection_rejected_without_trust_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let trust = CollectionTrust::new(store(dir.path()), None, TrustConfig::default()).unwrap();

        let file_path = dir.path().join("c.json");
        std::fs::write(&file_path, sample_collection_json("C")).unwrap();
        let url = url::Url::from_file_path(&file_path).unwrap().to_string();

        let source = CollectionSource {
            url,
            order: None,
            skip_signature_check: false,
        };

        let err = trust.add_collection(source, Some(|| false)).await.unwrap_err();
        assert!(matches!(err, TrustError::Untrusted));
        assert!(trust.list_collections().await.is_empty());
    }

    #[tokio::test]
    async fn unsigned_collection_without_confirmation_mechanism_requires_one() {
        let dir = tempfile::tempdir().unwrap();
        let trust = CollectionTrust::new(store(dir.path()), None, TrustConfig::default()).unwrap();

        let file_path = dir.path().join("c.json");
        std::fs::write(&file_path, sample_collection_json("C")).unwrap();
        let url = url::Url::from_file_path(&file_path).unwrap().to_string();

        let source = CollectionSource {
            url,
            order: None,
            skip_signature_check: false,
        };

        let err = trust
            .add_collection(source, None::<fn() -> bool>)
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::TrustConfirmationRequired));
    }

    #[tokio::test]
    async fn unsigned_collection_accepted_with_trust_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let trust = CollectionTrust::new(store(dir.path()), None, TrustConfig::default()).unwrap();

        let file_path = dir.path().join("c.json");
        std::fs::write(&file_path, sample_collection_json("C")).unwrap();
        let url = url::Url::from_file_path(&file_path).unwrap().to_string();

        let source = CollectionSource {
            url,
            order: None,
            skip_signature_check: false,
        };

        trust.add_collection(source, Some(|| true)).await.unwrap();
        let collections = trust.list_collections().await;
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, "C");
    }

    #[tokio::test]
    async fn skip_signature_check_bypasses_trust_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let trust = CollectionTrust::new(store(dir.path()), None, TrustConfig::default()).unwrap();

        let file_path = dir.path().join("c.json");
        std::fs::write(&file_path, sample_collection_json("C")).unwrap();
        let url = url::Url::from_file_path(&file_path).unwrap().to_string();

        let source = CollectionSource {
            url,
            order: None,
            skip_signature_check: true,
        };

        trust.add_collection(source, Some(|| false)).await.unwrap();
        assert_eq!(trust.list_collections().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_unknown_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let trust = CollectionTrust::new(store(dir.path()), None, TrustConfig::default()).unwrap();

        let err = trust.remove_collection("file:///nope.json").await.unwrap_err();
        assert!(matches!(err, TrustError::UnknownSource(_)));
    }

    fn signed_collection_file(dir: &std::path::Path, name: &str) -> (String, x509_certificate::CapturedX509Certificate) {
        use collection_signing::{CmsSignatureProvider, SignatureFormat, SignatureProvider, SigningIdentity};

        let collection = Collection {
            name: name.to_string(),
            overview: None,
            keywords: Vec::new(),
            packages: Vec::new(),
            format_version: collection_model::FORMAT_VERSION_V1_0.to_string(),
            revision: None,
            generated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            generated_by: None,
        };

        let canonical = serde_json::to_vec(&collection).unwrap();

        let (cert, key) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        let identity = SigningIdentity {
            chain: vec![cert.clone()],
            private_key: std::sync::Arc::new(key),
        };

        let provider = CmsSignatureProvider::default();
        let signature = provider.sign(&canonical, &identity, SignatureFormat::Cms1_0_0).unwrap();

        let mut document = serde_json::to_value(&collection).unwrap();
        document.as_object_mut().unwrap().insert(
            "signature".to_string(),
            serde_json::json!({
                "signature": base64::engine::general_purpose::STANDARD.encode(signature),
                "certificate": {"subject": {}, "issuer": {}},
            }),
        );

        let file_path = dir.join(format!("{name}.json"));
        std::fs::write(&file_path, serde_json::to_vec(&document).unwrap()).unwrap();

        (url::Url::from_file_path(&file_path).unwrap().to_string(), cert)
    }

    #[tokio::test]
    async fn signed_collection_with_trusted_root_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let (url, cert) = signed_collection_file(dir.path(), "Signed");

        let config = TrustConfig {
            verifier_config: collection_signing::VerifierConfiguration {
                trusted_roots: vec![cert],
                ..Default::default()
            },
            ..Default::default()
        };
        let trust = CollectionTrust::new(store(dir.path()), None, config).unwrap();

        let source = CollectionSource {
            url,
            order: None,
            skip_signature_check: false,
        };

        let signed = trust.add_collection(source, Some(|| false)).await.unwrap();
        assert_eq!(signed.collection.name, "Signed");

        let signature = signed.signature.unwrap();
        assert_eq!(signature.certificate.subject.common_name.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn signed_collection_with_empty_trusted_roots_cannot_verify() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _cert) = signed_collection_file(dir.path(), "Signed");

        let trust = CollectionTrust::new(store(dir.path()), None, TrustConfig::default()).unwrap();

        let source = CollectionSource {
            url,
            order: None,
            skip_signature_check: false,
        };

        let err = trust.add_collection(source, Some(|| false)).await.unwrap_err();
        assert!(matches!(err, TrustError::CannotVerifySignature));
    }
}
