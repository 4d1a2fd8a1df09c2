// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end coverage for collections whose JSON layout differs from this
//! implementation's own derived `Serialize` output: reordered keys and
//! incidental whitespace. A signature computed over such a document is only
//! verifiable if the payload handed to the verifier is a byte-exact slice of
//! the original document, never a re-serialization.

use {
    base64::Engine,
    collection_signing::{CmsSignatureProvider, SignatureFormat, SignatureProvider, SigningIdentity},
    collection_trust::{CollectionSource, CollectionTrust, TrustConfig},
    std::sync::Arc,
};

/// A hand-laid-out collection document: key order (`packages` before `name`)
/// and spacing that a derived `Serialize` impl for `Collection` would never
/// produce. Returns the signed document's `file://` URL and the signing cert.
fn non_canonical_signed_fixture(dir: &std::path::Path) -> (String, x509_certificate::CapturedX509Certificate) {
    let payload = br#"{
  "packages":  [],
  "generatedAt": "2024-01-01T00:00:00Z",
  "name": "Signed",
  "formatVersion": "v1_0"
}"#;

    let (cert, key) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
    let identity = SigningIdentity {
        chain: vec![cert.clone()],
        private_key: Arc::new(key),
    };

    let provider = CmsSignatureProvider::default();
    let signature = provider.sign(payload, &identity, SignatureFormat::Cms1_0_0).unwrap();
    let encoded = base64::engine::general_purpose::STANDARD.encode(signature);

    // Append the signature object as raw text rather than going through
    // `serde_json::Value`, which would reorder/reformat the document and
    // silently defeat the point of this fixture.
    let mut document = payload[..payload.len() - 1].to_vec();
    document.extend_from_slice(
        format!(r#",  "signature": {{"signature": "{encoded}", "certificate": {{"subject": {{}}, "issuer": {{}}}}}}}}"#).as_bytes(),
    );

    let file_path = dir.join("fixture.json");
    std::fs::write(&file_path, &document).unwrap();

    (url::Url::from_file_path(&file_path).unwrap().to_string(), cert)
}

#[test]
fn envelope_split_recovers_the_exact_signed_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _cert) = non_canonical_signed_fixture(dir.path());
    let path = url::Url::parse(&url).unwrap().to_file_path().unwrap();
    let document = std::fs::read(&path).unwrap();

    let (payload, signature) = collection_model::envelope::split_signed_json(&document).unwrap();
    assert!(signature.is_some());

    let expected_payload = br#"{
  "packages":  [],
  "generatedAt": "2024-01-01T00:00:00Z",
  "name": "Signed",
  "formatVersion": "v1_0"
}"#;
    assert_eq!(payload, expected_payload);
}

#[tokio::test]
async fn non_canonically_laid_out_collection_with_trusted_root_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let (url, cert) = non_canonical_signed_fixture(dir.path());

    let config = TrustConfig {
        verifier_config: collection_signing::VerifierConfiguration {
            trusted_roots: vec![cert],
            ..Default::default()
        },
        ..Default::default()
    };
    let checksum_store = collection_checksum_store::ChecksumStore::new(dir.path().join("checksums"));
    let trust = CollectionTrust::new(checksum_store, None, config).unwrap();

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
