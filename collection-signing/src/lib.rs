// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CMS-based detached signature creation and verification for collection
//! documents (C3).
//!
//! [CmsSignatureProvider] binds a [SigningIdentity]'s key and certificate
//! chain to a named [SignatureFormat], producing and verifying a detached
//! CMS `SignedData` structure over the collection bytes. Verification
//! delegates chain trust decisions to [collection_cert_policy::CertPolicy].

use {
    collection_cert_policy::{CertPolicy, ExpirationMode, RevocationMode},
    collection_model::SigningEntity,
    cryptographic_message_syntax::{Certificate, SignedData, SignedDataBuilder, SignerBuilder, SigningKey},
    serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer},
    std::fmt,
    x509_certificate::{CapturedX509Certificate, InMemorySigningKeyPair, KeyAlgorithm, Sign},
};

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing identity's private key is not a type permitted by this signature format")]
    UnsupportedKeyType,

    #[error("failed re-encoding a certificate: {0}")]
    CertificateEncoding(String),

    #[error("failed constructing CMS signature: {0}")]
    Cms(#[from] cryptographic_message_syntax::CmsError),

    #[error("failed constructing signing key from signing identity's private key: {0}")]
    KeyConstruction(String),

    #[error("signature does not conform to the expected CMS format: {0}")]
    DoesNotConformToSignatureFormat(String),

    #[error("chain validation policy rejected the signer's certificate: {0}")]
    PolicyError(#[from] collection_cert_policy::CertPolicyError),
}

pub type Result<T> = std::result::Result<T, SigningError>;

/// The signature format understood by this provider.
///
/// Currently a single value is recognized. Parsing any other string fails;
/// this keeps the door open for future formats without silently accepting
/// unrecognized ones.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureFormat {
    Cms1_0_0,
}

impl SignatureFormat {
    pub const CMS_1_0_0: &'static str = "cms-1.0.0";
}

impl fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cms1_0_0 => write!(f, "{}", Self::CMS_1_0_0),
        }
    }
}

impl std::str::FromStr for SignatureFormat {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            Self::CMS_1_0_0 => Ok(Self::Cms1_0_0),
            other => Err(SigningError::DoesNotConformToSignatureFormat(format!(
                "unrecognized signature format: {other}"
            ))),
        }
    }
}

impl Serialize for SignatureFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SignatureFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A key pair plus the certificate chain vouching for it (leaf first, root last).
#[derive(Clone)]
pub struct SigningIdentity {
    pub chain: Vec<CapturedX509Certificate>,
    pub private_key: std::sync::Arc<InMemorySigningKeyPair>,
}

impl SigningIdentity {
    pub fn leaf(&self) -> Option<&CapturedX509Certificate> {
        self.chain.first()
    }
}

/// Result of verifying a signature against a [VerifierConfiguration].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignatureStatus {
    /// Signature parsed, chain is trusted, and the content digest matches.
    Valid(SigningEntity),

    /// The policy engine reported the chain as untrusted, with no specific
    /// validation failure recorded beyond the boolean result.
    CertificateNotTrusted,

    /// The policy engine reported a specific validation failure.
    CertificateInvalid(String),

    /// The bytes did not parse as a well-formed signature of this format.
    DoesNotConformToSignatureFormat(String),

    /// The chain validated but the signed digest did not match the content.
    DigestMismatch,
}

/// Configuration controlling how [CmsSignatureProvider::status] evaluates a
/// signature's certificate chain.
///
/// Defaults match the policy's own defaults: no trusted roots, expiration
/// checking disabled, revocation checking disabled.
#[derive(Clone, Debug)]
pub struct VerifierConfiguration {
    pub trusted_roots: Vec<CapturedX509Certificate>,
    pub certificate_expiration: ExpirationMode,
    pub certificate_revocation: RevocationMode,
}

impl Default for VerifierConfiguration {
    fn default() -> Self {
        Self {
            trusted_roots: Vec::new(),
            certificate_expiration: ExpirationMode::Disabled,
            certificate_revocation: RevocationMode::Disabled,
        }
    }
}

/// A named policy for producing and verifying signatures over collection bytes.
pub trait SignatureProvider {
    fn sign(&self, content: &[u8], identity: &SigningIdentity, format: SignatureFormat) -> Result<Vec<u8>>;

    fn status(
        &self,
        signature: &[u8],
        content: &[u8],
        config: &VerifierConfiguration,
        format: SignatureFormat,
    ) -> Result<SignatureStatus>;

    fn signing_entity(&self, signature: &[u8], format: SignatureFormat) -> Result<SigningEntity>;
}

/// The sole implementation of [SignatureProvider]: CMS (RFC 5652) detached
/// signatures, SHA-256 digest, signature algorithm bound to key type.
#[derive(Clone, Copy, Debug, Default)]
pub struct CmsSignatureProvider {
    pub cert_policy: CmsCertPolicyChoice,
}

/// Which [CertPolicy] `status()` evaluates a chain against.
#[derive(Clone, Copy, Debug)]
pub enum CmsCertPolicyChoice {
    Basic,
    AppleDeveloper,
}

impl Default for CmsCertPolicyChoice {
    fn default() -> Self {
        Self::Basic
    }
}

impl CmsCertPolicyChoice {
    fn resolve(&self) -> CertPolicy {
        match self {
            Self::Basic => CertPolicy::Basic,
            Self::AppleDeveloper => CertPolicy::AppleDeveloper {
                expected_subject_user_id: None,
            },
        }
    }
}

/// Bridge an [InMemorySigningKeyPair] into this format's accepted
/// [SigningKey], rejecting any key type the format does not permit.
///
/// `cms-1.0.0` only permits EC keys. The two crates' key types are
/// independently defined (they live in sibling crates with no shared
/// dependency on each other's key representation), so the only path between
/// them is through the PKCS#8 DER bytes each already carries.
fn signing_key_for_format(
    key_pair: &InMemorySigningKeyPair,
    format: SignatureFormat,
) -> Result<SigningKey> {
    match format {
        SignatureFormat::Cms1_0_0 => match key_pair.key_algorithm() {
            Some(KeyAlgorithm::Ecdsa(_)) => {
                let pkcs8 = key_pair
                    .private_key_data()
                    .ok_or(SigningError::UnsupportedKeyType)?;

                let ring_pair = ring::signature::EcdsaKeyPair::from_pkcs8(
                    &ring::signature::ECDSA_P256_SHA256_ASN1_SIGNING,
                    &pkcs8,
                )
                .map_err(|e| SigningError::KeyConstruction(e.to_string()))?;

                Ok(SigningKey::from(ring_pair))
            }
            _ => Err(SigningError::UnsupportedKeyType),
        },
    }
}

fn to_cms_certificate(cert: &CapturedX509Certificate) -> Result<Certificate> {
    Certificate::from_der(cert.constructed_data())
        .map_err(|e| SigningError::CertificateEncoding(e.to_string()))
}

impl SignatureProvider for CmsSignatureProvider {
    fn sign(&self, content: &[u8], identity: &SigningIdentity, format: SignatureFormat) -> Result<Vec<u8>> {
        let signing_key = signing_key_for_format(&identity.private_key, format)?;

        let leaf = identity.leaf().ok_or(SigningError::UnsupportedKeyType)?;
        let signing_cert = to_cms_certificate(leaf)?;

        let signer = SignerBuilder::new(&signing_key, signing_cert).message_id_content(content.to_vec());

        let mut builder = SignedDataBuilder::default().signer(signer);
        for cert in &identity.chain {
            builder = builder.certificate(to_cms_certificate(cert)?)?;
        }

        Ok(builder.build_ber()?)
    }

    fn status(
        &self,
        signature: &[u8],
        content: &[u8],
        config: &VerifierConfiguration,
        format: SignatureFormat,
    ) -> Result<SignatureStatus> {
        let _ = format;

        let signed_data = match SignedData::parse_ber(signature) {
            Ok(signed_data) => signed_data,
            Err(e) => {
                return Ok(SignatureStatus::DoesNotConformToSignatureFormat(e.to_string()));
            }
        };

        let signer = match signed_data.signers().next() {
            Some(signer) => signer,
            None => {
                return Ok(SignatureStatus::DoesNotConformToSignatureFormat(
                    "no SignerInfo present".to_string(),
                ));
            }
        };

        let (issuer, serial) = signer
            .certificate_issuer_and_serial()
            .ok_or_else(|| SigningError::DoesNotConformToSignatureFormat("no signer identifier".to_string()))?;

        let chain = reconstruct_chain(&signed_data, issuer, serial)?;
        let leaf = match chain.first() {
            Some(leaf) => leaf.clone(),
            None => {
                return Ok(SignatureStatus::DoesNotConformToSignatureFormat(
                    "signer certificate not present among embedded certificates".to_string(),
                ));
            }
        };

        let policy = self.cert_policy.resolve();
        let trusted = policy.validate(
            &chain,
            Some(&config.trusted_roots),
            None,
            config.certificate_expiration,
            config.certificate_revocation,
        )?;

        if !trusted {
            return Ok(SignatureStatus::CertificateNotTrusted);
        }

        if signer.verify_message_digest(content).is_err() {
            return Ok(SignatureStatus::DigestMismatch);
        }

        let verifier = signer.signature_verifier(signed_data.certificates())?;
        let signed_content = signer.signed_content(Some(content));
        if verifier.verify(&signed_content, signer.signature()).is_err() {
            return Ok(SignatureStatus::DigestMismatch);
        }

        Ok(SignatureStatus::Valid(entity_from_leaf(&leaf)?))
    }

    fn signing_entity(&self, signature: &[u8], format: SignatureFormat) -> Result<SigningEntity> {
        let _ = format;

        let signed_data = SignedData::parse_ber(signature)
            .map_err(|e| SigningError::DoesNotConformToSignatureFormat(e.to_string()))?;

        let signer = signed_data
            .signers()
            .next()
            .ok_or_else(|| SigningError::DoesNotConformToSignatureFormat("no SignerInfo present".to_string()))?;

        let (issuer, serial) = signer
            .certificate_issuer_and_serial()
            .ok_or_else(|| SigningError::DoesNotConformToSignatureFormat("no signer identifier".to_string()))?;

        let chain = reconstruct_chain(&signed_data, issuer, serial)?;
        let leaf = chain
            .first()
            .ok_or_else(|| SigningError::DoesNotConformToSignatureFormat("signer certificate not embedded".to_string()))?;

        entity_from_leaf(leaf)
    }
}

/// Walk the embedded certificate set starting from the signer's issuer+serial
/// and follow each certificate's issuer up to (but not past) a self-signed
/// root, producing a leaf-first chain.
///
/// `cryptographic_message_syntax::certificate_is_subset_of` is private to
/// that crate, so identity here is a plain issuer/serial equality check,
/// matching how `SignerInfo::certificate_issuer_and_serial` identifies the
/// signer in the first place.
fn reconstruct_chain(
    signed_data: &SignedData,
    issuer: &cryptographic_message_syntax::asn1::rfc3280::Name,
    serial: &bcder::Integer,
) -> Result<Vec<CapturedX509Certificate>> {
    let embedded: Vec<Certificate> = signed_data.certificates().cloned().collect();

    let leaf = embedded
        .iter()
        .find(|cert| cert.issuer() == issuer && cert.serial_number() == serial)
        .ok_or_else(|| {
            SigningError::DoesNotConformToSignatureFormat(
                "signer certificate not present among embedded certificates".to_string(),
            )
        })?;

    let mut chain = Vec::new();
    let mut current = leaf.clone();

    loop {
        let der = current
            .as_der()
            .map_err(|e| SigningError::CertificateEncoding(e.to_string()))?;
        let captured = CapturedX509Certificate::from_der(der)
            .map_err(|e| SigningError::CertificateEncoding(e.to_string()))?;

        let is_self_signed = current.is_self_signed();
        chain.push(captured);

        if is_self_signed {
            break;
        }

        match embedded.iter().find(|cert| cert.subject() == current.issuer()) {
            Some(next) => current = next.clone(),
            None => break,
        }
    }

    Ok(chain)
}

fn entity_from_leaf(leaf: &CapturedX509Certificate) -> Result<SigningEntity> {
    use collection_cert_policy::PackageCertificate;

    let subject = leaf.extracted_subject()?;

    let entity_type = if leaf.has_extension(&collection_cert_policy::OID_APPLE_MARKER_IOS_DISTRIBUTION)
        || leaf.has_extension(&collection_cert_policy::OID_APPLE_MARKER_MAC_DISTRIBUTION)
    {
        Some("adp".to_string())
    } else {
        None
    };

    Ok(SigningEntity {
        entity_type,
        name: subject.common_name,
        organizational_unit: subject.organizational_unit_name,
        organization: subject.organization_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_from(cert: CapturedX509Certificate, key: InMemorySigningKeyPair) -> SigningIdentity {
        SigningIdentity {
            chain: vec![cert],
            private_key: std::sync::Arc::new(key),
        }
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let (cert, key) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        let identity = identity_from(cert, key);

        let content = b"collection bytes to sign";
        let provider = CmsSignatureProvider::default();

        let signature = provider
            .sign(content, &identity, SignatureFormat::Cms1_0_0)
            .expect("signing should succeed");

        let config = VerifierConfiguration {
            trusted_roots: identity.chain.clone(),
            certificate_expiration: ExpirationMode::Enabled,
            certificate_revocation: RevocationMode::Disabled,
        };

        let status = provider
            .status(&signature, content, &config, SignatureFormat::Cms1_0_0)
            .expect("status should not error");

        assert!(matches!(status, SignatureStatus::Valid(_)));
    }

    #[test]
    fn tampered_content_is_rejected() {
        let (cert, key) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        let identity = identity_from(cert, key);

        let provider = CmsSignatureProvider::default();
        let signature = provider
            .sign(b"original", &identity, SignatureFormat::Cms1_0_0)
            .expect("signing should succeed");

        let config = VerifierConfiguration {
            trusted_roots: identity.chain.clone(),
            certificate_expiration: ExpirationMode::Enabled,
            certificate_revocation: RevocationMode::Disabled,
        };

        let status = provider
            .status(&signature, b"tampered", &config, SignatureFormat::Cms1_0_0)
            .expect("status should not error");

        assert_eq!(status, SignatureStatus::DigestMismatch);
    }

    #[test]
    fn untrusted_chain_is_reported() {
        let (cert, key) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        let identity = identity_from(cert, key);

        let provider = CmsSignatureProvider::default();
        let content = b"collection bytes";
        let signature = provider
            .sign(content, &identity, SignatureFormat::Cms1_0_0)
            .expect("signing should succeed");

        let config = VerifierConfiguration::default();

        let status = provider
            .status(&signature, content, &config, SignatureFormat::Cms1_0_0)
            .expect("status should not error");

        assert_eq!(status, SignatureStatus::CertificateNotTrusted);
    }

    #[test]
    fn unrecognized_format_string_is_rejected() {
        assert!("cms-2.0.0".parse::<SignatureFormat>().is_err());
        assert_eq!("cms-1.0.0".parse::<SignatureFormat>().unwrap(), SignatureFormat::Cms1_0_0);
    }
}
