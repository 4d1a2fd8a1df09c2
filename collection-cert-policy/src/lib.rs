// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Certificate attribute extraction and chain validation policies.
//!
//! [PackageCertificate] extends [CapturedX509Certificate] with the name and
//! extension lookups the trust subsystem needs (C1). [CertPolicy] validates a
//! chain of certificates against a named policy, including Apple marker
//! extensions and optional OCSP revocation checking (C2).

pub mod ocsp;

use {
    bcder::{ConstOid, Oid},
    chrono::{DateTime, Utc},
    x509_certificate::{CapturedX509Certificate, X509Certificate},
};

#[derive(Debug, thiserror::Error)]
pub enum CertPolicyError {
    #[error("certificate chain is empty")]
    EmptyChain,

    #[error("failed extracting a name attribute: {0}")]
    NameExtractionFailure(String),

    #[error("failed inspecting a certificate extension: {0}")]
    ExtensionFailure(String),

    #[error("certificate could not be parsed: {0}")]
    InitializationFailure(String),
}

pub type Result<T> = std::result::Result<T, CertPolicyError>;

/// Extended Key Usage extension OID (2.5.29.37).
const OID_EXTENDED_KEY_USAGE: ConstOid = Oid(&[85, 29, 37]);

/// `id-pe-authorityInfoAccess` (1.3.6.1.5.5.7.1.1).
const OID_AUTHORITY_INFO_ACCESS: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 1, 1]);

/// `id-ad-ocsp` (1.3.6.1.5.5.7.48.1).
const OID_AD_OCSP: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 48, 1]);

/// EKU purpose `id-kp-codeSigning` (1.3.6.1.5.5.7.3.3).
pub const OID_EKU_CODE_SIGNING: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 3]);

/// Apple Distribution: iOS marker (1.2.840.113635.100.6.1.4).
pub const OID_APPLE_MARKER_IOS_DISTRIBUTION: ConstOid =
    Oid(&[42, 134, 72, 134, 247, 99, 100, 6, 1, 4]);

/// Apple Distribution: macOS marker (1.2.840.113635.100.6.1.7).
pub const OID_APPLE_MARKER_MAC_DISTRIBUTION: ConstOid =
    Oid(&[42, 134, 72, 134, 247, 99, 100, 6, 1, 7]);

/// Apple Worldwide Developer Relations intermediate marker (1.2.840.113635.100.6.2.1).
pub const OID_APPLE_MARKER_WWDR_INTERMEDIATE: ConstOid =
    Oid(&[42, 134, 72, 134, 247, 99, 100, 6, 2, 1]);

/// OID for the `userId` name attribute (0.9.2342.19200300.100.1.1).
const OID_USER_ID: ConstOid = Oid(&[9, 146, 38, 137, 147, 242, 44, 100, 1, 1]);

/// Name attributes extracted from a certificate's subject or issuer.
///
/// Attributes not present on the certificate are `None`; decoding never
/// panics on malformed or non-UTF-8 attribute values, it simply treats them
/// as absent.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtractedName {
    pub user_id: Option<String>,
    pub common_name: Option<String>,
    pub organization_name: Option<String>,
    pub organizational_unit_name: Option<String>,
}

/// Extends [CapturedX509Certificate] with the attribute and extension lookups
/// the trust subsystem needs.
pub trait PackageCertificate: Sized {
    fn extracted_subject(&self) -> Result<ExtractedName>;
    fn extracted_issuer(&self) -> Result<ExtractedName>;
    fn has_extension<T: AsRef<[u8]>>(&self, oid: &Oid<T>) -> bool;
    fn extended_key_usages(&self) -> Vec<Oid>;
    fn ocsp_responder_urls(&self) -> Vec<String>;
}

impl PackageCertificate for CapturedX509Certificate {
    fn extracted_subject(&self) -> Result<ExtractedName> {
        extract_name(self.subject_name())
    }

    fn extracted_issuer(&self) -> Result<ExtractedName> {
        extract_name(self.issuer_name())
    }

    fn has_extension<T: AsRef<[u8]>>(&self, oid: &Oid<T>) -> bool {
        self.iter_extensions()
            .any(|extension| extension.id.as_ref() == oid.as_ref())
    }

    fn extended_key_usages(&self) -> Vec<Oid> {
        self.iter_extensions()
            .filter(|extension| extension.id.as_ref() == OID_EXTENDED_KEY_USAGE.as_ref())
            .filter_map(|extension| extension.try_decode_sequence_single_oid())
            .collect()
    }

    fn ocsp_responder_urls(&self) -> Vec<String> {
        self.iter_extensions()
            .filter(|extension| extension.id.as_ref() == OID_AUTHORITY_INFO_ACCESS.as_ref())
            .filter_map(|extension| ocsp::parse_authority_info_access_ocsp_urls(&extension.value).ok())
            .flatten()
            .collect()
    }
}

/// Attempts an attribute lookup first as PrintableString, then UTF8String;
/// failure to decode in either form is treated as the attribute being absent.
fn find_attribute_string(name: &x509_certificate::rfc3280::Name, oid: ConstOid) -> Option<String> {
    name.find_first_attribute_string(Oid(oid.as_ref().into()))
        .ok()
        .flatten()
}

fn extract_name(name: &x509_certificate::rfc3280::Name) -> Result<ExtractedName> {
    Ok(ExtractedName {
        user_id: find_attribute_string(name, OID_USER_ID),
        common_name: name.iter_common_name().next().and_then(|a| a.to_string().ok()),
        organization_name: name.iter_organization().next().and_then(|a| a.to_string().ok()),
        organizational_unit_name: name
            .iter_organizational_unit()
            .next()
            .and_then(|a| a.to_string().ok()),
    })
}

/// A named certificate chain validation policy (C2).
#[derive(Clone, Debug)]
pub enum CertPolicy {
    /// Leaf carries EKU `codeSigning` and at least one OCSP responder URL;
    /// chain verifies against the supplied anchors.
    Basic,

    /// [Self::Basic] plus Apple marker-extension and chain-shape requirements.
    AppleDeveloper {
        expected_subject_user_id: Option<String>,
    },
}

/// Whether a chain's `notBefore`/`notAfter` validity window is enforced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExpirationMode {
    /// Reject a chain with any certificate outside its validity window.
    Enabled,
    /// Skip the date check entirely.
    Disabled,
}

/// How OCSP revocation is consulted while validating a chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevocationMode {
    /// Skip OCSP entirely.
    Disabled,
    /// An inconclusive ("unknown") OCSP response is accepted.
    AllowSoftFail,
    /// Only a conclusive "good" OCSP response is accepted.
    Strict,
}

impl CertPolicy {
    /// Validate `chain` (leaf-first) against `anchors`, optionally pinning
    /// the verification instant and the expiration/OCSP revocation
    /// disciplines.
    ///
    /// Returns `Ok(false)` for an untrusted chain (signature verification
    /// failure, date out of range, revoked certificate) and `Err` only for
    /// structurally invalid input (empty chain, unreadable extensions).
    pub fn validate(
        &self,
        chain: &[CapturedX509Certificate],
        anchors: Option<&[CapturedX509Certificate]>,
        verify_date: Option<DateTime<Utc>>,
        expiration: ExpirationMode,
        revocation: RevocationMode,
    ) -> Result<bool> {
        let leaf = chain.first().ok_or(CertPolicyError::EmptyChain)?;
        let verify_date = verify_date.unwrap_or_else(Utc::now);

        if expiration == ExpirationMode::Enabled && !chain_dates_valid(chain, verify_date) {
            return Ok(false);
        }

        if !chain_signatures_valid(chain, anchors) {
            return Ok(false);
        }

        if !leaf
            .extended_key_usages()
            .iter()
            .any(|oid| oid.as_ref() == OID_EKU_CODE_SIGNING.as_ref())
        {
            return Ok(false);
        }

        if leaf.ocsp_responder_urls().is_empty() {
            return Ok(false);
        }

        if !self.extra_checks_pass(chain)? {
            return Ok(false);
        }

        if revocation != RevocationMode::Disabled {
            for responder in leaf.ocsp_responder_urls() {
                match ocsp::check_revocation_status(&responder, leaf, chain.get(1)) {
                    Ok(ocsp::RevocationStatus::Good) => {}
                    Ok(ocsp::RevocationStatus::Revoked) => return Ok(false),
                    Ok(ocsp::RevocationStatus::Unknown) | Err(_) => {
                        if revocation == RevocationMode::Strict {
                            return Ok(false);
                        }
                        log::warn!("OCSP check against {} was inconclusive; soft-failing", responder);
                    }
                }
            }
        }

        Ok(true)
    }

    fn extra_checks_pass(&self, chain: &[CapturedX509Certificate]) -> Result<bool> {
        match self {
            Self::Basic => Ok(true),
            Self::AppleDeveloper {
                expected_subject_user_id,
            } => {
                if chain.len() != 3 {
                    return Ok(false);
                }

                let leaf = &chain[0];
                let intermediate = &chain[1];

                let leaf_marked = leaf.has_extension(&OID_APPLE_MARKER_IOS_DISTRIBUTION)
                    || leaf.has_extension(&OID_APPLE_MARKER_MAC_DISTRIBUTION);
                if !leaf_marked {
                    return Ok(false);
                }

                if !intermediate.has_extension(&OID_APPLE_MARKER_WWDR_INTERMEDIATE) {
                    return Ok(false);
                }

                if let Some(expected) = expected_subject_user_id {
                    let subject = leaf.extracted_subject()?;
                    if subject.user_id.as_deref() != Some(expected.as_str()) {
                        return Ok(false);
                    }
                }

                Ok(true)
            }
        }
    }
}

fn chain_dates_valid(chain: &[CapturedX509Certificate], verify_date: DateTime<Utc>) -> bool {
    chain.iter().all(|cert| {
        let validity = cert.validity();
        verify_date >= validity.not_before.to_datetime() && verify_date <= validity.not_after.to_datetime()
    })
}

fn chain_signatures_valid(
    chain: &[CapturedX509Certificate],
    anchors: Option<&[CapturedX509Certificate]>,
) -> bool {
    for pair in chain.windows(2) {
        if pair[0].verify_signed_by_certificate(&pair[1]).is_err() {
            return false;
        }
    }

    let top = match chain.last() {
        Some(top) => top,
        None => return false,
    };

    match anchors {
        None => top.subject_is_issuer(),
        Some(anchors) if anchors.is_empty() => top.subject_is_issuer() && chain.len() > 1,
        Some(anchors) => anchors.iter().any(|anchor| {
            top.verify_signed_by_certificate(anchor).is_ok()
                || top.constructed_data() == anchor.constructed_data()
        }),
    }
}

/// A cheap helper exposing the underlying ASN.1 [X509Certificate] for a
/// [CapturedX509Certificate], mirroring the crate's own `AsRef` impl.
pub fn as_rfc5280(cert: &CapturedX509Certificate) -> &X509Certificate {
    cert.as_ref()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        bytes::Bytes,
        x509_certificate::rfc5280::{Extension, Extensions},
    };

    fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        assert!(content.len() < 128);
        let mut out = vec![tag, content.len() as u8];
        out.extend_from_slice(content);
        out
    }

    fn extension(oid: ConstOid, content: Vec<u8>) -> Extension {
        Extension {
            id: Oid(Bytes::copy_from_slice(oid.as_ref())),
            critical: None,
            value: bcder::OctetString::new(Bytes::from(content)),
        }
    }

    fn eku_code_signing_extension() -> Extension {
        let oid_tlv = der_tlv(0x06, OID_EKU_CODE_SIGNING.as_ref());
        extension(OID_EXTENDED_KEY_USAGE, der_tlv(0x30, &oid_tlv))
    }

    fn ocsp_authority_info_access_extension(url: &str) -> Extension {
        let method = der_tlv(0x06, OID_AD_OCSP.as_ref());
        let location = der_tlv(0x86, url.as_bytes());
        let access_description = der_tlv(0x30, &[method, location].concat());
        extension(OID_AUTHORITY_INFO_ACCESS, der_tlv(0x30, &access_description))
    }

    fn marker_extension(oid: ConstOid) -> Extension {
        extension(oid, Vec::new())
    }

    fn cert_with_extensions(extensions: Vec<Extension>) -> CapturedX509Certificate {
        let mut exts = Extensions::default();
        for ext in extensions {
            exts.push(ext);
        }

        x509_certificate::testutil::self_signed_ecdsa_key_pair_with_extensions("test", exts).0
    }

    fn code_signing_cert() -> CapturedX509Certificate {
        cert_with_extensions(vec![
            eku_code_signing_extension(),
            ocsp_authority_info_access_extension("http://ocsp.example.com/"),
        ])
    }

    #[test]
    fn chain_signatures_valid_accepts_length_one_chain_with_leaf_as_sole_anchor() {
        let (cert, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        assert!(chain_signatures_valid(&[cert.clone()], Some(&[cert])));
    }

    #[test]
    fn chain_signatures_valid_rejects_length_one_chain_against_unrelated_anchor() {
        let (leaf, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        let (other, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        assert!(!chain_signatures_valid(&[leaf], Some(&[other])));
    }

    #[test]
    fn chain_signatures_valid_accepts_self_signed_leaf_with_no_anchors_supplied() {
        let (cert, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        assert!(chain_signatures_valid(&[cert], None));
    }

    #[test]
    fn chain_dates_valid_rejects_a_verify_date_outside_the_certificate_window() {
        let (cert, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        assert!(chain_dates_valid(&[cert.clone()], Utc::now()));
        assert!(!chain_dates_valid(&[cert], Utc::now() + chrono::Duration::hours(2)));
    }

    #[test]
    fn validate_rejects_an_empty_chain() {
        let policy = CertPolicy::Basic;
        let err = policy
            .validate(&[], None, None, ExpirationMode::Disabled, RevocationMode::Disabled)
            .unwrap_err();
        assert!(matches!(err, CertPolicyError::EmptyChain));
    }

    /// The named boundary case: a chain of length 1 with the leaf passed as
    /// its own sole anchor still passes the Basic policy.
    #[test]
    fn validate_basic_policy_accepts_leaf_used_as_its_own_anchor() {
        let cert = code_signing_cert();
        let policy = CertPolicy::Basic;

        let result = policy
            .validate(
                &[cert.clone()],
                Some(&[cert]),
                None,
                ExpirationMode::Enabled,
                RevocationMode::Disabled,
            )
            .unwrap();
        assert!(result);
    }

    #[test]
    fn validate_basic_policy_rejects_leaf_without_code_signing_eku() {
        let cert = cert_with_extensions(vec![ocsp_authority_info_access_extension(
            "http://ocsp.example.com/",
        )]);
        let policy = CertPolicy::Basic;

        let result = policy
            .validate(
                &[cert.clone()],
                Some(&[cert]),
                None,
                ExpirationMode::Disabled,
                RevocationMode::Disabled,
            )
            .unwrap();
        assert!(!result);
    }

    #[test]
    fn validate_basic_policy_rejects_leaf_without_ocsp_responder() {
        let cert = cert_with_extensions(vec![eku_code_signing_extension()]);
        let policy = CertPolicy::Basic;

        let result = policy
            .validate(
                &[cert.clone()],
                Some(&[cert]),
                None,
                ExpirationMode::Disabled,
                RevocationMode::Disabled,
            )
            .unwrap();
        assert!(!result);
    }

    #[test]
    fn apple_developer_extra_checks_rejects_wrong_chain_length() {
        let policy = CertPolicy::AppleDeveloper {
            expected_subject_user_id: None,
        };
        let cert = code_signing_cert();
        assert!(!policy.extra_checks_pass(&[cert]).unwrap());
    }

    #[test]
    fn apple_developer_extra_checks_requires_leaf_and_intermediate_markers() {
        let policy = CertPolicy::AppleDeveloper {
            expected_subject_user_id: None,
        };

        let leaf = code_signing_cert();
        let intermediate = cert_with_extensions(vec![marker_extension(OID_APPLE_MARKER_WWDR_INTERMEDIATE)]);
        let root = cert_with_extensions(vec![]);

        // Leaf lacks an Apple distribution marker.
        assert!(!policy
            .extra_checks_pass(&[leaf.clone(), intermediate.clone(), root.clone()])
            .unwrap());

        let marked_leaf = cert_with_extensions(vec![marker_extension(OID_APPLE_MARKER_IOS_DISTRIBUTION)]);
        let unmarked_intermediate = code_signing_cert();

        // Intermediate lacks the WWDR marker.
        assert!(!policy
            .extra_checks_pass(&[marked_leaf, unmarked_intermediate, root])
            .unwrap());
    }

    #[test]
    fn apple_developer_extra_checks_passes_when_both_markers_present() {
        let policy = CertPolicy::AppleDeveloper {
            expected_subject_user_id: None,
        };

        let leaf = cert_with_extensions(vec![marker_extension(OID_APPLE_MARKER_MAC_DISTRIBUTION)]);
        let intermediate = cert_with_extensions(vec![marker_extension(OID_APPLE_MARKER_WWDR_INTERMEDIATE)]);
        let root = cert_with_extensions(vec![]);

        assert!(policy.extra_checks_pass(&[leaf, intermediate, root]).unwrap());
    }

    #[test]
    fn apple_developer_extra_checks_rejects_subject_user_id_mismatch() {
        let policy = CertPolicy::AppleDeveloper {
            expected_subject_user_id: Some("expected-user".to_string()),
        };

        let leaf = cert_with_extensions(vec![marker_extension(OID_APPLE_MARKER_IOS_DISTRIBUTION)]);
        let intermediate = cert_with_extensions(vec![marker_extension(OID_APPLE_MARKER_WWDR_INTERMEDIATE)]);
        let root = cert_with_extensions(vec![]);

        // The test leaf carries no userId attribute at all, so any expectation mismatches.
        assert!(!policy.extra_checks_pass(&[leaf, intermediate, root]).unwrap());
    }
}
