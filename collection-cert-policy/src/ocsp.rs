// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal OCSP (RFC 6960) client: build a request for a single
//! certificate, POST it to the issuing certificate's responder, and read
//! back just enough of the response to know whether the certificate is
//! good, revoked, or unknown.

use {
    bcder::{
        decode::{Constructed, Malformed},
        encode::{PrimitiveContent, Values},
        Mode, Oid, OctetString, Tag,
    },
    bytes::Bytes,
    x509_certificate::CapturedX509Certificate,
};

#[derive(Debug, thiserror::Error)]
pub enum OcspError {
    #[error("HTTP error communicating with OCSP responder: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed OCSP response")]
    Malformed,

    #[error("OCSP responder returned a non-successful status")]
    ResponderError,
}

pub type Result<T> = std::result::Result<T, OcspError>;

/// The certificate status conveyed by a `SingleResponse`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevocationStatus {
    Good,
    Revoked,
    Unknown,
}

/// `id-sha1` (1.3.14.3.2.26), the hash algorithm mandated for `CertID` by RFC 6960.
const OID_SHA1: &[u8] = &[43, 14, 3, 2, 26];

/// Extracts the OCSP responder URLs carried by an `AuthorityInfoAccess`
/// extension's raw octet string value.
///
/// `AuthorityInfoAccess ::= SEQUENCE OF AccessDescription`, where
/// `AccessDescription ::= SEQUENCE { accessMethod OID, accessLocation GeneralName }`
/// and a URI `GeneralName` is context tag `[6]` holding an IA5String.
pub fn parse_authority_info_access_ocsp_urls(octets: &OctetString) -> Result<Vec<String>> {
    let data = octets.clone().to_bytes();

    Constructed::decode(data.as_ref(), Mode::Der, |cons| {
        // Unwrap the SEQUENCE OF wrapper, then walk its AccessDescription elements.
        cons.take_sequence(|cons| {
            let mut urls = Vec::new();

            while let Some(()) = cons.take_opt_sequence(|cons| {
                let method = Oid::take_from(cons)?;
                let is_ocsp = method.as_ref() == crate::OID_AD_OCSP.as_ref();

                let uri = cons.take_opt_primitive_if(Tag::CTX_6, |prim| {
                    Ok(String::from_utf8_lossy(prim.take_all()?.as_ref()).into_owned())
                })?;

                if let (true, Some(uri)) = (is_ocsp, uri) {
                    urls.push(uri);
                } else {
                    // Not a URI-shaped or non-OCSP access location; nothing further to read.
                }

                Ok(())
            })? {}

            Ok(urls)
        })
    })
    .map_err(|_| OcspError::Malformed)
}

/// Build the DER bytes of an `OCSPRequest` for `leaf`, whose issuer is `issuer`.
fn build_ocsp_request(leaf: &CapturedX509Certificate, issuer: &CapturedX509Certificate) -> Vec<u8> {
    use {bcder::encode, ring::digest};

    let mut issuer_name_der = Vec::new();
    issuer
        .subject_name()
        .encode_ref()
        .write_encoded(Mode::Der, &mut issuer_name_der)
        .expect("writing to Vec<u8> cannot fail");
    let issuer_name_hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &issuer_name_der);

    let issuer_public_key = issuer.public_key_data();
    let issuer_key_hash =
        digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, issuer_public_key.as_ref());

    let serial = leaf.as_ref().serial_number_asn1().clone();

    // CertID ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier, issuerNameHash
    // OCTET STRING, issuerKeyHash OCTET STRING, serialNumber CertificateSerialNumber }
    //
    // AlgorithmIdentifier is itself a SEQUENCE wrapping the hash OID.
    let hash_algorithm = encode::sequence(Oid(Bytes::copy_from_slice(OID_SHA1)).encode_ref());

    let cert_id = encode::sequence((
        hash_algorithm,
        OctetString::new(Bytes::copy_from_slice(issuer_name_hash.as_ref())).encode_ref(),
        OctetString::new(Bytes::copy_from_slice(issuer_key_hash.as_ref())).encode_ref(),
        (&serial).encode(),
    ));

    // Request ::= SEQUENCE { reqCert CertID }
    let request = encode::sequence(cert_id);

    // TBSRequest ::= SEQUENCE { requestList SEQUENCE OF Request }
    let request_list = encode::sequence(request);
    let tbs_request = encode::sequence(request_list);

    // OCSPRequest ::= SEQUENCE { tbsRequest TBSRequest }
    let mut buf = Vec::new();
    encode::sequence(tbs_request)
        .write_encoded(Mode::Der, &mut buf)
        .expect("writing to Vec<u8> cannot fail");

    buf
}

/// Parse the `certStatus` CHOICE out of the first `SingleResponse` in a
/// `BasicOCSPResponse`.
///
/// This walks only as deep as needed to read the status (`[0] good`,
/// `[1] revoked`, `[2] unknown`); extensions, nonces, and signature
/// verification of the response itself are not inspected, matching this
/// subsystem's soft-fail-friendly revocation model.
fn parse_cert_status(der: &[u8]) -> Result<RevocationStatus> {
    Constructed::decode(der, Mode::Der, |cons| {
        // OCSPResponse ::= SEQUENCE { responseStatus ENUMERATED, responseBytes [0] EXPLICIT ResponseBytes OPTIONAL }
        cons.take_sequence(|cons| {
            let status = cons.take_primitive_if(Tag::ENUMERATED, |prim| {
                Ok(prim.take_all()?.as_ref().first().copied().unwrap_or(1))
            })?;

            if status != 0 {
                return Err(Malformed.into());
            }

            let response_bytes = cons
                .take_constructed_if(Tag::CTX_0, |cons| cons.take_sequence(|cons| {
                    // ResponseBytes ::= SEQUENCE { responseType OID, response OCTET STRING }
                    let _response_type = Oid::take_from(cons)?;
                    let response = OctetString::take_from(cons)?;
                    Ok(response.to_bytes())
                }))?;

            Constructed::decode(response_bytes.as_ref(), Mode::Der, |cons| {
                // BasicOCSPResponse ::= SEQUENCE { tbsResponseData ResponseData, ... }
                cons.take_sequence(|cons| parse_response_data(cons))
            })
            .map_err(|_| Malformed.into())
        })
    })
    .map_err(|_| OcspError::Malformed)
}

fn parse_response_data<S: bcder::decode::Source>(
    cons: &mut Constructed<S>,
) -> std::result::Result<RevocationStatus, bcder::decode::DecodeError<S::Error>> {
    cons.take_sequence(|cons| {
        // ResponseData ::= SEQUENCE { version [0] EXPLICIT DEFAULT, responderID
        // ResponderID, producedAt GeneralizedTime, responses SEQUENCE OF SingleResponse, ... }
        cons.take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?;
        cons.take_constructed(|_, cons| cons.capture_all())?; // responderID
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| prim.take_all())?; // producedAt

        cons.take_sequence(|cons| {
            cons.take_sequence(|cons| {
                cons.take_sequence(|cons| cons.capture_all())?; // CertID

                // CertStatus ::= CHOICE { good [0] IMPLICIT NULL, revoked [1]
                // IMPLICIT RevokedInfo, unknown [2] IMPLICIT UnknownInfo }
                if cons.take_opt_primitive_if(Tag::CTX_0, |prim| prim.take_all())?.is_some() {
                    return Ok(RevocationStatus::Good);
                }
                if cons.take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?.is_some() {
                    return Ok(RevocationStatus::Revoked);
                }
                cons.take_opt_constructed_if(Tag::CTX_2, |cons| cons.capture_all())?;
                Ok(RevocationStatus::Unknown)
            })
        })
    })
}

/// Query `responder_url` for the revocation status of `leaf`, issued by
/// `issuer`. Any error communicating with the responder or parsing its
/// response is surfaced rather than silently treated as "good" — callers
/// decide whether that counts against them per their revocation mode.
pub fn check_revocation_status(
    responder_url: &str,
    leaf: &CapturedX509Certificate,
    issuer: Option<&CapturedX509Certificate>,
) -> Result<RevocationStatus> {
    let issuer = match issuer {
        Some(issuer) => issuer,
        None => return Ok(RevocationStatus::Unknown),
    };

    let request_der = build_ocsp_request(leaf, issuer);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(1))
        .build()?;

    let response = client
        .post(responder_url)
        .header("Content-Type", "application/ocsp-request")
        .body(request_der)
        .send()?;

    if !response.status().is_success() {
        return Err(OcspError::ResponderError);
    }

    let body = response.bytes()?;

    parse_cert_status(body.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short-form DER TLV encoder. Every value built by these tests fits well
    /// under the 128-byte long-form length threshold.
    fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        assert!(content.len() < 128);
        let mut out = vec![tag, content.len() as u8];
        out.extend_from_slice(content);
        out
    }

    /// Builds a minimal but structurally valid `OCSPResponse` carrying a
    /// single `SingleResponse` whose `certStatus` is `cert_status`. Only the
    /// fields `parse_cert_status` actually reads are populated; optional
    /// fields it skips (`version`, `thisUpdate`, extensions, the response
    /// signature) are omitted entirely.
    fn synthetic_ocsp_response(cert_status: &[u8]) -> Vec<u8> {
        let cert_id = der_tlv(0x30, &[]);
        let single_response = der_tlv(0x30, &[cert_id, cert_status.to_vec()].concat());
        let responses = der_tlv(0x30, &single_response);

        let responder_id = der_tlv(0x30, &[]);
        let produced_at = der_tlv(0x18, b"20240101000000Z");
        let response_data = der_tlv(0x30, &[responder_id, produced_at, responses].concat());
        let basic_response = der_tlv(0x30, &response_data);

        let response_type = der_tlv(0x06, &[43, 14, 3, 2, 26]);
        let response_octet_string = der_tlv(0x04, &basic_response);
        let response_bytes = der_tlv(0x30, &[response_type, response_octet_string].concat());
        let tagged_response_bytes = der_tlv(0xA0, &response_bytes);

        let response_status = der_tlv(0x0A, &[0]);

        der_tlv(0x30, &[response_status, tagged_response_bytes].concat())
    }

    #[test]
    fn parse_cert_status_reads_good() {
        let response = synthetic_ocsp_response(&der_tlv(0x80, &[]));
        assert_eq!(parse_cert_status(&response).unwrap(), RevocationStatus::Good);
    }

    #[test]
    fn parse_cert_status_reads_revoked() {
        let response = synthetic_ocsp_response(&der_tlv(0xA1, &[]));
        assert_eq!(parse_cert_status(&response).unwrap(), RevocationStatus::Revoked);
    }

    #[test]
    fn parse_cert_status_reads_unknown() {
        let response = synthetic_ocsp_response(&der_tlv(0xA2, &[]));
        assert_eq!(parse_cert_status(&response).unwrap(), RevocationStatus::Unknown);
    }

    #[test]
    fn parse_cert_status_reads_unknown_when_certstatus_tag_omitted() {
        // `[2] unknown` is itself optional; its absence still means unknown.
        let response = synthetic_ocsp_response(&[]);
        assert_eq!(parse_cert_status(&response).unwrap(), RevocationStatus::Unknown);
    }

    #[test]
    fn parse_cert_status_rejects_non_successful_response_status() {
        let response_status = der_tlv(0x0A, &[1]); // malformedRequest
        let response = der_tlv(0x30, &response_status);
        assert!(parse_cert_status(&response).is_err());
    }

    #[test]
    fn parse_cert_status_rejects_garbage() {
        assert!(parse_cert_status(&[0xff, 0x00, 0x01]).is_err());
    }

    #[test]
    fn build_ocsp_request_produces_well_formed_der() {
        let (leaf, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);
        let (issuer, _) = x509_certificate::testutil::self_signed_ecdsa_key_pair(None);

        let der = build_ocsp_request(&leaf, &issuer);

        let serial = Constructed::decode(der.as_ref(), Mode::Der, |cons| {
            cons.take_sequence(|cons| {
                // TBSRequest
                cons.take_sequence(|cons| {
                    // requestList: SEQUENCE OF Request, exactly one here
                    cons.take_sequence(|cons| {
                        // Request wraps a single CertID as its sole element
                        cons.take_sequence(|cons| {
                            // CertID
                            cons.take_sequence(|cons| {
                                cons.take_sequence(|cons| Oid::take_from(cons))?;
                                let name_hash = OctetString::take_from(cons)?;
                                let key_hash = OctetString::take_from(cons)?;
                                let serial = bcder::int::Integer::take_from(cons)?;
                                assert_eq!(name_hash.to_bytes().len(), 20);
                                assert_eq!(key_hash.to_bytes().len(), 20);
                                Ok(serial)
                            })
                        })
                    })
                })
            })
        })
        .unwrap();

        assert_eq!(&serial, leaf.as_ref().serial_number_asn1());
    }
}
