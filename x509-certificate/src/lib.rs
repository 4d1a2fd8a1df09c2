// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface with X.509 certificates.
//!
//! This crate provides an interface to X.509 certificates.
//!
//! Low-level ASN.1 primitives are defined in modules having the name of the
//! RFC in which they are defined.

pub mod algorithm;
pub mod asn1time;
pub mod certificate;
pub mod rfc2986;
pub mod rfc3280;
pub mod rfc3447;
pub mod rfc4519;
pub mod rfc5280;
pub mod rfc5480;
pub mod rfc5652;
pub mod rfc5915;
pub mod rfc5958;
pub mod rfc8017;
pub mod signing;
#[cfg(any(test, feature = "test"))]
pub mod testutil;

pub use {
    algorithm::{DigestAlgorithm, EcdsaCurve, KeyAlgorithm, SignatureAlgorithm},
    asn1time::Time,
    certificate::{
        certificate_is_subset_of, CapturedX509Certificate, MutableX509Certificate,
        X509Certificate,
    },
    rfc5280::{Extension, Extensions},
    signing::{InMemorySigningKeyPair, KeyInfoSigner, Sign, Signature},
};

/// Errors related to X.509 certificate handling.
#[derive(Debug, thiserror::Error)]
pub enum X509CertificateError {
    #[error("error decoding certificate data: {0}")]
    CertificateDecode(#[from] bcder::decode::Error),

    #[error("error decoding PEM data: {0}")]
    PemDecode(#[from] pem::PemError),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("unknown signature algorithm: {0}")]
    UnknownSignatureAlgorithm(String),

    #[error("unknown key algorithm: {0}")]
    UnknownKeyAlgorithm(String),

    #[error("unknown elliptic curve: {0}")]
    UnknownEllipticCurve(String),

    #[error("signature verification not supported for key algorithm {0:?} and signature algorithm {1:?}")]
    UnsupportedSignatureVerification(KeyAlgorithm, SignatureAlgorithm),

    #[error("unhandled key algorithm parameters {0}")]
    UnhandledKeyAlgorithmParameters(&'static str),

    #[error("key pair generation error")]
    KeyPairGenerationError,

    #[error("RSA key generation is not supported")]
    RsaKeyGenerationNotSupported,

    #[error("certificate signature verification failed")]
    CertificateSignatureVerificationFailed,
}

pub type Result<T> = std::result::Result<T, X509CertificateError>;
