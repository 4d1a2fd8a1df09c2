// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Enumeration of platform-keychain signing identities by label (C4).
//!
//! [SigningIdentityStore::find] never fails hard: an unavailable or
//! inaccessible identity store is logged as a warning and reported as an
//! empty result, never as an error.

use x509_certificate::CapturedX509Certificate;

/// A certificate chain enumerated from a platform identity store, paired
/// with the label it was found under.
///
/// This is deliberately lighter than `collection_signing::SigningIdentity`:
/// a keychain-backed private key cannot be extracted into memory, so this
/// type carries only the certificate chain needed to identify and display
/// the identity. Using it to actually sign requires a platform-specific
/// signing call keyed off `label`, which is outside this component's scope.
#[derive(Clone, Debug)]
pub struct SigningIdentity {
    pub label: String,
    pub certificate_chain: Vec<CapturedX509Certificate>,
}

pub trait SigningIdentityStore {
    /// Enumerate identities whose leaf certificate's common name exactly
    /// matches `label`. Returns an empty vector, never an error, when the
    /// platform has no identity store or it could not be queried.
    fn find(&self, label: &str) -> Vec<SigningIdentity>;
}

/// The store available on the current target.
#[cfg(target_os = "macos")]
pub type PlatformSigningIdentityStore = macos::KeychainSigningIdentityStore;

#[cfg(not(target_os = "macos"))]
pub type PlatformSigningIdentityStore = NullSigningIdentityStore;

/// Returned on every target without a native identity store.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSigningIdentityStore;

impl SigningIdentityStore for NullSigningIdentityStore {
    fn find(&self, label: &str) -> Vec<SigningIdentity> {
        log::warn!(
            "no signing identity store is available on this platform; \
             cannot look up label {label:?}"
        );
        Vec::new()
    }
}

#[cfg(target_os = "macos")]
pub mod macos {
    use {
        super::SigningIdentity,
        bcder::Oid,
        security_framework::{
            item::{ItemClass, ItemSearchOptions, Reference, SearchResult},
            os::macos::keychain::{SecKeychain, SecPreferencesDomain},
        },
        x509_certificate::CapturedX509Certificate,
    };

    /// `userId` attribute OID (0.9.2342.19200300.100.1.1), matching
    /// `collection-cert-policy`'s name-extraction constant.
    const OID_COMMON_NAME: &[u8] = &[85, 4, 3];

    /// Enumerates identities from the user's default keychain.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct KeychainSigningIdentityStore;

    impl super::SigningIdentityStore for KeychainSigningIdentityStore {
        fn find(&self, label: &str) -> Vec<SigningIdentity> {
            match find_by_label(label) {
                Ok(identities) => identities,
                Err(e) => {
                    log::warn!("failed querying the macOS keychain for label {label:?}: {e}");
                    Vec::new()
                }
            }
        }
    }

    fn find_by_label(label: &str) -> Result<Vec<SigningIdentity>, security_framework::base::Error> {
        let keychain = SecKeychain::default_for_domain(SecPreferencesDomain::User)?;

        let mut search = ItemSearchOptions::default();
        search.keychains(&[keychain]);
        search.class(ItemClass::identity());
        search.limit(i32::MAX as i64);

        let mut identities = Vec::new();

        for item in search.search()? {
            let SearchResult::Ref(Reference::Identity(identity)) = item else {
                continue;
            };

            let Ok(cert) = identity.certificate() else {
                continue;
            };

            let Ok(captured) = CapturedX509Certificate::from_der(cert.to_der()) else {
                continue;
            };

            let common_name = captured
                .subject_name()
                .find_first_attribute_string(Oid(OID_COMMON_NAME.into()))
                .ok()
                .flatten();

            if common_name.as_deref() == Some(label) {
                identities.push(SigningIdentity {
                    label: label.to_string(),
                    certificate_chain: vec![captured],
                });
            }
        }

        Ok(identities)
    }
}

#[cfg(all(test, not(target_os = "macos")))]
mod tests {
    use super::*;

    #[test]
    fn null_store_never_fails() {
        let store = NullSigningIdentityStore;
        assert!(store.find("anything").is_empty());
    }
}
