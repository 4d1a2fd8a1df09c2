// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data model and JSON wire formats for package collections.
//!
//! A [Collection] is a curated, ordered list of [Package] entries. Collections
//! are distributed as JSON documents, optionally wrapped in a signature
//! envelope (see [envelope]).

pub mod envelope;

use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Format version understood by this implementation.
pub const FORMAT_VERSION_V1_0: &str = "v1_0";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unrecognized collection format version: {0}")]
    UnrecognizedFormatVersion(String),

    #[error("error deserializing collection JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("package url does not look like a git-compatible location: {0}")]
    InvalidGitUrl(String),

    #[error("signature envelope malformed: {0}")]
    MalformedEnvelope(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// A curated collection of packages (the payload of a signed collection document).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub packages: Vec<Package>,
    #[serde(rename = "formatVersion")]
    pub format_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(rename = "generatedAt")]
    pub generated_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "generatedBy", skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
}

impl Collection {
    /// Parse a collection payload from JSON bytes.
    ///
    /// Fails if `formatVersion` is not a value this implementation recognizes.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let collection: Self = serde_json::from_slice(data)?;

        if collection.format_version != FORMAT_VERSION_V1_0 {
            return Err(ModelError::UnrecognizedFormatVersion(
                collection.format_version,
            ));
        }

        Ok(collection)
    }
}

/// A single package entry within a [Collection].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub versions: Vec<Version>,
    #[serde(rename = "readmeUrl", skip_serializing_if = "Option::is_none")]
    pub readme_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// The three components of a git-compatible package location: host, owner, repo.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GitLocation {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

/// Regular expression shared by every component that needs to decompose a
/// package's `url` into `(host, owner, repo)`.
///
/// Matches SSH-style (`git@github.com:owner/repo.git`) and HTTPS-style
/// (`https://github.com/owner/repo`) locations alike.
pub static GIT_URL_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
    regex::RegexBuilder::new(r"([^/@]+)[:/]([^:/]+)/([^/.]+)(\.git)?$")
        .case_insensitive(true)
        .build()
        .expect("git location regex is valid")
});

impl Package {
    /// Parse this package's `url` into `(host, owner, repo)`.
    pub fn git_location(&self) -> Result<GitLocation> {
        parse_git_location(&self.url)
    }
}

/// Parse a git-compatible location string into `(host, owner, repo)`.
///
/// Returns [ModelError::InvalidGitUrl] if `location` does not match the
/// shared regex every component uses for this decomposition.
pub fn parse_git_location(location: &str) -> Result<GitLocation> {
    let captures = GIT_URL_RE
        .captures(location)
        .ok_or_else(|| ModelError::InvalidGitUrl(location.to_string()))?;

    Ok(GitLocation {
        host: captures[1].to_string(),
        owner: captures[2].to_string(),
        repo: captures[3].to_string(),
    })
}

/// A single distributable artifact within a [Package], at a given [semver::Version].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Version {
    #[serde(with = "semver_string")]
    pub version: semver::Version,
    #[serde(rename = "packageName")]
    pub package_name: String,
    pub targets: Vec<Target>,
    pub products: Vec<Product>,
    #[serde(rename = "toolsVersion")]
    pub tools_version: String,
    #[serde(
        rename = "minimumPlatformVersions",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub minimum_platform_versions: Vec<PlatformVersion>,
    #[serde(
        rename = "verifiedCompatibility",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub verified_compatibility: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

mod semver_string {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &semver::Version, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<semver::Version, D::Error> {
        let raw = String::deserialize(d)?;
        semver::Version::parse(&raw).map_err(D::Error::custom)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlatformVersion {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub name: String,
    #[serde(rename = "moduleName", skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub targets: Vec<String>,
}

/// Library linkage mode.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    Static,
    Dynamic,
    Automatic,
}

/// The kind of build product a [Product] describes.
///
/// Encoded as a single-key JSON object: `{"library": [<LibraryType>]}`,
/// `{"executable": null}`, or `{"test": null}`. Any other shape fails to
/// decode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProductType {
    Library(LibraryType),
    Executable,
    Test,
}

impl Serialize for ProductType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Library(kind) => map.serialize_entry("library", &[*kind])?,
            Self::Executable => map.serialize_entry("executable", &())?,
            Self::Test => map.serialize_entry("test", &())?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProductType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        enum Shape {
            Library(Vec<LibraryType>),
            Executable(Option<()>),
            Test(Option<()>),
        }

        let shape = Shape::deserialize(deserializer)?;

        match shape {
            Shape::Library(kinds) => {
                let kind = kinds
                    .into_iter()
                    .next()
                    .ok_or_else(|| D::Error::custom("library product type missing a linkage kind"))?;
                Ok(Self::Library(kind))
            }
            Shape::Executable(_) => Ok(Self::Executable),
            Shape::Test(_) => Ok(Self::Test),
        }
    }
}

/// A distinguished name projection: the attributes this subsystem cares about.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Name {
    #[serde(rename = "commonName", skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

/// The signature envelope attached to a [SignedCollection].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Signature {
    /// Base64-encoded CMS signature bytes.
    pub signature: String,
    pub certificate: SignatureCertificate,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignatureCertificate {
    pub subject: Name,
    pub issuer: Name,
}

/// A [Collection] payload plus the signature envelope fields that accompanied it.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedCollection {
    pub collection: Collection,
    pub signature: Option<Signature>,
}

/// The externally visible identity projected from a verified leaf certificate.
///
/// `type` is currently only ever `Some("adp")`, set when the leaf carries an
/// Apple-Developer marker extension. Two entities compare equal by all four
/// fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SigningEntity {
    pub entity_type: Option<String>,
    pub name: Option<String>,
    pub organizational_unit: Option<String>,
    pub organization: Option<String>,
}

impl SigningEntity {
    /// Whether this entity was recognized as belonging to a known signing program.
    pub fn is_recognized(&self) -> bool {
        self.entity_type.is_some()
    }
}

impl fmt::Display for SigningEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("<unknown>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_type_round_trips() {
        let lib = ProductType::Library(LibraryType::Static);
        let json = serde_json::to_value(&lib).unwrap();
        assert_eq!(json, serde_json::json!({"library": ["static"]}));
        assert_eq!(serde_json::from_value::<ProductType>(json).unwrap(), lib);

        let exe = ProductType::Executable;
        let json = serde_json::to_value(&exe).unwrap();
        assert_eq!(json, serde_json::json!({"executable": null}));
        assert_eq!(serde_json::from_value::<ProductType>(json).unwrap(), exe);
    }

    #[test]
    fn git_location_parses_ssh_and_https() {
        let ssh = parse_git_location("git@github.com:apple/swift-package-manager.git").unwrap();
        assert_eq!(ssh.host, "github.com");
        assert_eq!(ssh.owner, "apple");
        assert_eq!(ssh.repo, "swift-package-manager");

        let https = parse_git_location("https://github.com/apple/swift-package-manager").unwrap();
        assert_eq!(https.host, "github.com");
        assert_eq!(https.repo, "swift-package-manager");
    }

    #[test]
    fn git_location_rejects_non_matching_input() {
        assert!(parse_git_location("not a url at all").is_err());
    }

    #[test]
    fn collection_rejects_unknown_format_version() {
        let doc = serde_json::json!({
            "name": "C",
            "packages": [],
            "formatVersion": "2.0",
            "generatedAt": "2024-01-01T00:00:00Z",
        });
        let err = Collection::from_json(serde_json::to_vec(&doc).unwrap().as_slice()).unwrap_err();
        assert!(matches!(err, ModelError::UnrecognizedFormatVersion(_)));
    }
}
