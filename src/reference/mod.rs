//! Image references
//!
//! Parsing and Docker Hub normalization are left to
//! [`oci_distribution::Reference`]; this module adds what the engine API needs
//! on top of it: bare image IDs, and whether a reference already pins a digest.

use oci_distribution::Reference as OciReference;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("invalid reference {reference:?}: {reason}")]
    Invalid { reference: String, reason: String },

    #[error("invalid repository name ({0}), cannot specify 64-byte hexadecimal strings")]
    IdentifierAsName(String),
}

/// A parsed image reference
///
/// Whether a reference already pins a digest is part of its type:
/// `Named` references can be pinned, `Canonical` ones already are, and
/// `Digest` references name content without naming a repository at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Named(OciReference),
    Canonical(OciReference),
    Digest(String),
}

impl Reference {
    /// Parse any reference: a bare 64-hex image ID, a bare digest, or a
    /// (possibly familiar) repository reference.
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        if is_identifier(s) {
            return Ok(Reference::Digest(format!("sha256:{}", s)));
        }
        if is_digest(s) {
            return Ok(Reference::Digest(s.to_string()));
        }
        Self::parse_named(s)
    }

    /// Parse a repository reference, normalizing familiar Docker Hub names
    pub fn parse_named(s: &str) -> Result<Self, ReferenceError> {
        if is_identifier(s) {
            return Err(ReferenceError::IdentifierAsName(s.to_string()));
        }

        let reference = OciReference::from_str(s).map_err(|e| ReferenceError::Invalid {
            reference: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_oci(reference))
    }

    fn from_oci(reference: OciReference) -> Self {
        if reference.digest().is_some() {
            Reference::Canonical(reference)
        } else {
            Reference::Named(reference)
        }
    }

    /// The underlying repository reference, if there is one
    pub fn as_oci(&self) -> Option<&OciReference> {
        match self {
            Reference::Named(r) | Reference::Canonical(r) => Some(r),
            Reference::Digest(_) => None,
        }
    }

    pub fn registry(&self) -> Option<&str> {
        match self {
            Reference::Named(r) | Reference::Canonical(r) => Some(r.registry()),
            Reference::Digest(_) => None,
        }
    }

    pub fn repository(&self) -> Option<&str> {
        match self {
            Reference::Named(r) | Reference::Canonical(r) => Some(r.repository()),
            Reference::Digest(_) => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Reference::Named(r) | Reference::Canonical(r) => r.tag(),
            Reference::Digest(_) => None,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            Reference::Canonical(r) => r.digest(),
            Reference::Digest(digest) => Some(digest),
            Reference::Named(_) => None,
        }
    }

    /// True if the reference already pins a specific digest
    pub fn is_canonical(&self) -> bool {
        matches!(self, Reference::Canonical(_))
    }

    /// Pin a named reference to `digest`, keeping its tag.
    ///
    /// Returns `Ok(None)` for references that are already canonical or that
    /// do not name a repository, and an error if `digest` is not valid.
    pub fn with_digest(&self, digest: &str) -> Result<Option<Reference>, ReferenceError> {
        let Reference::Named(reference) = self else {
            return Ok(None);
        };

        let mut pinned = format!("{}/{}", reference.registry(), reference.repository());
        if let Some(tag) = reference.tag() {
            pinned.push(':');
            pinned.push_str(tag);
        }
        pinned.push('@');
        pinned.push_str(digest);

        Self::parse_named(&pinned).map(Some)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Named(r) | Reference::Canonical(r) => f.write_str(&r.whole()),
            Reference::Digest(digest) => f.write_str(digest),
        }
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A full image ID, as printed by `docker images --no-trunc` without its prefix
fn is_identifier(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// An `algorithm:hex` digest on its own; validated by the reference parser
fn is_digest(s: &str) -> bool {
    if !s.contains(':') || s.contains(['/', '@']) {
        return false;
    }
    OciReference::from_str(&format!("scratch@{}", s))
        .map(|r| r.digest().is_some())
        .unwrap_or(false)
}
