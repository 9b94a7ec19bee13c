// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Namespace-qualified browse names and browse paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// A browse name qualified by a namespace index, written `ns:Name`.
///
/// # Examples
///
/// ```
/// use uasub_lib::types::QualifiedName;
///
/// let name: QualifiedName = "2:MyObject".parse().unwrap();
/// assert_eq!(name.namespace(), 2);
/// assert_eq!(name.name(), "MyObject");
///
/// // Without a prefix the name lives in namespace 0
/// let objects: QualifiedName = "Objects".parse().unwrap();
/// assert_eq!(objects.namespace(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    namespace: u16,
    name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Returns the namespace index.
    #[must_use]
    pub const fn namespace(&self) -> u16 {
        self.namespace
    }

    /// Returns the unqualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = match s.split_once(':') {
            Some((ns, name)) if !ns.is_empty() && ns.bytes().all(|b| b.is_ascii_digit()) => {
                let ns = ns
                    .parse::<u16>()
                    .map_err(|_| ValueError::InvalidQualifiedName(s.to_string()))?;
                (ns, name)
            }
            _ => (0, s),
        };

        if name.is_empty() {
            return Err(ValueError::InvalidQualifiedName(s.to_string()));
        }

        Ok(Self::new(namespace, name))
    }
}

/// An ordered sequence of qualified names, resolved one segment at a time.
///
/// # Examples
///
/// ```
/// use uasub_lib::types::BrowsePath;
///
/// let path = BrowsePath::from_segments(["0:Objects", "2:MyObject", "2:MyVariable"]).unwrap();
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_string(), "0:Objects/2:MyObject/2:MyVariable");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrowsePath {
    segments: Vec<QualifiedName>,
}

impl BrowsePath {
    /// Creates a browse path from already parsed segments.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidBrowsePath` if `segments` is empty.
    pub fn new(segments: Vec<QualifiedName>) -> Result<Self, ValueError> {
        if segments.is_empty() {
            return Err(ValueError::InvalidBrowsePath("empty path".to_string()));
        }
        Ok(Self { segments })
    }

    /// Parses each `ns:Name` segment.
    ///
    /// # Errors
    ///
    /// Returns error if the list is empty or a segment is malformed.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ValueError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<QualifiedName>, _>>()?;
        Self::new(segments)
    }

    /// Returns the segments in order.
    #[must_use]
    pub fn segments(&self) -> &[QualifiedName] {
        &self.segments
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`; a browse path has at least one segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path made of the first `len` segments, if `len` is in range.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Option<Self> {
        (1..=self.segments.len()).contains(&len).then(|| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Returns `true` if `other` is a prefix of this path (or equal to it).
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for BrowsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for BrowsePath {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segments(s.split('/').filter(|segment| !segment.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_display() {
        assert_eq!(QualifiedName::new(2, "multiply").to_string(), "2:multiply");
    }

    #[test]
    fn qualified_name_with_colon_in_name() {
        let name: QualifiedName = "3:a:b".parse().unwrap();
        assert_eq!(name.namespace(), 3);
        assert_eq!(name.name(), "a:b");

        let unprefixed: QualifiedName = "Temp:C".parse().unwrap();
        assert_eq!(unprefixed.namespace(), 0);
        assert_eq!(unprefixed.name(), "Temp:C");
    }

    #[test]
    fn qualified_name_rejects_empty() {
        assert!("".parse::<QualifiedName>().is_err());
        assert!("2:".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn browse_path_rejects_empty() {
        assert!(BrowsePath::from_segments(Vec::<&str>::new()).is_err());
        assert!("".parse::<BrowsePath>().is_err());
    }

    #[test]
    fn browse_path_prefix() {
        let path: BrowsePath = "0:Objects/2:MyObject/2:MyVariable".parse().unwrap();
        let prefix = path.prefix(2).unwrap();
        assert_eq!(prefix.to_string(), "0:Objects/2:MyObject");
        assert!(path.starts_with(&prefix));
        assert!(!prefix.starts_with(&path));
        assert!(path.prefix(0).is_none());
        assert!(path.prefix(4).is_none());
    }
}
