// Copyright 2022 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

#![deny(missing_docs)]

//! Labels for JUMBF boxes as defined in C2PA 1.2 Specification, and helpers
//! for the `self#jumbf=` URL syntax used by hashed URIs.
//!
//! See <https://c2pa.org/specifications/specifications/1.2/specs/C2PA_Specification.html#_c2pa_box_details>.

/// Label for the C2PA manifest store.
///
/// See <https://c2pa.org/specifications/specifications/1.2/specs/C2PA_Specification.html#_c2pa_box_details>.
pub const MANIFEST_STORE: &str = "c2pa";

/// Label for the C2PA assertion store box.
///
/// See <https://c2pa.org/specifications/specifications/1.2/specs/C2PA_Specification.html#_c2pa_box_details>.
pub const ASSERTIONS: &str = "c2pa.assertions";

/// Label for the C2PA claim box.
///
/// See <https://c2pa.org/specifications/specifications/1.2/specs/C2PA_Specification.html#_c2pa_box_details>.
pub const CLAIM: &str = "c2pa.claim";

/// Label for the C2PA claim signature box.
///
/// See <https://c2pa.org/specifications/specifications/1.2/specs/C2PA_Specification.html#_c2pa_box_details>.
pub const SIGNATURE: &str = "c2pa.signature";

/// The scheme prefix of a JUMBF URL.
pub const JUMBF_PREFIX: &str = "self#jumbf=";

/// A parsed `self#jumbf=` reference.
///
/// A leading `/` marks an absolute path starting at the root JUMBF store;
/// otherwise the path is resolved against a context box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JumbfUri {
    absolute: bool,
    segments: Vec<String>,
}

impl JumbfUri {
    /// Parse `self#jumbf=[/]label1/label2/...`. The `self#` and `jumbf=`
    /// prefixes are each optional on input.
    pub fn parse(uri: &str) -> Option<Self> {
        let mut path = uri;
        if let Some(rest) = path.strip_prefix("self#") {
            path = rest;
        }
        if let Some(rest) = path.strip_prefix("jumbf=") {
            path = rest;
        }
        let absolute = path.starts_with('/');
        if absolute {
            path = &path[1..];
        }
        if path.is_empty() {
            return None;
        }
        Some(JumbfUri {
            absolute,
            segments: path.split('/').map(|s| s.to_owned()).collect(),
        })
    }

    /// True if this reference starts at the root store.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// The label path.
    pub fn segments(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.as_str()).collect()
    }

    /// Format an absolute URL from label segments.
    pub fn to_absolute(segments: &[&str]) -> String {
        format!("{JUMBF_PREFIX}/{}", segments.join("/"))
    }

    /// Format a relative URL from label segments.
    pub fn to_relative(segments: &[&str]) -> String {
        format!("{JUMBF_PREFIX}{}", segments.join("/"))
    }
}

/// Extract the manifest label from an absolute JUMBF URI, e.g.
/// `self#jumbf=/c2pa/urn:uuid:x/...` yields `urn:uuid:x`.
pub fn manifest_label_from_uri(uri: &str) -> Option<String> {
    let parsed = JumbfUri::parse(uri)?;
    if !parsed.absolute {
        return None;
    }
    let segments = parsed.segments();
    if segments.first() == Some(&MANIFEST_STORE) {
        segments.get(1).map(|s| (*s).to_owned())
    } else {
        None
    }
}

/// Extract the assertion label from a JUMBF URI, absolute or relative.
pub fn assertion_label_from_uri(uri: &str) -> Option<String> {
    let parsed = JumbfUri::parse(uri)?;
    let segments = parsed.segments();
    let rel = if parsed.absolute {
        if segments.first() != Some(&MANIFEST_STORE) {
            return None;
        }
        &segments[2..]
    } else {
        &segments[..]
    };
    if rel.first() == Some(&ASSERTIONS) {
        rel.get(1).map(|s| (*s).to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;

    #[test]
    fn parse_forms() {
        let full = JumbfUri::parse("self#jumbf=/c2pa/urn:x").unwrap();
        assert!(full.is_absolute());
        assert_eq!(full.segments(), vec!["c2pa", "urn:x"]);

        let bare = JumbfUri::parse("c2pa.assertions/c2pa.hash.data").unwrap();
        assert!(!bare.is_absolute());
        assert_eq!(bare.segments(), vec!["c2pa.assertions", "c2pa.hash.data"]);

        let no_scheme = JumbfUri::parse("jumbf=/c2pa/urn:x").unwrap();
        assert!(no_scheme.is_absolute());

        assert!(JumbfUri::parse("self#jumbf=").is_none());
    }

    #[test]
    fn format_round_trip() {
        let uri = JumbfUri::to_absolute(&["c2pa", "urn:x"]);
        assert_eq!(uri, "self#jumbf=/c2pa/urn:x");
        assert_eq!(JumbfUri::parse(&uri).unwrap().segments(), vec!["c2pa", "urn:x"]);

        let uri = JumbfUri::to_relative(&[ASSERTIONS, "c2pa.hash.data"]);
        assert_eq!(uri, "self#jumbf=c2pa.assertions/c2pa.hash.data");
    }

    #[test]
    fn label_extraction() {
        assert_eq!(
            manifest_label_from_uri("self#jumbf=/c2pa/urn:uuid:a/c2pa.assertions/x"),
            Some("urn:uuid:a".to_owned())
        );
        assert_eq!(manifest_label_from_uri("self#jumbf=c2pa.assertions/x"), None);

        assert_eq!(
            assertion_label_from_uri("self#jumbf=c2pa.assertions/c2pa.hash.data"),
            Some("c2pa.hash.data".to_owned())
        );
        assert_eq!(
            assertion_label_from_uri("self#jumbf=/c2pa/urn:m/c2pa.assertions/stds.exif"),
            Some("stds.exif".to_owned())
        );
    }
}
