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

//! The claim: the CBOR document inside a manifest that lists assertions and
//! is the COSE payload.
//!
//! A claim read from a foreign store is never re-encoded during
//! verification; the raw bytes in the claim box are the signed payload.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A JUMBF URL paired with a digest of the target box's contents.
///
/// The digest covers the target superbox's children (description box plus
/// content boxes), not the superbox header.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HashedUri {
    url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,

    #[serde(with = "serde_bytes")]
    hash: Vec<u8>,
}

impl HashedUri {
    pub fn new(url: String, alg: Option<String>, hash: Vec<u8>) -> Self {
        HashedUri { url, alg, hash }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn is_hash_set(&self) -> bool {
        !self.hash.is_empty()
    }

    pub fn set_hash(&mut self, hash: Vec<u8>) {
        self.hash = hash;
    }

    pub fn clear_hash(&mut self) {
        self.hash.clear();
    }
}

/// The claim CBOR map.
///
/// Required fields (`dc:format`, `instanceID`, `claim_generator`) are modelled
/// as options because a claim is built incrementally; the signing pipeline
/// enforces presence. Unknown fields in foreign claims are ignored here and
/// preserved in the claim box's raw bytes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Claim {
    #[serde(rename = "dc:format", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(rename = "instanceID", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_generator: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_generator_info: Option<serde_cbor::Value>,

    #[serde(default)]
    pub assertions: Vec<HashedUri>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Claim {
    /// Decode a claim from the raw bytes of a claim box.
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        Ok(serde_cbor::from_slice(data)?)
    }

    /// Serialize this claim. Field order is fixed, so repeated encodings of
    /// an identical claim are byte-identical.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }
}

/// The default `claim_generator` user agent applied at signing when the
/// caller did not set one.
pub fn default_claim_generator() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;

    #[test]
    fn cbor_round_trip() {
        let claim = Claim {
            format: Some("image/jpeg".to_owned()),
            instance_id: Some("urn:uuid:1111".to_owned()),
            alg: Some("sha256".to_owned()),
            claim_generator: Some("test/1.0".to_owned()),
            claim_generator_info: None,
            assertions: vec![HashedUri::new(
                "self#jumbf=c2pa.assertions/c2pa.hash.data".to_owned(),
                None,
                vec![1, 2, 3],
            )],
            signature: Some("self#jumbf=c2pa.signature".to_owned()),
        };

        let bytes = claim.to_cbor().unwrap();
        let restored = Claim::from_cbor(&bytes).unwrap();
        assert_eq!(restored, claim);

        // deterministic encoding
        assert_eq!(claim.to_cbor().unwrap(), bytes);
    }

    #[test]
    fn hash_serializes_as_byte_string() {
        let uri = HashedUri::new("self#jumbf=x".to_owned(), None, vec![0xab; 4]);
        let bytes = serde_cbor::to_vec(&uri).unwrap();
        // "hash" value must be a CBOR byte string (major type 2), not an array
        let value: serde_cbor::Value = serde_cbor::from_slice(&bytes).unwrap();
        match value {
            serde_cbor::Value::Map(map) => {
                let hash = map
                    .get(&serde_cbor::Value::Text("hash".to_owned()))
                    .expect("hash entry");
                assert!(matches!(hash, serde_cbor::Value::Bytes(b) if b == &vec![0xab; 4]));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn foreign_fields_tolerated() {
        // a claim with extra fields (dc:title) still decodes
        let mut map = std::collections::BTreeMap::new();
        map.insert(
            serde_cbor::Value::Text("dc:format".into()),
            serde_cbor::Value::Text("image/jpeg".into()),
        );
        map.insert(
            serde_cbor::Value::Text("dc:title".into()),
            serde_cbor::Value::Text("My Photo".into()),
        );
        let bytes = serde_cbor::to_vec(&serde_cbor::Value::Map(map)).unwrap();

        let claim = Claim::from_cbor(&bytes).unwrap();
        assert_eq!(claim.format.as_deref(), Some("image/jpeg"));
        assert!(claim.assertions.is_empty());
    }
}
