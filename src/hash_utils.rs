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

//! Hashing support for claims and assertions.
//!
//! C2PA names its digest algorithms `sha256`, `sha384` and `sha512`; anything
//! else is rejected with `algorithm.unsupported`.

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// The algorithm used when a claim does not specify one.
pub const DEFAULT_HASH_ALGORITHM: &str = "sha256";

#[derive(Clone)]
pub enum Hasher {
    SHA256(Sha256),
    SHA384(Sha384),
    SHA512(Sha512),
}

impl Hasher {
    /// Create a hasher for a C2PA algorithm identifier.
    pub fn new(alg: &str) -> Result<Self> {
        match alg {
            "sha256" => Ok(Hasher::SHA256(Sha256::new())),
            "sha384" => Ok(Hasher::SHA384(Sha384::new())),
            "sha512" => Ok(Hasher::SHA512(Sha512::new())),
            _ => Err(Error::UnsupportedAlgorithm(alg.to_owned())),
        }
    }

    // update hash value with new data
    pub fn update(&mut self, data: &[u8]) {
        use Hasher::*;
        match self {
            SHA256(ref mut d) => d.update(data),
            SHA384(ref mut d) => d.update(data),
            SHA512(ref mut d) => d.update(data),
        }
    }

    // consume hasher and return the final digest
    pub fn finalize(hasher_enum: Hasher) -> Vec<u8> {
        use Hasher::*;
        match hasher_enum {
            SHA256(d) => d.finalize().to_vec(),
            SHA384(d) => d.finalize().to_vec(),
            SHA512(d) => d.finalize().to_vec(),
        }
    }
}

/// Return the digest of `data` under a named algorithm.
pub fn hash_by_alg(alg: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = Hasher::new(alg)?;
    hasher.update(data);
    Ok(Hasher::finalize(hasher))
}

/// Return a Sha256 hash of an array of bytes.
pub fn hash_sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Compare two byte slices, true if they match.
pub fn vec_compare(va: &[u8], vb: &[u8]) -> bool {
    va.len() == vb.len() && va.iter().zip(vb).all(|(a, b)| a == b)
}

/// Pick the effective algorithm from an inheritance chain, nearest first.
pub fn effective_alg<'a>(chain: &[Option<&'a str>]) -> &'a str {
    chain
        .iter()
        .find_map(|alg| *alg)
        .unwrap_or(DEFAULT_HASH_ALGORITHM)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;

    #[test]
    fn digest_lengths() {
        assert_eq!(hash_by_alg("sha256", b"abc").unwrap().len(), 32);
        assert_eq!(hash_by_alg("sha384", b"abc").unwrap().len(), 48);
        assert_eq!(hash_by_alg("sha512", b"abc").unwrap().len(), 64);
        assert!(matches!(
            hash_by_alg("md5", b"abc"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn alg_inheritance_prefers_nearest() {
        assert_eq!(effective_alg(&[Some("sha384"), Some("sha256")]), "sha384");
        assert_eq!(effective_alg(&[None, Some("sha512")]), "sha512");
        assert_eq!(effective_alg(&[None, None]), "sha256");
    }

    #[test]
    fn sha256_known_vector() {
        let digest = hash_sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
