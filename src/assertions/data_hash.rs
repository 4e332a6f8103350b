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

//! The `c2pa.hash.data` assertion: a streaming hash of the surrounding
//! asset with an exclusion list.
//!
//! At signing time the asset is presented already excluded of the region
//! reserved for the manifest itself, so every byte of the stream is hashed.
//! At verification time the exclusion ranges are skipped.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    hash_utils::{effective_alg, Hasher},
};

/// The encoded `exclusions` array plus `pad` occupy this many bytes, so the
/// post-signing encoded size can be predicted from the pre-signing one.
const PAD_BUDGET: usize = 80;

/// One excluded byte range of the asset.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Exclusion {
    pub start: u64,
    pub length: u64,
}

impl Exclusion {
    pub fn new(start: u64, length: u64) -> Self {
        Exclusion { start, length }
    }
}

/// The `c2pa.hash.data` CBOR payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DataHash {
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(with = "serde_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub hash: Vec<u8>,

    #[serde(with = "serde_bytes", default)]
    pub pad: Vec<u8>,
}

impl DataHash {
    pub fn new() -> Self {
        DataHash::default()
    }

    /// Install the exclusion ranges, which must be in order and must not
    /// overlap, and size the zero-filled pad so exclusions plus pad occupy
    /// a fixed byte budget.
    pub fn set_exclusions(&mut self, exclusions: Vec<Exclusion>) -> Result<()> {
        let mut pos = -1i128;
        for exclusion in &exclusions {
            if (exclusion.start as i128) <= pos || exclusion.length == 0 {
                return Err(Error::InvalidExclusions(format!("{exclusions:?}")));
            }
            pos = exclusion.start as i128 + exclusion.length as i128;
        }

        let encoded_len = serde_cbor::to_vec(&exclusions)?.len();
        let pad_length = PAD_BUDGET
            .checked_sub(encoded_len)
            .ok_or_else(|| Error::InvalidExclusions(format!("{exclusions:?}")))?;

        self.exclusions = exclusions;
        self.pad = vec![0u8; pad_length];
        Ok(())
    }

    /// Compute the digest during signing. All bytes of the stream are fed to
    /// the digest; the exclusion ranges describe the embedded layout for
    /// verifiers and are not applied here.
    pub fn sign(&mut self, claim_alg: Option<&str>, stream: &mut dyn Read) -> Result<()> {
        if self.pad.is_empty() && self.exclusions.is_empty() {
            self.set_exclusions(Vec::new())?;
        }
        self.hash.clear();

        let mut hasher = Hasher::new(effective_alg(&[self.alg.as_deref(), claim_alg]))?;
        let mut buf = [0u8; 8192];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        self.hash = Hasher::finalize(hasher);
        Ok(())
    }

    /// Recompute the digest during verification, skipping the exclusion
    /// ranges, and compare it to the stored hash.
    pub fn verify(&self, claim_alg: Option<&str>, stream: &mut dyn Read) -> Result<bool> {
        let mut hasher = Hasher::new(effective_alg(&[self.alg.as_deref(), claim_alg]))?;

        let mut pos = 0u64;
        let mut buf = [0u8; 8192];
        for exclusion in &self.exclusions {
            // hash up to the start of the exclusion
            pos = hash_until(&mut hasher, stream, pos, exclusion.start, &mut buf)?;
            // then skip its length
            pos = skip_until(stream, pos, exclusion.start.saturating_add(exclusion.length))?;
        }
        // hash the remainder
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let digest = Hasher::finalize(hasher);
        Ok(crate::hash_utils::vec_compare(&digest, &self.hash))
    }
}

fn hash_until(
    hasher: &mut Hasher,
    stream: &mut dyn Read,
    mut pos: u64,
    end: u64,
    buf: &mut [u8],
) -> Result<u64> {
    while pos < end {
        let want = std::cmp::min((end - pos) as usize, buf.len());
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        pos += n as u64;
    }
    Ok(pos)
}

fn skip_until(stream: &mut dyn Read, mut pos: u64, end: u64) -> Result<u64> {
    let mut buf = [0u8; 8192];
    while pos < end {
        let want = std::cmp::min((end - pos) as usize, buf.len());
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        pos += n as u64;
    }
    Ok(pos)
}
