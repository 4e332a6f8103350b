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

#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]

//! Create, embed, extract and cryptographically verify C2PA provenance
//! manifests (spec v1.2).
//!
//! A manifest store is a signed, CBOR-encoded bundle of assertions about a
//! media asset, wrapped in JUMBF (ISO 19566) boxes and signed using
//! COSE_Sign1 over an X.509 certificate chain. Because signatures are
//! computed over box bytes, the [`jumbf`] codec preserves byte-exact round
//! trips.

/// The internal name of this crate
pub const NAME: &str = "c2pa-store";

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public modules
pub mod assertions;
pub mod asset;
pub mod cert_profile;
pub mod claim;
pub mod cose;
pub mod jumbf;
pub mod signature;
pub mod status;
pub mod store;
pub mod trust;

// Internal modules
pub(crate) mod error;
pub(crate) mod hash_utils;

// Public exports
pub use asset::jpeg::{read_jpeg, write_jpeg, JpegImage, XmpPolicy};
pub use claim::{Claim, HashedUri};
pub use cose::{OpensslSigner, Signer, SigningAlg};
pub use error::{Error, Result};
pub use hash_utils::{hash_by_alg, Hasher, DEFAULT_HASH_ALGORITHM};
pub use signature::{sign, verify};
pub use status::{StatusCode, ValidationStatus};
pub use store::Store;
pub use trust::TrustStore;
