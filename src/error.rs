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

use thiserror::Error;

use crate::jumbf::boxes::JumbfParseError;

/// `Error` enumerates errors returned by most functions in this crate.
///
/// Validation *outcomes* are not errors: they are reported through the
/// [`ValidationStatus`](crate::status::ValidationStatus) lists returned by the
/// signing and verification pipelines. `Error` is reserved for programming
/// faults (missing signer, malformed builder input) and I/O failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("claim is missing required field {field}")]
    ClaimMissingField { field: &'static str },

    #[error("store has no manifest labeled {label:?}")]
    ManifestNotFound { label: String },

    #[error("manifest has no signer configured")]
    SignerMissing,

    #[error("manifest has no asset stream installed")]
    AssetStreamMissing,

    #[error("box label contains invalid character {0:?}")]
    InvalidBoxLabel(char),

    #[error("invalid exclusion ranges: {0}")]
    InvalidExclusions(String),

    #[error("hash algorithm {0:?} is not supported")]
    UnsupportedAlgorithm(String),

    #[error("{0} is not supported")]
    UnsupportedType(&'static str),

    #[error("COSE signature error: {0}")]
    CoseSignature(String),

    #[error("could not parse certificate")]
    InvalidCertificate,

    #[error("keystore could not be opened: {0}")]
    Keystore(String),

    #[error("not a JPEG stream")]
    InvalidJpeg,

    #[error("XMP packet too large ({0} bytes)")]
    XmpTooLarge(usize),

    #[error("expected {expected} bytes, second signing gave us {actual}")]
    PresizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    JumbfParseError(#[from] JumbfParseError),

    #[error(transparent)]
    CborError(#[from] serde_cbor::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    OpenSslError(#[from] openssl::error::ErrorStack),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    OtherError(String),
}

/// A specialized `Result` type for c2pa-store operations.
pub type Result<T> = std::result::Result<T, Error>;
