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

//! C2PA validation status codes.
//!
//! Every sign and verify call returns a list of [`ValidationStatus`] records.
//! Successes are reported explicitly so callers can distinguish "checked and
//! passed" from "not checked".
//!
//! See <https://c2pa.org/specifications/specifications/1.2/specs/C2PA_Specification.html#_status_codes>.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! status_codes {
    ($( $name:ident => ($ok:expr, $code:literal, $desc:literal) ),* $(,)?) => {
        /// The standard C2PA status-code enumeration.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[allow(clippy::enum_variant_names)]
        pub enum StatusCode {
            $( $name, )*
        }

        impl StatusCode {
            /// The official dotted code string, e.g. `claimSignature.validated`.
            pub fn code(&self) -> &'static str {
                match self {
                    $( StatusCode::$name => $code, )*
                }
            }

            /// `true` if this code reports success.
            pub fn is_ok(&self) -> bool {
                match self {
                    $( StatusCode::$name => $ok, )*
                }
            }

            /// The description of this code from the specification.
            pub fn description(&self) -> &'static str {
                match self {
                    $( StatusCode::$name => $desc, )*
                }
            }

            /// Look up a standard code from its dotted string form.
            pub fn from_code(code: &str) -> Option<StatusCode> {
                match code {
                    $( $code => Some(StatusCode::$name), )*
                    _ => None,
                }
            }
        }
    }
}

status_codes! {
    ClaimSignatureValidated => (true, "claimSignature.validated", "The claim signature referenced in the ingredient's claim validated."),
    SigningCredentialTrusted => (true, "signingCredential.trusted", "The signing credential is listed on the validator's trust list."),
    TimeStampTrusted => (true, "timeStamp.trusted", "The time-stamp credential is listed on the validator's trust list."),
    AssertionHashedUriMatch => (true, "assertion.hashedURI.match", "The hash of the referenced assertion in the manifest matches the corresponding hash in the assertion's hashed URI in the claim."),
    AssertionDataHashMatch => (true, "assertion.dataHash.match", "Hash of a byte range of the asset matches the hash declared in the data hash assertion."),
    AssertionBmffHashMatch => (true, "assertion.bmffHash.match", "Hash of a box-based asset matches the hash declared in the BMFF hash assertion."),

    AssertionAccessible => (false, "assertion.accessible", "A non-embedded (remote) assertion was accessible at the time of validation."),
    ClaimMissing => (false, "claim.missing", "The referenced claim in the ingredient's manifest cannot be found."),
    ClaimMultiple => (false, "claim.multiple", "More than one claim box is present in the manifest."),
    ClaimHardBindingsMissing => (false, "claim.hardBindings.missing", "No hard bindings are present in the claim."),
    ClaimRequiredMissing => (false, "claim.required.missing", "A required field is not present in the claim."),
    ClaimCborInvalid => (false, "claim.cbor.invalid", "The cbor of the claim is not valid."),
    IngredientHashedUriMismatch => (false, "ingredient.hashedURI.mismatch", "The hash of the referenced ingredient claim in the manifest does not match the corresponding hash in the ingredient's hashed URI in the claim."),
    ClaimSignatureMissing => (false, "claimSignature.missing", "The claim signature referenced in the ingredient's claim cannot be found in its manifest."),
    ClaimSignatureMismatch => (false, "claimSignature.mismatch", "The claim signature referenced in the ingredient's claim failed to validate."),
    ManifestMultipleParents => (false, "manifest.multipleParents", "The manifest has more than one ingredient whose relationship is parentOf."),
    ManifestUpdateInvalid => (false, "manifest.update.invalid", "The manifest is an update manifest, but it contains a disallowed assertion."),
    ManifestUpdateWrongParents => (false, "manifest.update.wrongParents", "The manifest is an update manifest, but it contains either zero or multiple parentOf ingredients."),
    SigningCredentialUntrusted => (false, "signingCredential.untrusted", "The signing credential is not listed on the validator's trust list."),
    SigningCredentialInvalid => (false, "signingCredential.invalid", "The signing credential is not valid for signing."),
    SigningCredentialRevoked => (false, "signingCredential.revoked", "The signing credential has been revoked by the issuer."),
    SigningCredentialExpired => (false, "signingCredential.expired", "The signing credential has expired."),
    TimeStampMismatch => (false, "timeStamp.mismatch", "The time-stamp does not correspond to the contents of the claim."),
    TimeStampUntrusted => (false, "timeStamp.untrusted", "The time-stamp credential is not listed on the validator's trust list."),
    TimeStampOutsideValidity => (false, "timeStamp.outsideValidity", "The signed time-stamp attribute in the signature falls outside the validity window of the signing certificate or the TSA's certificate."),
    AssertionHashedUriMismatch => (false, "assertion.hashedURI.mismatch", "The hash of the referenced assertion in the manifest does not match the corresponding hash in the assertion's hashed URI in the claim."),
    AssertionMissing => (false, "assertion.missing", "An assertion listed in the claim is missing from the manifest."),
    AssertionMultipleHardBindings => (false, "assertion.multipleHardBindings", "The manifest has more than one hard binding assertion."),
    AssertionUndeclared => (false, "assertion.undeclared", "An assertion was found in the manifest that was not explicitly declared in the claim."),
    AssertionInaccessible => (false, "assertion.inaccessible", "A non-embedded (remote) assertion was inaccessible at the time of validation."),
    AssertionNotRedacted => (false, "assertion.notRedacted", "An assertion was declared as redacted in the claim but is still present in the manifest."),
    AssertionSelfRedacted => (false, "assertion.selfRedacted", "An assertion was declared as redacted by its own claim."),
    AssertionRequiredMissing => (false, "assertion.required.missing", "A required field is not present in an assertion."),
    AssertionJsonInvalid => (false, "assertion.json.invalid", "The JSON(-LD) of an assertion is not valid."),
    AssertionCborInvalid => (false, "assertion.cbor.invalid", "The cbor of an assertion is not valid."),
    AssertionActionIngredientMismatch => (false, "assertion.action.ingredientMismatch", "An action that requires an associated ingredient either does not have one or the one specified cannot be located."),
    AssertionActionRedacted => (false, "assertion.action.redacted", "An action assertion was redacted when the claim was created."),
    AssertionDataHashMismatch => (false, "assertion.dataHash.mismatch", "The hash of a byte range of the asset does not match the hash declared in the data hash assertion."),
    AssertionBmffHashMismatch => (false, "assertion.bmffHash.mismatch", "The hash of a box-based asset does not match the hash declared in a BMFF hash assertion."),
    AssertionCloudDataHardBinding => (false, "assertion.cloud-data.hardBinding", "A hard binding assertion is in a cloud data assertion."),
    AssertionCloudDataActions => (false, "assertion.cloud-data.actions", "An update manifest contains a cloud data assertion referencing an actions assertion."),
    AlgorithmUnsupported => (false, "algorithm.unsupported", "The value of an alg header, or other header that specifies an algorithm used to compute the value of another field, is unknown or unsupported."),
    GeneralError => (false, "general.error", "A value to be used when there was an error not specifically listed here."),
}

/// A single validation outcome, either recorded by a sign/verify pass or
/// restored from an ingredient's embedded `validationStatus` list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ValidationStatus {
    code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,

    #[serde(rename = "explanation", skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,

    #[serde(skip)]
    referenced: Option<Box<ValidationStatus>>,
}

impl ValidationStatus {
    /// Create a status record for a standard code with its default message.
    pub fn new(code: StatusCode) -> Self {
        ValidationStatus {
            code: code.code().to_owned(),
            url: None,
            message: Some(code.description().to_owned()),
            success: None,
            referenced: None,
        }
    }

    /// Create a status record with a custom message.
    pub fn with_message<S: Into<String>>(code: StatusCode, message: S) -> Self {
        ValidationStatus {
            code: code.code().to_owned(),
            url: None,
            message: Some(message.into()),
            success: None,
            referenced: None,
        }
    }

    pub fn set_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach the status record that caused this one, e.g. an error restored
    /// from an ingredient's embedded `validationStatus`.
    pub fn set_referenced(mut self, referenced: ValidationStatus) -> Self {
        self.referenced = Some(Box::new(referenced));
        self
    }

    /// The dotted code string.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The standard code, if this record carries one.
    pub fn standard_code(&self) -> Option<StatusCode> {
        StatusCode::from_code(&self.code)
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn referenced(&self) -> Option<&ValidationStatus> {
        self.referenced.as_deref()
    }

    /// `true` if this status reports success.
    ///
    /// Restored records may carry an explicit `success` flag; otherwise the
    /// standard code decides, and an unrecognized code counts as an error.
    pub fn is_ok(&self) -> bool {
        match self.success {
            Some(success) => success,
            None => self
                .standard_code()
                .map(|c| c.is_ok())
                .unwrap_or(false),
        }
    }

    /// `true` if this status reports a failure.
    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }
}

impl From<StatusCode> for ValidationStatus {
    fn from(code: StatusCode) -> Self {
        ValidationStatus::new(code)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error() {
            write!(f, "[ERROR {}]", self.code)?;
        } else {
            write!(f, "[{}]", self.code)?;
        }
        if let Some(message) = &self.message {
            write!(f, " {}", message.trim_end_matches('.'))?;
        }
        if let Some(url) = &self.url {
            write!(f, " (at {url})")?;
        }
        Ok(())
    }
}

/// `true` if every status in the list reports success.
pub fn all_ok(statuses: &[ValidationStatus]) -> bool {
    statuses.iter().all(|s| s.is_ok())
}
