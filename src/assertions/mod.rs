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

//! Assertion model.
//!
//! An assertion is a JUMBF box in the manifest's assertion store: a CBOR
//! container, a JSON container, or an embedded-file container. The label
//! identifies the assertion type; unknown labels are retained as opaque
//! assertions and only reported if the claim references them.

pub mod actions;
pub mod data_hash;
pub mod ingredient;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{Error, Result},
    jumbf::{
        boxes::{
            BoxSubtype, BoxType, ChildBox, CborBox, DataBox, EmbeddedFileDescBox, JsonBox,
            SuperBox,
        },
        factory::strip_label_suffix,
    },
};

pub use actions::{Action, Actions};
pub use data_hash::{DataHash, Exclusion};
pub use ingredient::Ingredient;

/// Assertion labels defined by C2PA.
pub mod labels {
    /// The data-hash hard binding.
    pub const DATA_HASH: &str = "c2pa.hash.data";
    /// The BMFF hard binding (not supported by this crate).
    pub const BMFF_HASH: &str = "c2pa.hash.bmff";
    /// Provenance actions.
    pub const ACTIONS: &str = "c2pa.actions";
    /// A prior or component manifest reference.
    pub const INGREDIENT: &str = "c2pa.ingredient";
    /// Claim thumbnail prefix; a media subtype follows.
    pub const CLAIM_THUMBNAIL: &str = "c2pa.thumbnail.claim";
    /// Ingredient thumbnail prefix; a media subtype follows.
    pub const INGREDIENT_THUMBNAIL: &str = "c2pa.thumbnail.ingredient";
    /// Schema.org CreativeWork metadata.
    pub const CREATIVE_WORK: &str = "stds.schema-org.CreativeWork";
}

/// The recognized assertion types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssertionKind {
    DataHash,
    BmffHash,
    Actions,
    Ingredient,
    Thumbnail,
    Schema,
    SoftBinding,
    CloudData,
    /// Any label this crate does not recognize.
    Unknown,
}

impl AssertionKind {
    /// Type an assertion by its box label. A trailing `__N` dedup suffix is
    /// ignored.
    pub fn from_label(label: &str) -> AssertionKind {
        let label = strip_label_suffix(label);
        match label {
            labels::DATA_HASH => AssertionKind::DataHash,
            labels::ACTIONS => AssertionKind::Actions,
            labels::INGREDIENT => AssertionKind::Ingredient,
            "c2pa.soft-binding" => AssertionKind::SoftBinding,
            "c2pa.cloud-data" => AssertionKind::CloudData,
            _ if label == labels::BMFF_HASH || label.starts_with("c2pa.hash.bmff") => {
                AssertionKind::BmffHash
            }
            _ if label.starts_with(labels::CLAIM_THUMBNAIL)
                || label.starts_with(labels::INGREDIENT_THUMBNAIL) =>
            {
                AssertionKind::Thumbnail
            }
            _ if label.starts_with("stds.") => AssertionKind::Schema,
            _ => AssertionKind::Unknown,
        }
    }

    /// True for assertions that tie the manifest to specific asset bytes.
    pub fn is_hard_binding(&self) -> bool {
        matches!(self, AssertionKind::DataHash | AssertionKind::BmffHash)
    }
}

/// An assertion resolved through the claim's list.
///
/// A claim may reference an assertion URL that does not resolve (redacted or
/// unknown-typed); the resolver still yields a placeholder carrying the URL
/// so callers can distinguish "not present" from "present but unrecognised".
#[derive(Debug)]
pub enum Assertion<'a> {
    Known(&'a SuperBox),
    Unknown(String),
}

impl<'a> Assertion<'a> {
    pub fn as_box(&self) -> Option<&'a SuperBox> {
        match self {
            Assertion::Known(sbox) => Some(sbox),
            Assertion::Unknown(_) => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.as_box().and_then(|b| b.label())
    }

    pub fn kind(&self) -> AssertionKind {
        match self.label() {
            Some(label) => AssertionKind::from_label(label),
            None => AssertionKind::Unknown,
        }
    }
}

/// Create a CBOR assertion box (`jumb/cbor`) from a serializable payload.
pub fn new_cbor_assertion<T: Serialize>(label: &str, payload: &T) -> Result<SuperBox> {
    let mut sbox = SuperBox::new(BoxSubtype::from_tag("cbor"), label)
        .map_err(Error::JumbfParseError)?;
    sbox.add_child(ChildBox::Cbor(CborBox::new(serde_cbor::to_vec(payload)?)));
    Ok(sbox)
}

/// Create a JSON assertion box (`jumb/json`), e.g. a
/// `stds.schema-org.CreativeWork` schema carrier.
pub fn new_json_assertion(label: &str, payload: &serde_json::Value) -> Result<SuperBox> {
    let mut sbox = SuperBox::new(BoxSubtype::from_tag("json"), label)
        .map_err(Error::JumbfParseError)?;
    sbox.add_child(ChildBox::Json(JsonBox::new(serde_json::to_vec(payload)?)));
    Ok(sbox)
}

/// Create an embedded-file assertion box: a JUMBF container holding a
/// `bfdb` description and a `bidb` data box.
pub fn new_embedded_file_assertion(
    label: &str,
    media_type: &str,
    file_name: Option<&str>,
    data: Vec<u8>,
) -> Result<SuperBox> {
    let subtype = BoxSubtype::from_hex_str(crate::jumbf::boxes::EMBEDDED_FILE_SUBTYPE)
        .ok_or(Error::OtherError("bad embedded file subtype".to_owned()))?;
    let mut sbox = SuperBox::new(subtype, label).map_err(Error::JumbfParseError)?;
    sbox.add_child(ChildBox::EmbeddedFileDesc(EmbeddedFileDescBox::new(
        media_type, file_name, false,
    )));
    sbox.add_child(ChildBox::Data(DataBox::new(BoxType::EmbedContent, data)));
    Ok(sbox)
}

/// The thumbnail assertion label for a media type, e.g.
/// `c2pa.thumbnail.claim.jpeg` for `image/jpeg`.
pub fn thumbnail_label(media_type: &str, claim: bool) -> Result<String> {
    let lower = media_type.to_ascii_lowercase();
    let subtype = lower
        .strip_prefix("image/")
        .map(|s| s.split(';').next().unwrap_or(s))
        .ok_or_else(|| Error::OtherError(format!("media type is {media_type}")))?;
    let prefix = if claim {
        labels::CLAIM_THUMBNAIL
    } else {
        labels::INGREDIENT_THUMBNAIL
    };
    Ok(format!("{prefix}.{subtype}"))
}

/// Decode an assertion's CBOR payload into a typed struct.
pub fn assertion_cbor<T: DeserializeOwned>(sbox: &SuperBox) -> Result<T> {
    let cbor = sbox
        .cbor_box()
        .ok_or(Error::OtherError("assertion has no cbor box".to_owned()))?;
    Ok(serde_cbor::from_slice(cbor.data())?)
}

/// Replace an assertion's CBOR payload from a typed struct.
pub fn set_assertion_cbor<T: Serialize>(sbox: &mut SuperBox, payload: &T) -> Result<()> {
    let data = serde_cbor::to_vec(payload)?;
    match sbox.cbor_box_mut() {
        Some(cbor) => cbor.set_data(data),
        None => sbox.add_child(ChildBox::Cbor(CborBox::new(data))),
    }
    Ok(())
}
