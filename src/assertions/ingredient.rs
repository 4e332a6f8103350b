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

//! The `c2pa.ingredient` assertion: a reference to a prior manifest
//! (parent) or component manifest in the same store.
//!
//! Ingredient manifests are not recursively validated; an embedded
//! `validationStatus` list records how the ingredient validated when it was
//! consumed, and any errors in it are surfaced as referenced statuses.

use serde::{Deserialize, Serialize};

use crate::{
    claim::HashedUri,
    jumbf::boxes::SuperBox,
    status::{StatusCode, ValidationStatus},
    store::{self, Store},
};

/// The ingredient is the direct parent of this asset.
pub const PARENT_OF: &str = "parentOf";

/// The ingredient is a component placed into this asset.
pub const COMPONENT_OF: &str = "componentOf";

/// The `c2pa.ingredient` CBOR payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Ingredient {
    #[serde(rename = "dc:format", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(rename = "dc:title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "instanceID", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    pub relationship: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub c2pa_manifest: Option<HashedUri>,

    #[serde(rename = "validationStatus", skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<Vec<ValidationStatus>>,
}

impl Ingredient {
    /// Describe a target manifest, recording the validation outcome observed
    /// when it was consumed. The hashed URI must already carry the target
    /// manifest's digest.
    pub fn for_manifest(
        relationship: &str,
        manifest_uri: HashedUri,
        target_claim: &crate::claim::Claim,
        status: Vec<ValidationStatus>,
    ) -> Self {
        Ingredient {
            format: target_claim.format.clone(),
            title: None,
            instance_id: target_claim.instance_id.clone(),
            relationship: relationship.to_owned(),
            c2pa_manifest: Some(manifest_uri),
            validation_status: if status.is_empty() {
                None
            } else {
                Some(status)
            },
        }
    }

    pub fn is_parent(&self) -> bool {
        self.relationship == PARENT_OF
    }
}

/// Verify an ingredient assertion box within its manifest.
pub fn verify(store: &Store, manifest: &SuperBox, sbox: &SuperBox) -> Vec<ValidationStatus> {
    let mut status = Vec::new();
    let self_uri = store.uri_from(manifest, sbox);

    let ingredient: Ingredient = match super::assertion_cbor(sbox) {
        Ok(ingredient) => ingredient,
        Err(_) => {
            status.push(
                ValidationStatus::with_message(
                    StatusCode::AssertionCborInvalid,
                    "ingredient cbor did not decode",
                )
                .set_url(self_uri.unwrap_or_default()),
            );
            return status;
        }
    };

    // zero or one parentOf ingredients per manifest
    let parents = store::assertion_boxes(manifest)
        .filter(|b| {
            super::AssertionKind::from_label(b.label().unwrap_or_default())
                == super::AssertionKind::Ingredient
        })
        .filter(|b| {
            super::assertion_cbor::<Ingredient>(b)
                .map(|i| i.is_parent())
                .unwrap_or(false)
        })
        .count();
    if parents > 1 {
        status.push(
            ValidationStatus::with_message(
                StatusCode::ManifestMultipleParents,
                "manifest has multiple \"parentOf\" c2pa.ingredient assertions",
            )
            .set_url(self_uri.unwrap_or_default()),
        );
        return status;
    }

    if let Some(manifest_uri) = &ingredient.c2pa_manifest {
        let target = store
            .find_from(manifest, manifest_uri.url())
            .filter(|b| b.subtype() == "c2ma");
        if target.is_none() {
            status.push(
                ValidationStatus::with_message(
                    StatusCode::ClaimMissing,
                    format!("\"{}\" not in manifest", manifest_uri.url()),
                )
                .set_url(self_uri.unwrap_or_default()),
            );
            return status;
        }

        // report embedded validation errors without re-validating the
        // ingredient manifest
        if let Some(embedded) = &ingredient.validation_status {
            for st in embedded.iter().filter(|st| st.is_error()) {
                status.push(
                    ValidationStatus::with_message(
                        StatusCode::IngredientHashedUriMismatch,
                        format!(
                            "referenced ingredient at \"{}\" validationStatus has error",
                            manifest_uri.url()
                        ),
                    )
                    .set_url(self_uri.clone().unwrap_or_default())
                    .set_referenced(st.clone()),
                );
            }
        }
    }

    status
}
