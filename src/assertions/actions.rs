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

//! The `c2pa.actions` assertion: the provenance history of an asset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_cbor::Value;

use crate::{
    claim::HashedUri,
    jumbf::boxes::SuperBox,
    status::{StatusCode, ValidationStatus},
    store::Store,
};

use super::{assertion_cbor, AssertionKind, Ingredient};

/// Specification defined C2PA actions
pub mod c2pa_action {
    pub const OPENED: &str = "c2pa.opened";
    pub const PLACED: &str = "c2pa.placed";
    pub const REMOVED: &str = "c2pa.removed";
    pub const REPACKAGED: &str = "c2pa.repackaged";
    pub const TRANSCODED: &str = "c2pa.transcoded";
    pub const CREATED: &str = "c2pa.created";
    pub const EDITED: &str = "c2pa.edited";
}

// actions that must cite a parentOf ingredient
const PARENT_ACTIONS: [&str; 3] = [
    c2pa_action::OPENED,
    c2pa_action::REPACKAGED,
    c2pa_action::TRANSCODED,
];

// actions that must cite a componentOf ingredient
const COMPONENT_ACTIONS: [&str; 2] = [c2pa_action::PLACED, c2pa_action::REMOVED];

/// One entry in the action list.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Action {
    /// The action label, e.g. `c2pa.repackaged`.
    pub action: String,

    /// The `xmpMM:InstanceID` of the modified resource.
    #[serde(rename = "instanceID", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Additional parameters of the action. These vary by the type of action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, Value>>,
}

impl Action {
    pub fn new(action: &str) -> Self {
        Action {
            action: action.to_owned(),
            ..Default::default()
        }
    }

    /// Cite an ingredient assertion by its hashed URI, as required for the
    /// opened/placed/removed/repackaged/transcoded actions.
    pub fn with_ingredient(mut self, ingredient_uri: &HashedUri) -> Self {
        let mut parameters = self.parameters.unwrap_or_default();
        if let Ok(value) = serde_cbor::value::to_value(ingredient_uri) {
            parameters.insert("ingredient".to_owned(), value);
        }
        self.parameters = Some(parameters);
        self
    }

    fn ingredient_url(&self) -> Option<String> {
        let parameters = self.parameters.as_ref()?;
        match parameters.get("ingredient")? {
            Value::Map(map) => match map.get(&Value::Text("url".to_owned()))? {
                Value::Text(url) => Some(url.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// The `c2pa.actions` CBOR payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Actions {
    pub actions: Vec<Action>,
}

impl Actions {
    pub fn new() -> Self {
        Actions::default()
    }

    pub fn add(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Verify an actions assertion box within its manifest: every action that
/// requires an associated ingredient must cite one that resolves to an
/// ingredient assertion in the same manifest with the right relationship.
pub fn verify(store: &Store, manifest: &SuperBox, sbox: &SuperBox) -> Vec<ValidationStatus> {
    let mut status = Vec::new();
    let self_uri = store.uri_from(manifest, sbox).unwrap_or_default();

    let actions: Actions = match assertion_cbor(sbox) {
        Ok(actions) => actions,
        Err(_) => {
            status.push(
                ValidationStatus::with_message(
                    StatusCode::AssertionCborInvalid,
                    "actions cbor did not decode",
                )
                .set_url(self_uri),
            );
            return status;
        }
    };

    for (i, action) in actions.actions.iter().enumerate() {
        let action_type = action.action.as_str();
        let wants_parent = PARENT_ACTIONS.contains(&action_type);
        let wants_component = COMPONENT_ACTIONS.contains(&action_type);
        if !wants_parent && !wants_component {
            continue;
        }

        let mismatch = |detail: String| {
            ValidationStatus::with_message(
                StatusCode::AssertionActionIngredientMismatch,
                format!("action[{i}] \"{action_type}\" {detail}"),
            )
            .set_url(self_uri.clone())
        };

        let url = action.ingredient_url();
        let target = url
            .as_deref()
            .and_then(|url| store.find_from(manifest, url));
        let target = match target {
            Some(target)
                if AssertionKind::from_label(target.label().unwrap_or_default())
                    == AssertionKind::Ingredient =>
            {
                target
            }
            Some(_) | None => {
                status.push(mismatch(format!(
                    "ingredient \"{}\" not found",
                    url.as_deref().unwrap_or("(none)")
                )));
                continue;
            }
        };

        // the cited box must live in this manifest's assertion store
        if manifest.path_to(target).is_none() {
            status.push(mismatch(format!(
                "ingredient \"{}\" in different manifest",
                url.as_deref().unwrap_or_default()
            )));
            continue;
        }

        let ingredient: Ingredient = match assertion_cbor(target) {
            Ok(ingredient) => ingredient,
            Err(_) => {
                status.push(mismatch("ingredient cbor did not decode".to_owned()));
                continue;
            }
        };

        let relationship = ingredient.relationship.as_str();
        if wants_parent && relationship != super::ingredient::PARENT_OF {
            status.push(mismatch(format!(
                "ingredient \"{}\" relationship \"{relationship}\"",
                url.as_deref().unwrap_or_default()
            )));
            continue;
        }
        if wants_component && relationship != super::ingredient::COMPONENT_OF {
            status.push(mismatch(format!(
                "ingredient \"{}\" relationship \"{relationship}\"",
                url.as_deref().unwrap_or_default()
            )));
            continue;
        }

        if let Some(manifest_uri) = &ingredient.c2pa_manifest {
            let resolved = store
                .find_from(manifest, manifest_uri.url())
                .filter(|b| b.subtype() == "c2ma");
            if resolved.is_none() {
                status.push(mismatch(format!(
                    "ingredient \"{}\" manifest \"{}\" not found",
                    url.as_deref().unwrap_or_default(),
                    manifest_uri.url()
                )));
            }
        }
    }

    status
}
