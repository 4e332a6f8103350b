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

//! The C2PA manifest store: the top-level JUMBF box whose children are
//! manifests, each holding an assertion store, exactly one claim, and
//! exactly one signature.
//!
//! The box tree is the source of truth. Claim and assertion accessors decode
//! the underlying boxes on demand; mutation helpers rewrite box payloads.
//! Boxes created on first access follow the layout of reference stores:
//! assertion store, claim, signature.

use crate::{
    assertions::Assertion,
    claim::Claim,
    error::{Error, Result},
    jumbf::{
        boxes::{BoxSubtype, ChildBox, CborBox, JumbfParseError, SuperBox},
        factory::BoxFactory,
        labels::{self, JumbfUri},
    },
};

/// A `Store` is the root JUMBF box (`jumb/c2pa`) holding one or more
/// manifests.
#[derive(Clone, Debug, PartialEq)]
pub struct Store {
    root: SuperBox,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a new, empty store.
    pub fn new() -> Self {
        let root = SuperBox::new(BoxSubtype::from_tag("c2pa"), labels::MANIFEST_STORE)
            .unwrap_or_else(|_| unreachable!("store label is valid"));
        Store { root }
    }

    /// Parse a store from its encoded bytes (e.g. the concatenated APP11
    /// payload of a JPEG, or a `.c2pa` sidecar file).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let factory = BoxFactory::new();
        let parsed = factory
            .load_from_slice(data)?
            .ok_or(Error::JumbfParseError(JumbfParseError::UnexpectedEof))?;
        match parsed {
            ChildBox::Super(root) if root.subtype() == "c2pa" => Ok(Store { root }),
            _ => Err(Error::JumbfParseError(JumbfParseError::ExpectedJumb)),
        }
    }

    /// Encode the store. Fails if any box is sparse.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.root.encode()?)
    }

    pub fn root(&self) -> &SuperBox {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut SuperBox {
        &mut self.root
    }

    /// The store's own label, normally `c2pa`.
    pub fn label(&self) -> &str {
        self.root.label().unwrap_or(labels::MANIFEST_STORE)
    }

    /// The manifests in insertion order.
    pub fn manifests(&self) -> Vec<&SuperBox> {
        self.root
            .child_superboxes()
            .filter(|sb| sb.subtype() == "c2ma")
            .collect()
    }

    /// The active manifest: the last in insertion order.
    pub fn active_manifest(&self) -> Option<&SuperBox> {
        self.manifests().into_iter().last()
    }

    pub fn active_manifest_mut(&mut self) -> Option<&mut SuperBox> {
        self.root
            .child_superboxes_mut()
            .filter(|sb| sb.subtype() == "c2ma")
            .last()
    }

    /// Find a manifest by its label.
    pub fn manifest(&self, label: &str) -> Option<&SuperBox> {
        self.manifests()
            .into_iter()
            .find(|m| m.label() == Some(label))
    }

    pub fn manifest_mut(&mut self, label: &str) -> Option<&mut SuperBox> {
        self.root
            .child_superboxes_mut()
            .filter(|sb| sb.subtype() == "c2ma")
            .find(|m| m.label() == Some(label))
    }

    /// Append a manifest; it becomes the active manifest.
    pub fn add_manifest(&mut self, manifest: SuperBox) {
        self.root.add_child(ChildBox::Super(manifest));
    }

    /// Insert a manifest before the others at the given child position, used
    /// when repackaging a prior store into this one.
    pub fn insert_manifest(&mut self, index: usize, manifest: SuperBox) {
        let index = index.min(self.root.children().len());
        self.root
            .children_mut()
            .insert(index, ChildBox::Super(manifest));
    }

    /// Resolve an absolute `self#jumbf=` URL against the store root.
    pub fn find(&self, uri: &str) -> Option<&SuperBox> {
        let parsed = JumbfUri::parse(uri)?;
        if !parsed.is_absolute() {
            return None;
        }
        let segments = parsed.segments();
        // the first segment names the root store box
        if segments.first() != Some(&self.label()) {
            return None;
        }
        self.root.find_segments(&segments[1..])
    }

    /// Resolve a `self#jumbf=` URL: absolute paths start at the store,
    /// relative paths at the context manifest.
    pub fn find_from<'a>(
        &'a self,
        context: &'a SuperBox,
        uri: &str,
    ) -> Option<&'a SuperBox> {
        let parsed = JumbfUri::parse(uri)?;
        if parsed.is_absolute() {
            self.find(uri)
        } else {
            context.find_segments(&parsed.segments())
        }
    }

    /// The absolute URL of a descendant box.
    pub fn uri_for(&self, target: &SuperBox) -> Option<String> {
        if std::ptr::eq(&self.root, target) {
            return Some(JumbfUri::to_absolute(&[self.label()]));
        }
        let path = self.root.path_to(target)?;
        let mut segments = vec![self.label()];
        segments.extend(path.iter().map(|s| s.as_str()));
        Some(JumbfUri::to_absolute(&segments))
    }

    /// The shortest URL of a descendant box: relative to the context
    /// manifest when possible, absolute otherwise.
    pub fn uri_from(&self, context: &SuperBox, target: &SuperBox) -> Option<String> {
        match context.path_to(target) {
            Some(path) => {
                let segments: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
                Some(JumbfUri::to_relative(&segments))
            }
            None => self.uri_for(target),
        }
    }

    /// A non-live diagnostic projection of the store, largely comparable to
    /// the output of `c2patool`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut manifests = serde_json::Map::new();
        for manifest in self.manifests() {
            let mut m = serde_json::Map::new();

            if let Some(claim) = claim_box(manifest) {
                if let Some(cbor) = claim.cbor_box() {
                    m.insert("claim".to_owned(), cbor_to_json(cbor.data())?);
                }
            }

            let mut assertions = serde_json::Map::new();
            for sbox in assertion_boxes(manifest) {
                let label = sbox.label().unwrap_or_default().to_owned();
                let value = if let Some(cbor) = sbox.cbor_box() {
                    cbor_to_json(cbor.data())?
                } else if let Some(json) = sbox.json_box() {
                    json.value()?
                } else if let Some((desc, data)) = sbox.embedded_file() {
                    serde_json::json!({
                        "media_type": desc.media_type(),
                        "length": data.data().len(),
                    })
                } else {
                    serde_json::Value::String(format!(
                        "<{} bytes>",
                        sbox.encode().map(|b| b.len()).unwrap_or(0)
                    ))
                };
                assertions.insert(label, value);
            }
            m.insert(
                "assertion_store".to_owned(),
                serde_json::Value::Object(assertions),
            );

            if let Some(sig) = signature_box(manifest) {
                if let Some(cbor) = sig.cbor_box() {
                    m.insert(
                        "signature.length".to_owned(),
                        serde_json::Value::from(cbor.data().len()),
                    );
                    if let Ok(info) = crate::cose::describe_signature(cbor.data()) {
                        m.insert("signature.alg".to_owned(), serde_json::Value::from(info.alg));
                        if let Some(issuer) = info.issuer {
                            m.insert(
                                "signature.issuer".to_owned(),
                                serde_json::Value::from(issuer),
                            );
                        }
                    }
                }
            }

            manifests.insert(
                manifest.label().unwrap_or_default().to_owned(),
                serde_json::Value::Object(m),
            );
        }

        Ok(serde_json::json!({ "manifests": manifests }))
    }
}

/// Transcode a CBOR item to a JSON value for diagnostics. Byte strings
/// become arrays of numbers.
fn cbor_to_json(data: &[u8]) -> Result<serde_json::Value> {
    let mut deserializer = serde_cbor::Deserializer::from_slice(data);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut out);
    serde_transcode::transcode(&mut deserializer, &mut serializer)
        .map_err(|e| Error::OtherError(format!("cbor transcode: {e}")))?;
    Ok(serde_json::from_slice(&out)?)
}

//---------------
// SECTION Manifest accessors
//---------------

/// Create a new manifest box. The label is its unique identifier within the
/// store, typically a `urn:uuid:`.
pub fn new_manifest(label: &str) -> Result<SuperBox> {
    Ok(SuperBox::new(BoxSubtype::from_tag("c2ma"), label)?)
}

/// The manifest's assertion store (`jumb/c2as`), if present.
pub fn assertion_store(manifest: &SuperBox) -> Option<&SuperBox> {
    manifest.child_by_subtype("c2as")
}

/// The manifest's assertion store, created on first access.
pub fn ensure_assertion_store(manifest: &mut SuperBox) -> Result<&mut SuperBox> {
    if assertion_store(manifest).is_none() {
        let sbox = SuperBox::new(BoxSubtype::from_tag("c2as"), labels::ASSERTIONS)?;
        manifest.add_child(ChildBox::Super(sbox));
    }
    manifest
        .child_by_subtype_mut("c2as")
        .ok_or_else(|| Error::OtherError("assertion store vanished".to_owned()))
}

/// The assertion boxes of a manifest in insertion order.
pub fn assertion_boxes(manifest: &SuperBox) -> impl Iterator<Item = &SuperBox> {
    assertion_store(manifest)
        .into_iter()
        .flat_map(|store| store.child_superboxes())
}

/// Add an assertion box to the manifest's assertion store and return its
/// relative URL within the manifest.
pub fn add_assertion(manifest: &mut SuperBox, assertion: SuperBox) -> Result<String> {
    let label = assertion
        .label()
        .ok_or_else(|| Error::OtherError("assertion has no label".to_owned()))?
        .to_owned();
    let store = ensure_assertion_store(manifest)?;
    store.add_child(ChildBox::Super(assertion));
    Ok(JumbfUri::to_relative(&[labels::ASSERTIONS, &label]))
}

/// The manifest's claim box (`jumb/c2cl`), if present.
pub fn claim_box(manifest: &SuperBox) -> Option<&SuperBox> {
    manifest.child_by_subtype("c2cl")
}

/// The manifest's claim box, created (with an empty CBOR map) on first
/// access.
pub fn ensure_claim_box(manifest: &mut SuperBox) -> Result<&mut SuperBox> {
    if claim_box(manifest).is_none() {
        let mut sbox = SuperBox::new(BoxSubtype::from_tag("c2cl"), labels::CLAIM)?;
        sbox.add_child(ChildBox::Cbor(CborBox::new(vec![0xa0]))); // {}
        manifest.add_child(ChildBox::Super(sbox));
    }
    manifest
        .child_by_subtype_mut("c2cl")
        .ok_or_else(|| Error::OtherError("claim box vanished".to_owned()))
}

/// Decode the manifest's claim. A missing claim box reads as an empty claim.
pub fn read_claim(manifest: &SuperBox) -> Result<Claim> {
    match claim_box(manifest).and_then(|b| b.cbor_box()) {
        Some(cbor) => Claim::from_cbor(cbor.data()),
        None => Ok(Claim::default()),
    }
}

/// Serialize the claim into the manifest's claim box.
pub fn write_claim(manifest: &mut SuperBox, claim: &Claim) -> Result<()> {
    let data = claim.to_cbor()?;
    let sbox = ensure_claim_box(manifest)?;
    match sbox.cbor_box_mut() {
        Some(cbor) => cbor.set_data(data),
        None => sbox.add_child(ChildBox::Cbor(CborBox::new(data))),
    }
    Ok(())
}

/// The manifest's signature box (`jumb/c2cs`), if present.
pub fn signature_box(manifest: &SuperBox) -> Option<&SuperBox> {
    manifest.child_by_subtype("c2cs")
}

/// The manifest's signature box, created on first access.
pub fn ensure_signature_box(manifest: &mut SuperBox) -> Result<&mut SuperBox> {
    if signature_box(manifest).is_none() {
        let mut sbox = SuperBox::new(BoxSubtype::from_tag("c2cs"), labels::SIGNATURE)?;
        sbox.add_child(ChildBox::Cbor(CborBox::new(Vec::new())));
        manifest.add_child(ChildBox::Super(sbox));
    }
    manifest
        .child_by_subtype_mut("c2cs")
        .ok_or_else(|| Error::OtherError("signature box vanished".to_owned()))
}

/// Resolve the claim's assertion list against the manifest. URLs that do not
/// resolve to a requestable assertion yield [`Assertion::Unknown`] carrying
/// the URL.
pub fn claim_assertions<'a>(
    store: &'a Store,
    manifest: &'a SuperBox,
    claim: &Claim,
) -> Vec<Assertion<'a>> {
    claim
        .assertions
        .iter()
        .map(|uri| match store.find_from(manifest, uri.url()) {
            Some(sbox) => Assertion::Known(sbox),
            None => Assertion::Unknown(uri.url().to_owned()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;
    use crate::{
        assertions::{new_cbor_assertion, DataHash},
        claim::HashedUri,
    };

    fn store_with_manifest() -> (Store, String) {
        let mut store = Store::new();
        let label = "urn:uuid:00000000-1111-2222-3333-444444444444";
        let mut manifest = new_manifest(label).unwrap();
        let dh = DataHash::new();
        add_assertion(
            &mut manifest,
            new_cbor_assertion("c2pa.hash.data", &dh).unwrap(),
        )
        .unwrap();
        store.add_manifest(manifest);
        (store, label.to_owned())
    }

    #[test]
    fn active_manifest_is_last() {
        let (mut store, first_label) = store_with_manifest();
        assert_eq!(
            store.active_manifest().unwrap().label(),
            Some(first_label.as_str())
        );

        let second = new_manifest("urn:uuid:second").unwrap();
        store.add_manifest(second);
        assert_eq!(store.manifests().len(), 2);
        assert_eq!(
            store.active_manifest().unwrap().label(),
            Some("urn:uuid:second")
        );
    }

    #[test]
    fn find_and_uri_round_trip() {
        let (store, label) = store_with_manifest();
        let manifest = store.manifest(&label).unwrap();

        let uri = store.uri_for(manifest).unwrap();
        assert_eq!(uri, format!("self#jumbf=/c2pa/{label}"));
        assert!(std::ptr::eq(store.find(&uri).unwrap(), manifest));
    }

    #[test]
    fn relative_resolution_within_manifest() {
        let (store, label) = store_with_manifest();
        let manifest = store.manifest(&label).unwrap();

        let assertion = store
            .find_from(manifest, "self#jumbf=c2pa.assertions/c2pa.hash.data")
            .expect("assertion");
        assert_eq!(assertion.label(), Some("c2pa.hash.data"));

        let uri = store.uri_from(manifest, assertion).unwrap();
        assert_eq!(uri, "self#jumbf=c2pa.assertions/c2pa.hash.data");

        // the same box is reachable absolutely
        let abs = store.uri_for(assertion).unwrap();
        assert_eq!(
            abs,
            format!("self#jumbf=/c2pa/{label}/c2pa.assertions/c2pa.hash.data")
        );
        assert!(std::ptr::eq(store.find(&abs).unwrap(), assertion));
    }

    #[test]
    fn claim_round_trips_through_box() {
        let (mut store, label) = store_with_manifest();
        let manifest = store.manifest_mut(&label).unwrap();

        let mut claim = Claim::default();
        claim.format = Some("image/jpeg".to_owned());
        claim.assertions.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.hash.data".to_owned(),
            None,
            Vec::new(),
        ));
        write_claim(manifest, &claim).unwrap();

        let restored = read_claim(store.manifest(&label).unwrap()).unwrap();
        assert_eq!(restored, claim);
    }

    #[test]
    fn claim_assertions_distinguish_unknown() {
        let (mut store, label) = store_with_manifest();
        let manifest = store.manifest_mut(&label).unwrap();

        let mut claim = Claim::default();
        claim.assertions.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.hash.data".to_owned(),
            None,
            Vec::new(),
        ));
        claim.assertions.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.redacted-thing".to_owned(),
            None,
            Vec::new(),
        ));
        write_claim(manifest, &claim).unwrap();

        let manifest = store.manifest(&label).unwrap();
        let claim = read_claim(manifest).unwrap();
        let resolved = claim_assertions(&store, manifest, &claim);
        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].as_box().is_some());
        match &resolved[1] {
            Assertion::Unknown(url) => {
                assert_eq!(url, "self#jumbf=c2pa.assertions/c2pa.redacted-thing")
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn store_round_trips_bytes() {
        let (mut store, label) = store_with_manifest();
        let manifest = store.manifest_mut(&label).unwrap();
        let mut claim = Claim::default();
        claim.format = Some("image/jpeg".to_owned());
        write_claim(manifest, &claim).unwrap();

        let bytes = store.encode().unwrap();
        let restored = Store::from_bytes(&bytes).unwrap();
        assert_eq!(restored.encode().unwrap(), bytes);
        assert_eq!(restored.manifests().len(), 1);
    }

    #[test]
    fn boxes_created_in_reference_order() {
        let mut manifest = new_manifest("urn:uuid:m").unwrap();
        add_assertion(
            &mut manifest,
            new_cbor_assertion("c2pa.hash.data", &DataHash::new()).unwrap(),
        )
        .unwrap();
        ensure_claim_box(&mut manifest).unwrap();
        ensure_signature_box(&mut manifest).unwrap();

        let subtypes: Vec<String> = manifest
            .child_superboxes()
            .map(|sb| sb.subtype())
            .collect();
        assert_eq!(subtypes, vec!["c2as", "c2cl", "c2cs"]);
    }
}
