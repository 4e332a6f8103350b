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

//! Box registry and factory.
//!
//! The registry maps dotted `type[.subtype[.label]]` keys to box
//! constructors. The factory reads a box header, sniffs the extension
//! subtype and `jumd` label for subtyped types before dispatching, then
//! resolves the constructor by longest-prefix match.

use std::{
    collections::{HashMap, HashSet},
    io::Read,
};

use log::debug;

use super::boxes::{
    BoxHeader, BoxSubtype, BoxType, ChildBox, DescriptionBox, JumbfParseError, JumbfParseResult,
    C2PA_UUID_SUBTYPE, EMBEDDED_FILE_SUBTYPE,
};

/// The constructors a registry key can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxBuilder {
    /// `jumb` superbox: description box plus content boxes.
    Super,
    /// Raw CBOR content box.
    Cbor,
    /// Raw JSON content box.
    Json,
    /// `bfdb` embedded-file description.
    EmbeddedFileDesc,
    /// Opaque payload, preserved byte-exactly.
    Data,
    /// Generic container: payload is a list of child boxes.
    Container,
    /// The C2PA `uuid` container for BMFF-embedded manifests.
    C2paUuid,
}

/// Creates [`ChildBox`] trees from a byte stream.
pub struct BoxFactory {
    registry: HashMap<String, BoxBuilder>,
    containers: HashSet<String>,
    subtyped: HashSet<String>,
}

impl Default for BoxFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxFactory {
    /// Create a factory with the default C2PA registrations.
    pub fn new() -> Self {
        let mut factory = BoxFactory {
            registry: HashMap::new(),
            containers: HashSet::new(),
            subtyped: HashSet::new(),
        };
        factory.register_defaults();
        factory
    }

    /// Register a box constructor.
    ///
    /// `subtype` is the extension subtype identifier (four-character alias or
    /// 32 hex digits) for types whose payload begins with an extension
    /// header; `label` matches the nested `jumd` label for `jumb` boxes.
    pub fn register(
        &mut self,
        box_type: &str,
        subtype: Option<&str>,
        label: Option<&str>,
        container: bool,
        builder: BoxBuilder,
    ) {
        match (subtype, label) {
            (Some(subtype), Some(label)) => {
                self.registry
                    .insert(format!("{box_type}.{subtype}.{label}"), builder);
                self.subtyped.insert(box_type.to_owned());
            }
            (Some(subtype), None) => {
                self.registry
                    .insert(format!("{box_type}.{subtype}"), builder);
                self.subtyped.insert(box_type.to_owned());
            }
            _ => {
                self.registry.insert(box_type.to_owned(), builder);
                if container {
                    self.containers.insert(box_type.to_owned());
                }
            }
        }
    }

    /// True if boxes of this type parse their payload as child boxes.
    pub fn is_container(&self, box_type: &str) -> bool {
        self.containers.contains(box_type)
    }

    /// True if boxes of this type begin with an ISO extension subtype.
    pub fn is_subtyped(&self, box_type: &str) -> bool {
        self.subtyped.contains(box_type)
    }

    /// Resolve a `type[.subtype[.label]]` triple to a constructor by
    /// longest-prefix match, with progressive truncation: the full key is
    /// tried first, then with any trailing `__N` digit suffix stripped from
    /// the label, then one dotted segment at a time down to the bare type,
    /// finally the default (container or opaque data).
    pub fn resolve(
        &self,
        box_type: &str,
        subtype: Option<&str>,
        label: Option<&str>,
    ) -> (BoxBuilder, String) {
        // digit suffixes are only stripped from the label region of the key
        let min_length = box_type.len() + subtype.map(|s| s.len() + 2).unwrap_or(1);

        let mut key = match (subtype, label) {
            (Some(subtype), Some(label)) => format!("{box_type}.{subtype}.{label}"),
            (Some(subtype), None) => format!("{box_type}.{subtype}"),
            _ => box_type.to_owned(),
        };

        while !key.is_empty() {
            if key.len() > min_length && key.ends_with(|c: char| c.is_ascii_digit()) {
                let stripped = strip_label_suffix(&key);
                if stripped.len() != key.len() {
                    key = stripped.to_owned();
                }
            }
            if let Some(builder) = self.registry.get(&key) {
                return (*builder, key);
            }
            match key.rfind('.') {
                Some(pos) => key.truncate(pos),
                None => break,
            }
        }

        if self.is_container(box_type) {
            (BoxBuilder::Container, box_type.to_owned())
        } else {
            (BoxBuilder::Data, box_type.to_owned())
        }
    }

    /// Read one box from the stream.
    ///
    /// Returns `Ok(None)` on a clean end of stream. A box with length zero
    /// consumes the remainder of the stream.
    pub fn load<R: Read>(&self, reader: &mut R) -> JumbfParseResult<Option<ChildBox>> {
        let header = match BoxHeader::read(reader)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let mut payload = Vec::new();
        if header.size == 0 {
            reader.read_to_end(&mut payload)?;
        } else {
            if header.size < header.header_len() {
                return Err(JumbfParseError::InvalidBoxRange);
            }
            payload = vec![0u8; (header.size - header.header_len()) as usize];
            reader
                .read_exact(&mut payload)
                .map_err(|_| JumbfParseError::UnexpectedEof)?;
        }

        let box_type = header.name.tag();
        let (subtype, label) = if self.is_subtyped(&box_type) {
            self.sniff_subtype(&header, &payload)?
        } else {
            (None, None)
        };

        let (builder, resolved) =
            self.resolve(&box_type, subtype.as_deref(), label.as_deref());
        debug!("load {box_type} resolved {resolved} ({} bytes)", payload.len());

        ChildBox::from_payload(builder, &header, &payload, self).map(Some)
    }

    /// Load a single box from a byte slice.
    pub fn load_from_slice(&self, data: &[u8]) -> JumbfParseResult<Option<ChildBox>> {
        self.load(&mut std::io::Cursor::new(data))
    }

    /// Decode the extension header (and the `jumd` label for `jumb`) from the
    /// start of the payload, so the constructor can be picked before the box
    /// is parsed. The constructor re-reads from the start.
    fn sniff_subtype(
        &self,
        header: &BoxHeader,
        payload: &[u8],
    ) -> JumbfParseResult<(Option<String>, Option<String>)> {
        match header.name {
            BoxType::Jumb => {
                let mut reader = std::io::Cursor::new(payload);
                let desc_header =
                    BoxHeader::read(&mut reader)?.ok_or(JumbfParseError::InvalidJumbBox)?;
                if desc_header.name != BoxType::Jumd
                    || desc_header.size < desc_header.header_len()
                    || desc_header.size as usize > payload.len()
                {
                    return Err(JumbfParseError::InvalidJumbBox);
                }
                let desc = DescriptionBox::from_payload(
                    &payload[desc_header.header_len() as usize..desc_header.size as usize],
                )?;
                Ok((
                    Some(desc.subtype().identifier()),
                    desc.label().map(|l| l.to_owned()),
                ))
            }
            _ => {
                if payload.len() < 16 {
                    return Err(JumbfParseError::InvalidUuidBox);
                }
                let subtype: [u8; 16] = payload[..16]
                    .try_into()
                    .map_err(|_| JumbfParseError::InvalidUuidBox)?;
                Ok((Some(BoxSubtype(subtype).identifier()), None))
            }
        }
    }

    fn register_defaults(&mut self) {
        use BoxBuilder::*;

        self.register("jumb", None, None, true, Super);
        self.register("jumd", None, None, false, Data);
        self.register("cbor", None, None, false, Cbor);
        self.register("json", None, None, false, Json);
        self.register("bfdb", None, None, false, EmbeddedFileDesc);
        self.register("bidb", None, None, false, Data);
        self.register("free", None, None, false, Data);
        self.register("uuid", None, None, false, Data);

        self.register("jumb", Some("cbor"), None, true, Super);
        self.register("jumb", Some("json"), None, true, Super);
        self.register("jumb", Some("c2pa"), None, true, Super);
        self.register("jumb", Some("c2ma"), None, true, Super);
        self.register("jumb", Some("c2as"), None, true, Super);
        self.register("jumb", Some("c2cl"), None, true, Super);
        self.register("jumb", Some("c2cs"), None, true, Super);
        self.register("jumb", Some(EMBEDDED_FILE_SUBTYPE), None, true, Super);

        self.register("uuid", Some(C2PA_UUID_SUBTYPE), None, false, C2paUuid);

        // known assertion types; all parse as superboxes, the labels type
        // them at the C2PA layer
        for label in [
            "c2pa.actions",
            "c2pa.hash.data",
            "c2pa.hash.bmff",
            "c2pa.hash.bmff.v2",
            "c2pa.soft-binding",
            "c2pa.cloud-data",
            "c2pa.ingredient",
        ] {
            self.register("jumb", Some("cbor"), Some(label), true, Super);
        }
        for label in [
            "stds.exif",
            "stds.iptc",
            "stds.schema-org.ClaimReview",
            "stds.schema-org.CreativeWork",
        ] {
            self.register("jumb", Some("json"), Some(label), true, Super);
        }
        self.register(
            "jumb",
            Some(EMBEDDED_FILE_SUBTYPE),
            Some("c2pa.thumbnail"),
            true,
            Super,
        );
    }
}

/// Strip a trailing `__N` dedup suffix from a label or dotted key.
/// `c2pa.hash.data__2` becomes `c2pa.hash.data`.
pub(crate) fn strip_label_suffix(label: &str) -> &str {
    let trimmed = label.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.len() != label.len() && trimmed.len() > 2 && trimmed.ends_with("__") {
        &trimmed[..trimmed.len() - 2]
    } else {
        label
    }
}
