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

//! ISO BMFF/JUMBF box codec.
//!
//! Boxes are length-prefixed nested containers (ISO 14496-12); JUMBF
//! (ISO 19566-5) layers a description box with a label and subtype on top.
//! C2PA signatures are computed over encoded box bytes, so a non-sparse tree
//! must re-encode to exactly the bytes it was parsed from.
//!
//!  # References
//!
//!  - [ISO BMFF Byte Stream Format](https://w3c.github.io/media-source/isobmff-byte-stream-format.html)
//!  - [JPEG universal metadata box format](https://www.iso.org/standard/73604.html)

use std::{
    fmt,
    io::{Cursor, Read, Write},
};

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

/// `JumbfParseError` enumerates errors detected while parsing or encoding
/// JUMBF data structures.
#[derive(Debug, Error)]
pub enum JumbfParseError {
    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("invalid box header")]
    InvalidBoxHeader,

    #[error("invalid box range")]
    InvalidBoxRange,

    #[error("invalid JUMB box")]
    InvalidJumbBox,

    #[error("invalid JUMD box")]
    InvalidDescriptionBox,

    #[error("invalid UUID box")]
    InvalidUuidBox,

    #[error("invalid embedded file box")]
    InvalidEmbeddedFileBox,

    #[error("salt must be c2sh and at least 16 bytes")]
    InvalidSalt,

    #[error("sparse box cannot be encoded")]
    SparseBox,

    #[error("expected a jumb box")]
    ExpectedJumb,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// A specialized `Result` type for JUMBF parsing operations.
pub type JumbfParseResult<T> = std::result::Result<T, JumbfParseError>;

macro_rules! write_u8 {
    ($w:expr, $n:expr) => {{
        use byteorder::WriteBytesExt;
        $w.write_u8($n)?
    }};
}
macro_rules! write_u16 {
    ($w:expr, $n:expr) => {{
        use byteorder::{BigEndian, WriteBytesExt};
        $w.write_u16::<BigEndian>($n)?;
    }};
}
macro_rules! write_u32 {
    ($w:expr, $n:expr) => {{
        use byteorder::{BigEndian, WriteBytesExt};
        $w.write_u32::<BigEndian>($n)?;
    }};
}
macro_rules! write_u64 {
    ($w:expr, $n:expr) => {{
        use byteorder::{BigEndian, WriteBytesExt};
        $w.write_u64::<BigEndian>($n)?;
    }};
}
macro_rules! write_all {
    ($w:expr, $n:expr) => {{
        $w.write_all($n)?;
    }};
}

/// macro for dealing with the type of a BMFF/JUMBF box
macro_rules! boxtype {
    ($( $name:ident => $value:expr ),*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BoxType {
            $( $name, )*
            UnknownBox(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> BoxType {
                match t {
                    $( $value => BoxType::$name, )*
                    _ => BoxType::UnknownBox(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(t: BoxType) -> u32 {
                match t {
                    $( BoxType::$name => $value, )*
                    BoxType::UnknownBox(t) => t,
                }
            }
        }
    }
}

boxtype! {
    Empty => 0x0000_0000,
    Jumb => 0x6A75_6D62,
    Jumd => 0x6A75_6D64,
    Padding => 0x6672_6565,
    SaltHash => 0x6332_7368,
    Json => 0x6A73_6F6E,
    Cbor => 0x6362_6F72,
    Uuid => 0x7575_6964,
    Jp2c => 0x6A70_3263,
    EmbedMediaDesc => 0x6266_6462,
    EmbedContent => 0x6269_6462
}

impl BoxType {
    /// The four-character tag, e.g. `jumb`, or the raw hex value for
    /// non-printable types.
    pub fn tag(&self) -> String {
        let v: u32 = (*self).into();
        let bytes = v.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            bytes.iter().map(|b| *b as char).collect()
        } else {
            format!("0x{v:08x}")
        }
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

pub(crate) const HEADER_SIZE: u64 = 8;

// ANCHOR BoxHeader
/// The length/type prefix of a box.
pub struct BoxHeader {
    pub name: BoxType,
    pub size: u64,
    pub extended: bool,
}

impl BoxHeader {
    pub fn new(name: BoxType, size: u64) -> Self {
        Self {
            name,
            size,
            extended: false,
        }
    }

    /// Bytes occupied by this header on the wire.
    pub fn header_len(&self) -> u64 {
        if self.extended {
            HEADER_SIZE + 8
        } else {
            HEADER_SIZE
        }
    }

    /// Read a box header. Returns `None` on a clean end of stream.
    pub fn read<R: Read>(reader: &mut R) -> JumbfParseResult<Option<BoxHeader>> {
        let mut buf = [0u8; 8];
        let bytes_read = reader.read(&mut buf)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        if bytes_read < 8 {
            reader
                .read_exact(&mut buf[bytes_read..])
                .map_err(|_| JumbfParseError::UnexpectedEof)?;
        }

        let size = u32::from_be_bytes(
            buf[0..4]
                .try_into()
                .map_err(|_| JumbfParseError::InvalidBoxHeader)?,
        );
        let typ = u32::from_be_bytes(
            buf[4..8]
                .try_into()
                .map_err(|_| JumbfParseError::InvalidBoxHeader)?,
        );

        // size == 1 means an 8-byte extended length follows
        if size == 1 {
            let large_size = reader.read_u64::<BigEndian>()?;
            Ok(Some(BoxHeader {
                name: BoxType::from(typ),
                size: large_size,
                extended: true,
            }))
        } else {
            Ok(Some(BoxHeader {
                name: BoxType::from(typ),
                size: size as u64,
                extended: false,
            }))
        }
    }
}

//---------------
// SECTION Subtypes
//---------------

/// Extension subtypes ending in this suffix alias a printable four-character
/// tag (ISO 14496-12 s 11).
pub const EXTENSION_SUFFIX: [u8; 12] = [
    0x00, 0x11, 0x00, 0x10, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

/// The C2PA `uuid` container subtype for BMFF-embedded manifests.
pub const C2PA_UUID_SUBTYPE: &str = "d8fec3d61b0e483c92975828877ec481";

/// The JUMBF embedded-file container subtype (ISO 19566-5 AMD-1).
pub const EMBEDDED_FILE_SUBTYPE: &str = "40cb0c32bb8a489da70b2ad6f47f4369";

/// A 16-byte extension box subtype.
///
/// If the subtype ends with the fixed [`EXTENSION_SUFFIX`], the first four
/// bytes form a printable tag that aliases it (`cbor`, `c2pa`, ...);
/// otherwise the identifier is the full 32-hex-digit string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxSubtype(pub [u8; 16]);

impl BoxSubtype {
    /// Build a subtype from a four-character tag using the standard suffix.
    pub fn from_tag(tag: &str) -> Self {
        let mut bytes = [0u8; 16];
        for (i, c) in tag.bytes().take(4).enumerate() {
            bytes[i] = c;
        }
        bytes[4..].copy_from_slice(&EXTENSION_SUFFIX);
        BoxSubtype(bytes)
    }

    /// Build a subtype from a 32-hex-digit string.
    pub fn from_hex_str(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 16] = bytes.try_into().ok()?;
        Some(BoxSubtype(bytes))
    }

    /// Parse either form: a four-character tag or 32 hex digits.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 4 {
            Some(BoxSubtype::from_tag(s))
        } else {
            BoxSubtype::from_hex_str(s)
        }
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The four-character alias, if this subtype carries the standard suffix.
    pub fn tag(&self) -> Option<String> {
        if self.0[4..] == EXTENSION_SUFFIX && self.0[..4].iter().all(|b| b.is_ascii_graphic()) {
            Some(self.0[..4].iter().map(|b| *b as char).collect())
        } else {
            None
        }
    }

    /// The identifier used in registry keys and diagnostics: the alias when
    /// present, the 32-hex-digit form otherwise.
    pub fn identifier(&self) -> String {
        match self.tag() {
            Some(tag) => tag,
            None => hex::encode(self.0),
        }
    }
}

impl fmt::Debug for BoxSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxSubtype({})", self.identifier())
    }
}

impl fmt::Display for BoxSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

//---------------
// SECTION JUMBF description box
//---------------

// jumd toggle bits
const TOGGLE_REQUESTABLE: u8 = 1;
const TOGGLE_LABEL: u8 = 2;
const TOGGLE_ID: u8 = 4;
const TOGGLE_SIGNATURE: u8 = 8;
const TOGGLE_SALT: u8 = 16;

/// JUMBF description box (`jumd`, ISO 19566-5 A.3).
///
/// Carries the subtype and label that make the enclosing superbox
/// addressable, plus optional id, SHA-256 signature and salt.
#[derive(Clone, Debug, PartialEq)]
pub struct DescriptionBox {
    subtype: BoxSubtype,
    pub(crate) requestable: bool,
    label: Option<String>,
    id: Option<u16>,
    pub(crate) signature: Option<[u8; 32]>,
    salt: Option<Vec<u8>>,
    sparse: bool,
}

impl DescriptionBox {
    /// Create a requestable, labeled description.
    pub fn new(subtype: BoxSubtype, label: &str) -> JumbfParseResult<Self> {
        validate_label(label)?;
        Ok(DescriptionBox {
            subtype,
            requestable: true,
            label: Some(label.to_owned()),
            id: None,
            signature: None,
            salt: None,
            sparse: false,
        })
    }

    pub fn subtype(&self) -> &BoxSubtype {
        &self.subtype
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// A box is requestable iff the flag is set and a label is present.
    pub fn is_requestable(&self) -> bool {
        self.requestable && self.label.is_some()
    }

    pub fn id(&self) -> Option<u16> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<u16>) {
        self.id = id;
    }

    pub fn signature(&self) -> Option<&[u8; 32]> {
        self.signature.as_ref()
    }

    pub fn salt(&self) -> Option<&[u8]> {
        self.salt.as_deref()
    }

    /// Salt must be at least 16 bytes (C2PA hashing of JUMBF boxes).
    pub fn set_salt(&mut self, salt: Vec<u8>) -> JumbfParseResult<()> {
        if salt.len() < 16 {
            return Err(JumbfParseError::InvalidSalt);
        }
        self.salt = Some(salt);
        Ok(())
    }

    /// Parse a description box payload.
    pub(crate) fn from_payload(payload: &[u8]) -> JumbfParseResult<Self> {
        let mut reader = Cursor::new(payload);

        let mut subtype = [0u8; 16];
        reader.read_exact(&mut subtype)?;
        let toggles = reader.read_u8()?;

        let label = if toggles & TOGGLE_LABEL != 0 {
            let mut buf = Vec::with_capacity(64);
            loop {
                let c = reader.read_u8()?;
                if c == 0 {
                    break;
                }
                buf.push(c);
            }
            Some(String::from_utf8(buf).map_err(|_| JumbfParseError::InvalidDescriptionBox)?)
        } else {
            None
        };

        let id = if toggles & TOGGLE_ID != 0 {
            Some(reader.read_u16::<BigEndian>()?)
        } else {
            None
        };

        let signature = if toggles & TOGGLE_SIGNATURE != 0 {
            let mut sig = [0u8; 32];
            reader.read_exact(&mut sig)?;
            Some(sig)
        } else {
            None
        };

        let salt = if toggles & TOGGLE_SALT != 0 {
            let salt_len = reader.read_u32::<BigEndian>()? as u64;
            let salt_type = reader.read_u32::<BigEndian>()?;
            if BoxType::from(salt_type) != BoxType::SaltHash || salt_len < HEADER_SIZE {
                return Err(JumbfParseError::InvalidSalt);
            }
            let mut salt = vec![0u8; (salt_len - HEADER_SIZE) as usize];
            reader.read_exact(&mut salt)?;
            Some(salt)
        } else {
            None
        };

        let sparse = (reader.position() as usize) < payload.len();

        Ok(DescriptionBox {
            subtype: BoxSubtype(subtype),
            requestable: toggles & TOGGLE_REQUESTABLE != 0,
            label,
            id,
            signature,
            salt,
            sparse,
        })
    }

    fn write_payload(&self, w: &mut dyn Write) -> JumbfParseResult<()> {
        write_all!(w, self.subtype.as_bytes());

        let mut toggles = 0u8;
        if self.requestable {
            toggles |= TOGGLE_REQUESTABLE;
        }
        if self.label.is_some() {
            toggles |= TOGGLE_LABEL;
        }
        if self.id.is_some() {
            toggles |= TOGGLE_ID;
        }
        if self.signature.is_some() {
            toggles |= TOGGLE_SIGNATURE;
        }
        if self.salt.is_some() {
            toggles |= TOGGLE_SALT;
        }
        write_u8!(w, toggles);

        if let Some(label) = &self.label {
            write_all!(w, label.as_bytes());
            write_u8!(w, 0);
        }
        if let Some(id) = self.id {
            write_u16!(w, id);
        }
        if let Some(sig) = &self.signature {
            write_all!(w, sig);
        }
        if let Some(salt) = &self.salt {
            write_u32!(w, (salt.len() as u64 + HEADER_SIZE) as u32);
            write_u32!(w, BoxType::SaltHash.into());
            write_all!(w, salt);
        }
        Ok(())
    }
}

/// Reject label characters forbidden by ISO 19566-5 and C2PA: controls,
/// `0x7f..=0x9f`, the path/query delimiters, noncharacters, and
/// format-category code points.
fn validate_label(label: &str) -> JumbfParseResult<()> {
    for c in label.chars() {
        let v = c as u32;
        let format = matches!(v,
            0xad | 0x600..=0x605 | 0x61c | 0x6dd | 0x70f | 0x180e
            | 0x200b..=0x200f | 0x202a..=0x202e | 0x2060..=0x2064
            | 0x2066..=0x206f | 0xfeff | 0xfff9..=0xfffb);
        let noncharacter = (v & 0xfffe) == 0xfffe || (0xfdd0..=0xfdef).contains(&v);
        if v < 0x1f
            || (0x7f..=0x9f).contains(&v)
            || c == '/'
            || c == ';'
            || c == '?'
            || c == '#'
            || noncharacter
            || format
        {
            return Err(JumbfParseError::InvalidDescriptionBox);
        }
    }
    Ok(())
}

//---------------
// SECTION Content boxes
//---------------

/// A `cbor` content box: a single CBOR item, kept as raw bytes so the tree
/// round-trips byte-exactly.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CborBox {
    data: Vec<u8>,
}

impl CborBox {
    pub fn new(data: Vec<u8>) -> Self {
        CborBox { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Decode the payload as a CBOR value.
    pub fn value(&self) -> Result<serde_cbor::Value, serde_cbor::Error> {
        serde_cbor::from_slice(&self.data)
    }
}

/// A `json` content box: UTF-8 JSON text, kept as raw bytes.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct JsonBox {
    data: Vec<u8>,
}

impl JsonBox {
    pub fn new(data: Vec<u8>) -> Self {
        JsonBox { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode the payload as a JSON value.
    pub fn value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }
}

/// A `bfdb` embedded-file description box (ISO 19566-5 AMD-1).
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedFileDescBox {
    media_type: String,
    file_name: Option<String>,
    external: bool,
    sparse: bool,
}

impl EmbeddedFileDescBox {
    pub fn new(media_type: &str, file_name: Option<&str>, external: bool) -> Self {
        EmbeddedFileDescBox {
            media_type: media_type.to_owned(),
            file_name: file_name.map(|s| s.to_owned()),
            external,
            sparse: false,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// True if the sibling `bidb` box carries a URL rather than file bytes.
    pub fn is_external(&self) -> bool {
        self.external
    }

    fn from_payload(payload: &[u8]) -> JumbfParseResult<Self> {
        let mut reader = Cursor::new(payload);
        let toggles = reader.read_u8()?;

        fn read_cstring(reader: &mut Cursor<&[u8]>) -> JumbfParseResult<String> {
            let mut buf = Vec::new();
            loop {
                match ReadBytesExt::read_u8(reader) {
                    Ok(0) => break,
                    Ok(c) => buf.push(c),
                    Err(_) => break, // tolerate a missing terminator at end of payload
                }
            }
            String::from_utf8(buf).map_err(|_| JumbfParseError::InvalidEmbeddedFileBox)
        }

        let media_type = read_cstring(&mut reader)?;
        let file_name = if toggles & 1 != 0 {
            Some(read_cstring(&mut reader)?)
        } else {
            None
        };
        let sparse = (reader.position() as usize) < payload.len();

        Ok(EmbeddedFileDescBox {
            media_type,
            file_name,
            external: toggles & 2 != 0,
            sparse,
        })
    }

    fn write_payload(&self, w: &mut dyn Write) -> JumbfParseResult<()> {
        let mut toggles = 0u8;
        if self.file_name.is_some() {
            toggles |= 1;
        }
        if self.external {
            toggles |= 2;
        }
        write_u8!(w, toggles);
        write_all!(w, self.media_type.as_bytes());
        write_u8!(w, 0);
        if let Some(name) = &self.file_name {
            write_all!(w, name.as_bytes());
            write_u8!(w, 0);
        }
        Ok(())
    }
}

/// An opaque box: `bidb` content, `free` padding, and any unregistered type.
/// The payload bytes are preserved exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct DataBox {
    box_type: BoxType,
    data: Vec<u8>,
}

impl DataBox {
    pub fn new(box_type: BoxType, data: Vec<u8>) -> Self {
        DataBox { box_type, data }
    }

    pub fn box_type(&self) -> BoxType {
        self.box_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A generic container box: a type registered as a container whose payload is
/// a list of child boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerBox {
    box_type: BoxType,
    children: Vec<ChildBox>,
}

impl ContainerBox {
    pub fn new(box_type: BoxType, children: Vec<ChildBox>) -> Self {
        ContainerBox { box_type, children }
    }

    pub fn box_type(&self) -> BoxType {
        self.box_type
    }

    pub fn children(&self) -> &[ChildBox] {
        &self.children
    }
}

/// The C2PA `uuid` container used to embed a store in a BMFF asset:
/// `version ∥ purpose ∥ [offset if purpose="manifest"] ∥ store ∥ padding`.
#[derive(Clone, Debug, PartialEq)]
pub struct C2paUuidBox {
    version: u32,
    purpose: String,
    offset: u64,
    content: Vec<ChildBox>,
    pub(crate) pad_length: usize,
}

impl C2paUuidBox {
    pub fn new(store: ChildBox) -> Self {
        C2paUuidBox {
            version: 0,
            purpose: "manifest".to_owned(),
            offset: 0,
            content: vec![store],
            pad_length: 0,
        }
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// For "manifest" boxes, the absolute file offset of the first auxiliary
    /// "merkle" uuid box, or zero.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn content(&self) -> Option<&ChildBox> {
        self.content.first()
    }

    fn from_payload(payload: &[u8], factory: &super::factory::BoxFactory) -> JumbfParseResult<Self> {
        if payload.len() < 16 {
            return Err(JumbfParseError::InvalidUuidBox);
        }
        // the 16-byte subtype was used for dispatch and is skipped here
        let mut reader = Cursor::new(&payload[16..]);
        let version = reader.read_u32::<BigEndian>()?;
        let mut purpose = Vec::new();
        loop {
            match reader.read_u8()? {
                0 => break,
                c => purpose.push(c),
            }
        }
        let purpose = String::from_utf8(purpose).map_err(|_| JumbfParseError::InvalidUuidBox)?;
        let offset = if purpose == "manifest" {
            reader.read_u64::<BigEndian>()?
        } else {
            0
        };

        let content = factory
            .load(&mut reader)?
            .ok_or(JumbfParseError::InvalidUuidBox)?;

        // tolerate trailing zero padding, recorded for re-emission
        let mut pad_length = 0;
        let mut pad = [0u8; 1];
        while reader.read(&mut pad)? == 1 {
            pad_length += 1;
        }

        Ok(C2paUuidBox {
            version,
            purpose,
            offset,
            content: vec![content],
            pad_length,
        })
    }

    fn write_payload(&self, w: &mut dyn Write) -> JumbfParseResult<()> {
        match BoxSubtype::from_hex_str(C2PA_UUID_SUBTYPE) {
            Some(subtype) => write_all!(w, subtype.as_bytes()),
            None => return Err(JumbfParseError::InvalidUuidBox),
        }
        write_u32!(w, self.version);
        write_all!(w, self.purpose.as_bytes());
        write_u8!(w, 0);
        if self.purpose == "manifest" {
            write_u64!(w, self.offset);
        }
        for child in &self.content {
            child.write_box(w)?;
        }
        for _ in 0..self.pad_length {
            write_u8!(w, 0);
        }
        Ok(())
    }
}

//---------------
// SECTION JUMBF superbox
//---------------

/// JUMBF superbox (`jumb`, ISO 19566-5 A.2): a description box followed by
/// one or more content boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct SuperBox {
    desc: DescriptionBox,
    children: Vec<ChildBox>,
    sparse: bool,
}

impl SuperBox {
    /// Create a new superbox with a requestable, labeled description.
    pub fn new(subtype: BoxSubtype, label: &str) -> JumbfParseResult<Self> {
        Ok(SuperBox {
            desc: DescriptionBox::new(subtype, label)?,
            children: Vec::new(),
            sparse: false,
        })
    }

    pub fn from_desc(desc: DescriptionBox) -> Self {
        SuperBox {
            desc,
            children: Vec::new(),
            sparse: false,
        }
    }

    pub fn desc(&self) -> &DescriptionBox {
        &self.desc
    }

    pub fn desc_mut(&mut self) -> &mut DescriptionBox {
        &mut self.desc
    }

    pub fn label(&self) -> Option<&str> {
        self.desc.label()
    }

    /// The subtype identifier from the description box (alias or hex form).
    pub fn subtype(&self) -> String {
        self.desc.subtype().identifier()
    }

    pub fn is_requestable(&self) -> bool {
        self.desc.is_requestable()
    }

    pub fn add_child(&mut self, child: ChildBox) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[ChildBox] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<ChildBox> {
        &mut self.children
    }

    /// Iterate the child superboxes in order.
    pub fn child_superboxes(&self) -> impl Iterator<Item = &SuperBox> {
        self.children.iter().filter_map(|c| match c {
            ChildBox::Super(sb) => Some(sb),
            _ => None,
        })
    }

    pub fn child_superboxes_mut(&mut self) -> impl Iterator<Item = &mut SuperBox> {
        self.children.iter_mut().filter_map(|c| match c {
            ChildBox::Super(sb) => Some(sb),
            _ => None,
        })
    }

    /// The first child superbox with the given subtype identifier.
    pub fn child_by_subtype(&self, subtype: &str) -> Option<&SuperBox> {
        self.child_superboxes().find(|sb| sb.subtype() == subtype)
    }

    pub fn child_by_subtype_mut(&mut self, subtype: &str) -> Option<&mut SuperBox> {
        self.child_superboxes_mut()
            .find(|sb| sb.subtype() == subtype)
    }

    /// The first child superbox with the given label.
    pub fn child_by_label(&self, label: &str) -> Option<&SuperBox> {
        self.child_superboxes().find(|sb| sb.label() == Some(label))
    }

    /// The first `cbor` content box child, if any.
    pub fn cbor_box(&self) -> Option<&CborBox> {
        self.children.iter().find_map(|c| match c {
            ChildBox::Cbor(b) => Some(b),
            _ => None,
        })
    }

    pub fn cbor_box_mut(&mut self) -> Option<&mut CborBox> {
        self.children.iter_mut().find_map(|c| match c {
            ChildBox::Cbor(b) => Some(b),
            _ => None,
        })
    }

    /// The first `json` content box child, if any.
    pub fn json_box(&self) -> Option<&JsonBox> {
        self.children.iter().find_map(|c| match c {
            ChildBox::Json(b) => Some(b),
            _ => None,
        })
    }

    /// The embedded-file description / data pair, if this is an
    /// embedded-file container.
    pub fn embedded_file(&self) -> Option<(&EmbeddedFileDescBox, &DataBox)> {
        let desc = self.children.iter().find_map(|c| match c {
            ChildBox::EmbeddedFileDesc(b) => Some(b),
            _ => None,
        })?;
        let data = self.children.iter().find_map(|c| match c {
            ChildBox::Data(b) if b.box_type() == BoxType::EmbedContent => Some(b),
            _ => None,
        })?;
        Some((desc, data))
    }

    /// Resolve a sequence of labels against this box's descendants. The
    /// terminal box must be requestable.
    pub fn find_segments(&self, segments: &[&str]) -> Option<&SuperBox> {
        let mut ctx = self;
        for segment in segments {
            ctx = ctx.child_by_label(segment)?;
        }
        if ctx.is_requestable() {
            Some(ctx)
        } else {
            None
        }
    }

    pub fn find_segments_mut(&mut self, segments: &[&str]) -> Option<&mut SuperBox> {
        let mut ctx = self;
        for segment in segments {
            ctx = ctx
                .child_superboxes_mut()
                .find(|sb| sb.label() == Some(segment))?;
        }
        if ctx.is_requestable() {
            Some(ctx)
        } else {
            None
        }
    }

    /// Compute the label path from this box down to `target` (by identity),
    /// excluding this box's own label. `None` if `target` is not a
    /// descendant.
    pub fn path_to(&self, target: &SuperBox) -> Option<Vec<String>> {
        for child in self.child_superboxes() {
            if std::ptr::eq(child, target) {
                return Some(vec![child.label()?.to_owned()]);
            }
            if let Some(mut rest) = child.path_to(target) {
                rest.insert(0, child.label()?.to_owned());
                return Some(rest);
            }
        }
        None
    }

    /// True if this box or any descendant was not fully parsed.
    pub fn is_sparse(&self) -> bool {
        self.sparse || self.desc.sparse || self.children.iter().any(|c| c.is_sparse())
    }

    /// Digest the encoded bytes of each child of this box (description plus
    /// content boxes), excluding the superbox header itself. This is the
    /// hashing rule for JUMBF hashed URIs.
    pub fn update_digest(&self, hasher: &mut crate::hash_utils::Hasher) -> JumbfParseResult<()> {
        let mut buf = Vec::new();
        write_box_with_header(BoxType::Jumd, &mut buf, |w| self.desc.write_payload(w))?;
        for child in &self.children {
            child.write_box(&mut buf)?;
        }
        hasher.update(&buf);
        Ok(())
    }

    pub fn write_box(&self, w: &mut dyn Write) -> JumbfParseResult<()> {
        if self.is_sparse() {
            return Err(JumbfParseError::SparseBox);
        }
        write_box_with_header(BoxType::Jumb, w, |w| {
            write_box_with_header(BoxType::Jumd, w, |w| self.desc.write_payload(w))?;
            for child in &self.children {
                child.write_box(w)?;
            }
            Ok(())
        })
    }

    /// Return the encoded box structure.
    pub fn encode(&self) -> JumbfParseResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_box(&mut buf)?;
        Ok(buf)
    }

    /// Parse the payload of a `jumb` box: a description box followed by
    /// content boxes.
    pub(crate) fn from_payload(
        payload: &[u8],
        factory: &super::factory::BoxFactory,
    ) -> JumbfParseResult<Self> {
        let mut reader = Cursor::new(payload);
        let desc_header = BoxHeader::read(&mut reader)?.ok_or(JumbfParseError::InvalidJumbBox)?;
        if desc_header.name != BoxType::Jumd || desc_header.size < desc_header.header_len() {
            return Err(JumbfParseError::InvalidJumbBox);
        }
        let desc_end = desc_header.size as usize;
        if desc_end > payload.len() {
            return Err(JumbfParseError::InvalidBoxRange);
        }
        let desc =
            DescriptionBox::from_payload(&payload[desc_header.header_len() as usize..desc_end])?;

        let mut sbox = SuperBox::from_desc(desc);
        let mut reader = Cursor::new(&payload[desc_end..]);
        while let Some(child) = factory.load(&mut reader)? {
            sbox.add_child(child);
        }
        Ok(sbox)
    }
}

/// Serialize a payload, then emit `length(4) ∥ type(4) ∥ payload`.
/// Extended lengths are never written.
fn write_box_with_header<F>(box_type: BoxType, w: &mut dyn Write, f: F) -> JumbfParseResult<()>
where
    F: FnOnce(&mut dyn Write) -> JumbfParseResult<()>,
{
    let mut payload = Vec::new();
    f(&mut payload)?;
    write_u32!(w, (payload.len() as u64 + HEADER_SIZE) as u32);
    write_u32!(w, box_type.into());
    write_all!(w, &payload);
    Ok(())
}

//---------------
// SECTION Child box
//---------------

/// Any box that can appear in a box stream or inside a container.
#[derive(Clone, Debug, PartialEq)]
pub enum ChildBox {
    Super(SuperBox),
    Cbor(CborBox),
    Json(JsonBox),
    EmbeddedFileDesc(EmbeddedFileDescBox),
    Data(DataBox),
    Container(ContainerBox),
    C2paUuid(C2paUuidBox),
}

impl ChildBox {
    /// The wire type of this box.
    pub fn box_type(&self) -> BoxType {
        match self {
            ChildBox::Super(_) => BoxType::Jumb,
            ChildBox::Cbor(_) => BoxType::Cbor,
            ChildBox::Json(_) => BoxType::Json,
            ChildBox::EmbeddedFileDesc(_) => BoxType::EmbedMediaDesc,
            ChildBox::Data(b) => b.box_type(),
            ChildBox::Container(b) => b.box_type(),
            ChildBox::C2paUuid(_) => BoxType::Uuid,
        }
    }

    pub fn as_superbox(&self) -> Option<&SuperBox> {
        match self {
            ChildBox::Super(sb) => Some(sb),
            _ => None,
        }
    }

    pub fn as_superbox_mut(&mut self) -> Option<&mut SuperBox> {
        match self {
            ChildBox::Super(sb) => Some(sb),
            _ => None,
        }
    }

    pub fn is_sparse(&self) -> bool {
        match self {
            ChildBox::Super(sb) => sb.is_sparse(),
            ChildBox::EmbeddedFileDesc(b) => b.sparse,
            ChildBox::Container(b) => b.children.iter().any(|c| c.is_sparse()),
            _ => false,
        }
    }

    pub fn write_box(&self, w: &mut dyn Write) -> JumbfParseResult<()> {
        if self.is_sparse() {
            return Err(JumbfParseError::SparseBox);
        }
        match self {
            ChildBox::Super(sb) => sb.write_box(w),
            ChildBox::Cbor(b) => write_box_with_header(BoxType::Cbor, w, |w| {
                write_all!(w, &b.data);
                Ok(())
            }),
            ChildBox::Json(b) => write_box_with_header(BoxType::Json, w, |w| {
                write_all!(w, &b.data);
                Ok(())
            }),
            ChildBox::EmbeddedFileDesc(b) => {
                write_box_with_header(BoxType::EmbedMediaDesc, w, |w| b.write_payload(w))
            }
            ChildBox::Data(b) => write_box_with_header(b.box_type, w, |w| {
                write_all!(w, &b.data);
                Ok(())
            }),
            ChildBox::Container(b) => write_box_with_header(b.box_type, w, |w| {
                for child in &b.children {
                    child.write_box(w)?;
                }
                Ok(())
            }),
            ChildBox::C2paUuid(b) => {
                write_box_with_header(BoxType::Uuid, w, |w| b.write_payload(w))
            }
        }
    }

    /// Return the encoded box structure.
    pub fn encode(&self) -> JumbfParseResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_box(&mut buf)?;
        Ok(buf)
    }

    /// Parse a box payload with the builder chosen by the factory.
    pub(crate) fn from_payload(
        builder: super::factory::BoxBuilder,
        header: &BoxHeader,
        payload: &[u8],
        factory: &super::factory::BoxFactory,
    ) -> JumbfParseResult<ChildBox> {
        use super::factory::BoxBuilder;
        match builder {
            BoxBuilder::Super => Ok(ChildBox::Super(SuperBox::from_payload(payload, factory)?)),
            BoxBuilder::Cbor => Ok(ChildBox::Cbor(CborBox::new(payload.to_vec()))),
            BoxBuilder::Json => Ok(ChildBox::Json(JsonBox::new(payload.to_vec()))),
            BoxBuilder::EmbeddedFileDesc => Ok(ChildBox::EmbeddedFileDesc(
                EmbeddedFileDescBox::from_payload(payload)?,
            )),
            BoxBuilder::Data => Ok(ChildBox::Data(DataBox::new(header.name, payload.to_vec()))),
            BoxBuilder::Container => {
                let mut reader = Cursor::new(payload);
                let mut children = Vec::new();
                while let Some(child) = factory.load(&mut reader)? {
                    children.push(child);
                }
                Ok(ChildBox::Container(ContainerBox::new(
                    header.name,
                    children,
                )))
            }
            BoxBuilder::C2paUuid => Ok(ChildBox::C2paUuid(C2paUuidBox::from_payload(
                payload, factory,
            )?)),
        }
    }
}
