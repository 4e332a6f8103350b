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

//! JPEG container I/O: extract and embed C2PA stores in APP11 segments.
//!
//! C2PA data rides in APP11 (`0xFFEB`) marker segments with the JPEG XT
//! layout: `FF EB seglen(2) 4A 50 instance(2) sequence(4)` followed by the
//! box bytes, with the 8-byte box length+type prefix repeated in every
//! segment. Embedding uses the two-pass sizing scheme: a dummy signing pass
//! measures the encoded store so the data-hash exclusion can be installed
//! before the real signing pass.

use std::io::{Read, Write};

use log::debug;

use crate::{
    assertions::{self, AssertionKind, DataHash, Exclusion},
    cose::Signer,
    error::{Error, Result},
    jumbf::labels,
    signature,
    status::ValidationStatus,
    store::{self, Store},
};

// JPEG markers
const SOI: u16 = 0xffd8; // Start of Image
const EOI: u16 = 0xffd9; // End of Image
const SOS: u16 = 0xffda; // Start of Scan (image data follows)
const TEM: u16 = 0xff01;
const APP0: u16 = 0xffe0; // JFIF
const APP1: u16 = 0xffe1; // XMP / EXIF
const APP11: u16 = 0xffeb; // JUMBF

const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";

/// Maximum bytes in one marker segment, including the two length bytes.
const MAX_SEGMENT: usize = 65535;

/// Per-segment overhead: marker(2) + length(2) + `JP`(2) + instance(2) +
/// sequence(4) + box length(4) + box type(4).
const SEGMENT_HEADER: usize = 20;

/// A JPEG image decomposed for C2PA processing: the image bytes with any
/// C2PA and XMP segments removed, the suggested insert offset for new
/// metadata, and the extracted blocks.
#[derive(Debug, Default)]
pub struct JpegImage {
    /// The image data after the C2PA and XMP segments are removed.
    pub data: Vec<u8>,
    /// Offset into `data` where new C2PA or XMP segments belong (after the
    /// JFIF/Exif header run).
    pub insert_offset: usize,
    /// The encoded C2PA store, if the image carried one.
    pub c2pa: Option<Vec<u8>>,
    /// The raw XMP packet, if the image carried one.
    pub xmp: Option<Vec<u8>>,
}

/// What to do about XMP when writing a signed JPEG.
pub enum XmpPolicy {
    /// Write no XMP segment.
    Omit,
    /// Write a minimal packet whose `dcterms:provenance` names the active
    /// manifest.
    Provenance,
    /// Write the supplied packet bytes.
    Custom(Vec<u8>),
}

/// Read a JPEG stream, stripping out C2PA APP11 groups and the XMP APP1
/// segment. When several APP11 instance groups are present the first one
/// wins.
pub fn read_jpeg<R: Read>(reader: &mut R) -> Result<JpegImage> {
    let mut input = Vec::new();
    reader.read_to_end(&mut input)?;
    if input.len() < 2 || read_u16(&input, 0) != SOI {
        return Err(Error::InvalidJpeg);
    }

    let mut out = Vec::with_capacity(input.len());
    let mut insert_offset = 0usize;
    let mut in_header = true;
    let mut xmp: Option<Vec<u8>> = None;
    // APP11 payloads grouped by box instance number, in first-seen order
    let mut groups: Vec<(u16, Vec<u8>)> = Vec::new();

    let mut pos = 0usize;
    while pos + 2 <= input.len() {
        let marker = read_u16(&input, pos);
        if marker >> 8 != 0xff {
            return Err(Error::InvalidJpeg);
        }

        if marker == SOS {
            // entropy-coded data and everything after it is copied verbatim
            out.extend_from_slice(&input[pos..]);
            break;
        }
        if marker == SOI || marker == EOI || marker == TEM || (0xffd0..=0xffd7).contains(&marker) {
            out.extend_from_slice(&input[pos..pos + 2]);
            pos += 2;
            if in_header && marker != SOI {
                in_header = false;
            }
            if in_header {
                insert_offset = out.len();
            }
            continue;
        }

        if pos + 4 > input.len() {
            return Err(Error::InvalidJpeg);
        }
        let length = read_u16(&input, pos + 2) as usize;
        let seg_end = pos + 2 + length;
        if length < 2 || seg_end > input.len() {
            return Err(Error::InvalidJpeg);
        }
        let data = &input[pos + 4..seg_end];
        let mut write = true;

        if marker == APP11 && length > 17 {
            in_header = false;
            if data[0] == 0x4a && data[1] == 0x50 {
                write = false;
                let instance = read_u16(data, 2);
                let seq = read_u32(data, 4);
                let box_len = read_u32(data, 8);
                let box_type = read_u32(data, 12);
                if box_type == 0x6a75_6d62 {
                    // "jumb"
                    let index = match groups.iter().position(|(id, _)| *id == instance) {
                        Some(index) => index,
                        None => {
                            groups.push((instance, Vec::new()));
                            groups.len() - 1
                        }
                    };
                    let Some((_, group)) = groups.get_mut(index) else {
                        return Err(Error::InvalidJpeg);
                    };
                    // the box length and type are repeated on every
                    // continuation segment and dropped on reassembly
                    let mut skip = 8; // JP + instance + sequence
                    if seq > 1 {
                        skip += 8;
                        if box_len == 1 {
                            skip += 8; // extended box length repeats too
                        }
                    }
                    if data.len() >= skip {
                        group.extend_from_slice(&data[skip..]);
                    }
                } else {
                    write = true;
                }
            }
        } else if marker == APP1 && length > 6 {
            if !data.starts_with(EXIF_SIGNATURE) {
                in_header = false;
                if data.starts_with(XMP_SIGNATURE) {
                    write = false;
                    xmp = Some(data[XMP_SIGNATURE.len()..].to_vec());
                }
            }
        } else if marker != APP0 {
            in_header = false;
        }

        if write {
            out.extend_from_slice(&input[pos..seg_end]);
        }
        if in_header {
            insert_offset = out.len();
        }
        pos = seg_end;
    }

    let c2pa = groups.into_iter().next().map(|(instance, group)| {
        debug!("extracted {} C2PA bytes from APP11 instance {instance}", group.len());
        group
    });

    Ok(JpegImage {
        data: out,
        insert_offset,
        c2pa,
        xmp,
    })
}

/// Sign the store's active manifest over the image and write the signed
/// JPEG.
///
/// The manifest must hold a `c2pa.hash.data` assertion and the signer
/// identity. Signing is performed twice: a dummy pass over an empty asset
/// measures the encoded store, the data-hash exclusion is sized from it, and
/// the real pass hashes the image as it will be laid out. Both passes must
/// produce identical store sizes.
///
/// Returns the status list from the real signing pass and the encoded store
/// bytes that were embedded.
pub fn write_jpeg<W: Write>(
    image: &JpegImage,
    store: &mut Store,
    signer: &dyn Signer,
    xmp: XmpPolicy,
    out: &mut W,
) -> Result<(Vec<ValidationStatus>, Vec<u8>)> {
    let (manifest_label, data_hash_label) = {
        let manifest = store
            .active_manifest()
            .ok_or_else(|| Error::OtherError("store has no active manifest".to_owned()))?;
        let data_hash_label = store::assertion_boxes(manifest)
            .filter_map(|b| b.label())
            .find(|label| AssertionKind::from_label(label) == AssertionKind::DataHash)
            .map(|l| l.to_owned())
            .ok_or_else(|| {
                Error::OtherError("active manifest has no data hash assertion".to_owned())
            })?;
        let label = manifest
            .label()
            .ok_or_else(|| Error::OtherError("manifest has no label".to_owned()))?
            .to_owned();
        (label, data_hash_label)
    };

    let insert_offset = image.insert_offset.min(image.data.len());
    let xmp_segment = build_xmp_segment(store, &xmp)?;

    // Dummy sign to determine length
    signature::sign(
        store,
        &manifest_label,
        signer,
        &mut std::io::empty(),
    )?;
    let expected_len = store.encode()?.len();

    let payload_per_segment = MAX_SEGMENT - SEGMENT_HEADER;
    let num_segments = (expected_len - 8).div_ceil(payload_per_segment);
    let app11_len = (expected_len - 8) + num_segments * SEGMENT_HEADER;
    debug!("store is {expected_len} bytes, {num_segments} APP11 segments");

    // install the exclusion covering the APP11 block, then sign for real
    // over the would-be-embedded layout
    {
        let manifest = store
            .manifest_mut(&manifest_label)
            .ok_or_else(|| Error::ManifestNotFound {
                label: manifest_label.clone(),
            })?;
        let sbox = manifest
            .find_segments_mut(&[labels::ASSERTIONS, &data_hash_label])
            .ok_or_else(|| Error::OtherError("data hash assertion vanished".to_owned()))?;
        let mut data_hash: DataHash = assertions::assertion_cbor(sbox)?;
        data_hash.set_exclusions(vec![Exclusion::new(insert_offset as u64, app11_len as u64)])?;
        assertions::set_assertion_cbor(sbox, &data_hash)?;
    }

    let mut asset = std::io::Cursor::new(&image.data[..insert_offset])
        .chain(std::io::Cursor::new(&xmp_segment))
        .chain(std::io::Cursor::new(&image.data[insert_offset..]));
    let status = signature::sign(store, &manifest_label, signer, &mut asset)?;

    let data = store.encode()?;
    if data.len() != expected_len {
        return Err(Error::PresizeMismatch {
            expected: expected_len,
            actual: data.len(),
        });
    }

    out.write_all(&image.data[..insert_offset])?;
    write_app11_segments(out, &data)?;
    out.write_all(&xmp_segment)?;
    out.write_all(&image.data[insert_offset..])?;
    out.flush()?;

    Ok((status, data))
}

/// Chunk an encoded store into APP11 segments. Every segment carries the
/// 20-byte header and repeats the first 8 payload bytes (box length + type).
fn write_app11_segments<W: Write>(out: &mut W, data: &[u8]) -> Result<usize> {
    if data.len() < 8 {
        return Err(Error::OtherError("store too small to segment".to_owned()));
    }
    let payload_per_segment = MAX_SEGMENT - SEGMENT_HEADER;
    let num_segments = (data.len() - 8).div_ceil(payload_per_segment);

    let instance: u16 = 0;
    for i in 0..num_segments {
        let start = 8 + i * payload_per_segment;
        let len = std::cmp::min(payload_per_segment, data.len() - start);
        let seq = (i + 1) as u32; // sequence numbers start at 1
        let seg_len = (len + SEGMENT_HEADER - 2) as u16; // excluding the marker

        out.write_all(&APP11.to_be_bytes())?;
        out.write_all(&seg_len.to_be_bytes())?;
        out.write_all(b"JP")?;
        out.write_all(&instance.to_be_bytes())?;
        out.write_all(&seq.to_be_bytes())?;
        out.write_all(&data[..8])?; // repeated in every segment
        out.write_all(&data[start..start + len])?;
    }
    Ok(num_segments)
}

/// Build the complete APP1 XMP segment (marker and length included), or an
/// empty vector when XMP is omitted.
fn build_xmp_segment(store: &Store, policy: &XmpPolicy) -> Result<Vec<u8>> {
    let packet: Vec<u8> = match policy {
        XmpPolicy::Omit => return Ok(Vec::new()),
        XmpPolicy::Custom(bytes) => bytes.clone(),
        XmpPolicy::Provenance => {
            let provenance = store
                .active_manifest()
                .and_then(|m| store.uri_for(m))
                .unwrap_or_default();
            format!(
                "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\
                 <x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
                 <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\
                 <rdf:Description rdf:about=\"\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
                 dcterms:provenance=\"{provenance}\"/>\
                 </rdf:RDF></x:xmpmeta><?xpacket end=\"r\"?>"
            )
            .into_bytes()
        }
    };

    let data_len = packet.len() + XMP_SIGNATURE.len() + 2;
    if data_len > MAX_SEGMENT {
        return Err(Error::XmpTooLarge(data_len));
    }

    let mut segment = Vec::with_capacity(data_len + 2);
    segment.extend_from_slice(&APP1.to_be_bytes());
    segment.extend_from_slice(&(data_len as u16).to_be_bytes());
    segment.extend_from_slice(XMP_SIGNATURE);
    segment.extend_from_slice(&packet);
    Ok(segment)
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([data[pos], data[pos + 1]])
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// A minimal JPEG for tests: SOI, JFIF APP0, SOS with a little entropy
/// data, EOI. Not a decodable image, but structurally valid for segment
/// walking.
#[cfg(test)]
pub(crate) fn test_jpeg() -> Vec<u8> {
    let mut jpeg = Vec::new();
    jpeg.extend_from_slice(&SOI.to_be_bytes());
    // APP0 "JFIF" header, 16 bytes of segment
    jpeg.extend_from_slice(&APP0.to_be_bytes());
    jpeg.extend_from_slice(&16u16.to_be_bytes());
    jpeg.extend_from_slice(b"JFIF\0");
    jpeg.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);
    // SOS and a few bytes of scan data
    jpeg.extend_from_slice(&SOS.to_be_bytes());
    jpeg.extend_from_slice(&[0x00, 0x0c, 0x03, 0x01, 0x00, 0x02]);
    jpeg.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
    jpeg.extend_from_slice(&EOI.to_be_bytes());
    jpeg
}
