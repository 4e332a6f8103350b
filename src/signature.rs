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

//! Signing and verification of manifests.
//!
//! Signing assembles the claim (hard-binding digest, per-assertion hashed
//! URIs, defaults), serializes it as canonical CBOR, and wraps it in a
//! detached COSE_Sign1. Verification re-derives everything and reports
//! outcomes as status records; error statuses do not stop processing unless
//! they make further work meaningless.

use std::io::Read;

use log::debug;

use crate::{
    assertions::{self, Assertion, AssertionKind, DataHash},
    cert_profile::{self, CertPurpose},
    claim::{default_claim_generator, Claim, HashedUri},
    cose::{self, Signer},
    error::{Error, Result},
    hash_utils::{effective_alg, Hasher, DEFAULT_HASH_ALGORITHM},
    jumbf::{
        boxes::SuperBox,
        labels::{self, JumbfUri},
    },
    status::{StatusCode, ValidationStatus},
    store::{self, Store},
    trust::TrustStore,
};

/// Compute the digest for a hashed URI against its target box.
///
/// The algorithm preference order is: the URI's own `alg`, the supplied
/// inherited algorithms (nearest CBOR ancestor first), the claim's `alg`,
/// then sha256. Returns the digest (when one could be computed) and the
/// status record describing the outcome.
pub fn digest_hashed_uri(
    store: &Store,
    manifest: &SuperBox,
    uri: &HashedUri,
    claim_alg: Option<&str>,
    ingredient: bool,
) -> (Option<Vec<u8>>, ValidationStatus) {
    let target = match store.find_from(manifest, uri.url()) {
        Some(target) => target,
        None => {
            let code = if ingredient {
                StatusCode::ClaimMissing
            } else {
                StatusCode::AssertionMissing
            };
            let status =
                ValidationStatus::with_message(code, format!("\"{}\" not in manifest", uri.url()))
                    .set_url(store.uri_for(manifest).unwrap_or_default());
            return (None, status);
        }
    };
    let target_uri = store.uri_from(manifest, target).unwrap_or_default();

    let alg = effective_alg(&[uri.alg(), claim_alg]);
    let mut hasher = match Hasher::new(alg) {
        Ok(hasher) => hasher,
        Err(_) => {
            let status = ValidationStatus::with_message(
                StatusCode::AlgorithmUnsupported,
                format!("alg \"{alg}\" not found"),
            )
            .set_url(target_uri);
            return (None, status);
        }
    };

    // the digest covers the target box's children (description plus content
    // boxes), not the enclosing superbox header
    if target.update_digest(&mut hasher).is_err() {
        let status = ValidationStatus::with_message(
            StatusCode::GeneralError,
            "target box could not be encoded",
        )
        .set_url(target_uri);
        return (None, status);
    }
    let digest = Hasher::finalize(hasher);

    let label = target.label().unwrap_or_default();
    if uri.is_hash_set() && uri.hash() != digest {
        let code = if ingredient {
            StatusCode::IngredientHashedUriMismatch
        } else {
            StatusCode::AssertionHashedUriMismatch
        };
        let status =
            ValidationStatus::with_message(code, format!("hash mismatch for \"{label}\""))
                .set_url(target_uri);
        return (None, status);
    }

    let status = ValidationStatus::with_message(
        StatusCode::AssertionHashedUriMatch,
        format!("hash match for \"{label}\""),
    )
    .set_url(target_uri);
    (Some(digest), status)
}

/// Build a hashed URI (URL plus digest) for a target box, relative to the
/// context manifest when possible.
pub fn hashed_uri_for(
    store: &Store,
    manifest: &SuperBox,
    target: &SuperBox,
    claim_alg: Option<&str>,
) -> Result<HashedUri> {
    let url = store
        .uri_from(manifest, target)
        .ok_or_else(|| Error::OtherError("target box is not in the store".to_owned()))?;

    let mut hasher = Hasher::new(effective_alg(&[claim_alg]))?;
    target.update_digest(&mut hasher)?;
    Ok(HashedUri::new(url, None, Hasher::finalize(hasher)))
}

/// Sign a manifest's claim.
///
/// The asset stream is consumed exactly once by the hard-binding assertion.
/// Returns the status list; `claimSignature.validated` is at index 0 on
/// success. Structural problems (missing signer, missing claim fields, BMFF
/// hard bindings) abort with an error instead.
pub fn sign(
    store: &mut Store,
    manifest_label: &str,
    signer: &dyn Signer,
    asset: &mut dyn Read,
) -> Result<Vec<ValidationStatus>> {
    let mut status: Vec<ValidationStatus> = Vec::new();

    if signer.certs()?.is_empty() {
        return Err(Error::SignerMissing);
    }

    // analyse the claim against the manifest
    let (mut claim, manifest_uri, data_hash_label) = {
        let manifest = store
            .manifest(manifest_label)
            .ok_or_else(|| Error::ManifestNotFound {
                label: manifest_label.to_owned(),
            })?;
        let manifest_uri = store.uri_for(manifest).unwrap_or_default();

        let mut claim = store::read_claim(manifest)?;
        if claim.format.is_none() {
            return Err(Error::ClaimMissingField { field: "dc:format" });
        }
        if claim.instance_id.is_none() {
            return Err(Error::ClaimMissingField {
                field: "instanceID",
            });
        }

        // an empty claim list means "everything in the manifest"
        if claim.assertions.is_empty() {
            claim.assertions = store::assertion_boxes(manifest)
                .filter_map(|sbox| sbox.label())
                .map(|label| {
                    HashedUri::new(
                        JumbfUri::to_relative(&[labels::ASSERTIONS, label]),
                        None,
                        Vec::new(),
                    )
                })
                .collect();
        }

        let resolved = store::claim_assertions(store, manifest, &claim);

        // refuse unknown assertions referenced by the claim
        for assertion in &resolved {
            if let Assertion::Unknown(url) = assertion {
                status.push(
                    ValidationStatus::with_message(
                        StatusCode::AssertionMissing,
                        format!("assertion \"{url}\" not found"),
                    )
                    .set_url(manifest_uri.clone()),
                );
                return Ok(status);
            }
        }

        // exactly one hard binding
        let hard_bindings: Vec<(AssertionKind, String)> = resolved
            .iter()
            .filter(|a| a.kind().is_hard_binding())
            .filter_map(|a| a.label().map(|l| (a.kind(), l.to_owned())))
            .collect();
        match hard_bindings.len() {
            0 => {
                status.push(
                    ValidationStatus::with_message(
                        StatusCode::ClaimHardBindingsMissing,
                        "manifest has no hard-binding",
                    )
                    .set_url(manifest_uri.clone()),
                );
                return Ok(status);
            }
            1 => {}
            _ => {
                status.push(
                    ValidationStatus::with_message(
                        StatusCode::AssertionMultipleHardBindings,
                        "manifest has multiple hard-binding",
                    )
                    .set_url(manifest_uri.clone()),
                );
                return Ok(status);
            }
        }
        let Some((kind, label)) = hard_bindings.into_iter().next() else {
            return Err(Error::OtherError("hard binding vanished".to_owned()));
        };
        if kind == AssertionKind::BmffHash {
            return Err(Error::UnsupportedType("c2pa.hash.bmff signing"));
        }

        (claim, manifest_uri, label)
    };

    // fill claim defaults
    if claim.alg.is_none() {
        claim.alg = Some(DEFAULT_HASH_ALGORITHM.to_owned());
    }
    if claim.claim_generator.is_none() {
        claim.claim_generator = Some(default_claim_generator());
    }
    claim.signature = Some(JumbfUri::to_relative(&[labels::SIGNATURE]));

    // drive the hard binding over the asset stream
    {
        let manifest =
            store
                .manifest_mut(manifest_label)
                .ok_or_else(|| Error::ManifestNotFound {
                    label: manifest_label.to_owned(),
                })?;
        let sbox = manifest
            .find_segments_mut(&[labels::ASSERTIONS, &data_hash_label])
            .ok_or_else(|| Error::OtherError("hard binding vanished".to_owned()))?;
        let mut data_hash: DataHash = assertions::assertion_cbor(sbox)?;
        match data_hash.sign(claim.alg.as_deref(), asset) {
            Ok(()) => assertions::set_assertion_cbor(sbox, &data_hash)?,
            Err(Error::UnsupportedAlgorithm(alg)) => {
                status.push(
                    ValidationStatus::with_message(
                        StatusCode::AlgorithmUnsupported,
                        format!("alg \"{alg}\" not found"),
                    )
                    .set_url(manifest_uri.clone()),
                );
                return Ok(status);
            }
            Err(e) => return Err(e),
        }

        // make sure the claim and signature boxes exist before digesting
        store::ensure_claim_box(manifest)?;
        store::ensure_signature_box(manifest)?;
    }

    // compute the hashed-URI digest of every claim-referenced assertion
    {
        let manifest = store
            .manifest(manifest_label)
            .ok_or_else(|| Error::ManifestNotFound {
                label: manifest_label.to_owned(),
            })?;
        for uri in claim.assertions.iter_mut() {
            uri.clear_hash();
            let (digest, st) =
                digest_hashed_uri(store, manifest, uri, claim.alg.as_deref(), false);
            status.push(st);
            match digest {
                Some(digest) => uri.set_hash(digest),
                None => return Ok(status),
            }
        }
    }

    // serialize the claim and produce the detached COSE signature
    let claim_bytes = claim.to_cbor()?;
    debug!(
        "signing claim of {} bytes for {manifest_label}",
        claim_bytes.len()
    );

    status.extend(cert_profile::verify_certificates(
        &signer.certs()?,
        CertPurpose::Signing,
        cert_profile::now_timestamp(),
        None,
    ));

    let signature_bytes = cose::cose_sign(signer, &claim_bytes)?;

    {
        let manifest =
            store
                .manifest_mut(manifest_label)
                .ok_or_else(|| Error::ManifestNotFound {
                    label: manifest_label.to_owned(),
                })?;
        store::write_claim(manifest, &claim)?;
        let sig_box = store::ensure_signature_box(manifest)?;
        match sig_box.cbor_box_mut() {
            Some(cbor) => cbor.set_data(signature_bytes),
            None => {
                return Err(Error::OtherError("signature box has no cbor".to_owned()));
            }
        }
    }

    status.insert(
        0,
        ValidationStatus::with_message(StatusCode::ClaimSignatureValidated, "signing succeeded")
            .set_url(manifest_uri),
    );
    Ok(status)
}

/// Verify a manifest: its assertions, certificate profile, hashed URIs, and
/// COSE signature.
///
/// `timestamp` is the verified time the signature was applied, in seconds
/// since the epoch; the current clock is used when absent. If a trust store
/// is supplied, the certificate chain's tail must issue from one of its
/// anchors.
pub fn verify(
    store: &Store,
    manifest_label: &str,
    asset: &mut dyn Read,
    trust: Option<&TrustStore>,
    timestamp: Option<i64>,
) -> Result<Vec<ValidationStatus>> {
    let mut status: Vec<ValidationStatus> = Vec::new();

    let manifest = store
        .manifest(manifest_label)
        .ok_or_else(|| Error::ManifestNotFound {
            label: manifest_label.to_owned(),
        })?;

    let sig_box = store::signature_box(manifest)
        .ok_or_else(|| Error::CoseSignature("manifest has no signature box".to_owned()))?;
    let sig_bytes = sig_box
        .cbor_box()
        .map(|b| b.data())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::CoseSignature("not signed".to_owned()))?;

    // must be a tagged Signature1 with detached payload
    let sign1 = cose::parse_cose_sign1(sig_bytes)?;
    if sign1.payload.is_some() {
        return Err(Error::CoseSignature("not detached".to_owned()));
    }

    // only one claim box per manifest
    let claim_count = manifest
        .child_superboxes()
        .filter(|sb| sb.subtype() == "c2cl")
        .count();
    if claim_count > 1 {
        status.push(
            ValidationStatus::with_message(StatusCode::ClaimMultiple, "too many claim boxes")
                .set_url(store.uri_for(manifest).unwrap_or_default()),
        );
        return Ok(status);
    }

    let claim_box = store::claim_box(manifest)
        .and_then(|b| b.cbor_box())
        .ok_or_else(|| Error::OtherError("manifest has no claim".to_owned()))?;
    let claim = Claim::from_cbor(claim_box.data())?;

    // the claim must point back at this signature box
    let sig_resolves = claim
        .signature
        .as_deref()
        .and_then(|uri| store.find_from(manifest, uri))
        .map(|found| std::ptr::eq(found, sig_box))
        .unwrap_or(false);
    if !sig_resolves {
        status.push(
            ValidationStatus::with_message(
                StatusCode::ClaimSignatureMissing,
                "signature not in claim",
            )
            .set_url(claim.signature.clone().unwrap_or_default()),
        );
        return Ok(status);
    }

    // the public key comes from the first certificate in the chain; no
    // externally supplied key is accepted
    let certs = cose::cert_chain(&sign1)?;
    let leaf = certs.first().cloned().ok_or_else(|| {
        Error::CoseSignature("no key supplied and no certificates included".to_owned())
    })?;

    // verify every assertion referenced by the claim
    for assertion in store::claim_assertions(store, manifest, &claim) {
        let Some(sbox) = assertion.as_box() else {
            // reported as assertion.missing by the hashed-URI pass below
            continue;
        };
        match assertion.kind() {
            AssertionKind::DataHash => {
                let data_hash: DataHash = match assertions::assertion_cbor(sbox) {
                    Ok(dh) => dh,
                    Err(_) => {
                        status.push(
                            ValidationStatus::with_message(
                                StatusCode::AssertionCborInvalid,
                                "data hash cbor did not decode",
                            )
                            .set_url(store.uri_from(manifest, sbox).unwrap_or_default()),
                        );
                        continue;
                    }
                };
                match data_hash.verify(claim.alg.as_deref(), asset) {
                    Ok(true) => {}
                    Ok(false) => status.push(
                        ValidationStatus::with_message(
                            StatusCode::AssertionDataHashMismatch,
                            "digest mismatch",
                        )
                        .set_url(store.uri_from(manifest, sbox).unwrap_or_default()),
                    ),
                    Err(Error::UnsupportedAlgorithm(alg)) => status.push(
                        ValidationStatus::with_message(
                            StatusCode::AlgorithmUnsupported,
                            format!("alg \"{alg}\" not found"),
                        )
                        .set_url(store.uri_from(manifest, sbox).unwrap_or_default()),
                    ),
                    Err(e) => return Err(e),
                }
            }
            AssertionKind::BmffHash => status.push(
                ValidationStatus::with_message(
                    StatusCode::GeneralError,
                    "BMFF hash assertions are not supported",
                )
                .set_url(store.uri_from(manifest, sbox).unwrap_or_default()),
            ),
            AssertionKind::Ingredient => {
                status.extend(assertions::ingredient::verify(store, manifest, sbox));
            }
            AssertionKind::Actions => {
                status.extend(assertions::actions::verify(store, manifest, sbox));
            }
            _ => {}
        }
    }

    // certificate profile: the leaf signs, the rest issue
    status.extend(cert_profile::verify_certificates(
        &certs,
        CertPurpose::Signing,
        timestamp.unwrap_or_else(cert_profile::now_timestamp),
        trust,
    ));

    // recompute hashed URIs; mismatches surface as status codes
    for uri in &claim.assertions {
        let (_digest, st) = digest_hashed_uri(store, manifest, uri, claim.alg.as_deref(), false);
        status.push(st);
    }

    // the raw claim bytes are the detached payload
    let validated = cose::verify_signature(&sign1, claim_box.data(), &leaf)?;
    status.insert(
        0,
        ValidationStatus::new(if validated {
            StatusCode::ClaimSignatureValidated
        } else {
            StatusCode::ClaimSignatureMismatch
        })
        .set_url(store.uri_from(manifest, sig_box).unwrap_or_default()),
    );

    Ok(status)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use std::io::Cursor;

    use super::*;
    use crate::{
        assertions::new_cbor_assertion,
        store::{add_assertion, new_manifest, write_claim},
    };

    struct NullSigner;

    impl Signer for NullSigner {
        fn sign(&self, _data: &[u8]) -> Result<Vec<u8>> {
            Ok(vec![0u8; 64])
        }

        fn alg(&self) -> cose::SigningAlg {
            cose::SigningAlg::Es256
        }

        fn certs(&self) -> Result<Vec<Vec<u8>>> {
            Ok(vec![vec![1, 2, 3]])
        }
    }

    fn manifest_with(labels_and_payloads: &[&str]) -> (Store, String) {
        let mut store = Store::new();
        let label = "urn:uuid:test-manifest".to_owned();
        let mut manifest = new_manifest(&label).unwrap();
        for assertion_label in labels_and_payloads {
            add_assertion(
                &mut manifest,
                new_cbor_assertion(assertion_label, &DataHash::new()).unwrap(),
            )
            .unwrap();
        }
        let mut claim = Claim::default();
        claim.format = Some("image/jpeg".to_owned());
        claim.instance_id = Some("urn:uuid:instance".to_owned());
        write_claim(&mut manifest, &claim).unwrap();
        store.add_manifest(manifest);
        (store, label)
    }

    #[test]
    fn missing_claim_fields_abort() {
        let mut store = Store::new();
        let mut manifest = new_manifest("urn:m").unwrap();
        write_claim(&mut manifest, &Claim::default()).unwrap();
        store.add_manifest(manifest);

        let result = sign(&mut store, "urn:m", &NullSigner, &mut Cursor::new(b""));
        assert!(matches!(
            result,
            Err(Error::ClaimMissingField { field: "dc:format" })
        ));
    }

    #[test]
    fn no_hard_binding_reports_status() {
        let (mut store, label) = manifest_with(&["c2pa.actions"]);
        let status = sign(&mut store, &label, &NullSigner, &mut Cursor::new(b"")).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].code(), "claim.hardBindings.missing");
    }

    #[test]
    fn multiple_hard_bindings_fail_before_any_key_is_used() {
        let (mut store, label) = manifest_with(&["c2pa.hash.data", "c2pa.hash.bmff"]);
        let status = sign(&mut store, &label, &NullSigner, &mut Cursor::new(b"")).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].code(), "assertion.multipleHardBindings");
    }

    #[test]
    fn bmff_hard_binding_rejected() {
        let (mut store, label) = manifest_with(&["c2pa.hash.bmff"]);
        let result = sign(&mut store, &label, &NullSigner, &mut Cursor::new(b""));
        assert!(matches!(result, Err(Error::UnsupportedType(_))));
    }

    #[test]
    fn unknown_claim_assertion_reports_missing() {
        let (mut store, label) = manifest_with(&["c2pa.hash.data"]);
        {
            let manifest = store.manifest_mut(&label).unwrap();
            let mut claim = store::read_claim(manifest).unwrap();
            claim.assertions.push(HashedUri::new(
                "self#jumbf=c2pa.assertions/c2pa.hash.data".to_owned(),
                None,
                Vec::new(),
            ));
            claim.assertions.push(HashedUri::new(
                "self#jumbf=c2pa.assertions/c2pa.gone".to_owned(),
                None,
                Vec::new(),
            ));
            write_claim(manifest, &claim).unwrap();
        }
        let status = sign(&mut store, &label, &NullSigner, &mut Cursor::new(b"")).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].code(), "assertion.missing");
    }

    #[test]
    fn hashed_uri_digest_changes_when_assertion_changes() {
        let (store, label) = manifest_with(&["c2pa.hash.data"]);
        let manifest = store.manifest(&label).unwrap();
        let target = store
            .find_from(manifest, "self#jumbf=c2pa.assertions/c2pa.hash.data")
            .unwrap();

        let uri1 = hashed_uri_for(&store, manifest, target, Some("sha256")).unwrap();

        // mutate the assertion payload and recompute
        let mut store2 = store.clone();
        {
            let manifest = store2.manifest_mut(&label).unwrap();
            let sbox = manifest
                .find_segments_mut(&[labels::ASSERTIONS, "c2pa.hash.data"])
                .unwrap();
            let mut dh: DataHash = assertions::assertion_cbor(sbox).unwrap();
            dh.hash = vec![0xff; 32];
            assertions::set_assertion_cbor(sbox, &dh).unwrap();
        }
        let manifest2 = store2.manifest(&label).unwrap();
        let target2 = store2
            .find_from(manifest2, "self#jumbf=c2pa.assertions/c2pa.hash.data")
            .unwrap();
        let uri2 = hashed_uri_for(&store2, manifest2, target2, Some("sha256")).unwrap();

        assert_eq!(uri1.url(), uri2.url());
        assert_ne!(uri1.hash(), uri2.hash());
    }

    #[test]
    fn hashed_uri_alg_inheritance_from_claim() {
        let (store, label) = manifest_with(&["c2pa.hash.data"]);
        let manifest = store.manifest(&label).unwrap();
        let uri = HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.hash.data".to_owned(),
            None,
            Vec::new(),
        );

        let (digest, status) = digest_hashed_uri(&store, manifest, &uri, Some("sha384"), false);
        assert!(status.is_ok());
        assert_eq!(digest.unwrap().len(), 48);
    }

    #[test]
    fn hashed_uri_mismatch_detected() {
        let (store, label) = manifest_with(&["c2pa.hash.data"]);
        let manifest = store.manifest(&label).unwrap();
        let uri = HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.hash.data".to_owned(),
            None,
            vec![0xde; 32],
        );

        let (digest, status) = digest_hashed_uri(&store, manifest, &uri, None, false);
        assert!(digest.is_none());
        assert_eq!(status.code(), "assertion.hashedURI.mismatch");

        // the ingredient flavor reports its own code
        let (_, status) = digest_hashed_uri(&store, manifest, &uri, None, true);
        assert_eq!(status.code(), "ingredient.hashedURI.mismatch");
    }

    #[test]
    fn unresolved_hashed_uri_reports_missing() {
        let (store, label) = manifest_with(&["c2pa.hash.data"]);
        let manifest = store.manifest(&label).unwrap();
        let uri = HashedUri::new(
            "self#jumbf=c2pa.assertions/no.such.assertion".to_owned(),
            None,
            Vec::new(),
        );

        let (_, status) = digest_hashed_uri(&store, manifest, &uri, None, false);
        assert_eq!(status.code(), "assertion.missing");

        let (_, status) = digest_hashed_uri(&store, manifest, &uri, None, true);
        assert_eq!(status.code(), "claim.missing");
    }
}
