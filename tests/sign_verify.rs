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

//! End-to-end signing and verification: generate a CA and leaf identity,
//! sign a minimal JPEG, extract and re-verify.

use std::io::Cursor;

use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    x509::{
        extension::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
            SubjectKeyIdentifier,
        },
        X509Builder, X509NameBuilder, X509,
    },
};

use c2pa_store::{
    assertions::{
        self, actions::c2pa_action, ingredient::PARENT_OF, new_cbor_assertion, Action, Actions,
        AssertionKind, DataHash, Ingredient,
    },
    claim::Claim,
    jumbf::labels,
    read_jpeg, signature,
    status::all_ok,
    store::{self, Store},
    write_jpeg, OpensslSigner, TrustStore, ValidationStatus, XmpPolicy,
};

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> openssl::x509::X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_text("CN", cn).unwrap();
    builder.build()
}

fn base_builder(subject: &str, pubkey: &PKey<Private>) -> X509Builder {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name(subject)).unwrap();
    builder.set_pubkey(pubkey).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder
}

fn make_ca() -> (PKey<Private>, X509) {
    let key = ec_key();
    let mut builder = base_builder("c2pa-store test ca", &key);
    builder.set_issuer_name(&name("c2pa-store test ca")).unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    let ctx = builder.x509v3_context(None, None);
    let ski = SubjectKeyIdentifier::new().build(&ctx).unwrap();
    builder.append_extension(ski).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (key, builder.build())
}

fn make_leaf(ca_key: &PKey<Private>, ca_cert: &X509) -> (PKey<Private>, X509) {
    let key = ec_key();
    let mut builder = base_builder("c2pa-store test signer", &key);
    builder.set_issuer_name(ca_cert.subject_name()).unwrap();
    builder
        .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
        .unwrap();
    builder
        .append_extension(ExtendedKeyUsage::new().email_protection().build().unwrap())
        .unwrap();
    let ctx = builder.x509v3_context(Some(ca_cert), None);
    let aki = AuthorityKeyIdentifier::new().keyid(true).build(&ctx).unwrap();
    builder.append_extension(aki).unwrap();
    builder.sign(ca_key, MessageDigest::sha256()).unwrap();
    (key, builder.build())
}

struct TestIdentity {
    signer: OpensslSigner,
    ca_cert: X509,
}

fn test_identity() -> TestIdentity {
    let (ca_key, ca_cert) = make_ca();
    let (leaf_key, leaf_cert) = make_leaf(&ca_key, &ca_cert);
    let signer = OpensslSigner::new(
        leaf_key,
        vec![leaf_cert.to_der().unwrap(), ca_cert.to_der().unwrap()],
    )
    .unwrap();
    TestIdentity { signer, ca_cert }
}

/// A structurally valid (not decodable) minimal JPEG: SOI, JFIF APP0, SOS
/// with a little scan data, EOI.
fn minimal_jpeg() -> Vec<u8> {
    let mut jpeg = Vec::new();
    jpeg.extend_from_slice(&[0xff, 0xd8]); // SOI
    jpeg.extend_from_slice(&[0xff, 0xe0, 0x00, 0x10]); // APP0, 16 bytes
    jpeg.extend_from_slice(b"JFIF\0");
    jpeg.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);
    jpeg.extend_from_slice(&[0xff, 0xda, 0x00, 0x0c]); // SOS
    jpeg.extend_from_slice(&[0x03, 0x01, 0x00, 0x02, 0x11, 0x22, 0x33, 0x44]);
    jpeg.extend_from_slice(&[0xff, 0xd9]); // EOI
    jpeg
}

fn minimal_store(alg: Option<&str>) -> (Store, String) {
    minimal_store_labeled("urn:uuid:00000000-0000-0000-0000-000000000000", alg)
}

fn minimal_store_labeled(label: &str, alg: Option<&str>) -> (Store, String) {
    let mut store = Store::new();
    let label = label.to_owned();
    let mut manifest = store::new_manifest(&label).unwrap();
    let claim = Claim {
        format: Some("image/jpeg".to_owned()),
        instance_id: Some("urn:uuid:11111111-1111-1111-1111-111111111111".to_owned()),
        alg: alg.map(|s| s.to_owned()),
        ..Default::default()
    };
    store::write_claim(&mut manifest, &claim).unwrap();
    store::add_assertion(
        &mut manifest,
        new_cbor_assertion("c2pa.hash.data", &DataHash::new()).unwrap(),
    )
    .unwrap();
    store.add_manifest(manifest);
    (store, label)
}

fn sign_into_jpeg(store: &mut Store, signer: &OpensslSigner) -> (Vec<ValidationStatus>, Vec<u8>) {
    let image = read_jpeg(&mut Cursor::new(minimal_jpeg())).unwrap();
    let mut out = Vec::new();
    let (status, _store_bytes) =
        write_jpeg(&image, store, signer, XmpPolicy::Provenance, &mut out).unwrap();
    (status, out)
}

#[test]
fn sign_minimal_and_reverify() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(None);
    let (status, signed) = sign_into_jpeg(&mut store, &identity.signer);

    assert!(all_ok(&status), "signing status: {status:#?}");
    assert_eq!(status[0].code(), "claimSignature.validated");

    // the signed file contains an APP11 JUMBF group that round-trips
    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let extracted = image.c2pa.expect("APP11 c2pa data");
    let restored = Store::from_bytes(&extracted).unwrap();
    assert_eq!(restored.encode().unwrap(), extracted);

    // and the restored store verifies cleanly against the file bytes
    let status = signature::verify(&restored, &label, &mut Cursor::new(&signed), None, None)
        .unwrap();
    assert!(all_ok(&status), "verify status: {status:#?}");
    assert_eq!(status[0].code(), "claimSignature.validated");
    assert!(status
        .iter()
        .any(|s| s.code() == "assertion.hashedURI.match"));
}

#[test]
fn tampered_asset_fails_data_hash() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(None);
    let (_, signed) = sign_into_jpeg(&mut store, &identity.signer);

    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let restored = Store::from_bytes(&image.c2pa.unwrap()).unwrap();

    // flip a byte of scan data near the end of the file, outside the
    // exclusion range
    let mut tampered = signed.clone();
    let n = tampered.len();
    tampered[n - 4] ^= 0xff;

    let status =
        signature::verify(&restored, &label, &mut Cursor::new(&tampered), None, None).unwrap();
    assert!(status
        .iter()
        .any(|s| s.code() == "assertion.dataHash.mismatch"));
    // the claim signature itself still validates
    assert_eq!(status[0].code(), "claimSignature.validated");
}

#[test]
fn tampered_assertion_fails_hashed_uri() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(None);
    let (_, signed) = sign_into_jpeg(&mut store, &identity.signer);

    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let mut restored = Store::from_bytes(&image.c2pa.unwrap()).unwrap();

    // mutate the data-hash assertion's payload after signing
    {
        let manifest = restored.manifest_mut(&label).unwrap();
        let sbox = manifest
            .find_segments_mut(&[labels::ASSERTIONS, "c2pa.hash.data"])
            .unwrap();
        let mut dh: DataHash = assertions::assertion_cbor(sbox).unwrap();
        dh.alg = Some("sha256".to_owned());
        assertions::set_assertion_cbor(sbox, &dh).unwrap();
    }

    let status =
        signature::verify(&restored, &label, &mut Cursor::new(&signed), None, None).unwrap();
    assert!(status
        .iter()
        .any(|s| s.code() == "assertion.hashedURI.mismatch"));
}

#[test]
fn trust_store_distinguishes_anchors() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(None);
    let (_, signed) = sign_into_jpeg(&mut store, &identity.signer);

    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let restored = Store::from_bytes(&image.c2pa.unwrap()).unwrap();

    let mut trust = TrustStore::new();
    trust
        .load_trust_anchors_from_data(&identity.ca_cert.to_pem().unwrap())
        .unwrap();
    let status = signature::verify(
        &restored,
        &label,
        &mut Cursor::new(&signed),
        Some(&trust),
        None,
    )
    .unwrap();
    assert!(all_ok(&status), "trusted status: {status:#?}");
    assert!(status
        .iter()
        .any(|s| s.code() == "signingCredential.trusted"));

    let stranger = test_identity();
    let mut wrong = TrustStore::new();
    wrong
        .load_trust_anchors_from_data(&stranger.ca_cert.to_pem().unwrap())
        .unwrap();
    let status = signature::verify(
        &restored,
        &label,
        &mut Cursor::new(&signed),
        Some(&wrong),
        None,
    )
    .unwrap();
    assert!(status
        .iter()
        .any(|s| s.code() == "signingCredential.untrusted"));
}

#[test]
fn sha384_claim_produces_48_byte_digests() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(Some("sha384"));
    let (status, signed) = sign_into_jpeg(&mut store, &identity.signer);
    assert!(all_ok(&status), "signing status: {status:#?}");

    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let restored = Store::from_bytes(&image.c2pa.unwrap()).unwrap();
    let claim = store::read_claim(restored.manifest(&label).unwrap()).unwrap();
    assert_eq!(claim.alg.as_deref(), Some("sha384"));
    for uri in &claim.assertions {
        assert_eq!(uri.hash().len(), 48);
    }

    let status =
        signature::verify(&restored, &label, &mut Cursor::new(&signed), None, None).unwrap();
    assert!(all_ok(&status), "verify status: {status:#?}");
}

#[test]
fn multi_segment_store_presizes_exactly() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(None);

    // a large schema assertion forces the store across several APP11
    // segments
    let big = serde_json::json!({
        "@context": "https://schema.org/",
        "@type": "CreativeWork",
        "text": "x".repeat(150_000),
    });
    {
        let manifest = store.manifest_mut(&label).unwrap();
        store::add_assertion(
            manifest,
            assertions::new_json_assertion("stds.schema-org.CreativeWork", &big).unwrap(),
        )
        .unwrap();
    }

    // write_jpeg fails with PresizeMismatch if the second pass diverges
    let (status, signed) = sign_into_jpeg(&mut store, &identity.signer);
    assert!(all_ok(&status), "signing status: {status:#?}");

    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let extracted = image.c2pa.unwrap();
    assert!(extracted.len() > 65515, "store should span segments");
    let restored = Store::from_bytes(&extracted).unwrap();

    let status =
        signature::verify(&restored, &label, &mut Cursor::new(&signed), None, None).unwrap();
    assert!(all_ok(&status), "verify status: {status:#?}");

    // a flipped byte inside the excluded APP11 block that extraction does
    // not reassemble (the repeated box-length prefix of the second segment)
    // changes nothing
    let insert_offset = 2 + 2 + 16;
    let second_segment = insert_offset + 65535; // past the full first segment
    let mut padded = signed.clone();
    padded[second_segment + 13] ^= 0xff; // inside the repeated box length
    let image2 = read_jpeg(&mut Cursor::new(&padded)).unwrap();
    assert_eq!(image2.c2pa.as_deref(), Some(&extracted[..]));
    let status =
        signature::verify(&restored, &label, &mut Cursor::new(&padded), None, None).unwrap();
    assert!(all_ok(&status), "padded verify status: {status:#?}");
}

#[test]
fn repackage_wraps_prior_manifest_as_parent_ingredient() {
    let identity = test_identity();

    // first signing pass
    let (mut store, first_label) = minimal_store(None);
    let (_, first_signed) = sign_into_jpeg(&mut store, &identity.signer);

    // second pass: build a new store, carry the prior manifest over and
    // reference it from a repackaged action
    let image = read_jpeg(&mut Cursor::new(&first_signed)).unwrap();
    let original = Store::from_bytes(image.c2pa.as_deref().unwrap()).unwrap();
    let prior_status = signature::verify(
        &original,
        &first_label,
        &mut Cursor::new(&first_signed),
        None,
        None,
    )
    .unwrap();
    assert!(all_ok(&prior_status));

    let (mut store2, second_label) =
        minimal_store_labeled("urn:uuid:22222222-2222-2222-2222-222222222222", None);
    for (i, prior) in original.manifests().into_iter().enumerate() {
        store2.insert_manifest(i, prior.clone());
    }

    let (manifest_uri, target_claim) = {
        let manifest = store2.manifest(&second_label).unwrap();
        let target = store2.manifest(&first_label).unwrap();
        let target_claim = store::read_claim(target).unwrap();
        let uri = signature::hashed_uri_for(&store2, manifest, target, None).unwrap();
        (uri, target_claim)
    };
    assert_eq!(
        manifest_uri.url(),
        format!("self#jumbf=/c2pa/{first_label}")
    );

    let ingredient =
        Ingredient::for_manifest(PARENT_OF, manifest_uri, &target_claim, prior_status);
    {
        let manifest = store2.manifest_mut(&second_label).unwrap();
        store::add_assertion(
            manifest,
            new_cbor_assertion("c2pa.ingredient", &ingredient).unwrap(),
        )
        .unwrap();
    }

    let action = {
        let manifest = store2.manifest(&second_label).unwrap();
        let ingredient_box = store2
            .find_from(manifest, "self#jumbf=c2pa.assertions/c2pa.ingredient")
            .unwrap();
        let uri = signature::hashed_uri_for(&store2, manifest, ingredient_box, None).unwrap();
        Action::new(c2pa_action::REPACKAGED).with_ingredient(&uri)
    };
    {
        let manifest = store2.manifest_mut(&second_label).unwrap();
        store::add_assertion(
            manifest,
            new_cbor_assertion("c2pa.actions", &Actions::new().add(action)).unwrap(),
        )
        .unwrap();
    }

    // sign into the stripped image and verify the new active manifest
    let mut out = Vec::new();
    let (status, _) = write_jpeg(
        &image,
        &mut store2,
        &identity.signer,
        XmpPolicy::Provenance,
        &mut out,
    )
    .unwrap();
    assert!(all_ok(&status), "repackage signing status: {status:#?}");

    let reread = read_jpeg(&mut Cursor::new(&out)).unwrap();
    let restored = Store::from_bytes(&reread.c2pa.unwrap()).unwrap();
    assert_eq!(restored.manifests().len(), 2);
    assert_eq!(
        restored.active_manifest().unwrap().label(),
        Some(second_label.as_str())
    );

    let status = signature::verify(
        &restored,
        &second_label,
        &mut Cursor::new(&out),
        None,
        None,
    )
    .unwrap();
    assert!(all_ok(&status), "repackage verify status: {status:#?}");

    // the new manifest carries the parentOf ingredient and the repackaged
    // action citing it
    let manifest = restored.manifest(&second_label).unwrap();
    let ingredient_box = store::assertion_boxes(manifest)
        .find(|b| {
            AssertionKind::from_label(b.label().unwrap_or_default())
                == AssertionKind::Ingredient
        })
        .expect("ingredient assertion");
    let restored_ingredient: Ingredient =
        assertions::assertion_cbor(ingredient_box).unwrap();
    assert!(restored_ingredient.is_parent());
    assert_eq!(
        restored_ingredient
            .c2pa_manifest
            .as_ref()
            .map(|u| u.url().to_owned()),
        Some(format!("self#jumbf=/c2pa/{first_label}"))
    );
    assert!(restored_ingredient
        .validation_status
        .as_ref()
        .map(|v| v.iter().all(|s| s.is_ok()))
        .unwrap_or(true));
}

#[test]
fn two_parent_ingredients_fail_verification() {
    let identity = test_identity();
    let (mut store, label) = minimal_store(None);

    // two parentOf ingredients with no manifest reference
    for suffix in ["", "__1"] {
        let ingredient = Ingredient {
            relationship: PARENT_OF.to_owned(),
            ..Default::default()
        };
        let manifest = store.manifest_mut(&label).unwrap();
        store::add_assertion(
            manifest,
            new_cbor_assertion(&format!("c2pa.ingredient{suffix}"), &ingredient).unwrap(),
        )
        .unwrap();
    }

    let (status, signed) = sign_into_jpeg(&mut store, &identity.signer);
    assert!(all_ok(&status), "signing status: {status:#?}");

    let image = read_jpeg(&mut Cursor::new(&signed)).unwrap();
    let restored = Store::from_bytes(&image.c2pa.unwrap()).unwrap();
    let status =
        signature::verify(&restored, &label, &mut Cursor::new(&signed), None, None).unwrap();
    assert!(status
        .iter()
        .any(|s| s.code() == "manifest.multipleParents"));
}
