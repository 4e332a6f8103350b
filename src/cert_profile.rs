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

//! X.509 certificate profile enforcement per C2PA §14.
//!
//! Each violation is reported as a `signingCredential.invalid` status
//! pointing at the offending chain index; validity-window failures use
//! `signingCredential.expired` (or `timeStamp.outsideValidity` for
//! time-stamping chains). Checks never abort the chain walk.

use x509_parser::{prelude::*, public_key::PublicKey, signature_algorithm::SignatureAlgorithm};

use crate::{
    status::{StatusCode, ValidationStatus},
    trust::TrustStore,
};

/// The role a certificate chain plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertPurpose {
    /// The chain that signed a claim; its leaf must not be self-signed.
    Signing,
    /// Intermediate certificates.
    Ca,
    /// A time-stamping countersignature chain.
    Timestamp,
    /// An OCSP responder chain.
    Ocsp,
}

// signatureAlgorithm values allowed by the profile
const ALLOWED_SIG_ALG_OIDS: [&str; 8] = [
    "1.2.840.10045.4.3.2",   // ecdsa-with-SHA256
    "1.2.840.10045.4.3.3",   // ecdsa-with-SHA384
    "1.2.840.10045.4.3.4",   // ecdsa-with-SHA512
    "1.2.840.113549.1.1.11", // sha256WithRSAEncryption
    "1.2.840.113549.1.1.12", // sha384WithRSAEncryption
    "1.2.840.113549.1.1.13", // sha512WithRSAEncryption
    "1.2.840.113549.1.1.10", // id-RSASSA-PSS
    "1.3.101.112",           // id-Ed25519
];

const RSASSA_PSS_OID: &str = "1.2.840.113549.1.1.10";

// id-sha256 / id-sha384 / id-sha512
const ALLOWED_PSS_HASH_OIDS: [&str; 3] = [
    "2.16.840.1.101.3.4.2.1",
    "2.16.840.1.101.3.4.2.2",
    "2.16.840.1.101.3.4.2.3",
];

// named curves allowed for EC keys
const ALLOWED_EC_CURVE_OIDS: [&str; 3] = [
    "1.2.840.10045.3.1.7", // prime256v1
    "1.3.132.0.34",        // secp384r1
    "1.3.132.0.35",        // secp521r1
];

/// Verify that the supplied certificate chain is allowed for use with C2PA.
///
/// `certs` is the DER chain in order, signing certificate first. The first
/// certificate is checked against `purpose`, the rest as CAs. `timestamp` is
/// the verified time the signature was applied, in seconds since the epoch.
/// If a trust store is supplied, the chain's tail must issue from one of its
/// anchors.
pub fn verify_certificates(
    certs: &[Vec<u8>],
    purpose: CertPurpose,
    timestamp: i64,
    trust: Option<&TrustStore>,
) -> Vec<ValidationStatus> {
    let mut status = Vec::new();
    let orig_purpose = purpose;

    for (ix, der) in certs.iter().enumerate() {
        let purpose = if ix == 0 { purpose } else { CertPurpose::Ca };
        let chain_url = format!("Cose_Sign1.x5chain[{ix}]");

        let cert = match X509Certificate::from_der(der) {
            Ok((_, cert)) => cert,
            Err(_) => {
                status.push(
                    ValidationStatus::with_message(
                        StatusCode::SigningCredentialInvalid,
                        "parsing exception",
                    )
                    .set_url(chain_url),
                );
                continue;
            }
        };

        // "If the sigTst header is not present, the claim is valid if the
        //  current time is within the validity period of the signer's
        //  credential."
        if timestamp > 0 {
            let validity = cert.validity();
            if timestamp < validity.not_before.timestamp()
                || timestamp > validity.not_after.timestamp()
            {
                let code = if orig_purpose == CertPurpose::Timestamp {
                    StatusCode::TimeStampOutsideValidity
                } else {
                    StatusCode::SigningCredentialExpired
                };
                status.push(ValidationStatus::new(code).set_url(chain_url.clone()));
            }
        }

        for violation in check_profile(&cert, purpose) {
            status.push(
                ValidationStatus::with_message(StatusCode::SigningCredentialInvalid, violation)
                    .set_url(chain_url.clone()),
            );
        }
    }

    if let Some(trust) = trust {
        status.extend(check_trust(certs, orig_purpose, timestamp, trust));
    }

    status
}

/// The profile checks for a single certificate; returns human-readable
/// violations.
fn check_profile(cert: &X509Certificate<'_>, purpose: CertPurpose) -> Vec<String> {
    let mut list = Vec::new();
    let is_ca_purpose = purpose == CertPurpose::Ca;

    // The algorithm field of the signatureAlgorithm field shall be one of:
    //   ecdsa-with-SHA256/384/512 (RFC 5758 section 3.2)
    //   sha256/384/512WithRSAEncryption (RFC 8017 appendix A.2.4)
    //   id-RSASSA-PSS (RFC 8017 appendix A.2.3)
    //   id-Ed25519 (RFC 8410 section 3)
    let sig_alg_oid = cert.signature_algorithm.algorithm.to_id_string();
    if !ALLOWED_SIG_ALG_OIDS.contains(&sig_alg_oid.as_str()) {
        list.push(format!("algorithm {sig_alg_oid}"));
    } else if sig_alg_oid == RSASSA_PSS_OID {
        // RSASSA-PSS-params: the hashAlgorithm shall be one of sha256/384/512
        // and the maskGenAlgorithm's hash shall equal it (RFC 8017 A.2.3)
        match SignatureAlgorithm::try_from(&cert.signature_algorithm) {
            Ok(SignatureAlgorithm::RSASSA_PSS(params)) => {
                let hash_oid = params.hash_algorithm_oid().to_id_string();
                if !ALLOWED_PSS_HASH_OIDS.contains(&hash_oid.as_str()) {
                    list.push(format!("RSASSA-PSS-params algorithm {hash_oid}"));
                } else {
                    match params.mask_gen_algorithm() {
                        Ok(mgf) if mgf.hash.to_id_string() == hash_oid => {}
                        _ => list.push("RSASSA-PSS-params algorithm != mgf algorithm".to_owned()),
                    }
                }
            }
            _ => list.push("RSASSA-PSS-params unreadable".to_owned()),
        }
    }

    // subjectPublicKeyInfo: EC keys use P-256/P-384/P-521; RSA >= 2048 bits
    match cert.public_key().parsed() {
        Ok(PublicKey::EC(_)) => {
            let curve_oid = cert
                .public_key()
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|oid| oid.to_id_string());
            match curve_oid {
                Some(oid) if ALLOWED_EC_CURVE_OIDS.contains(&oid.as_str()) => {}
                _ => list.push("public-key EC curve".to_owned()),
            }
        }
        Ok(PublicKey::RSA(rsa)) => {
            let bits = rsa.key_size();
            if bits < 2048 {
                list.push(format!("public-key RSA bits={bits}"));
            }
        }
        _ => {}
    }

    // Version must be v3. RFC 5280 section 4.1.2.1
    if cert.version != X509Version::V3 {
        list.push(format!("version {}", cert.version.0 + 1));
    }

    // The issuerUniqueID and subjectUniqueID optional fields must not be
    // present. RFC 5280 section 4.1.2.8
    if cert.tbs_certificate.issuer_uid.is_some() || cert.tbs_certificate.subject_uid.is_some() {
        list.push("has issuerUniqueID or subjectUniqueID".to_owned());
    }

    // BasicConstraints must be present with the CA boolean asserted on
    // certificates that issue certificates, and absent or not asserted on
    // leaves. RFC 5280 section 4.2.1.9
    let basic_constraints = cert.basic_constraints().ok().flatten();
    let is_ca_cert = basic_constraints.as_ref().map(|bc| bc.value.ca).unwrap_or(false);
    if is_ca_purpose && !is_ca_cert {
        list.push("no basic constraints".to_owned());
    } else if !is_ca_purpose && is_ca_cert {
        list.push("basic constraints set".to_owned());
    }

    // The Authority Key Identifier extension must be present in any
    // certificate that is not self-signed. RFC 5280 section 4.2.1.1
    // The signing certificate cannot be self-signed: CA must not be asserted
    // on it, yet every issuing certificate must assert CA.
    let has_aki = cert
        .get_extension_unique(&x509_parser::oid_registry::OID_X509_EXT_AUTHORITY_KEY_IDENTIFIER)
        .ok()
        .flatten()
        .is_some();
    if !has_aki {
        let self_signed = cert.subject().as_raw() == cert.issuer().as_raw();
        if purpose == CertPurpose::Signing {
            list.push(
                "Authority Key Identifier (2.5.29.35) missing on signing certificate, which can't be self-signed"
                    .to_owned(),
            );
        } else if !self_signed {
            list.push("Authority Key Identifier (2.5.29.35) missing and not self-signed".to_owned());
        }
    }

    // KeyUsage must be present and critical. Certificates that sign C2PA
    // manifests must assert digitalSignature; keyCertSign only with CA.
    // RFC 5280 section 4.2.1.3
    match cert.key_usage().ok().flatten() {
        None => list.push("keyUsage missing".to_owned()),
        Some(ku) => {
            if !ku.critical {
                list.push("keyUsage not marked as critical".to_owned());
            }
            if purpose == CertPurpose::Signing && !ku.value.digital_signature() {
                list.push("keyUsage missing digitalSignature".to_owned());
            }
            if ku.value.key_cert_sign() && !is_ca_cert {
                list.push("keyUsage contains keyCertSign".to_owned());
            }
        }
    }

    // ExtendedKeyUsage must be present and non-empty on end-entity
    // certificates, must not contain anyExtendedKeyUsage, and must match the
    // chain purpose. RFC 5280 section 4.2.1.12
    if !is_ca_cert {
        match cert.extended_key_usage().ok().flatten() {
            None => list.push("extendedKeyUsage not present".to_owned()),
            Some(eku) => {
                let eku = eku.value;
                let purposes = [
                    eku.email_protection,
                    eku.time_stamping,
                    eku.ocsp_signing,
                    eku.client_auth,
                    eku.server_auth,
                    eku.code_signing,
                ]
                .iter()
                .filter(|p| **p)
                .count()
                    + eku.other.len();

                if eku.any {
                    // The anyExtendedKeyUsage EKU (2.5.29.37.0) must not be present
                    list.push("extendedKeyUsage contains 2.5.29.37.0".to_owned());
                }
                match purpose {
                    CertPurpose::Signing if !eku.email_protection => {
                        // a certificate that signs C2PA manifests must be
                        // valid for id-kp-emailProtection
                        list.push("extendedKeyUsage missing 1.3.6.1.5.5.7.3.4".to_owned());
                    }
                    CertPurpose::Timestamp => {
                        // valid for exactly id-kp-timeStamping
                        if !eku.time_stamping {
                            list.push("extendedKeyUsage missing 1.3.6.1.5.5.7.3.8".to_owned());
                        } else if purposes > 1 {
                            list.push(
                                "extendedKeyUsage contains not only 1.3.6.1.5.5.7.3.8".to_owned(),
                            );
                        }
                    }
                    CertPurpose::Ocsp => {
                        // valid for exactly id-kp-OCSPSigning
                        if !eku.ocsp_signing {
                            list.push("extendedKeyUsage missing 1.3.6.1.5.5.7.3.9".to_owned());
                        } else if purposes > 1 {
                            list.push(
                                "extendedKeyUsage contains not only 1.3.6.1.5.5.7.3.9".to_owned(),
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    list
}

/// Match the chain's tail against the trust anchors: the tail's issuer must
/// be an anchor whose self-signature verifies, and the anchor must be valid
/// at the signing time.
fn check_trust(
    certs: &[Vec<u8>],
    orig_purpose: CertPurpose,
    timestamp: i64,
    trust: &TrustStore,
) -> Vec<ValidationStatus> {
    let mut status = Vec::new();
    let ix = certs.len().saturating_sub(1);
    let chain_url = format!("Cose_Sign1.x5chain[{ix}]");

    let tail = certs.last().and_then(|der| {
        X509Certificate::from_der(der)
            .ok()
            .map(|(_, cert)| cert)
    });

    let mut trusted = false;
    if let Some(tail) = tail {
        for anchor_der in trust.anchors() {
            let Ok((_, anchor)) = X509Certificate::from_der(anchor_der) else {
                continue;
            };
            if tail.issuer().as_raw() != anchor.subject().as_raw() {
                continue;
            }
            // the anchor must be self-signed and verify with its own key
            let anchor_ok = openssl::x509::X509::from_der(anchor_der)
                .and_then(|x| x.public_key().map(|k| (x, k)))
                .and_then(|(x, k)| x.verify(&k))
                .unwrap_or(false);
            if !anchor_ok {
                continue;
            }

            let validity = anchor.validity();
            if timestamp > 0
                && (timestamp < validity.not_before.timestamp()
                    || timestamp > validity.not_after.timestamp())
            {
                let code = if orig_purpose == CertPurpose::Timestamp {
                    StatusCode::TimeStampOutsideValidity
                } else {
                    StatusCode::SigningCredentialExpired
                };
                status.push(ValidationStatus::new(code).set_url(chain_url.clone()));
            } else {
                let code = if orig_purpose == CertPurpose::Timestamp {
                    StatusCode::TimeStampTrusted
                } else {
                    StatusCode::SigningCredentialTrusted
                };
                status.push(ValidationStatus::new(code).set_url(chain_url.clone()));
            }
            trusted = true;
            break;
        }
    }

    if !trusted {
        let code = if orig_purpose == CertPurpose::Timestamp {
            StatusCode::TimeStampUntrusted
        } else {
            StatusCode::SigningCredentialUntrusted
        };
        status.push(ValidationStatus::new(code).set_url(chain_url));
    }

    status
}

/// Seconds since the epoch, used when no explicit signing time is supplied.
pub fn now_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
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

    use super::*;

    fn ec_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    fn name(cn: &str) -> openssl::x509::X509Name {
        let mut builder = X509NameBuilder::new().unwrap();
        builder.append_entry_by_text("CN", cn).unwrap();
        builder.build()
    }

    fn base_builder(subject: &str, issuer: &str, pubkey: &PKey<Private>) -> X509Builder {
        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name(subject)).unwrap();
        builder.set_issuer_name(&name(issuer)).unwrap();
        builder.set_pubkey(pubkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder
    }

    pub(crate) fn make_ca(cn: &str) -> (PKey<Private>, X509) {
        let key = ec_key();
        let mut builder = base_builder(cn, cn, &key);
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

    pub(crate) fn make_leaf(
        cn: &str,
        ca_key: &PKey<Private>,
        ca_cert: &X509,
        digital_signature: bool,
        email_protection: bool,
    ) -> (PKey<Private>, X509) {
        let key = ec_key();
        let mut builder = base_builder(cn, "test ca", &key);
        builder.set_issuer_name(ca_cert.subject_name()).unwrap();
        let mut ku = KeyUsage::new();
        ku.critical();
        if digital_signature {
            ku.digital_signature();
        } else {
            ku.non_repudiation();
        }
        builder.append_extension(ku.build().unwrap()).unwrap();
        let mut eku = ExtendedKeyUsage::new();
        if email_protection {
            eku.email_protection();
        } else {
            eku.client_auth();
        }
        builder.append_extension(eku.build().unwrap()).unwrap();
        let ctx = builder.x509v3_context(Some(ca_cert), None);
        let aki = AuthorityKeyIdentifier::new()
            .keyid(true)
            .build(&ctx)
            .unwrap();
        builder.append_extension(aki).unwrap();
        builder.sign(ca_key, MessageDigest::sha256()).unwrap();
        (key, builder.build())
    }

    fn chain(leaf: &X509, ca: &X509) -> Vec<Vec<u8>> {
        vec![leaf.to_der().unwrap(), ca.to_der().unwrap()]
    }

    #[test]
    fn good_chain_passes() {
        let (ca_key, ca_cert) = make_ca("test ca");
        let (_, leaf) = make_leaf("signer", &ca_key, &ca_cert, true, true);

        let status = verify_certificates(
            &chain(&leaf, &ca_cert),
            CertPurpose::Signing,
            now_timestamp(),
            None,
        );
        assert!(status.is_empty(), "unexpected status: {status:?}");
    }

    #[test]
    fn missing_digital_signature_flagged() {
        let (ca_key, ca_cert) = make_ca("test ca");
        let (_, leaf) = make_leaf("signer", &ca_key, &ca_cert, false, true);

        let status = verify_certificates(
            &chain(&leaf, &ca_cert),
            CertPurpose::Signing,
            now_timestamp(),
            None,
        );
        assert!(status.iter().any(|s| {
            s.code() == "signingCredential.invalid"
                && s.url() == Some("Cose_Sign1.x5chain[0]")
                && s.message().unwrap_or_default().contains("digitalSignature")
        }));
    }

    #[test]
    fn missing_email_protection_flagged() {
        let (ca_key, ca_cert) = make_ca("test ca");
        let (_, leaf) = make_leaf("signer", &ca_key, &ca_cert, true, false);

        let status = verify_certificates(
            &chain(&leaf, &ca_cert),
            CertPurpose::Signing,
            now_timestamp(),
            None,
        );
        assert!(status
            .iter()
            .any(|s| s.message().unwrap_or_default().contains("1.3.6.1.5.5.7.3.4")));
    }

    #[test]
    fn self_signed_leaf_flagged() {
        let (_, ca_cert) = make_ca("test ca");

        // a CA cert used directly as a signing cert: self-signed, no AKI,
        // basic constraints set
        let status = verify_certificates(
            &[ca_cert.to_der().unwrap()],
            CertPurpose::Signing,
            now_timestamp(),
            None,
        );
        assert!(status
            .iter()
            .any(|s| s.message().unwrap_or_default().contains("can't be self-signed")));
        assert!(status
            .iter()
            .any(|s| s.message().unwrap_or_default().contains("basic constraints set")));
    }

    #[test]
    fn trust_store_matching() {
        let (ca_key, ca_cert) = make_ca("test ca");
        let (_, leaf) = make_leaf("signer", &ca_key, &ca_cert, true, true);
        let certs = chain(&leaf, &ca_cert);

        let mut trust = TrustStore::new();
        trust.add_anchor_der(ca_cert.to_der().unwrap());
        let status =
            verify_certificates(&certs, CertPurpose::Signing, now_timestamp(), Some(&trust));
        assert!(status.iter().any(|s| s.code() == "signingCredential.trusted"));

        let (_, other_ca) = make_ca("someone else");
        let mut wrong = TrustStore::new();
        wrong.add_anchor_der(other_ca.to_der().unwrap());
        let status =
            verify_certificates(&certs, CertPurpose::Signing, now_timestamp(), Some(&wrong));
        assert!(status
            .iter()
            .any(|s| s.code() == "signingCredential.untrusted"));
    }

    #[test]
    fn expired_chain_flagged() {
        let (ca_key, ca_cert) = make_ca("test ca");
        let (_, leaf) = make_leaf("signer", &ca_key, &ca_cert, true, true);

        // a timestamp far in the past predates the validity window
        let status =
            verify_certificates(&chain(&leaf, &ca_cert), CertPurpose::Signing, 1_000, None);
        assert!(status
            .iter()
            .any(|s| s.code() == "signingCredential.expired"));
    }
}
