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

//! COSE_Sign1 assembly and verification (RFC 9052 §4.2).
//!
//! The claim bytes are the detached COSE payload; certificates travel in the
//! `x5chain` header. The signature primitive is provided by openssl; ECDSA
//! signatures are carried raw (`r ∥ s`) per COSE and converted to and from
//! DER at the openssl boundary.

use std::fmt;

use ciborium::value::Value;
use coset::{
    iana, CoseSign1, CoseSign1Builder, HeaderBuilder, Label, TaggedCborSerializable,
};
use openssl::{
    bn::BigNum,
    ecdsa::EcdsaSig,
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private, Public},
    rsa::Padding,
    sign::RsaPssSaltlen,
    x509::X509,
};

use crate::error::{Error, Result};

/// The COSE header label carrying the certificate chain (C2PA 1.2 layout).
const X5CHAIN: &str = "x5chain";

/// Describes the digital signature algorithm used when signing and
/// validating manifests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningAlg {
    /// ECDSA with SHA-256
    Es256,
    /// ECDSA with SHA-384
    Es384,
    /// ECDSA with SHA-512
    Es512,
    /// RSASSA-PSS with SHA-256 and MGF1 with SHA-256
    Ps256,
    /// RSASSA-PSS with SHA-384 and MGF1 with SHA-384
    Ps384,
    /// RSASSA-PSS with SHA-512 and MGF1 with SHA-512
    Ps512,
    /// Edwards-Curve DSA (Ed25519 instance only)
    Ed25519,
}

impl SigningAlg {
    fn cose_alg(&self) -> iana::Algorithm {
        match self {
            SigningAlg::Es256 => iana::Algorithm::ES256,
            SigningAlg::Es384 => iana::Algorithm::ES384,
            SigningAlg::Es512 => iana::Algorithm::ES512,
            SigningAlg::Ps256 => iana::Algorithm::PS256,
            SigningAlg::Ps384 => iana::Algorithm::PS384,
            SigningAlg::Ps512 => iana::Algorithm::PS512,
            SigningAlg::Ed25519 => iana::Algorithm::EdDSA,
        }
    }

    fn from_cose_alg(alg: iana::Algorithm) -> Option<Self> {
        match alg {
            iana::Algorithm::ES256 => Some(SigningAlg::Es256),
            iana::Algorithm::ES384 => Some(SigningAlg::Es384),
            iana::Algorithm::ES512 => Some(SigningAlg::Es512),
            iana::Algorithm::PS256 => Some(SigningAlg::Ps256),
            iana::Algorithm::PS384 => Some(SigningAlg::Ps384),
            iana::Algorithm::PS512 => Some(SigningAlg::Ps512),
            iana::Algorithm::EdDSA => Some(SigningAlg::Ed25519),
            _ => None,
        }
    }

    fn digest(&self) -> Option<MessageDigest> {
        match self {
            SigningAlg::Es256 | SigningAlg::Ps256 => Some(MessageDigest::sha256()),
            SigningAlg::Es384 | SigningAlg::Ps384 => Some(MessageDigest::sha384()),
            SigningAlg::Es512 | SigningAlg::Ps512 => Some(MessageDigest::sha512()),
            SigningAlg::Ed25519 => None,
        }
    }

    /// The byte length of one ECDSA signature component for this algorithm.
    fn ec_component_len(&self) -> Option<usize> {
        match self {
            SigningAlg::Es256 => Some(32),
            SigningAlg::Es384 => Some(48),
            SigningAlg::Es512 => Some(66),
            _ => None,
        }
    }
}

impl fmt::Display for SigningAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SigningAlg::Es256 => "es256",
            SigningAlg::Es384 => "es384",
            SigningAlg::Es512 => "es512",
            SigningAlg::Ps256 => "ps256",
            SigningAlg::Ps384 => "ps384",
            SigningAlg::Ps512 => "ps512",
            SigningAlg::Ed25519 => "ed25519",
        })
    }
}

/// The `Signer` trait generates a cryptographic signature over a byte array.
///
/// Implementations produce the raw signature format COSE expects for their
/// algorithm (`r ∥ s` for ECDSA).
pub trait Signer {
    /// Sign the byte slice, returning the raw signature bytes.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// The algorithm of this signer.
    fn alg(&self) -> SigningAlg;

    /// The certificate chain, signing certificate first, DER encoded. The
    /// trust anchor's certificate should not be included.
    fn certs(&self) -> Result<Vec<Vec<u8>>>;
}

/// A [`Signer`] backed by an openssl private key and certificate chain, as
/// loaded from a PKCS#12 keystore.
pub struct OpensslSigner {
    pkey: PKey<Private>,
    certs: Vec<Vec<u8>>,
    alg: SigningAlg,
}

impl OpensslSigner {
    /// Load an identity from PKCS#12 bytes. The signing algorithm is chosen
    /// from the private key: matched-curve ECDSA for EC keys, Ed25519, or
    /// RSASSA-PSS with SHA-256 for RSA keys.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self> {
        let pkcs12 = openssl::pkcs12::Pkcs12::from_der(data)
            .map_err(|e| Error::Keystore(e.to_string()))?;
        let parsed = pkcs12
            .parse2(password)
            .map_err(|e| Error::Keystore(e.to_string()))?;

        let pkey = parsed
            .pkey
            .ok_or_else(|| Error::Keystore("keystore has no private key".to_owned()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| Error::Keystore("keystore has no certificate".to_owned()))?;

        let mut certs = vec![cert.to_der()?];
        if let Some(ca) = parsed.ca {
            for cert in ca.iter() {
                certs.push(cert.to_der()?);
            }
        }
        // the trust anchor's certificate should not be included
        if certs.len() > 1 {
            certs.pop();
        }

        Self::new(pkey, certs)
    }

    /// Build a signer from a key and a DER certificate chain, leaf first.
    pub fn new(pkey: PKey<Private>, certs: Vec<Vec<u8>>) -> Result<Self> {
        let alg = match pkey.id() {
            openssl::pkey::Id::EC => {
                let curve = pkey.ec_key()?.group().curve_name();
                match curve {
                    Some(Nid::X9_62_PRIME256V1) => SigningAlg::Es256,
                    Some(Nid::SECP384R1) => SigningAlg::Es384,
                    Some(Nid::SECP521R1) => SigningAlg::Es512,
                    _ => return Err(Error::Keystore("unsupported EC curve".to_owned())),
                }
            }
            openssl::pkey::Id::ED25519 => SigningAlg::Ed25519,
            openssl::pkey::Id::RSA => SigningAlg::Ps256,
            other => {
                return Err(Error::Keystore(format!(
                    "unsupported key type {other:?}"
                )))
            }
        };

        Ok(OpensslSigner { pkey, certs, alg })
    }
}

impl Signer for OpensslSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.alg {
            SigningAlg::Es256 | SigningAlg::Es384 | SigningAlg::Es512 => {
                let md = self
                    .alg
                    .digest()
                    .ok_or(Error::CoseSignature("no digest".to_owned()))?;
                let mut signer = openssl::sign::Signer::new(md, &self.pkey)?;
                let der = signer.sign_oneshot_to_vec(data)?;
                let len = self
                    .alg
                    .ec_component_len()
                    .ok_or(Error::CoseSignature("not an EC alg".to_owned()))?;
                ec_der_to_raw(&der, len)
            }
            SigningAlg::Ps256 | SigningAlg::Ps384 | SigningAlg::Ps512 => {
                let md = self
                    .alg
                    .digest()
                    .ok_or(Error::CoseSignature("no digest".to_owned()))?;
                let mut signer = openssl::sign::Signer::new(md, &self.pkey)?;
                signer.set_rsa_padding(Padding::PKCS1_PSS)?;
                signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
                signer.set_rsa_mgf1_md(md)?;
                Ok(signer.sign_oneshot_to_vec(data)?)
            }
            SigningAlg::Ed25519 => {
                let mut signer = openssl::sign::Signer::new_without_digest(&self.pkey)?;
                Ok(signer.sign_oneshot_to_vec(data)?)
            }
        }
    }

    fn alg(&self) -> SigningAlg {
        self.alg
    }

    fn certs(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.certs.clone())
    }
}

/// Returns signed Cose_Sign1 bytes for `payload`, in detached content mode
/// with tag 18, with the certificate chain in the `x5chain` header.
pub fn cose_sign(signer: &dyn Signer, payload: &[u8]) -> Result<Vec<u8>> {
    let certs = signer.certs()?;
    if certs.is_empty() {
        return Err(Error::SignerMissing);
    }

    // 13.2.1. X.509 Certificates
    //
    // X.509 Certificates are stored in a header named x5chain. The value is
    // a CBOR array of byte strings, each containing one DER certificate.
    // The first element must be the certificate of the signer.
    let chain_value = match certs.len() {
        1 => Value::Bytes(certs[0].clone()),
        _ => Value::Array(certs.into_iter().map(Value::Bytes).collect()),
    };

    let protected = HeaderBuilder::new()
        .algorithm(signer.alg().cose_alg())
        .build();
    let unprotected = HeaderBuilder::new()
        .text_value(X5CHAIN.to_owned(), chain_value)
        .build();

    let mut sign1 = CoseSign1Builder::new()
        .protected(protected)
        .unprotected(unprotected)
        .payload(payload.to_vec())
        .build();

    let aad: &[u8; 0] = b"";
    let tbs = coset::sig_structure_data(
        coset::SignatureContext::CoseSign1,
        sign1.protected.clone(),
        None,
        aad,
        sign1.payload.as_ref().unwrap_or(&vec![]),
    );

    sign1.signature = signer.sign(&tbs)?;
    sign1.payload = None; // detached content mode

    sign1
        .to_tagged_vec()
        .map_err(|e| Error::CoseSignature(e.to_string()))
}

/// Parse tagged Cose_Sign1 bytes. Anything but tag 18 is rejected.
pub fn parse_cose_sign1(data: &[u8]) -> Result<CoseSign1> {
    CoseSign1::from_tagged_slice(data).map_err(|e| Error::CoseSignature(e.to_string()))
}

/// The certificate chain from the `x5chain` header (text label, or the
/// registered integer 33), signing certificate first.
pub fn cert_chain(sign1: &CoseSign1) -> Result<Vec<Vec<u8>>> {
    let headers = sign1
        .unprotected
        .rest
        .iter()
        .chain(sign1.protected.header.rest.iter());

    for (label, value) in headers {
        let matched = matches!(label, Label::Text(t) if t == X5CHAIN)
            || matches!(label, Label::Int(i) if *i == iana::HeaderParameter::X5Chain as i64);
        if !matched {
            continue;
        }
        return match value {
            Value::Bytes(bytes) => Ok(vec![bytes.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Bytes(bytes) => Ok(bytes.clone()),
                    _ => Err(Error::CoseSignature("x5chain entry not bytes".to_owned())),
                })
                .collect(),
            _ => Err(Error::CoseSignature("x5chain not bytes or array".to_owned())),
        };
    }

    Ok(Vec::new())
}

/// The signing algorithm from the protected header.
pub fn signing_alg(sign1: &CoseSign1) -> Result<SigningAlg> {
    match &sign1.protected.header.alg {
        Some(coset::RegisteredLabelWithPrivate::Assigned(alg)) => SigningAlg::from_cose_alg(*alg)
            .ok_or_else(|| Error::CoseSignature(format!("unsupported COSE alg {alg:?}"))),
        _ => Err(Error::CoseSignature("missing alg header".to_owned())),
    }
}

/// Verify a Cose_Sign1 signature over a detached payload using the public
/// key of the supplied DER certificate.
pub fn verify_signature(sign1: &CoseSign1, payload: &[u8], cert_der: &[u8]) -> Result<bool> {
    let alg = signing_alg(sign1)?;
    let cert = X509::from_der(cert_der).map_err(|_| Error::InvalidCertificate)?;
    let pkey = cert.public_key().map_err(|_| Error::InvalidCertificate)?;

    let aad: &[u8; 0] = b"";
    let tbs = coset::sig_structure_data(
        coset::SignatureContext::CoseSign1,
        sign1.protected.clone(),
        None,
        aad,
        payload,
    );

    verify_raw(alg, &pkey, &sign1.signature, &tbs)
}

fn verify_raw(
    alg: SigningAlg,
    pkey: &PKey<Public>,
    signature: &[u8],
    data: &[u8],
) -> Result<bool> {
    match alg {
        SigningAlg::Es256 | SigningAlg::Es384 | SigningAlg::Es512 => {
            let der = ec_raw_to_der(signature)?;
            let md = alg
                .digest()
                .ok_or(Error::CoseSignature("no digest".to_owned()))?;
            let mut verifier = openssl::sign::Verifier::new(md, pkey)?;
            Ok(verifier.verify_oneshot(&der, data)?)
        }
        SigningAlg::Ps256 | SigningAlg::Ps384 | SigningAlg::Ps512 => {
            let md = alg
                .digest()
                .ok_or(Error::CoseSignature("no digest".to_owned()))?;
            let mut verifier = openssl::sign::Verifier::new(md, pkey)?;
            verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
            verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            verifier.set_rsa_mgf1_md(md)?;
            Ok(verifier.verify_oneshot(signature, data)?)
        }
        SigningAlg::Ed25519 => {
            let mut verifier = openssl::sign::Verifier::new_without_digest(pkey)?;
            Ok(verifier.verify_oneshot(signature, data)?)
        }
    }
}

/// Convert a DER ECDSA signature to the fixed-size raw `r ∥ s` form COSE
/// carries.
fn ec_der_to_raw(der: &[u8], component_len: usize) -> Result<Vec<u8>> {
    let sig = EcdsaSig::from_der(der)?;
    let mut raw = sig.r().to_vec_padded(component_len as i32)?;
    raw.extend(sig.s().to_vec_padded(component_len as i32)?);
    Ok(raw)
}

/// Convert a raw `r ∥ s` ECDSA signature back to DER for openssl.
fn ec_raw_to_der(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(Error::CoseSignature("bad raw signature length".to_owned()));
    }
    let half = raw.len() / 2;
    let r = BigNum::from_slice(&raw[..half])?;
    let s = BigNum::from_slice(&raw[half..])?;
    Ok(EcdsaSig::from_private_components(r, s)?.to_der()?)
}

/// A summary of a signature box for diagnostics.
pub struct SignatureInfo {
    pub alg: String,
    pub issuer: Option<String>,
}

/// Summarize a signature box's COSE payload: the algorithm and the signing
/// certificate's subject.
pub fn describe_signature(data: &[u8]) -> Result<SignatureInfo> {
    let sign1 = parse_cose_sign1(data)?;
    let alg = signing_alg(&sign1)?;
    let issuer = cert_chain(&sign1)?
        .first()
        .and_then(|der| X509::from_der(der).ok())
        .and_then(|cert| {
            cert.subject_name()
                .entries()
                .last()
                .and_then(|e| e.data().as_utf8().ok().map(|s| s.to_string()))
        });

    Ok(SignatureInfo {
        alg: alg.to_string(),
        issuer,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;

    fn ec_test_signer() -> OpensslSigner {
        let group =
            openssl::ec::EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec_key = openssl::ec::EcKey::generate(&group).unwrap();
        let pkey = PKey::from_ec_key(ec_key).unwrap();
        OpensslSigner::new(pkey, vec![vec![0u8; 8]]).unwrap()
    }

    #[test]
    fn ec_signature_is_fixed_length_raw() {
        let signer = ec_test_signer();
        assert_eq!(signer.alg(), SigningAlg::Es256);

        let sig1 = signer.sign(b"hello").unwrap();
        let sig2 = signer.sign(b"a different message").unwrap();
        assert_eq!(sig1.len(), 64);
        assert_eq!(sig2.len(), 64);
    }

    #[test]
    fn ec_raw_der_round_trip() {
        let signer = ec_test_signer();
        let raw = signer.sign(b"payload").unwrap();
        let der = ec_raw_to_der(&raw).unwrap();
        let raw2 = ec_der_to_raw(&der, 32).unwrap();
        assert_eq!(raw, raw2);
    }

    #[test]
    fn cose_sign_produces_tagged_detached_sign1() {
        let signer = ec_test_signer();
        let payload = b"claim cbor bytes";
        let bytes = cose_sign(&signer, payload).unwrap();

        let sign1 = parse_cose_sign1(&bytes).unwrap();
        assert!(sign1.payload.is_none());
        assert_eq!(signing_alg(&sign1).unwrap(), SigningAlg::Es256);
        assert_eq!(cert_chain(&sign1).unwrap(), vec![vec![0u8; 8]]);

        // untagged bytes are rejected
        assert!(parse_cose_sign1(&bytes[1..]).is_err());
    }

    #[test]
    fn cose_sign_deterministic_length() {
        // two signings of the same payload produce equal-length structures,
        // the property the two-pass embedder depends on
        let signer = ec_test_signer();
        let a = cose_sign(&signer, b"payload").unwrap();
        let b = cose_sign(&signer, b"payload").unwrap();
        assert_eq!(a.len(), b.len());
    }
}
