// Copyright 2023 Adobe. All rights reserved.
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

//! Trust anchors for certificate-chain validation.

use crate::error::{Error, Result};

/// A set of trusted root certificates (DER encoded) against which the tail
/// of a signing chain is matched during verification.
#[derive(Debug, Default)]
pub struct TrustStore {
    anchors: Vec<Vec<u8>>,
}

impl TrustStore {
    pub fn new() -> Self {
        TrustStore::default()
    }

    /// Load trust anchors from a byte slice.
    ///
    /// The byte slice should be a UTF-8 text file containing zero or more
    /// valid certificates in PEM format. All text outside of the
    /// `---- BEGIN CERTIFICATE ----` / `---- END CERTIFICATE ----` line
    /// pairs is ignored.
    ///
    /// Returns [`Error::InvalidCertificate`] if any certificate can not be
    /// parsed.
    pub fn load_trust_anchors_from_data(&mut self, trust_data: &[u8]) -> Result<()> {
        for pem_result in x509_parser::pem::Pem::iter_from_buffer(trust_data) {
            let pem = pem_result.map_err(|_e| Error::InvalidCertificate)?;
            self.anchors.push(pem.contents);
        }
        Ok(())
    }

    /// Add a DER certificate as a trust anchor.
    pub fn add_anchor_der(&mut self, der: Vec<u8>) {
        self.anchors.push(der);
    }

    /// All anchors, DER encoded.
    pub fn anchors(&self) -> &[Vec<u8>] {
        &self.anchors
    }

    /// Remove all anchors.
    pub fn clear(&mut self) {
        self.anchors.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;

    #[test]
    fn ignores_text_outside_pem_blocks() {
        let mut store = TrustStore::new();
        store
            .load_trust_anchors_from_data(b"# a comment, no certificates here\n")
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn loads_pem_anchor() {
        // a generated self-signed certificate, PEM wrapped
        let group =
            openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1).unwrap();
        let ec_key = openssl::ec::EcKey::generate(&group).unwrap();
        let pkey = openssl::pkey::PKey::from_ec_key(ec_key).unwrap();

        let mut builder = openssl::x509::X509Builder::new().unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .sign(&pkey, openssl::hash::MessageDigest::sha256())
            .unwrap();
        let cert = builder.build();

        let mut store = TrustStore::new();
        store
            .load_trust_anchors_from_data(&cert.to_pem().unwrap())
            .unwrap();
        assert_eq!(store.anchors().len(), 1);
        assert_eq!(store.anchors()[0], cert.to_der().unwrap());
    }
}
