//! Ed25519 attestation signing for bridge sends.
//!
//! The keypair arrives base64-encoded in SPKI / PKCS#8 DER form and is
//! parsed once at startup; bad key material must kill the process before
//! any block is read. A signature is a bearer attestation - the counterparty
//! chain mints against it - so it is only ever produced after the local
//! state has already been advanced.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use meteorite_core::error::IndexerError;

/// Process-wide bridge signing key, read-only after startup.
#[derive(Clone)]
pub struct BridgeSigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl BridgeSigner {
    /// Parse a keypair from base64-encoded PKCS#8 (private) and SPKI
    /// (public) DER documents.
    pub fn from_base64_der(private_b64: &str, public_b64: &str) -> Result<Self, IndexerError> {
        let private_der = BASE64
            .decode(private_b64.trim())
            .map_err(|e| IndexerError::ConfigError(format!("bridge private key: {}", e)))?;
        let public_der = BASE64
            .decode(public_b64.trim())
            .map_err(|e| IndexerError::ConfigError(format!("bridge public key: {}", e)))?;

        let signing_key = SigningKey::from_pkcs8_der(&private_der)
            .map_err(|e| IndexerError::ConfigError(format!("bridge private key: {}", e)))?;
        let verifying_key = VerifyingKey::from_public_key_der(&public_der)
            .map_err(|e| IndexerError::ConfigError(format!("bridge public key: {}", e)))?;

        if signing_key.verifying_key() != verifying_key {
            return Err(IndexerError::ConfigError(
                "bridge public key does not match the private key".to_string(),
            ));
        }

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Sign an attestation, returning the base64 signature.
    pub fn sign(&self, attestation: &[u8]) -> String {
        BASE64.encode(self.signing_key.sign(attestation).to_bytes())
    }

    /// The verifying key, for counterparty configuration and tests.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

/// Attestation bytes for a bridge send: the byte concatenation, with no
/// separators, of chain id, transaction hash, ticker, the amount exactly as
/// it appeared in the URN, remote chain id, remote contract and receiver.
pub fn attestation_bytes(
    chain_id: &str,
    tx_hash: &str,
    ticker: &str,
    amount_literal: &str,
    remote_chain_id: &str,
    remote_contract: &str,
    receiver: &str,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(
        chain_id.len()
            + tx_hash.len()
            + ticker.len()
            + amount_literal.len()
            + remote_chain_id.len()
            + remote_contract.len()
            + receiver.len(),
    );
    bytes.extend_from_slice(chain_id.as_bytes());
    bytes.extend_from_slice(tx_hash.as_bytes());
    bytes.extend_from_slice(ticker.as_bytes());
    bytes.extend_from_slice(amount_literal.as_bytes());
    bytes.extend_from_slice(remote_chain_id.as_bytes());
    bytes.extend_from_slice(remote_contract.as_bytes());
    bytes.extend_from_slice(receiver.as_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    // DER framing for a raw Ed25519 keypair (RFC 8410)
    const PKCS8_PREFIX: [u8; 16] = [
        0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
        0x20,
    ];
    const SPKI_PREFIX: [u8; 12] = [
        0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
    ];

    fn test_keypair_b64() -> (String, String) {
        let seed = [7u8; 32];
        let signing_key = SigningKey::from_bytes(&seed);

        let mut private_der = PKCS8_PREFIX.to_vec();
        private_der.extend_from_slice(&seed);
        let mut public_der = SPKI_PREFIX.to_vec();
        public_der.extend_from_slice(signing_key.verifying_key().as_bytes());

        (BASE64.encode(private_der), BASE64.encode(public_der))
    }

    #[test]
    fn parses_der_keypair_and_signs_verifiably() {
        let (private_b64, public_b64) = test_keypair_b64();
        let signer = BridgeSigner::from_base64_der(&private_b64, &public_b64).unwrap();

        let attestation = attestation_bytes(
            "testchain-1",
            "A1B2C3",
            "TICK",
            "250",
            "osmosis-1",
            "osmo1contract",
            "osmo1xreceiver",
        );
        let signature_b64 = signer.sign(&attestation);

        let signature_bytes = BASE64.decode(signature_b64).unwrap();
        let signature = Signature::from_slice(&signature_bytes).unwrap();
        signer
            .verifying_key()
            .verify(&attestation, &signature)
            .unwrap();
    }

    // Test critique: une clé publique étrangère est refusée au démarrage
    #[test]
    fn mismatched_public_key_is_fatal() {
        let (private_b64, _) = test_keypair_b64();

        let other = SigningKey::from_bytes(&[9u8; 32]);
        let mut other_spki = SPKI_PREFIX.to_vec();
        other_spki.extend_from_slice(other.verifying_key().as_bytes());

        let result = BridgeSigner::from_base64_der(&private_b64, &BASE64.encode(other_spki));
        assert!(result.is_err());
    }

    #[test]
    fn garbage_keys_are_rejected() {
        assert!(BridgeSigner::from_base64_der("not base64!!", "also not").is_err());
        assert!(BridgeSigner::from_base64_der(
            &BASE64.encode(b"short"),
            &BASE64.encode(b"short")
        )
        .is_err());
    }

    #[test]
    fn attestation_is_separator_free_concatenation() {
        let bytes = attestation_bytes("chain", "HASH", "TICK", "250", "rch", "rco", "dst");
        assert_eq!(bytes, b"chainHASHTICK250rchrcodst".to_vec());
    }

    // La signature est déterministe pour un même message (Ed25519 pur)
    #[test]
    fn signing_is_deterministic() {
        let (private_b64, public_b64) = test_keypair_b64();
        let signer = BridgeSigner::from_base64_der(&private_b64, &public_b64).unwrap();

        let attestation = attestation_bytes("c", "h", "t", "1", "r1", "r2", "d");
        assert_eq!(signer.sign(&attestation), signer.sign(&attestation));
    }
}
