//! # BLS Signatures (BLS12-381)
//!
//! Validator keys, domain-separated signing, verification and aggregation
//! for batch votes.
//!
//! ## Layout
//!
//! - Signatures are on G1 (48 bytes compressed)
//! - Public keys are on G2 (96 bytes compressed)
//!
//! This uses blst's `min_sig` variant for smaller signatures.
//!
//! ## Domain Separation
//!
//! A signature never covers a batch hash directly. The signed message is
//! `keccak256(domain || hash)`, so a bridge vote cannot be replayed as a
//! signature for any other protocol purpose and vice versa.

use blst::min_sig::{AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;
use zeroize::Zeroize;

use super::errors::SignatureError;
use super::value_objects::{keccak256, keccak256_concat, Address, Hash};

/// Hash-to-curve tag for signatures on G1.
const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Compressed G1 signature length.
pub const SIGNATURE_LEN: usize = 48;

/// Compressed G2 public key length.
pub const PUBLIC_KEY_LEN: usize = 96;

/// A signing purpose mixed into every signed message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigningDomain(Hash);

impl SigningDomain {
    /// Domain for a purpose label.
    pub fn new(label: &str) -> Self {
        Self(keccak256(label.as_bytes()))
    }

    /// Domain used for bridge batch votes.
    pub fn bridge() -> Self {
        Self::new("DOMAIN_BRIDGE")
    }

    /// Domain used for checkpoint signatures.
    pub fn checkpoint() -> Self {
        Self::new("DOMAIN_CHECKPOINT_MANAGER")
    }

    /// Message actually fed to the pairing for `hash` under this domain.
    pub fn message_for(&self, hash: &Hash) -> Hash {
        keccak256_concat(&[&self.0, hash])
    }
}

impl fmt::Debug for SigningDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningDomain(0x{})", hex::encode(&self.0[..4]))
    }
}

/// Compressed BLS public key.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlsPublicKey(#[serde_as(as = "Bytes")] pub [u8; PUBLIC_KEY_LEN]);

impl BlsPublicKey {
    /// Parse and subgroup-check the key.
    fn to_point(self) -> Result<PublicKey, SignatureError> {
        PublicKey::key_validate(&self.0).map_err(|_| SignatureError::InvalidPublicKey)
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey(0x{}..)", hex::encode(&self.0[..6]))
    }
}

/// A validator's signing identity.
pub struct ValidatorKey {
    secret: SecretKey,
    public: BlsPublicKey,
    address: Address,
}

impl ValidatorKey {
    /// Derive a key from at least 32 bytes of input keying material.
    pub fn from_ikm(ikm: &[u8]) -> Result<Self, SignatureError> {
        let secret = SecretKey::key_gen(ikm, &[]).map_err(|_| SignatureError::InvalidSecretKey)?;
        let public = BlsPublicKey(secret.sk_to_pk().to_bytes());
        Ok(Self {
            secret,
            address: Address::from_key_material(&public.0),
            public,
        })
    }

    /// Deterministic key from a numeric seed.
    pub fn from_seed(seed: u64) -> Result<Self, SignatureError> {
        let mut ikm = [0u8; 32];
        ikm[..8].copy_from_slice(&seed.to_be_bytes());
        ikm[8..16].copy_from_slice(b"qcbridge");
        let key = Self::from_ikm(&ikm);
        ikm.zeroize();
        key
    }

    /// Fresh random key.
    pub fn random() -> Result<Self, SignatureError> {
        let mut ikm = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut ikm);
        let key = Self::from_ikm(&ikm);
        ikm.zeroize();
        key
    }

    /// Validator address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Public key.
    pub fn public_key(&self) -> BlsPublicKey {
        self.public
    }

    /// Sign `hash` under `domain`, returning the compressed signature.
    pub fn sign_with_domain(&self, hash: &Hash, domain: SigningDomain) -> Vec<u8> {
        let message = domain.message_for(hash);
        self.secret.sign(&message, DST, &[]).to_bytes().to_vec()
    }
}

impl fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Verify a signature over `hash` under `domain`.
pub fn verify_with_domain(
    signature: &[u8],
    hash: &Hash,
    public_key: &BlsPublicKey,
    domain: SigningDomain,
) -> Result<(), SignatureError> {
    let sig = Signature::from_bytes(signature).map_err(|_| SignatureError::InvalidFormat)?;
    let pk = public_key.to_point()?;
    let message = domain.message_for(hash);

    match sig.verify(true, &message, DST, &[], &pk, false) {
        BLST_ERROR::BLST_SUCCESS => Ok(()),
        _ => Err(SignatureError::VerificationFailed),
    }
}

/// Aggregate compressed signatures into one.
pub fn aggregate_signatures(signatures: &[Vec<u8>]) -> Result<Vec<u8>, SignatureError> {
    let (first, rest) = signatures
        .split_first()
        .ok_or(SignatureError::EmptyAggregation)?;

    let first = Signature::from_bytes(first).map_err(|_| SignatureError::InvalidFormat)?;
    let mut aggregate = AggregateSignature::from_signature(&first);

    for raw in rest {
        let parsed = Signature::from_bytes(raw).map_err(|_| SignatureError::InvalidFormat)?;
        aggregate
            .add_signature(&parsed, true)
            .map_err(|_| SignatureError::AggregationFailed)?;
    }

    Ok(aggregate.to_signature().to_bytes().to_vec())
}

/// Verify an aggregate signature where every signer signed the same `hash`.
pub fn verify_aggregate_with_domain(
    aggregate: &[u8],
    hash: &Hash,
    public_keys: &[BlsPublicKey],
    domain: SigningDomain,
) -> Result<(), SignatureError> {
    if public_keys.is_empty() {
        return Err(SignatureError::EmptyAggregation);
    }
    let sig = Signature::from_bytes(aggregate).map_err(|_| SignatureError::InvalidFormat)?;
    let points = public_keys
        .iter()
        .map(|pk| pk.to_point())
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&PublicKey> = points.iter().collect();
    let message = domain.message_for(hash);

    match sig.fast_aggregate_verify(true, &message, DST, &refs) {
        BLST_ERROR::BLST_SUCCESS => Ok(()),
        _ => Err(SignatureError::VerificationFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_bridge_domain() {
        let key = ValidatorKey::from_seed(1).unwrap();
        let hash = keccak256(b"batch");
        let signature = key.sign_with_domain(&hash, SigningDomain::bridge());

        assert_eq!(signature.len(), SIGNATURE_LEN);
        assert!(
            verify_with_domain(&signature, &hash, &key.public_key(), SigningDomain::bridge())
                .is_ok()
        );
    }

    #[test]
    fn test_other_domain_fails_verification() {
        let key = ValidatorKey::from_seed(2).unwrap();
        let hash = keccak256(b"batch");
        let signature = key.sign_with_domain(&hash, SigningDomain::checkpoint());

        assert_eq!(
            verify_with_domain(&signature, &hash, &key.public_key(), SigningDomain::bridge()),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = ValidatorKey::from_seed(3).unwrap();
        let other = ValidatorKey::from_seed(4).unwrap();
        let hash = keccak256(b"batch");
        let signature = signer.sign_with_domain(&hash, SigningDomain::bridge());

        assert!(
            verify_with_domain(&signature, &hash, &other.public_key(), SigningDomain::bridge())
                .is_err()
        );
    }

    #[test]
    fn test_garbage_signature_is_format_error() {
        let key = ValidatorKey::from_seed(5).unwrap();
        assert_eq!(
            verify_with_domain(&[1, 2, 3], &[0u8; 32], &key.public_key(), SigningDomain::bridge()),
            Err(SignatureError::InvalidFormat)
        );
    }

    #[test]
    fn test_aggregate_verifies_against_all_signers() {
        let keys: Vec<_> = (10..14).map(|s| ValidatorKey::from_seed(s).unwrap()).collect();
        let hash = keccak256(b"aggregate me");
        let signatures: Vec<_> = keys
            .iter()
            .map(|k| k.sign_with_domain(&hash, SigningDomain::bridge()))
            .collect();

        let aggregate = aggregate_signatures(&signatures).unwrap();
        let public_keys: Vec<_> = keys.iter().map(|k| k.public_key()).collect();

        assert!(verify_aggregate_with_domain(
            &aggregate,
            &hash,
            &public_keys,
            SigningDomain::bridge()
        )
        .is_ok());
        assert!(verify_aggregate_with_domain(
            &aggregate,
            &hash,
            &public_keys[..3],
            SigningDomain::bridge()
        )
        .is_err());
    }

    #[test]
    fn test_empty_aggregation_rejected() {
        assert_eq!(
            aggregate_signatures(&[]),
            Err(SignatureError::EmptyAggregation)
        );
    }

    #[test]
    fn test_seeded_keys_are_deterministic() {
        let a = ValidatorKey::from_seed(42).unwrap();
        let b = ValidatorKey::from_seed(42).unwrap();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), ValidatorKey::from_seed(43).unwrap().address());
    }
}
