//! Root key derivation using HKDF

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    chain::{ChainKey, KEY_SIZE, MessageKey, RootKey},
    keys::SharedSecret,
};

/// Label used for root/chain derivation
const RATCHET_LABEL: &[u8] = b"duetRatchetV1";

/// Label used for escrow wrapping keys
const ESCROW_LABEL: &[u8] = b"duetEscrowV1";

/// DH ratchet step: mix a fresh DH output into the root key.
///
/// Returns the successor root key and the first chain key of the new chain.
///
/// # Security
///
/// - The old root key is not recoverable from the outputs
/// - Both parties derive the same pair from the same (root, DH) inputs
pub fn kdf_root(root: &RootKey, dh_output: &SharedSecret) -> (RootKey, ChainKey) {
    expand_pair(root.as_bytes(), dh_output.as_bytes())
}

/// Handshake form of [`kdf_root`].
///
/// The identity-identity DH output stands in for the root key and the
/// ratchet-identity DH output is mixed in as the fresh secret.
pub fn kdf_initial(master_secret: &SharedSecret, second_dh: &SharedSecret) -> (RootKey, ChainKey) {
    expand_pair(master_secret.as_bytes(), second_dh.as_bytes())
}

/// Derive the AEAD key that wraps a message key for the escrow holder.
pub fn escrow_wrapping_key(dh_output: &SharedSecret) -> MessageKey {
    let hkdf = Hkdf::<Sha256>::new(None, dh_output.as_bytes());

    let mut okm = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(ESCROW_LABEL, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    let key = MessageKey::from_bytes(okm);
    okm.zeroize();
    key
}

fn expand_pair(ikm: &[u8], salt: &[u8]) -> (RootKey, ChainKey) {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = [0u8; 2 * KEY_SIZE];
    let Ok(()) = hkdf.expand(RATCHET_LABEL, &mut okm) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut root = [0u8; KEY_SIZE];
    let mut chain = [0u8; KEY_SIZE];
    root.copy_from_slice(&okm[..KEY_SIZE]);
    chain.copy_from_slice(&okm[KEY_SIZE..]);
    okm.zeroize();

    (RootKey::from_bytes(root), ChainKey::from_bytes(chain))
}
