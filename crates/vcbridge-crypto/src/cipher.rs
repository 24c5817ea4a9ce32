use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext` under the session secret with a fresh random IV.
///
/// Returns `IV || ciphertext`. A new IV is drawn for every call; IVs are
/// never reused within a session.
pub fn encrypt(secret: &Uuid, plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes128CbcEnc::new(secret.as_bytes().into(), (&iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Undo [`encrypt`]: split off the IV, decrypt, strip the padding.
pub fn decrypt(secret: &Uuid, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < IV_SIZE {
        return Err(CryptoError::BadLength(data.len()));
    }
    let (iv, ciphertext) = data.split_at(IV_SIZE);
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::BadLength(ciphertext.len()));
    }

    Aes128CbcDec::new_from_slices(secret.as_bytes(), iv)
        .map_err(|_| CryptoError::BadLength(iv.len()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadPadding)
}
