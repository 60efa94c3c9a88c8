//! Per-direction cipher state for the DIGEST-MD5 confidentiality layer.
//!
//! Both directions key their cipher once, when the first record is protected. After that the
//! RC4 keystream continues and CBC chains from the previous record's last ciphertext block.

#[cfg(any(feature = "des", feature = "rc4"))]
use cipher::KeyInit;
#[cfg(feature = "des")]
use cipher::{
    consts::U8, generic_array::GenericArray, BlockDecrypt, BlockEncrypt, BlockSizeUser,
};
#[cfg(feature = "rc4")]
use cipher::{consts::U16, StreamCipher};
#[cfg(feature = "des")]
use des::{Des, TdesEde3};
#[cfg(feature = "rc4")]
use rc4::Rc4;

use crate::common::Role;
use crate::error::SecurityLayerError;
use crate::mechanisms::digest_md5::compute::{derive_confidentiality_key, KCC_MAGIC, KCS_MAGIC};
use crate::mechanisms::digest_md5::Cipher;

/// Cipher state for both directions of one security layer.
pub(crate) struct SealingState {
    send: CipherState,
    receive: CipherState,
}

impl SealingState {
    /// Keys both directions for `role`; the receiving side uses the peer's sealing key.
    pub(crate) fn new(
        a1: &[u8],
        cipher: Cipher,
        role: Role,
    ) -> Result<SealingState, SecurityLayerError> {
        let (send_magic, receive_magic) = if role.is_server() {
            (KCS_MAGIC, KCC_MAGIC)
        } else {
            (KCC_MAGIC, KCS_MAGIC)
        };
        Ok(SealingState {
            send: CipherState::new(cipher, &derive_confidentiality_key(a1, cipher, send_magic))?,
            receive: CipherState::new(
                cipher,
                &derive_confidentiality_key(a1, cipher, receive_magic),
            )?,
        })
    }

    /// Encrypts an outgoing record in place.
    pub(crate) fn seal(&mut self, data: &mut [u8]) -> Result<(), SecurityLayerError> {
        self.send.encrypt(data)
    }

    /// Decrypts an incoming record in place.
    pub(crate) fn unseal(&mut self, data: &mut [u8]) -> Result<(), SecurityLayerError> {
        self.receive.decrypt(data)
    }
}

enum CipherState {
    #[cfg(feature = "rc4")]
    Rc4(Box<Rc4<U16>>),
    #[cfg(feature = "des")]
    Des { cipher: Des, iv: [u8; 8] },
    #[cfg(feature = "des")]
    TripleDes { cipher: TdesEde3, iv: [u8; 8] },
}

impl CipherState {
    #[allow(unused_variables)]
    fn new(cipher: Cipher, kc: &[u8]) -> Result<CipherState, SecurityLayerError> {
        match cipher {
            #[cfg(feature = "rc4")]
            Cipher::Rc4 | Cipher::Rc440 | Cipher::Rc456 => {
                let rc4 = Rc4::<U16>::new_from_slice(kc)
                    .map_err(|_| SecurityLayerError::InvalidKeyLength)?;
                Ok(CipherState::Rc4(Box::new(rc4)))
            }
            #[cfg(feature = "des")]
            Cipher::Des => {
                let (key, iv) = split_des_key(kc)?;
                let cipher =
                    Des::new_from_slice(&key).map_err(|_| SecurityLayerError::InvalidKeyLength)?;
                Ok(CipherState::Des { cipher, iv })
            }
            #[cfg(feature = "des")]
            Cipher::TripleDes => {
                let (first, iv) = split_des_key(kc)?;
                let second = expand_des_key(&des_key_bytes(&kc[7..14])?);
                let mut key = [0u8; 24];
                key[..8].copy_from_slice(&first);
                key[8..16].copy_from_slice(&second);
                key[16..].copy_from_slice(&first);
                let cipher = TdesEde3::new_from_slice(&key)
                    .map_err(|_| SecurityLayerError::InvalidKeyLength)?;
                Ok(CipherState::TripleDes { cipher, iv })
            }
            #[allow(unreachable_patterns)]
            _ => Err(SecurityLayerError::UnsupportedCipher(cipher.as_str().to_owned())),
        }
    }

    #[allow(unused_variables)]
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), SecurityLayerError> {
        match *self {
            #[cfg(feature = "rc4")]
            CipherState::Rc4(ref mut rc4) => {
                rc4.apply_keystream(data);
                Ok(())
            }
            #[cfg(feature = "des")]
            CipherState::Des {
                ref cipher,
                ref mut iv,
            } => cbc_encrypt(cipher, iv, data),
            #[cfg(feature = "des")]
            CipherState::TripleDes {
                ref cipher,
                ref mut iv,
            } => cbc_encrypt(cipher, iv, data),
        }
    }

    #[allow(unused_variables)]
    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), SecurityLayerError> {
        match *self {
            #[cfg(feature = "rc4")]
            CipherState::Rc4(ref mut rc4) => {
                rc4.apply_keystream(data);
                Ok(())
            }
            #[cfg(feature = "des")]
            CipherState::Des {
                ref cipher,
                ref mut iv,
            } => cbc_decrypt(cipher, iv, data),
            #[cfg(feature = "des")]
            CipherState::TripleDes {
                ref cipher,
                ref mut iv,
            } => cbc_decrypt(cipher, iv, data),
        }
    }
}

/// Spreads 7 key bytes over 8, shifting each by its index. The low bit of the first and last
/// byte is clear; DES ignores the low bits either way.
#[cfg(feature = "des")]
pub(crate) fn expand_des_key(key: &[u8; 7]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0] = key[0] & 0xfe;
    for i in 1..7 {
        out[i] = (key[i - 1] << (8 - i)) | (key[i] >> i);
    }
    out[7] = key[6] << 1;
    out
}

/// The expanded DES key from `Kc[0..7]` and the IV from `Kc[8..16]`.
#[cfg(feature = "des")]
fn split_des_key(kc: &[u8]) -> Result<([u8; 8], [u8; 8]), SecurityLayerError> {
    if kc.len() < 16 {
        return Err(SecurityLayerError::InvalidKeyLength);
    }
    let mut iv = [0u8; 8];
    iv.copy_from_slice(&kc[8..16]);
    Ok((expand_des_key(&des_key_bytes(&kc[..7])?), iv))
}

#[cfg(feature = "des")]
fn des_key_bytes(bytes: &[u8]) -> Result<[u8; 7], SecurityLayerError> {
    <[u8; 7]>::try_from(bytes).map_err(|_| SecurityLayerError::InvalidKeyLength)
}

#[cfg(feature = "des")]
fn cbc_encrypt<C>(cipher: &C, iv: &mut [u8; 8], data: &mut [u8]) -> Result<(), SecurityLayerError>
where
    C: BlockEncrypt + BlockSizeUser<BlockSize = U8>,
{
    if data.len() % 8 != 0 {
        return Err(SecurityLayerError::InvalidBlockLength);
    }
    for block in data.chunks_exact_mut(8) {
        for (byte, chain) in block.iter_mut().zip(iv.iter()) {
            *byte ^= chain;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        iv.copy_from_slice(block);
    }
    Ok(())
}

#[cfg(feature = "des")]
fn cbc_decrypt<C>(cipher: &C, iv: &mut [u8; 8], data: &mut [u8]) -> Result<(), SecurityLayerError>
where
    C: BlockDecrypt + BlockSizeUser<BlockSize = U8>,
{
    if data.len() % 8 != 0 {
        return Err(SecurityLayerError::InvalidBlockLength);
    }
    for block in data.chunks_exact_mut(8) {
        let mut next = [0u8; 8];
        next.copy_from_slice(block);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        for (byte, chain) in block.iter_mut().zip(iv.iter()) {
            *byte ^= chain;
        }
        *iv = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "des")]
    #[test]
    fn des_key_expansion() {
        assert_eq!(
            expand_des_key(&[0xff; 7]),
            [0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]
        );
        assert_eq!(
            expand_des_key(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd]),
            [0x00, 0x91, 0xd1, 0xac, 0x78, 0x4d, 0xaf, 0x9a]
        );
        assert_eq!(
            des_key_bytes(&[0u8; 6]),
            Err(SecurityLayerError::InvalidKeyLength)
        );
    }

    #[cfg(feature = "des")]
    #[test]
    fn cbc_chains_across_calls() {
        let a1 = [7u8; 16];
        let mut client = SealingState::new(&a1, Cipher::Des, Role::Client).unwrap();
        let mut server = SealingState::new(&a1, Cipher::Des, Role::Server).unwrap();
        let mut first = *b"first block 0001";
        let mut second = *b"first block 0001";
        client.seal(&mut first).unwrap();
        client.seal(&mut second).unwrap();
        assert_ne!(first, second);
        server.unseal(&mut first).unwrap();
        server.unseal(&mut second).unwrap();
        assert_eq!(&first, b"first block 0001");
        assert_eq!(&second, b"first block 0001");
    }

    #[cfg(feature = "des")]
    #[test]
    fn cbc_needs_whole_blocks() {
        let mut state = SealingState::new(&[1u8; 16], Cipher::TripleDes, Role::Client).unwrap();
        let mut data = [0u8; 12];
        assert_eq!(
            state.seal(&mut data),
            Err(SecurityLayerError::InvalidBlockLength)
        );
    }

    #[cfg(feature = "rc4")]
    #[test]
    fn rc4_keystream_continues() {
        let a1 = [3u8; 16];
        let mut client = SealingState::new(&a1, Cipher::Rc4, Role::Client).unwrap();
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        client.seal(&mut first).unwrap();
        client.seal(&mut second).unwrap();
        assert_ne!(first, second);
    }
}
