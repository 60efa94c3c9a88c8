//! The DIGEST-MD5 security layer: integrity (auth-int) and confidentiality (auth-conf).
//!
//! A signed record is `msg || MAC(Ki, SeqNum, msg)`. A sealed record is
//! `CIPHER(Kc, msg || pad || HMAC[0..10]) || 0x0001 || SeqNum`.

use std::iter;

use crate::common::{Context, Role};
use crate::error::{Error, SecurityLayerError};
use crate::mechanisms::digest_md5::compute::{
    derive_integrity_key, hmac_md5, KIC_MAGIC, KIS_MAGIC,
};
use crate::mechanisms::digest_md5::sealing::SealingState;
use crate::mechanisms::digest_md5::{Cipher, Qop};

const MESSAGE_TYPE: u16 = 1;
const MAC_BLOCK_SIZE: usize = 16;
const EMBEDDED_MAC_SIZE: usize = 10;
const TRAILER_SIZE: usize = MAC_BLOCK_SIZE - EMBEDDED_MAC_SIZE;

/// Wraps and unwraps application data once DIGEST-MD5 negotiated auth-int or auth-conf.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestMd5SecurityLayer;

impl DigestMd5SecurityLayer {
    /// Creates the security layer.
    pub fn new() -> DigestMd5SecurityLayer {
        DigestMd5SecurityLayer
    }

    /// Protects `data` for sending, using and advancing the send sequence number. The record
    /// has to fit in the peer's maxbuf.
    pub fn wrap(&self, data: &[u8], context: &mut Context) -> Result<Vec<u8>, Error> {
        let qop = negotiated_qop(context)?;
        let wrapped_length = match qop {
            Qop::AuthConf => sealed_length(data.len(), negotiated_cipher(context)?),
            _ => data.len() + MAC_BLOCK_SIZE,
        };
        check_maxbuf(wrapped_length, context.peer_maxbuf())?;

        let wrapped = match qop {
            Qop::AuthConf => encrypt(data, context)?,
            _ => sign(data, context)?,
        };
        context.advance_seqnum_sent();
        Ok(wrapped)
    }

    /// Checks and strips the protection of a received record, advancing the receive sequence
    /// number. The record has to fit in this side's own maxbuf.
    pub fn unwrap(&self, data: &[u8], context: &mut Context) -> Result<Vec<u8>, Error> {
        let qop = negotiated_qop(context)?;
        check_maxbuf(data.len(), context.maxbuf())?;

        let message = match qop {
            Qop::AuthConf => decrypt(data, context)?,
            _ => verify(data, context)?,
        };
        context.advance_seqnum_received();
        Ok(message)
    }
}

fn negotiated_qop(context: &Context) -> Result<Qop, SecurityLayerError> {
    if !context.has_security_layer() {
        return Err(SecurityLayerError::NotNegotiated);
    }
    match context.qop() {
        Some(qop) if qop.has_security_layer() => Ok(qop),
        other => Err(SecurityLayerError::UnsupportedQop(
            other.map(|qop| qop.as_str().to_owned()),
        )),
    }
}

fn negotiated_cipher(context: &Context) -> Result<Cipher, SecurityLayerError> {
    context
        .cipher()
        .ok_or(SecurityLayerError::MissingKeyMaterial("cipher"))
}

fn session_key(context: &Context) -> Result<Vec<u8>, SecurityLayerError> {
    context
        .a1()
        .map(<[u8]>::to_vec)
        .ok_or(SecurityLayerError::MissingKeyMaterial("a1"))
}

fn check_maxbuf(length: usize, maxbuf: u32) -> Result<(), SecurityLayerError> {
    if length > maxbuf as usize {
        return Err(SecurityLayerError::BufferExceeded(maxbuf));
    }
    Ok(())
}

/// Signing key for records sent by `role`.
fn integrity_key(a1: &[u8], sender: Role) -> Vec<u8> {
    let magic = if sender.is_server() {
        KIS_MAGIC
    } else {
        KIC_MAGIC
    };
    derive_integrity_key(a1, magic)
}

/// `HMAC(Ki, SeqNum || msg)[0..10] || 0x0001 || SeqNum`
fn mac_block(
    ki: &[u8],
    seqnum: u32,
    message: &[u8],
) -> Result<[u8; MAC_BLOCK_SIZE], SecurityLayerError> {
    let seq = seqnum.to_be_bytes();
    let hmac = hmac_md5(ki, &[&seq, message]).map_err(|_| SecurityLayerError::InvalidKeyLength)?;
    let mut block = [0u8; MAC_BLOCK_SIZE];
    block[..EMBEDDED_MAC_SIZE].copy_from_slice(&hmac[..EMBEDDED_MAC_SIZE]);
    block[EMBEDDED_MAC_SIZE..12].copy_from_slice(&MESSAGE_TYPE.to_be_bytes());
    block[12..].copy_from_slice(&seq);
    Ok(block)
}

/// Number of padding bytes; always between 1 and the block size for block ciphers.
fn padding_length(length: usize, cipher: Cipher) -> usize {
    let block_size = cipher.block_size();
    if block_size == 1 {
        return 0;
    }
    block_size - (length + EMBEDDED_MAC_SIZE) % block_size
}

fn sealed_length(length: usize, cipher: Cipher) -> usize {
    length + padding_length(length, cipher) + MAC_BLOCK_SIZE
}

fn remove_padding(data: &[u8], block_size: usize) -> Result<&[u8], SecurityLayerError> {
    let pad = *data.last().ok_or(SecurityLayerError::InvalidPaddingSize)?;
    let length = pad as usize;
    if length < 1 || length > block_size || length > data.len() {
        return Err(SecurityLayerError::InvalidPaddingSize);
    }
    let (message, padding) = data.split_at(data.len() - length);
    if padding.iter().any(|&byte| byte != pad) {
        return Err(SecurityLayerError::InvalidPadding);
    }
    Ok(message)
}

/// Splits the trailing message type and sequence number, checking both.
fn check_trailer(data: &[u8], expected: u32) -> Result<(), SecurityLayerError> {
    let trailer = &data[data.len() - TRAILER_SIZE..];
    let message_type = u16::from_be_bytes([trailer[0], trailer[1]]);
    if message_type != MESSAGE_TYPE {
        return Err(SecurityLayerError::MessageTypeMismatch(message_type));
    }
    let received = u32::from_be_bytes([trailer[2], trailer[3], trailer[4], trailer[5]]);
    if received != expected {
        return Err(SecurityLayerError::SequenceMismatch { expected, received });
    }
    Ok(())
}

fn check_length(data: &[u8]) -> Result<(), SecurityLayerError> {
    if data.len() < MAC_BLOCK_SIZE {
        return Err(SecurityLayerError::TooShort {
            expected: MAC_BLOCK_SIZE,
            actual: data.len(),
        });
    }
    Ok(())
}

fn sign(data: &[u8], context: &Context) -> Result<Vec<u8>, SecurityLayerError> {
    let a1 = session_key(context)?;
    let seqnum = context
        .seqnum_sent()
        .ok_or(SecurityLayerError::MissingKeyMaterial("seqnumsnt"))?;
    let ki = integrity_key(&a1, context.role());
    let mut signed = Vec::with_capacity(data.len() + MAC_BLOCK_SIZE);
    signed.extend_from_slice(data);
    signed.extend_from_slice(&mac_block(&ki, seqnum, data)?);
    Ok(signed)
}

fn verify(data: &[u8], context: &Context) -> Result<Vec<u8>, SecurityLayerError> {
    check_length(data)?;
    let a1 = session_key(context)?;
    let seqnum = context
        .seqnum_received()
        .ok_or(SecurityLayerError::MissingKeyMaterial("seqnumrcv"))?;
    check_trailer(data, seqnum)?;

    let (message, received) = data.split_at(data.len() - MAC_BLOCK_SIZE);
    let ki = integrity_key(&a1, context.role().peer());
    if mac_block(&ki, seqnum, message)?[..] != *received {
        return Err(SecurityLayerError::MacMismatch);
    }
    Ok(message.to_vec())
}

fn sealing_state<'a>(
    context: &'a mut Context,
    a1: &[u8],
    cipher: Cipher,
) -> Result<&'a mut SealingState, SecurityLayerError> {
    if context.sealing.is_none() {
        context.sealing = Some(SealingState::new(a1, cipher, context.role())?);
    }
    context
        .sealing
        .as_mut()
        .ok_or(SecurityLayerError::NotNegotiated)
}

fn encrypt(data: &[u8], context: &mut Context) -> Result<Vec<u8>, SecurityLayerError> {
    let a1 = session_key(context)?;
    let cipher = negotiated_cipher(context)?;
    let seqnum = context
        .seqnum_sent()
        .ok_or(SecurityLayerError::MissingKeyMaterial("seqnumsnt"))?;
    let ki = integrity_key(&a1, context.role());
    let mac = mac_block(&ki, seqnum, data)?;
    let pad = padding_length(data.len(), cipher);

    let mut sealed = Vec::with_capacity(sealed_length(data.len(), cipher));
    sealed.extend_from_slice(data);
    sealed.extend(iter::repeat(pad as u8).take(pad));
    sealed.extend_from_slice(&mac[..EMBEDDED_MAC_SIZE]);
    sealing_state(context, &a1, cipher)?.seal(&mut sealed)?;
    sealed.extend_from_slice(&mac[EMBEDDED_MAC_SIZE..]);
    Ok(sealed)
}

fn decrypt(data: &[u8], context: &mut Context) -> Result<Vec<u8>, SecurityLayerError> {
    check_length(data)?;
    let seqnum = context
        .seqnum_received()
        .ok_or(SecurityLayerError::MissingKeyMaterial("seqnumrcv"))?;
    check_trailer(data, seqnum)?;
    let a1 = session_key(context)?;
    let cipher = negotiated_cipher(context)?;

    let mut plain = data[..data.len() - TRAILER_SIZE].to_vec();
    sealing_state(context, &a1, cipher)?.unseal(&mut plain)?;
    let (padded, received) = plain.split_at(plain.len() - EMBEDDED_MAC_SIZE);
    let message = if cipher.block_size() > 1 {
        remove_padding(padded, cipher.block_size())?
    } else {
        padded
    };

    let ki = integrity_key(&a1, context.role().peer());
    if mac_block(&ki, seqnum, message)?[..EMBEDDED_MAC_SIZE] != *received {
        return Err(SecurityLayerError::MacMismatch);
    }
    Ok(message.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = "303a0201036335041164633d6578616d706c652c64633d636f6d0a01020a0100020100020100010100a30f0403756964040857696c6c69666f413000";

    fn layer(role: Role, qop: Qop, cipher: Option<Cipher>, a1: &str) -> Context {
        Context::with_security_layer(role, qop, cipher, hex::decode(a1).unwrap())
    }

    fn check_vector(cipher: Option<Cipher>, a1: &str, wrapped: &str) {
        let qop = if cipher.is_some() {
            Qop::AuthConf
        } else {
            Qop::AuthInt
        };
        let message = hex::decode(MESSAGE).unwrap();
        let security = DigestMd5SecurityLayer::new();

        let mut client = layer(Role::Client, qop, cipher, a1);
        let result = security.wrap(&message, &mut client).unwrap();
        assert_eq!(hex::encode(result), wrapped);
        assert_eq!(client.seqnum_sent(), Some(1));

        let mut server = layer(Role::Server, qop, cipher, a1);
        let result = security
            .unwrap(&hex::decode(wrapped).unwrap(), &mut server)
            .unwrap();
        assert_eq!(result, message);
        assert_eq!(server.seqnum_received(), Some(1));
    }

    #[test]
    fn integrity_vector() {
        check_vector(
            None,
            "7b712f824ba6ad44548ba16b2ec75988",
            &format!("{}86e03fcc17597a6dfb1c000100000000", MESSAGE),
        );
    }

    #[cfg(feature = "rc4")]
    #[test]
    fn rc4_vector() {
        check_vector(
            Some(Cipher::Rc4),
            "960bcfc7a190d6b1dcabcd5bc7f53fe0",
            "6c9849465f4a88af35b82a6b8f35295e8c60e9d17245f3a8fbe5be1ca6599d7aef09b7f5caf7f43a7eea74b02c669c6a9bb346ba863ab843cf51eccd5b0b570f912e910dd234000100000000",
        );
    }

    #[cfg(feature = "rc4")]
    #[test]
    fn rc4_40_vector() {
        check_vector(
            Some(Cipher::Rc440),
            "407a52fb725042db234e11b34fb5fd55",
            "056173eaae8b7ac19b1f0d73e8e340c37e83b6ab23377f143b1d2722cf11657b1de53c61ce7a2898786b01a30ca940521c6ade80f01f155e798babc7a1275614656d1b74dee7000100000000",
        );
    }

    #[cfg(feature = "rc4")]
    #[test]
    fn rc4_56_vector() {
        check_vector(
            Some(Cipher::Rc456),
            "3b39571696572c05957522d94817ce46",
            "96979065bdf4d9633698c2213aefd9e7ff99fb63d6bb10a65a67afc3cef4104f10a3e1855430c08c4539ce8e034717df84c537fb82f4e2bb8e6939806b18fcb7882feee2faeb000100000000",
        );
    }

    #[cfg(feature = "des")]
    #[test]
    fn des_vector() {
        check_vector(
            Some(Cipher::Des),
            "9969a25310dd52c864715057ca181374",
            "8d24f2aea2ed483b02b45c26b8f1c15af70fb6eda6ff5e0bb88125494a4298148b0a416950a94a01c6069cccb904f3670b98c4210554aee829d5cac14ee9592db4cb147d9b668d50000100000000",
        );
    }

    #[cfg(feature = "des")]
    #[test]
    fn triple_des_vector() {
        check_vector(
            Some(Cipher::TripleDes),
            "9969a25310dd52c864715057ca181374",
            "73ebc692c839c8382c4bc669076fa893d1deaca630a1c74dcb0354159680372e555863e2e609a0ce72f06b7bb64fed4e3cf30057af5fd23ff6e0ffda06eb7fdb67edc8b331723f02000100000000",
        );
    }

    #[test]
    fn padding_is_between_one_and_the_block_size() {
        assert_eq!(padding_length(60, Cipher::Des), 2);
        assert_eq!(padding_length(6, Cipher::Des), 8);
        assert_eq!(padding_length(7, Cipher::TripleDes), 7);
        assert_eq!(padding_length(60, Cipher::Rc4), 0);
    }

    #[test]
    fn padding_is_validated() {
        assert_eq!(remove_padding(b"abc\x02\x02", 8), Ok(&b"abc"[..]));
        assert_eq!(
            remove_padding(b"abc\x01\x02", 8),
            Err(SecurityLayerError::InvalidPadding)
        );
        assert_eq!(
            remove_padding(b"abc\x09", 8),
            Err(SecurityLayerError::InvalidPaddingSize)
        );
        assert_eq!(
            remove_padding(b"abc\x00", 8),
            Err(SecurityLayerError::InvalidPaddingSize)
        );
    }

    #[test]
    fn sequence_numbers_are_enforced() {
        let security = DigestMd5SecurityLayer::new();
        let mut client = layer(Role::Client, Qop::AuthInt, None, "7b712f824ba6ad44548ba16b2ec75988");
        let mut server = layer(Role::Server, Qop::AuthInt, None, "7b712f824ba6ad44548ba16b2ec75988");
        let first = security.wrap(b"first", &mut client).unwrap();
        let second = security.wrap(b"second", &mut client).unwrap();
        assert_eq!(
            security.unwrap(&second, &mut server),
            Err(Error::SecurityLayer(SecurityLayerError::SequenceMismatch {
                expected: 0,
                received: 1
            }))
        );
        assert_eq!(security.unwrap(&first, &mut server).unwrap(), b"first");
        assert_eq!(security.unwrap(&second, &mut server).unwrap(), b"second");
    }

    #[test]
    fn tampering_is_detected() {
        let security = DigestMd5SecurityLayer::new();
        let mut client = layer(Role::Client, Qop::AuthInt, None, "7b712f824ba6ad44548ba16b2ec75988");
        let mut server = layer(Role::Server, Qop::AuthInt, None, "7b712f824ba6ad44548ba16b2ec75988");
        let mut wrapped = security.wrap(b"hello", &mut client).unwrap();
        wrapped[0] ^= 1;
        assert_eq!(
            security.unwrap(&wrapped, &mut server),
            Err(Error::SecurityLayer(SecurityLayerError::MacMismatch))
        );
        assert_eq!(server.seqnum_received(), Some(0));
    }

    #[test]
    fn short_and_mistyped_records_are_rejected() {
        let security = DigestMd5SecurityLayer::new();
        let mut server = layer(Role::Server, Qop::AuthInt, None, "7b712f824ba6ad44548ba16b2ec75988");
        assert_eq!(
            security.unwrap(&[0u8; 15], &mut server),
            Err(Error::SecurityLayer(SecurityLayerError::TooShort {
                expected: 16,
                actual: 15
            }))
        );
        let mut record = vec![0u8; 16];
        record[11] = 2;
        assert_eq!(
            security.unwrap(&record, &mut server),
            Err(Error::SecurityLayer(
                SecurityLayerError::MessageTypeMismatch(2)
            ))
        );
    }

    #[cfg(feature = "rc4")]
    #[test]
    fn rc4_keystream_spans_records() {
        let a1 = "5c002ca5ad1405892f3a5e4bc594b08a";
        let records = [
            (
                "3070020103646b0446636e3d41646d696e2057696c6c69666f72642c6f753d41646d696e6973747261746976652c6f753d467265654453782d546573742c64633d6578616d706c652c64633d636f6d3021301f04046d61696c3117041557696c6c69666f41406e732d6d61696c382e636f6d",
                "d73c8d2c02c2f5f1fe37b4d7bd0c40ca8906b888ee8be3da1434558a42992e041dbd28ff6f53fab9136aece40ae15905144a76a55bf1b6560a9ffa558158cc05e5b97eb9206615dede875c73a8df036dcf7d200e1acf49125310818f8a5972be65f3367c26f9007441887346bd39ea9ba063ee81f599bc119cba6939000100000000",
            ),
            (
                "300c02010365070a010004000400",
                "20ebcfb4998c974483008a48f3003202ba151ab98074035e000100000001",
            ),
        ];
        let security = DigestMd5SecurityLayer::new();
        let mut server = layer(Role::Server, Qop::AuthConf, Some(Cipher::Rc4), a1);
        let mut client = layer(Role::Client, Qop::AuthConf, Some(Cipher::Rc4), a1);
        for (message, wrapped) in records.iter() {
            let message = hex::decode(message).unwrap();
            let sealed = security.wrap(&message, &mut server).unwrap();
            assert_eq!(hex::encode(&sealed), *wrapped);
            assert_eq!(security.unwrap(&sealed, &mut client).unwrap(), message);
        }
        assert_eq!(server.seqnum_sent(), Some(2));
        assert_eq!(client.seqnum_received(), Some(2));
    }

    #[test]
    fn maxbuf_is_enforced_both_ways() {
        let security = DigestMd5SecurityLayer::new();
        let mut client = layer(Role::Client, Qop::AuthInt, None, "7b712f824ba6ad44548ba16b2ec75988");
        client.set_peer_maxbuf(32);
        assert_eq!(
            security.wrap(&[0u8; 17], &mut client),
            Err(Error::SecurityLayer(SecurityLayerError::BufferExceeded(32)))
        );
        assert_eq!(client.seqnum_sent(), Some(0));
        assert!(security.wrap(&[0u8; 16], &mut client).is_ok());
        assert_eq!(
            security.unwrap(&[0u8; 33], &mut client),
            Err(Error::SecurityLayer(
                SecurityLayerError::MessageTypeMismatch(0)
            ))
        );
        client.set_maxbuf(24);
        assert_eq!(
            security.unwrap(&[0u8; 25], &mut client),
            Err(Error::SecurityLayer(SecurityLayerError::BufferExceeded(24)))
        );
        assert_eq!(
            Error::from(SecurityLayerError::BufferExceeded(32)).to_string(),
            "The wrapped buffer exceeds the maxbuf length of 32"
        );
    }

    #[test]
    fn layer_requires_negotiation() {
        let security = DigestMd5SecurityLayer::new();
        let mut context = Context::new(Role::Client);
        assert_eq!(
            security.wrap(b"data", &mut context),
            Err(Error::SecurityLayer(SecurityLayerError::NotNegotiated))
        );
        let mut context = layer(Role::Client, Qop::Auth, None, "7b712f824ba6ad44548ba16b2ec75988");
        assert_eq!(
            security.wrap(b"data", &mut context),
            Err(Error::SecurityLayer(SecurityLayerError::UnsupportedQop(Some(
                "auth".to_owned()
            ))))
        );
        let mut context = layer(Role::Client, Qop::AuthConf, None, "7b712f824ba6ad44548ba16b2ec75988");
        assert_eq!(
            security.wrap(b"data", &mut context),
            Err(Error::SecurityLayer(SecurityLayerError::MissingKeyMaterial(
                "cipher"
            )))
        );
    }
}
