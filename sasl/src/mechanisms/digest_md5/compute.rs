//! Response and key computation for DIGEST-MD5, as described in RFC 2831.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

use crate::common::Message;
use crate::error::ProtocolError;
use crate::mechanisms::digest_md5::{Cipher, Qop};

type HmacMd5 = Hmac<Md5>;

/// Magic constant for the client-to-server sealing key.
pub const KCC_MAGIC: &[u8] = b"Digest H(A1) to client-to-server sealing key magic constant";
/// Magic constant for the server-to-client sealing key.
pub const KCS_MAGIC: &[u8] = b"Digest H(A1) to server-to-client sealing key magic constant";
/// Magic constant for the client-to-server signing key.
pub const KIC_MAGIC: &[u8] = b"Digest session key to client-to-server signing key magic constant";
/// Magic constant for the server-to-client signing key.
pub const KIS_MAGIC: &[u8] = b"Digest session key to server-to-client signing key magic constant";

const A2_DIGEST_SUFFIX: &str = ":00000000000000000000000000000000";

fn md5(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// HMAC-MD5 of the concatenation of `parts`.
pub fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, ProtocolError> {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(key)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// The raw 16 byte session key `H(A1)`.
pub fn compute_a1_raw(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    authzid: Option<&str>,
) -> Vec<u8> {
    let secret = md5(&[
        username.as_bytes(),
        b":",
        realm.as_bytes(),
        b":",
        password.as_bytes(),
    ]);
    let mut hasher = Md5::new();
    hasher.update(&secret);
    hasher.update(b":");
    hasher.update(nonce);
    hasher.update(b":");
    hasher.update(cnonce);
    if let Some(authzid) = authzid {
        hasher.update(b":");
        hasher.update(authzid);
    }
    hasher.finalize().to_vec()
}

/// The hex form of `H(A1)`, as it enters the response hash.
pub fn compute_a1(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    authzid: Option<&str>,
) -> String {
    hex::encode(compute_a1_raw(
        username, realm, password, nonce, cnonce, authzid,
    ))
}

/// The `A2` string for `qop`; the server side leaves out the method.
pub fn compute_a2(
    digest_uri: &str,
    qop: &str,
    use_server_mode: bool,
) -> Result<String, ProtocolError> {
    let qop = Qop::from_name(qop).ok_or_else(|| ProtocolError::InvalidQop(qop.to_owned()))?;
    let method = if use_server_mode { "" } else { "AUTHENTICATE" };
    let mut a2 = format!("{}:{}", method, digest_uri);
    if qop.has_security_layer() {
        a2.push_str(A2_DIGEST_SUFFIX);
    }
    Ok(a2)
}

struct Inputs<'a> {
    username: &'a str,
    realm: &'a str,
    nonce: &'a str,
    cnonce: &'a str,
    nc: u32,
    qop: &'a str,
    digest_uri: &'a str,
    authzid: Option<&'a str>,
}

impl<'a> Inputs<'a> {
    fn gather(challenge: &'a Message, response: &'a Message) -> Result<Inputs<'a>, ProtocolError> {
        let required = move |name: &'static str| {
            response
                .get_str(name)
                .ok_or(ProtocolError::MissingDirective(name))
        };
        Ok(Inputs {
            username: required("username")?,
            realm: required("realm")?,
            nonce: challenge
                .get_str("nonce")
                .ok_or(ProtocolError::MissingDirective("nonce"))?,
            cnonce: required("cnonce")?,
            nc: response
                .get_number("nc")
                .ok_or(ProtocolError::MissingDirective("nc"))?,
            qop: required("qop")?,
            digest_uri: required("digest-uri")?,
            authzid: response.get_str("authzid"),
        })
    }
}

/// The raw session key agreed by a challenge and its response.
pub fn session_key(
    password: &str,
    challenge: &Message,
    response: &Message,
) -> Result<Vec<u8>, ProtocolError> {
    let inputs = Inputs::gather(challenge, response)?;
    Ok(compute_a1_raw(
        inputs.username,
        inputs.realm,
        password,
        inputs.nonce,
        inputs.cnonce,
        inputs.authzid,
    ))
}

/// The response hash for a challenge and a client response.
///
/// The client computes it with `use_server_mode` unset and sends it as `response`. Computing
/// it again with `use_server_mode` set gives the `rspauth` the server proves itself with.
pub fn compute_response(
    password: &str,
    challenge: &Message,
    response: &Message,
    use_server_mode: bool,
) -> Result<String, ProtocolError> {
    let inputs = Inputs::gather(challenge, response)?;
    let a1 = compute_a1(
        inputs.username,
        inputs.realm,
        password,
        inputs.nonce,
        inputs.cnonce,
        inputs.authzid,
    );
    let a2 = compute_a2(inputs.digest_uri, inputs.qop, use_server_mode)?;
    let nc = format!("{:08x}", inputs.nc);
    let a2 = hex::encode(md5(&[a2.as_bytes()]));
    Ok(hex::encode(md5(&[
        a1.as_bytes(),
        b":",
        inputs.nonce.as_bytes(),
        b":",
        nc.as_bytes(),
        b":",
        inputs.cnonce.as_bytes(),
        b":",
        inputs.qop.as_bytes(),
        b":",
        a2.as_bytes(),
    ])))
}

/// `Kic` or `Kis`: the signing key for one direction.
pub fn derive_integrity_key(a1: &[u8], magic: &[u8]) -> Vec<u8> {
    md5(&[a1, magic])
}

/// `Kcc` or `Kcs`: the sealing key for one direction, from a cipher dependent prefix of `a1`.
pub fn derive_confidentiality_key(a1: &[u8], cipher: Cipher, magic: &[u8]) -> Vec<u8> {
    let length = cipher.key_derivation_len().min(a1.len());
    md5(&[&a1[..length], magic])
}
