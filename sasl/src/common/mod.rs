//! Types shared by every mechanism: roles, options, validator capabilities and nonces.

use std::env;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;

use crate::error::ProtocolError;
use crate::mechanisms::digest_md5::{Cipher, Qop};

mod context;
mod message;

pub use self::context::{Context, DEFAULT_MAXBUF};
pub use self::message::{Message, Value};

/// Default number of random bytes in a generated nonce.
pub const DEFAULT_NONCE_SIZE: usize = 32;

/// Which end of the exchange a challenge plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The initiating side.
    Client,
    /// The responding side.
    Server,
}

impl Role {
    /// Whether this is the server side.
    pub fn is_server(self) -> bool {
        self == Role::Server
    }

    /// The role at the other end of the exchange.
    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Checks the credentials of a PLAIN exchange in server mode.
pub trait PlainValidator: Send + Sync {
    /// Returns whether `authcid` may log in with `password` and act as `authzid`.
    fn validate(&self, authzid: &str, authcid: &str, password: &str) -> bool;
}

impl<F> PlainValidator for F
where
    F: Fn(&str, &str, &str) -> bool + Send + Sync,
{
    fn validate(&self, authzid: &str, authcid: &str, password: &str) -> bool {
        self(authzid, authcid, password)
    }
}

/// Produces the digest a CRAM-MD5 client should send, without exposing the password store.
pub trait CramMd5Validator: Send + Sync {
    /// The expected lowercase hex digest for `username` under `challenge`, if the user exists.
    fn expected_digest(&self, username: &str, challenge: &str) -> Option<String>;
}

impl<F> CramMd5Validator for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn expected_digest(&self, username: &str, challenge: &str) -> Option<String> {
        self(username, challenge)
    }
}

/// Everything a caller can pass into a `challenge` step.
///
/// Each mechanism reads the subset it understands and ignores the rest.
#[derive(Clone, Default)]
pub struct Options {
    /// The authentication identity.
    pub username: Option<String>,
    /// The plaintext password.
    pub password: Option<String>,
    /// The authorization identity, when it differs from the username.
    pub authzid: Option<String>,
    /// Trace information sent by an ANONYMOUS client.
    pub trace: Option<String>,
    /// Request an integrity protecting security layer.
    pub use_integrity: bool,
    /// Request a confidentiality protecting security layer.
    pub use_privacy: bool,
    /// The service name used in the digest-uri, `ldap` when unset.
    pub service: Option<String>,
    /// The host name used in the digest-uri.
    pub host: Option<String>,
    /// The realm to authenticate in.
    pub realm: Option<String>,
    /// Overrides the generated nonce.
    pub nonce: Option<String>,
    /// Overrides the generated client nonce.
    pub cnonce: Option<String>,
    /// Overrides the nonce count, 1 when unset.
    pub nc: Option<u32>,
    /// Forces a quality of protection on the client.
    pub qop: Option<Qop>,
    /// Ciphers in order of preference; empty means the built-in order.
    pub cipher: Vec<Cipher>,
    /// Number of random bytes in generated nonces.
    pub nonce_size: Option<usize>,
    /// The largest security layer record this side accepts, advertised in the server
    /// challenge or the client response.
    pub maxbuf: Option<u32>,
    /// Overrides the computed digest-uri.
    pub digest_uri: Option<String>,
    /// The rspauth value of a server final response.
    pub rspauth: Option<String>,
    /// Overrides the generated CRAM-MD5 server challenge.
    pub challenge: Option<String>,
    /// Server-side PLAIN credential check.
    pub plain_validator: Option<Arc<dyn PlainValidator>>,
    /// Server-side CRAM-MD5 digest lookup.
    pub cram_md5_validator: Option<Arc<dyn CramMd5Validator>>,
}

impl fmt::Debug for Options {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Options")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<hidden>"))
            .field("authzid", &self.authzid)
            .field("trace", &self.trace)
            .field("use_integrity", &self.use_integrity)
            .field("use_privacy", &self.use_privacy)
            .field("service", &self.service)
            .field("host", &self.host)
            .field("realm", &self.realm)
            .field("nonce", &self.nonce)
            .field("cnonce", &self.cnonce)
            .field("nc", &self.nc)
            .field("qop", &self.qop)
            .field("cipher", &self.cipher)
            .field("nonce_size", &self.nonce_size)
            .field("maxbuf", &self.maxbuf)
            .field("digest_uri", &self.digest_uri)
            .field("rspauth", &self.rspauth)
            .field("challenge", &self.challenge)
            .field("plain_validator", &self.plain_validator.is_some())
            .field("cram_md5_validator", &self.cram_md5_validator.is_some())
            .finish()
    }
}

impl Options {
    /// Creates a new Options with the specified username.
    pub fn with_username<N: Into<String>>(mut self, username: N) -> Options {
        self.username = Some(username.into());
        self
    }

    /// Creates a new Options with the specified plaintext password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Options {
        self.password = Some(password.into());
        self
    }

    /// Creates a new Options with the specified authorization identity.
    pub fn with_authzid<A: Into<String>>(mut self, authzid: A) -> Options {
        self.authzid = Some(authzid.into());
        self
    }

    /// Creates a new Options with the specified ANONYMOUS trace.
    pub fn with_trace<T: Into<String>>(mut self, trace: T) -> Options {
        self.trace = Some(trace.into());
        self
    }

    /// Creates a new Options requesting integrity protection.
    pub fn with_integrity(mut self, use_integrity: bool) -> Options {
        self.use_integrity = use_integrity;
        self
    }

    /// Creates a new Options requesting confidentiality protection.
    pub fn with_privacy(mut self, use_privacy: bool) -> Options {
        self.use_privacy = use_privacy;
        self
    }

    /// Creates a new Options with the specified service.
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Options {
        self.service = Some(service.into());
        self
    }

    /// Creates a new Options with the specified host.
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Options {
        self.host = Some(host.into());
        self
    }

    /// Creates a new Options with the specified realm.
    pub fn with_realm<R: Into<String>>(mut self, realm: R) -> Options {
        self.realm = Some(realm.into());
        self
    }

    /// Creates a new Options with a fixed nonce.
    pub fn with_nonce<N: Into<String>>(mut self, nonce: N) -> Options {
        self.nonce = Some(nonce.into());
        self
    }

    /// Creates a new Options with a fixed client nonce.
    pub fn with_cnonce<N: Into<String>>(mut self, cnonce: N) -> Options {
        self.cnonce = Some(cnonce.into());
        self
    }

    /// Creates a new Options with the specified nonce count.
    pub fn with_nc(mut self, nc: u32) -> Options {
        self.nc = Some(nc);
        self
    }

    /// Creates a new Options forcing a quality of protection.
    pub fn with_qop(mut self, qop: Qop) -> Options {
        self.qop = Some(qop);
        self
    }

    /// Creates a new Options with the specified cipher preference.
    pub fn with_ciphers<I: IntoIterator<Item = Cipher>>(mut self, ciphers: I) -> Options {
        self.cipher = ciphers.into_iter().collect();
        self
    }

    /// Creates a new Options with the specified nonce size in bytes.
    pub fn with_nonce_size(mut self, nonce_size: usize) -> Options {
        self.nonce_size = Some(nonce_size);
        self
    }

    /// Creates a new Options with the specified maxbuf.
    pub fn with_maxbuf(mut self, maxbuf: u32) -> Options {
        self.maxbuf = Some(maxbuf);
        self
    }

    /// Creates a new Options with a fixed digest-uri.
    pub fn with_digest_uri<U: Into<String>>(mut self, digest_uri: U) -> Options {
        self.digest_uri = Some(digest_uri.into());
        self
    }

    /// Creates a new Options with the rspauth of a server final response.
    pub fn with_rspauth<R: Into<String>>(mut self, rspauth: R) -> Options {
        self.rspauth = Some(rspauth.into());
        self
    }

    /// Creates a new Options with a fixed CRAM-MD5 server challenge.
    pub fn with_challenge<C: Into<String>>(mut self, challenge: C) -> Options {
        self.challenge = Some(challenge.into());
        self
    }

    /// Creates a new Options with a PLAIN credential check.
    pub fn with_plain_validator<V: PlainValidator + 'static>(mut self, validator: V) -> Options {
        self.plain_validator = Some(Arc::new(validator));
        self
    }

    /// Creates a new Options with a CRAM-MD5 digest lookup.
    pub fn with_cram_md5_validator<V: CramMd5Validator + 'static>(
        mut self,
        validator: V,
    ) -> Options {
        self.cram_md5_validator = Some(Arc::new(validator));
        self
    }
}

/// Generate a base64 encoded nonce from `size` random bytes.
pub fn generate_nonce(size: usize) -> Result<String, ProtocolError> {
    let mut data = vec![0u8; size];
    getrandom::getrandom(&mut data)?;
    Ok(Base64.encode(data))
}

/// The first of the named environment variables that is set and non-empty.
pub(crate) fn env_fallback(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_has_requested_size() {
        let nonce = generate_nonce(32).unwrap();
        assert_eq!(Base64.decode(&nonce).unwrap().len(), 32);
        let nonce = generate_nonce(8).unwrap();
        assert_eq!(nonce.len(), 12);
        assert_ne!(generate_nonce(16).unwrap(), generate_nonce(16).unwrap());
    }

    #[test]
    fn debug_hides_the_password() {
        let options = Options::default()
            .with_username("user")
            .with_password("pencil");
        let debug = format!("{:?}", options);
        assert!(debug.contains("user"));
        assert!(!debug.contains("pencil"));
    }

    #[test]
    fn closures_are_validators() {
        let options = Options::default()
            .with_plain_validator(|_: &str, authcid: &str, password: &str| {
                authcid == "user" && password == "pencil"
            })
            .with_cram_md5_validator(|username: &str, _: &str| {
                (username == "foo").then(|| "0".repeat(32))
            });
        let plain = options.plain_validator.as_ref().unwrap();
        assert!(plain.validate("", "user", "pencil"));
        assert!(!plain.validate("", "user", "wrong"));
        let cram = options.cram_md5_validator.as_ref().unwrap();
        assert_eq!(cram.expected_digest("bar", "<x>"), None);
    }

    #[test]
    fn roles_are_peers() {
        assert_eq!(Role::Client.peer(), Role::Server);
        assert!(Role::Client.peer().is_server());
    }
}
