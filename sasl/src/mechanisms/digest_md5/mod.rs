//! Provides the SASL "DIGEST-MD5" mechanism, as described in RFC 2831.

use std::fmt;

use log::{debug, warn};

use crate::common::{Context, Message, Options, Role};
use crate::error::{Error, ProtocolError};

pub mod compute;
pub mod encoder;
pub mod factory;
pub(crate) mod sealing;
pub mod security;

pub use self::factory::{MessageFactory, MessageType};
pub use self::security::DigestMd5SecurityLayer;

/// Service used in the digest-uri when none is given.
pub const DEFAULT_SERVICE: &str = "ldap";

/// Shortest client nonce a server accepts.
pub const MIN_CNONCE_LENGTH: usize = 12;

/// Quality of protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qop {
    /// Authentication only.
    Auth,
    /// Authentication with integrity protection.
    AuthInt,
    /// Authentication with integrity and confidentiality protection.
    AuthConf,
}

impl Qop {
    /// The directive value.
    pub fn as_str(self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
            Qop::AuthConf => "auth-conf",
        }
    }

    /// Parses a directive value.
    pub fn from_name(name: &str) -> Option<Qop> {
        match name {
            "auth" => Some(Qop::Auth),
            "auth-int" => Some(Qop::AuthInt),
            "auth-conf" => Some(Qop::AuthConf),
            _ => None,
        }
    }

    /// Whether this protection needs a security layer after authentication.
    pub fn has_security_layer(self) -> bool {
        self != Qop::Auth
    }
}

impl fmt::Display for Qop {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// Ciphers of the confidentiality layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    /// RC4 with a 128 bit key.
    Rc4,
    /// Single DES in CBC mode.
    Des,
    /// Two key triple DES (EDE) in CBC mode.
    TripleDes,
    /// RC4 with a key derived from 40 bits of the session key.
    Rc440,
    /// RC4 with a key derived from 56 bits of the session key.
    Rc456,
}

impl Cipher {
    /// The order a server advertises ciphers in.
    pub const SERVER_PREFERENCE: [Cipher; 5] = [
        Cipher::Rc4,
        Cipher::Des,
        Cipher::TripleDes,
        Cipher::Rc440,
        Cipher::Rc456,
    ];

    /// The order a client picks ciphers in.
    pub const CLIENT_PREFERENCE: [Cipher; 5] = [
        Cipher::TripleDes,
        Cipher::Des,
        Cipher::Rc4,
        Cipher::Rc456,
        Cipher::Rc440,
    ];

    /// The directive value.
    pub fn as_str(self) -> &'static str {
        match self {
            Cipher::Rc4 => "rc4",
            Cipher::Des => "des",
            Cipher::TripleDes => "3des",
            Cipher::Rc440 => "rc4-40",
            Cipher::Rc456 => "rc4-56",
        }
    }

    /// Parses a directive value.
    pub fn from_name(name: &str) -> Option<Cipher> {
        match name {
            "rc4" => Some(Cipher::Rc4),
            "des" => Some(Cipher::Des),
            "3des" => Some(Cipher::TripleDes),
            "rc4-40" => Some(Cipher::Rc440),
            "rc4-56" => Some(Cipher::Rc456),
            _ => None,
        }
    }

    /// Block size in bytes; 1 for stream ciphers.
    pub fn block_size(self) -> usize {
        match self {
            Cipher::Des | Cipher::TripleDes => 8,
            Cipher::Rc4 | Cipher::Rc440 | Cipher::Rc456 => 1,
        }
    }

    /// How many bytes of the session key feed the sealing key.
    pub fn key_derivation_len(self) -> usize {
        match self {
            Cipher::Rc440 => 5,
            Cipher::Rc456 => 7,
            Cipher::Rc4 | Cipher::Des | Cipher::TripleDes => 16,
        }
    }

    /// Whether this build can use the cipher.
    pub fn is_available(self) -> bool {
        match self {
            Cipher::Des | Cipher::TripleDes => cfg!(feature = "des"),
            Cipher::Rc4 | Cipher::Rc440 | Cipher::Rc456 => cfg!(feature = "rc4"),
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// One DIGEST-MD5 exchange, from either side.
#[derive(Debug)]
pub struct DigestMd5Challenge {
    context: Context,
    challenge: Option<Message>,
}

impl DigestMd5Challenge {
    /// Starts an exchange as `role`.
    pub fn new(role: Role) -> DigestMd5Challenge {
        DigestMd5Challenge {
            context: Context::new(role),
            challenge: None,
        }
    }

    /// Runs one step of the exchange with the message received from the peer, if any.
    pub fn challenge(
        &mut self,
        received: Option<&[u8]>,
        options: &Options,
    ) -> Result<&Context, Error> {
        self.context.set_response(None);
        let role = self.context.role();
        let received = match received {
            Some(data) => Some(encoder::decode(data, role)?),
            None => None,
        };

        match (role, received) {
            (Role::Server, None) => self.send_challenge(options)?,
            (Role::Server, Some(response)) => self.verify_response(&response, options)?,
            (Role::Client, None) => (),
            (Role::Client, Some(message)) if message.has("rspauth") => {
                self.verify_rspauth(&message)?
            }
            (Role::Client, Some(challenge)) => self.send_response(&challenge, options)?,
        }

        Ok(&self.context)
    }

    /// The state of the exchange.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the state, for the security layer.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Ends the exchange, keeping its state.
    pub fn into_context(self) -> Context {
        self.context
    }

    fn send_challenge(&mut self, options: &Options) -> Result<(), Error> {
        let challenge = MessageFactory::create(MessageType::ServerChallenge, options, None)?;
        let encoded = encoder::encode(&challenge, Role::Server)?;
        debug!("DIGEST-MD5 challenge sent");
        self.challenge = Some(challenge);
        self.context.set_response(Some(encoded));
        Ok(())
    }

    fn send_response(&mut self, challenge: &Message, options: &Options) -> Result<(), Error> {
        let qop = options.qop.unwrap_or(if options.use_privacy {
            Qop::AuthConf
        } else if options.use_integrity {
            Qop::AuthInt
        } else {
            Qop::Auth
        });
        let mut options = options.clone().with_qop(qop);
        if options.service.is_none() {
            options.service = Some(DEFAULT_SERVICE.to_owned());
        }
        if options.digest_uri.is_none() {
            if let (Some(service), Some(host)) = (&options.service, &options.host) {
                options.digest_uri = Some(format!("{}/{}", service, host));
            }
        }

        let mut response =
            MessageFactory::create(MessageType::ClientResponse, &options, Some(challenge))?;
        let password = options
            .password
            .as_deref()
            .ok_or(ProtocolError::MissingOption {
                mechanism: "DIGEST-MD5",
                option: "password",
            })?;
        let digest = compute::compute_response(password, challenge, &response, false)?;
        let verification = compute::compute_response(password, challenge, &response, true)?;
        response.set("response", digest);
        let encoded = encoder::encode(&response, Role::Client)?;

        self.context.set_qop(qop);
        if let Some(maxbuf) = challenge.get_number("maxbuf") {
            self.context.set_peer_maxbuf(maxbuf);
        }
        if let Some(maxbuf) = options.maxbuf {
            self.context.set_maxbuf(maxbuf);
        }
        if qop.has_security_layer() {
            let cipher = response.get_str("cipher").and_then(Cipher::from_name);
            let a1 = compute::session_key(password, challenge, &response)?;
            self.context.set_key_material(a1, cipher);
        }
        self.context.set_verification(verification);
        self.context.set_response(Some(encoded));
        debug!("DIGEST-MD5 response sent with qop {}", qop);
        Ok(())
    }

    fn verify_rspauth(&mut self, message: &Message) -> Result<(), Error> {
        let verification = self
            .context
            .verification()
            .ok_or(ProtocolError::RspauthOutOfOrder)?;
        if message.get_str("rspauth") == Some(verification) {
            self.context.mark_authenticated();
            if self.context.qop().map_or(false, Qop::has_security_layer) {
                self.context.install_security_layer();
            }
            debug!("DIGEST-MD5 server verified");
        } else {
            warn!("DIGEST-MD5 rspauth from the server does not match");
        }
        self.context.mark_complete();
        Ok(())
    }

    fn verify_response(&mut self, response: &Message, options: &Options) -> Result<(), Error> {
        self.context.mark_complete();
        let challenge = match &self.challenge {
            Some(challenge) => challenge,
            None => {
                warn!("DIGEST-MD5 response received before a challenge was sent");
                return Ok(());
            }
        };
        let password = match &options.password {
            Some(password) => password,
            None => {
                warn!("DIGEST-MD5 server has no password to verify against");
                return Ok(());
            }
        };
        let qop = match response.get_str("qop") {
            Some(qop) if challenge.get("qop").map_or(false, |offered| offered.contains(qop)) => {
                qop
            }
            _ => {
                warn!("DIGEST-MD5 client selected a qop that was not offered");
                return Ok(());
            }
        };
        let qop = match Qop::from_name(qop) {
            Some(qop) => qop,
            None => return Ok(()),
        };
        let cipher = if qop == Qop::AuthConf {
            let offered = match (response.get_str("cipher"), challenge.get("cipher")) {
                (Some(cipher), Some(offered)) if offered.contains(cipher) => cipher,
                _ => {
                    warn!("DIGEST-MD5 client selected a cipher that was not offered");
                    return Ok(());
                }
            };
            Cipher::from_name(offered)
        } else {
            None
        };
        if response.get_str("cnonce").map_or(0, str::len) < MIN_CNONCE_LENGTH {
            warn!("DIGEST-MD5 client nonce is too short");
            return Ok(());
        }
        if response.get_str("nonce") != challenge.get_str("nonce") {
            warn!("DIGEST-MD5 client nonce does not match the challenge");
            return Ok(());
        }
        let expected = match compute::compute_response(password, challenge, response, false) {
            Ok(expected) => expected,
            Err(err) => {
                warn!("DIGEST-MD5 response could not be computed: {}", err);
                return Ok(());
            }
        };
        if response.get_str("response") != Some(expected.as_str()) {
            warn!("DIGEST-MD5 response does not match");
            return Ok(());
        }

        let rspauth = compute::compute_response(password, challenge, response, true)?;
        let a1 = compute::session_key(password, challenge, response)?;
        let options = options.clone().with_rspauth(rspauth);
        let message = MessageFactory::create(MessageType::ServerResponse, &options, None)?;

        self.context.mark_authenticated();
        self.context.set_qop(qop);
        if let Some(maxbuf) = challenge.get_number("maxbuf") {
            self.context.set_maxbuf(maxbuf);
        }
        if let Some(maxbuf) = response.get_number("maxbuf") {
            self.context.set_peer_maxbuf(maxbuf);
        }
        if qop.has_security_layer() {
            self.context.set_key_material(a1, cipher);
            self.context.install_security_layer();
        }
        self.context
            .set_response(Some(encoder::encode(&message, Role::Server)?));
        debug!("DIGEST-MD5 client authenticated with qop {}", qop);
        Ok(())
    }
}
