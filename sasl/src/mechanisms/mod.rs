//! Provides the supported SASL mechanisms.

use std::fmt;
use std::str::FromStr;

use crate::common::{Context, Options, Role};
use crate::error::{Error, ProtocolError};

pub mod anonymous;
pub mod cram_md5;
pub mod digest_md5;
pub mod plain;

pub use self::anonymous::AnonymousChallenge;
pub use self::cram_md5::CramMd5Challenge;
pub use self::digest_md5::{DigestMd5Challenge, DigestMd5SecurityLayer};
pub use self::plain::PlainChallenge;

/// What a mechanism can protect, used to rank mechanisms against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityStrength {
    supports_integrity: bool,
    supports_privacy: bool,
    supports_auth: bool,
    is_plaintext_auth: bool,
    max_key_size: u32,
}

impl SecurityStrength {
    /// Describes a mechanism's protection.
    pub const fn new(
        supports_integrity: bool,
        supports_privacy: bool,
        supports_auth: bool,
        is_plaintext_auth: bool,
        max_key_size: u32,
    ) -> SecurityStrength {
        SecurityStrength {
            supports_integrity,
            supports_privacy,
            supports_auth,
            is_plaintext_auth,
            max_key_size,
        }
    }

    /// Whether the mechanism can negotiate an integrity layer.
    pub fn supports_integrity(&self) -> bool {
        self.supports_integrity
    }

    /// Whether the mechanism can negotiate a confidentiality layer.
    pub fn supports_privacy(&self) -> bool {
        self.supports_privacy
    }

    /// Whether the mechanism authenticates the client at all.
    pub fn supports_auth(&self) -> bool {
        self.supports_auth
    }

    /// Whether the password crosses the wire in the clear.
    pub fn is_plaintext_auth(&self) -> bool {
        self.is_plaintext_auth
    }

    /// The largest key size, in bits, of its security layer.
    pub fn max_key_size(&self) -> u32 {
        self.max_key_size
    }
}

/// A SASL mechanism known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// DIGEST-MD5, RFC 2831.
    DigestMd5,
    /// CRAM-MD5, RFC 2195.
    CramMd5,
    /// PLAIN, RFC 4616.
    Plain,
    /// ANONYMOUS, RFC 4505.
    Anonymous,
}

impl Mechanism {
    /// Every mechanism, strongest first.
    pub const ALL: [Mechanism; 4] = [
        Mechanism::DigestMd5,
        Mechanism::CramMd5,
        Mechanism::Plain,
        Mechanism::Anonymous,
    ];

    /// The registered SASL name.
    pub fn name(self) -> &'static str {
        match self {
            Mechanism::DigestMd5 => "DIGEST-MD5",
            Mechanism::CramMd5 => "CRAM-MD5",
            Mechanism::Plain => "PLAIN",
            Mechanism::Anonymous => "ANONYMOUS",
        }
    }

    /// Looks a mechanism up by its SASL name, ignoring case.
    pub fn from_name(name: &str) -> Option<Mechanism> {
        Mechanism::ALL
            .iter()
            .copied()
            .find(|mechanism| mechanism.name().eq_ignore_ascii_case(name))
    }

    /// What this mechanism can protect.
    pub fn security_strength(self) -> SecurityStrength {
        match self {
            Mechanism::DigestMd5 => SecurityStrength::new(true, true, true, false, 128),
            Mechanism::CramMd5 => SecurityStrength::new(false, false, true, false, 0),
            Mechanism::Plain => SecurityStrength::new(false, false, true, true, 0),
            Mechanism::Anonymous => SecurityStrength::new(false, false, false, false, 0),
        }
    }

    /// Starts a fresh exchange of this mechanism as `role`.
    pub fn challenge(self, role: Role) -> Challenge {
        match self {
            Mechanism::DigestMd5 => Challenge::DigestMd5(DigestMd5Challenge::new(role)),
            Mechanism::CramMd5 => Challenge::CramMd5(CramMd5Challenge::new(role)),
            Mechanism::Plain => Challenge::Plain(PlainChallenge::new(role)),
            Mechanism::Anonymous => Challenge::Anonymous(AnonymousChallenge::new(role)),
        }
    }

    /// The security layer of this mechanism, if it has one.
    pub fn security_layer(self) -> Result<SecurityLayer, Error> {
        match self {
            Mechanism::DigestMd5 => Ok(SecurityLayer::DigestMd5(DigestMd5SecurityLayer::new())),
            other => Err(ProtocolError::NoSecurityLayer(other.name()).into()),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.name())
    }
}

impl FromStr for Mechanism {
    type Err = Error;

    fn from_str(name: &str) -> Result<Mechanism, Error> {
        Mechanism::from_name(name)
            .ok_or_else(|| ProtocolError::UnsupportedMechanism(name.to_owned()).into())
    }
}

/// One running exchange of any mechanism.
#[derive(Debug)]
pub enum Challenge {
    /// A DIGEST-MD5 exchange.
    DigestMd5(DigestMd5Challenge),
    /// A CRAM-MD5 exchange.
    CramMd5(CramMd5Challenge),
    /// A PLAIN exchange.
    Plain(PlainChallenge),
    /// An ANONYMOUS exchange.
    Anonymous(AnonymousChallenge),
}

impl Challenge {
    /// Which mechanism this exchange runs.
    pub fn mechanism(&self) -> Mechanism {
        match *self {
            Challenge::DigestMd5(_) => Mechanism::DigestMd5,
            Challenge::CramMd5(_) => Mechanism::CramMd5,
            Challenge::Plain(_) => Mechanism::Plain,
            Challenge::Anonymous(_) => Mechanism::Anonymous,
        }
    }

    /// Runs one step with the message received from the peer, if any.
    ///
    /// The returned context holds the response to send, if there is one this step.
    pub fn challenge(
        &mut self,
        received: Option<&[u8]>,
        options: &Options,
    ) -> Result<&Context, Error> {
        match *self {
            Challenge::DigestMd5(ref mut challenge) => challenge.challenge(received, options),
            Challenge::CramMd5(ref mut challenge) => challenge.challenge(received, options),
            Challenge::Plain(ref mut challenge) => challenge.challenge(received, options),
            Challenge::Anonymous(ref mut challenge) => challenge.challenge(received, options),
        }
    }

    /// The state of the exchange.
    pub fn context(&self) -> &Context {
        match *self {
            Challenge::DigestMd5(ref challenge) => challenge.context(),
            Challenge::CramMd5(ref challenge) => challenge.context(),
            Challenge::Plain(ref challenge) => challenge.context(),
            Challenge::Anonymous(ref challenge) => challenge.context(),
        }
    }

    /// Mutable access to the state, for the security layer.
    pub fn context_mut(&mut self) -> &mut Context {
        match *self {
            Challenge::DigestMd5(ref mut challenge) => challenge.context_mut(),
            Challenge::CramMd5(ref mut challenge) => challenge.context_mut(),
            Challenge::Plain(ref mut challenge) => challenge.context_mut(),
            Challenge::Anonymous(ref mut challenge) => challenge.context_mut(),
        }
    }

    /// Ends the exchange, keeping its state.
    pub fn into_context(self) -> Context {
        match self {
            Challenge::DigestMd5(challenge) => challenge.into_context(),
            Challenge::CramMd5(challenge) => challenge.into_context(),
            Challenge::Plain(challenge) => challenge.into_context(),
            Challenge::Anonymous(challenge) => challenge.into_context(),
        }
    }
}

/// The security layer of a mechanism that negotiates one.
#[derive(Debug, Clone, Copy)]
pub enum SecurityLayer {
    /// The DIGEST-MD5 integrity and confidentiality layer.
    DigestMd5(DigestMd5SecurityLayer),
}

impl SecurityLayer {
    /// Protects `data` for sending.
    pub fn wrap(&self, data: &[u8], context: &mut Context) -> Result<Vec<u8>, Error> {
        match *self {
            SecurityLayer::DigestMd5(ref layer) => layer.wrap(data, context),
        }
    }

    /// Checks and strips the protection of a received record.
    pub fn unwrap(&self, data: &[u8], context: &mut Context) -> Result<Vec<u8>, Error> {
        match *self {
            SecurityLayer::DigestMd5(ref layer) => layer.unwrap(data, context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        for mechanism in Mechanism::ALL.iter() {
            assert_eq!(Mechanism::from_name(mechanism.name()), Some(*mechanism));
        }
        assert_eq!(Mechanism::from_name("digest-md5"), Some(Mechanism::DigestMd5));
        assert_eq!("PLAIN".parse::<Mechanism>(), Ok(Mechanism::Plain));
        assert_eq!(
            "SCRAM-SHA-1".parse::<Mechanism>(),
            Err(Error::Protocol(ProtocolError::UnsupportedMechanism(
                "SCRAM-SHA-1".to_owned()
            )))
        );
        assert_eq!(Mechanism::CramMd5.to_string(), "CRAM-MD5");
    }

    #[test]
    fn strengths() {
        let digest = Mechanism::DigestMd5.security_strength();
        assert!(digest.supports_integrity() && digest.supports_privacy());
        assert_eq!(digest.max_key_size(), 128);
        assert!(Mechanism::Plain.security_strength().is_plaintext_auth());
        assert!(!Mechanism::Anonymous.security_strength().supports_auth());
    }

    #[test]
    fn only_digest_md5_has_a_security_layer() {
        assert!(Mechanism::DigestMd5.security_layer().is_ok());
        assert_eq!(
            Mechanism::Plain.security_layer().unwrap_err(),
            Error::Protocol(ProtocolError::NoSecurityLayer("PLAIN"))
        );
    }

    #[test]
    fn challenge_dispatch() {
        let mut challenge = Mechanism::Anonymous.challenge(Role::Client);
        assert_eq!(challenge.mechanism(), Mechanism::Anonymous);
        let context = challenge
            .challenge(None, &Options::default().with_trace("me"))
            .unwrap();
        assert_eq!(context.response(), Some(&b"me"[..]));
        assert!(challenge.context().is_authenticated());
        assert_eq!(challenge.into_context().role(), Role::Client);
    }
}
