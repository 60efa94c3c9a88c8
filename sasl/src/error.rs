use std::error;
use std::fmt;

/// Malformed wire data: bad grammar, unsupported or repeated directives, bad literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A directive name followed by `=` was expected.
    ExpectedKey,
    /// The input ended right after a directive name.
    ExpectedValue,
    /// Something other than a comma followed the value of the named directive.
    ExpectedComma(String),
    /// The directive name is not part of the grammar.
    UnsupportedDirective(String),
    /// The directive only accepts this exact literal.
    ExpectedLiteral(&'static str),
    /// A double-quoted string was expected.
    ExpectedQuotedString,
    /// A bare token was expected.
    MalformedToken,
    /// A sequence of digits was expected.
    ExpectedDigits,
    /// A lowercase hex value was expected.
    ExpectedHex,
    /// The hex value does not have the required number of characters.
    HexLength(usize),
    /// The hex value being encoded does not have the required number of characters.
    EncodedHexLength(usize),
    /// A directive which may only appear once appeared again.
    DuplicateDirective(String),
    /// The value stored for the directive cannot be encoded by its grammar.
    WrongValueType(String),
    /// The message is not valid UTF-8.
    InvalidUtf8,
    /// A PLAIN message lacks the named field.
    PlainMissingField(&'static str),
    /// A PLAIN field contains a NUL character.
    PlainContainsNull,
    /// A PLAIN message is not `authzid NUL authcid NUL password`.
    PlainMalformed,
    /// A CRAM-MD5 message lacks the named field.
    CramMd5MissingField(&'static str),
    /// A CRAM-MD5 digest is not 32 lowercase hex characters.
    CramMd5MalformedDigest,
    /// A CRAM-MD5 server challenge is not enclosed in angle brackets.
    CramMd5MalformedChallenge,
    /// A CRAM-MD5 client response is not `username SP digest`.
    CramMd5MalformedResponse,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodingError::ExpectedKey => write!(
                fmt,
                "The digest is malformed. Expected a key, but none was found."
            ),
            EncodingError::ExpectedValue => write!(
                fmt,
                "Unexpected end of digest. Expected a value following a key."
            ),
            EncodingError::ExpectedComma(name) => {
                write!(fmt, "Expected a comma following digest value for {}.", name)
            }
            EncodingError::UnsupportedDirective(name) => {
                write!(fmt, "Digest option {} is not supported.", name)
            }
            EncodingError::ExpectedLiteral(literal) => write!(
                fmt,
                "Expected the directive value to be \"{}\", but it is not.",
                literal
            ),
            EncodingError::ExpectedQuotedString => {
                write!(fmt, "The value is malformed. Expected a qdstr-val.")
            }
            EncodingError::MalformedToken => write!(fmt, "The value is malformed."),
            EncodingError::ExpectedDigits => {
                write!(fmt, "Expected a series of digits for a key value.")
            }
            EncodingError::ExpectedHex => write!(fmt, "Expected a hex value."),
            EncodingError::HexLength(length) => write!(
                fmt,
                "Expected the hex value to be {} characters long.",
                length
            ),
            EncodingError::EncodedHexLength(length) => write!(
                fmt,
                "Expected the encoded hex value to be {} characters long.",
                length
            ),
            EncodingError::DuplicateDirective(name) => {
                write!(fmt, "The option \"{}\" may occur only once.", name)
            }
            EncodingError::WrongValueType(name) => {
                write!(fmt, "The value for directive {} has the wrong type.", name)
            }
            EncodingError::InvalidUtf8 => write!(fmt, "The message is not valid UTF-8."),
            EncodingError::PlainMissingField(field) => {
                write!(fmt, "The PLAIN message must contain a {}.", field)
            }
            EncodingError::PlainContainsNull => write!(
                fmt,
                "PLAIN mechanism data cannot contain a null character."
            ),
            EncodingError::PlainMalformed => write!(fmt, "The PLAIN message data is malformed."),
            EncodingError::CramMd5MissingField(field) => {
                write!(fmt, "The CRAM-MD5 message must contain a {}.", field)
            }
            EncodingError::CramMd5MalformedDigest => write!(
                fmt,
                "The client digest must be a 16 octet, lower-case, hexadecimal value"
            ),
            EncodingError::CramMd5MalformedChallenge => {
                write!(fmt, "The server challenge is malformed.")
            }
            EncodingError::CramMd5MalformedResponse => {
                write!(fmt, "The client response is malformed.")
            }
        }
    }
}

impl error::Error for EncodingError {}

/// Misuse of the state machine, missing prerequisites, or an unacceptable offer from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The factory cannot build this message type from what it was given.
    UnrecognizedMessageType,
    /// A server final response was requested without an rspauth value.
    MissingRspauth,
    /// No username was supplied and none could be found in the environment.
    NoUsername,
    /// No realm was supplied and the challenge does not carry exactly one.
    NoRealm,
    /// Neither a digest-uri nor a service was supplied.
    NoService,
    /// A message lacks a directive needed for the computation.
    MissingDirective(&'static str),
    /// The qop value is not one of auth, auth-int, auth-conf.
    InvalidQop(String),
    /// None of the acceptable qop values were offered; carries what was offered.
    QopUnavailable(Vec<String>),
    /// auth-conf was selected but the challenge offers no ciphers.
    NoChallengeCiphers,
    /// None of the acceptable ciphers were offered; carries what was offered.
    CipherUnavailable(Vec<String>),
    /// No cipher is both wanted and available for auth-conf.
    NoAvailableCiphers,
    /// The rspauth message arrived before a response was sent.
    RspauthOutOfOrder,
    /// The operating system could not provide random data for a nonce.
    NonceGeneration(getrandom::Error),
    /// The HMAC key was rejected.
    InvalidKeyLength(hmac::digest::InvalidLength),
    /// The mechanism needs the named option for this step.
    MissingOption {
        /// Name of the mechanism.
        mechanism: &'static str,
        /// Name of the missing option.
        option: &'static str,
    },
    /// The mechanism needs a validator capability in server mode.
    MissingValidator(&'static str),
    /// No mechanism with this name is registered.
    UnsupportedMechanism(String),
    /// The mechanism has no security layer.
    NoSecurityLayer(&'static str),
    /// Nothing registered matches the choices and required properties.
    NoSuitableMechanism(Vec<String>),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::UnrecognizedMessageType => write!(
                fmt,
                "Unable to generate message. Unrecognized message type / received message combination."
            ),
            ProtocolError::MissingRspauth => write!(
                fmt,
                "The server response must include the rspauth value."
            ),
            ProtocolError::NoUsername => write!(
                fmt,
                "Unable to determine a username for the response. You must supply a username."
            ),
            ProtocolError::NoRealm => write!(fmt, "Unable to determine a realm for the response."),
            ProtocolError::NoService => write!(
                fmt,
                "If you do not supply a digest-uri, you must specify a service."
            ),
            ProtocolError::MissingDirective(name) => {
                write!(fmt, "The message is missing the {} directive.", name)
            }
            ProtocolError::InvalidQop(_) => write!(
                fmt,
                "The qop directive must be one of: auth, auth-conf, auth-int."
            ),
            ProtocolError::QopUnavailable(available) => write!(
                fmt,
                "None of the qop values are recognized, or the one you selected is not available. Available methods are: {}",
                available.join(", ")
            ),
            ProtocolError::NoChallengeCiphers => write!(
                fmt,
                "The client requested auth-conf, but the challenge contains no ciphers."
            ),
            ProtocolError::CipherUnavailable(offered) => write!(
                fmt,
                "No recognized ciphers were offered in the challenge: {}",
                offered.join(", ")
            ),
            ProtocolError::NoAvailableCiphers => {
                write!(fmt, "There are no available ciphers for auth-conf.")
            }
            ProtocolError::RspauthOutOfOrder => write!(
                fmt,
                "The rspauth value was received before the response was generated."
            ),
            ProtocolError::NonceGeneration(err) => {
                write!(fmt, "Unable to generate the nonce: {}", err)
            }
            ProtocolError::InvalidKeyLength(_) => write!(fmt, "The HMAC key length is invalid."),
            ProtocolError::MissingOption { mechanism, option } => write!(
                fmt,
                "You must supply a {} for the {} mechanism.",
                option, mechanism
            ),
            ProtocolError::MissingValidator(mechanism) => write!(
                fmt,
                "You must supply a validator to the {} mechanism in server mode.",
                mechanism
            ),
            ProtocolError::UnsupportedMechanism(name) => {
                write!(fmt, "The mechanism \"{}\" is not supported.", name)
            }
            ProtocolError::NoSecurityLayer(mechanism) => write!(
                fmt,
                "The {} mechanism does not support a security layer.",
                mechanism
            ),
            ProtocolError::NoSuitableMechanism(choices) => write!(
                fmt,
                "No supported SASL mechanisms could be found from the provided choices: {}",
                choices.join(", ")
            ),
        }
    }
}

impl error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ProtocolError::NonceGeneration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<hmac::digest::InvalidLength> for ProtocolError {
    fn from(err: hmac::digest::InvalidLength) -> ProtocolError {
        ProtocolError::InvalidKeyLength(err)
    }
}

impl From<getrandom::Error> for ProtocolError {
    fn from(err: getrandom::Error) -> ProtocolError {
        ProtocolError::NonceGeneration(err)
    }
}

/// Framing failures of a security-layer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Fewer than the four bytes of the length prefix are available.
    NotEnoughData,
    /// The prefix declares more bytes than are available.
    Incomplete {
        /// Length declared by the prefix.
        declared: usize,
        /// Bytes available after the prefix.
        available: usize,
    },
    /// The record is too long for the 32-bit length prefix.
    TooLarge(usize),
}

impl BufferError {
    /// Whether more bytes could complete the record.
    pub fn is_incomplete(&self) -> bool {
        !matches!(self, BufferError::TooLarge(_))
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BufferError::NotEnoughData => {
                write!(fmt, "Not enough data to unwrap the SASL buffer.")
            }
            BufferError::Incomplete { .. } => write!(fmt, "The SASL buffer is incomplete."),
            BufferError::TooLarge(length) => write!(
                fmt,
                "The SASL buffer of {} bytes does not fit a 32-bit length prefix.",
                length
            ),
        }
    }
}

impl error::Error for BufferError {}

/// Failures of the DIGEST-MD5 security layer while wrapping or unwrapping a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityLayerError {
    /// No security layer was negotiated on this context.
    NotNegotiated,
    /// The negotiated qop does not provide a security layer.
    UnsupportedQop(Option<String>),
    /// The cipher is unknown or was compiled out.
    UnsupportedCipher(String),
    /// The context lacks the named value needed to protect a record.
    MissingKeyMaterial(&'static str),
    /// The key material has the wrong length.
    InvalidKeyLength,
    /// The record is shorter than the trailing MAC block.
    TooShort {
        /// Minimum length.
        expected: usize,
        /// Length received.
        actual: usize,
    },
    /// The ciphertext is not a whole number of cipher blocks.
    InvalidBlockLength,
    /// The record's message type is not 1.
    MessageTypeMismatch(u16),
    /// The record's sequence number is not the one expected next.
    SequenceMismatch {
        /// Next expected sequence number.
        expected: u32,
        /// Sequence number carried by the record.
        received: u32,
    },
    /// The record's MAC does not verify.
    MacMismatch,
    /// The padding length is outside of `[1, block size]`.
    InvalidPaddingSize,
    /// The padding bytes are inconsistent.
    InvalidPadding,
    /// The record is larger than the negotiated maximum buffer size.
    BufferExceeded(u32),
}

impl fmt::Display for SecurityLayerError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SecurityLayerError::NotNegotiated => {
                write!(fmt, "No security layer was negotiated for this context.")
            }
            SecurityLayerError::UnsupportedQop(qop) => write!(
                fmt,
                "The qop option \"{}\" is not recognized as a security layer.",
                qop.as_deref().unwrap_or("")
            ),
            SecurityLayerError::UnsupportedCipher(cipher) => {
                write!(fmt, "The cipher \"{}\" is not supported.", cipher)
            }
            SecurityLayerError::MissingKeyMaterial(name) => {
                write!(fmt, "The security layer is missing the {} value.", name)
            }
            SecurityLayerError::InvalidKeyLength => {
                write!(fmt, "The security layer key material has an invalid length.")
            }
            SecurityLayerError::TooShort { expected, .. } => write!(
                fmt,
                "The wrapped data must be at least {} bytes.",
                expected
            ),
            SecurityLayerError::InvalidBlockLength => write!(
                fmt,
                "The encrypted data is not a multiple of the cipher block size."
            ),
            SecurityLayerError::MessageTypeMismatch(received) => write!(
                fmt,
                "The received message type of \"{}\" was unexpected.",
                received
            ),
            SecurityLayerError::SequenceMismatch { expected, received } => write!(
                fmt,
                "The received sequence number was unexpected. Expected {}, but got {}.",
                expected, received
            ),
            SecurityLayerError::MacMismatch => write!(
                fmt,
                "The received MAC does not match the expected MAC."
            ),
            SecurityLayerError::InvalidPaddingSize => {
                write!(fmt, "The padding size is not correct.")
            }
            SecurityLayerError::InvalidPadding => {
                write!(fmt, "The padding does not match the expected value.")
            }
            SecurityLayerError::BufferExceeded(maxbuf) => write!(
                fmt,
                "The wrapped buffer exceeds the maxbuf length of {}",
                maxbuf
            ),
        }
    }
}

impl error::Error for SecurityLayerError {}

/// A wrapper enum for things that could go wrong in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed wire data.
    Encoding(EncodingError),
    /// State machine misuse or an unacceptable offer from the peer.
    Protocol(ProtocolError),
    /// The record could not be framed; unless it is too large, more bytes are needed and the
    /// same call can be retried once they arrive.
    BufferIncomplete(BufferError),
    /// The security layer rejected a record.
    SecurityLayer(SecurityLayerError),
}

impl Error {
    /// Whether the caller should wait for more data and retry, rather than abandon the exchange.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BufferIncomplete(err) if err.is_incomplete())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Encoding(err) => write!(fmt, "{}", err),
            Error::Protocol(err) => write!(fmt, "{}", err),
            Error::BufferIncomplete(err) => write!(fmt, "{}", err),
            Error::SecurityLayer(err) => write!(fmt, "{}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Encoding(err) => Some(err),
            Error::Protocol(err) => Some(err),
            Error::BufferIncomplete(err) => Some(err),
            Error::SecurityLayer(err) => Some(err),
        }
    }
}

impl From<EncodingError> for Error {
    fn from(err: EncodingError) -> Error {
        Error::Encoding(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Error {
        Error::Protocol(err)
    }
}

impl From<BufferError> for Error {
    fn from(err: BufferError) -> Error {
        Error::BufferIncomplete(err)
    }
}

impl From<SecurityLayerError> for Error {
    fn from(err: SecurityLayerError) -> Error {
        Error::SecurityLayer(err)
    }
}

impl From<getrandom::Error> for Error {
    fn from(err: getrandom::Error) -> Error {
        Error::Protocol(ProtocolError::NonceGeneration(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_buffer_errors_are_retryable() {
        assert!(Error::from(BufferError::NotEnoughData).is_retryable());
        assert!(!Error::from(SecurityLayerError::MacMismatch).is_retryable());
        assert!(!Error::from(ProtocolError::RspauthOutOfOrder).is_retryable());
        assert!(!Error::from(EncodingError::ExpectedKey).is_retryable());
        assert!(!Error::from(BufferError::TooLarge(usize::MAX)).is_retryable());
    }

    #[test]
    fn nonce_failures_keep_their_source() {
        use std::error::Error as _;
        use std::num::NonZeroU32;

        let code = NonZeroU32::new(getrandom::Error::CUSTOM_START).unwrap();
        let err = Error::from(getrandom::Error::from(code));
        let inner = err.source().unwrap();
        assert!(inner.source().is_some());
        assert!(inner.to_string().starts_with("Unable to generate the nonce"));
    }

    #[test]
    fn display_delegates_to_the_inner_error() {
        let err = Error::from(SecurityLayerError::SequenceMismatch {
            expected: 0,
            received: 3,
        });
        assert_eq!(
            err.to_string(),
            "The received sequence number was unexpected. Expected 0, but got 3."
        );
        let err = Error::from(EncodingError::DuplicateDirective("nonce".to_owned()));
        assert_eq!(err.to_string(), "The option \"nonce\" may occur only once.");
    }
}
