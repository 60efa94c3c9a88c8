//! Provides the SASL "CRAM-MD5" mechanism, as described in RFC 2195.

use std::str;

use log::{debug, warn};

use crate::common::{generate_nonce, Context, Options, Role, DEFAULT_NONCE_SIZE};
use crate::error::{EncodingError, Error, ProtocolError};
use crate::mechanisms::digest_md5::compute::hmac_md5;

/// The keyed digest a client proves its password with: hex HMAC-MD5 of the challenge.
pub fn digest(password: &str, challenge: &str) -> Result<String, ProtocolError> {
    Ok(hex::encode(hmac_md5(password.as_bytes(), &[challenge.as_bytes()])?))
}

/// Decodes a server challenge, which must be enclosed in angle brackets.
pub fn decode_challenge(data: &[u8]) -> Result<String, EncodingError> {
    let challenge = str::from_utf8(data).map_err(|_| EncodingError::InvalidUtf8)?;
    if challenge.len() < 2 || !challenge.starts_with('<') || !challenge.ends_with('>') {
        return Err(EncodingError::CramMd5MalformedChallenge);
    }
    Ok(challenge.to_owned())
}

/// Decodes a client response into its username and digest.
pub fn decode_response(data: &[u8]) -> Result<(String, String), EncodingError> {
    let response = str::from_utf8(data).map_err(|_| EncodingError::InvalidUtf8)?;
    let (username, digest) = response
        .rsplit_once(' ')
        .ok_or(EncodingError::CramMd5MalformedResponse)?;
    if username.is_empty() {
        return Err(EncodingError::CramMd5MissingField("username"));
    }
    if digest.is_empty() {
        return Err(EncodingError::CramMd5MissingField("digest"));
    }
    let is_hex = digest
        .bytes()
        .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
    if digest.len() != 32 || !is_hex {
        return Err(EncodingError::CramMd5MalformedDigest);
    }
    Ok((username.to_owned(), digest.to_owned()))
}

/// One CRAM-MD5 exchange.
#[derive(Debug)]
pub struct CramMd5Challenge {
    context: Context,
}

impl CramMd5Challenge {
    /// Starts an exchange as `role`.
    pub fn new(role: Role) -> CramMd5Challenge {
        CramMd5Challenge {
            context: Context::new(role),
        }
    }

    /// Runs one step: the server opens with a challenge, the client answers it and the
    /// server checks the answer with its `cram_md5_validator`.
    pub fn challenge(
        &mut self,
        received: Option<&[u8]>,
        options: &Options,
    ) -> Result<&Context, Error> {
        self.context.set_response(None);
        match (self.context.role(), received) {
            (Role::Server, None) => self.send_challenge(options)?,
            (Role::Server, Some(data)) => self.verify_response(data, options)?,
            (Role::Client, Some(data)) => self.send_response(data, options)?,
            (Role::Client, None) => (),
        }
        Ok(&self.context)
    }

    /// The state of the exchange.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the state.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Ends the exchange, keeping its state.
    pub fn into_context(self) -> Context {
        self.context
    }

    fn send_challenge(&mut self, options: &Options) -> Result<(), Error> {
        let nonce = match options.challenge {
            Some(ref challenge) => challenge.clone(),
            None => generate_nonce(options.nonce_size.unwrap_or(DEFAULT_NONCE_SIZE))?,
        };
        let challenge = if nonce.starts_with('<') && nonce.ends_with('>') && nonce.len() >= 2 {
            nonce
        } else {
            format!("<{}>", nonce)
        };
        self.context.set_response(Some(challenge.as_bytes().to_vec()));
        self.context.set_challenge(challenge);
        Ok(())
    }

    fn send_response(&mut self, data: &[u8], options: &Options) -> Result<(), Error> {
        let missing = |option| ProtocolError::MissingOption {
            mechanism: "CRAM-MD5",
            option,
        };
        let username = options.username.as_ref().ok_or_else(|| missing("username"))?;
        let password = options.password.as_ref().ok_or_else(|| missing("password"))?;
        let challenge = decode_challenge(data)?;
        let response = format!("{} {}", username, digest(password, &challenge)?);
        self.context.set_response(Some(response.into_bytes()));
        self.context.set_challenge(challenge);
        self.context.mark_complete();
        Ok(())
    }

    fn verify_response(&mut self, data: &[u8], options: &Options) -> Result<(), Error> {
        let validator = options
            .cram_md5_validator
            .as_ref()
            .ok_or(ProtocolError::MissingValidator("CRAM-MD5"))?;
        let (username, digest) = decode_response(data)?;
        self.context.mark_complete();
        let expected = match self.context.challenge() {
            Some(challenge) => validator.expected_digest(&username, challenge),
            None => {
                warn!("CRAM-MD5 response from {} before any challenge", username);
                return Ok(());
            }
        };
        if expected.as_deref() == Some(digest.as_str()) {
            debug!("CRAM-MD5 login for {}", username);
            self.context.mark_authenticated();
        } else {
            warn!("CRAM-MD5 login rejected for {}", username);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str = "<1896.697170952@postoffice.reston.mci.net>";

    fn server_options() -> Options {
        Options::default()
            .with_challenge(CHALLENGE)
            .with_cram_md5_validator(|username: &str, challenge: &str| {
                if username == "tim" {
                    digest("tanstaaftanstaaf", challenge).ok()
                } else {
                    None
                }
            })
    }

    #[test]
    fn rfc_digest() {
        assert_eq!(
            digest("tanstaaftanstaaf", CHALLENGE).unwrap(),
            "b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[test]
    fn client_answers_challenge() {
        let mut challenge = CramMd5Challenge::new(Role::Client);
        let options = Options::default()
            .with_username("foo")
            .with_password("bar");
        let context = challenge.challenge(None, &options).unwrap();
        assert_eq!(context.response(), None);
        assert!(!context.is_complete());

        let context = challenge.challenge(Some(b"<foobar>"), &options).unwrap();
        assert_eq!(
            context.response(),
            Some(&b"foo e23c893e9de272d4a75e646265768a45"[..])
        );
        assert!(context.is_complete());
    }

    #[test]
    fn client_rejects_unbracketed_challenge() {
        let mut challenge = CramMd5Challenge::new(Role::Client);
        let options = Options::default()
            .with_username("foo")
            .with_password("bar");
        assert_eq!(
            challenge.challenge(Some(b"foo"), &options).unwrap_err(),
            Error::Encoding(EncodingError::CramMd5MalformedChallenge)
        );
    }

    #[test]
    fn server_sends_bracketed_challenge() {
        let mut challenge = CramMd5Challenge::new(Role::Server);
        let options = Options::default().with_challenge("abc");
        let context = challenge.challenge(None, &options).unwrap();
        assert_eq!(context.response(), Some(&b"<abc>"[..]));
        assert_eq!(context.challenge(), Some("<abc>"));

        let mut challenge = CramMd5Challenge::new(Role::Server);
        let context = challenge.challenge(None, &Options::default()).unwrap();
        let sent = context.challenge().unwrap();
        assert!(sent.starts_with('<') && sent.ends_with('>'));
        assert_eq!(context.response(), Some(sent.as_bytes()));
    }

    #[test]
    fn server_verifies_digest() {
        let options = server_options();
        let mut challenge = CramMd5Challenge::new(Role::Server);
        challenge.challenge(None, &options).unwrap();
        let context = challenge
            .challenge(Some(b"tim b913a602c7eda7a495b4e6e7334d3890"), &options)
            .unwrap();
        assert!(context.is_complete());
        assert!(context.is_authenticated());

        let mut challenge = CramMd5Challenge::new(Role::Server);
        challenge.challenge(None, &options).unwrap();
        let context = challenge
            .challenge(Some(b"bob b913a602c7eda7a495b4e6e7334d3890"), &options)
            .unwrap();
        assert!(context.is_complete());
        assert!(!context.is_authenticated());
    }

    #[test]
    fn server_needs_a_validator() {
        let mut challenge = CramMd5Challenge::new(Role::Server);
        challenge.challenge(None, &Options::default()).unwrap();
        assert_eq!(
            challenge
                .challenge(Some(b"tim b913a602c7eda7a495b4e6e7334d3890"), &Options::default())
                .unwrap_err(),
            Error::Protocol(ProtocolError::MissingValidator("CRAM-MD5"))
        );
    }

    #[test]
    fn response_grammar() {
        assert_eq!(
            decode_response(b"tim"),
            Err(EncodingError::CramMd5MalformedResponse)
        );
        assert_eq!(
            decode_response(b"tim B913A602C7EDA7A495B4E6E7334D3890"),
            Err(EncodingError::CramMd5MalformedDigest)
        );
        assert_eq!(
            decode_response(b" b913a602c7eda7a495b4e6e7334d3890"),
            Err(EncodingError::CramMd5MissingField("username"))
        );
        assert_eq!(
            decode_response(b"tim smith b913a602c7eda7a495b4e6e7334d3890").unwrap(),
            (
                "tim smith".to_owned(),
                "b913a602c7eda7a495b4e6e7334d3890".to_owned()
            )
        );
    }
}
