//! Provides the SASL "PLAIN" mechanism, as described in RFC 4616.

use std::str;

use log::{debug, warn};

use crate::common::{Context, Options, Role};
use crate::error::{EncodingError, Error, ProtocolError};

/// The fields of a PLAIN message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainMessage {
    /// The identity to act as; may be empty.
    pub authzid: String,
    /// The identity whose password is given.
    pub authcid: String,
    /// The password.
    pub password: String,
}

/// Encodes `authzid NUL authcid NUL password`.
pub fn encode(message: &PlainMessage) -> Result<Vec<u8>, EncodingError> {
    let fields = [&message.authzid, &message.authcid, &message.password];
    if fields.iter().any(|field| field.contains('\0')) {
        return Err(EncodingError::PlainContainsNull);
    }
    Ok(format!("{}\0{}\0{}", message.authzid, message.authcid, message.password).into_bytes())
}

/// Decodes a client message, which must have all three fields.
pub fn decode(data: &[u8]) -> Result<PlainMessage, EncodingError> {
    let text = str::from_utf8(data).map_err(|_| EncodingError::InvalidUtf8)?;
    let fields: Vec<&str> = text.split('\0').collect();
    if fields.len() != 3 {
        return Err(EncodingError::PlainMalformed);
    }
    if fields[1].is_empty() {
        return Err(EncodingError::PlainMissingField("authcid"));
    }
    if fields[2].is_empty() {
        return Err(EncodingError::PlainMissingField("password"));
    }
    Ok(PlainMessage {
        authzid: fields[0].to_owned(),
        authcid: fields[1].to_owned(),
        password: fields[2].to_owned(),
    })
}

/// One PLAIN exchange.
#[derive(Debug)]
pub struct PlainChallenge {
    context: Context,
}

impl PlainChallenge {
    /// Starts an exchange as `role`.
    pub fn new(role: Role) -> PlainChallenge {
        PlainChallenge {
            context: Context::new(role),
        }
    }

    /// The client sends its credentials at once; the server checks them with its
    /// `plain_validator`.
    pub fn challenge(
        &mut self,
        received: Option<&[u8]>,
        options: &Options,
    ) -> Result<&Context, Error> {
        self.context.set_response(None);
        match (self.context.role(), received) {
            (Role::Client, _) => self.send_credentials(options)?,
            (Role::Server, Some(data)) => self.check_credentials(data, options)?,
            (Role::Server, None) => (),
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

    fn send_credentials(&mut self, options: &Options) -> Result<(), Error> {
        let missing = |option| ProtocolError::MissingOption {
            mechanism: "PLAIN",
            option,
        };
        let username = options.username.as_ref().ok_or_else(|| missing("username"))?;
        let password = options.password.as_ref().ok_or_else(|| missing("password"))?;
        let message = PlainMessage {
            authzid: options.authzid.clone().unwrap_or_else(|| username.clone()),
            authcid: username.clone(),
            password: password.clone(),
        };
        self.context.set_response(Some(encode(&message)?));
        self.context.mark_complete();
        Ok(())
    }

    fn check_credentials(&mut self, data: &[u8], options: &Options) -> Result<(), Error> {
        let validator = options
            .plain_validator
            .as_ref()
            .ok_or(ProtocolError::MissingValidator("PLAIN"))?;
        let message = decode(data)?;
        self.context.mark_complete();
        if validator.validate(&message.authzid, &message.authcid, &message.password) {
            debug!("PLAIN login for {}", message.authcid);
            self.context.mark_authenticated();
        } else {
            warn!("PLAIN login rejected for {}", message.authcid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_options() -> Options {
        Options::default().with_plain_validator(|authzid: &str, authcid: &str, password: &str| {
            authzid == authcid && authcid == "user" && password == "pencil"
        })
    }

    #[test]
    fn client_sends_credentials() {
        let mut challenge = PlainChallenge::new(Role::Client);
        let options = Options::default()
            .with_username("user")
            .with_password("pencil");
        let context = challenge.challenge(None, &options).unwrap();
        assert_eq!(context.response(), Some(&b"user\0user\0pencil"[..]));
        assert!(context.is_complete());
        assert!(!context.is_authenticated());
    }

    #[test]
    fn client_uses_authzid() {
        let mut challenge = PlainChallenge::new(Role::Client);
        let options = Options::default()
            .with_username("user")
            .with_password("pencil")
            .with_authzid("admin");
        let context = challenge.challenge(None, &options).unwrap();
        assert_eq!(context.response(), Some(&b"admin\0user\0pencil"[..]));
    }

    #[test]
    fn client_needs_username_and_password() {
        let mut challenge = PlainChallenge::new(Role::Client);
        assert_eq!(
            challenge
                .challenge(None, &Options::default().with_username("user"))
                .unwrap_err(),
            Error::Protocol(ProtocolError::MissingOption {
                mechanism: "PLAIN",
                option: "password"
            })
        );
    }

    #[test]
    fn server_validates() {
        let mut challenge = PlainChallenge::new(Role::Server);
        let context = challenge
            .challenge(Some(b"user\0user\0pencil"), &server_options())
            .unwrap();
        assert!(context.is_complete());
        assert!(context.is_authenticated());

        let mut challenge = PlainChallenge::new(Role::Server);
        let context = challenge
            .challenge(Some(b"user\0user\0wrong"), &server_options())
            .unwrap();
        assert!(context.is_complete());
        assert!(!context.is_authenticated());
    }

    #[test]
    fn server_needs_a_validator() {
        let mut challenge = PlainChallenge::new(Role::Server);
        assert_eq!(
            challenge
                .challenge(Some(b"user\0user\0pencil"), &Options::default())
                .unwrap_err(),
            Error::Protocol(ProtocolError::MissingValidator("PLAIN"))
        );
    }

    #[test]
    fn encoding_rules() {
        assert_eq!(decode(b"user\0pencil"), Err(EncodingError::PlainMalformed));
        assert_eq!(
            decode(b"\0\0pencil"),
            Err(EncodingError::PlainMissingField("authcid"))
        );
        assert_eq!(
            decode(b"\0user\0"),
            Err(EncodingError::PlainMissingField("password"))
        );
        assert_eq!(
            decode(b"\0user\0pencil").unwrap().authzid,
            ""
        );
        let message = PlainMessage {
            authzid: String::new(),
            authcid: "us\0er".to_owned(),
            password: "pencil".to_owned(),
        };
        assert_eq!(encode(&message), Err(EncodingError::PlainContainsNull));
    }
}
