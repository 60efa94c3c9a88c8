//! Provides the SASL "ANONYMOUS" mechanism, as described in RFC 4505.

use std::str;

use log::debug;

use crate::common::{Context, Options, Role};
use crate::error::{EncodingError, Error};

/// Encodes the optional trace a client sends.
pub fn encode(trace: Option<&str>) -> Vec<u8> {
    trace.map(|trace| trace.as_bytes().to_vec()).unwrap_or_default()
}

/// Decodes a client message; an empty message carries no trace.
pub fn decode(data: &[u8]) -> Result<Option<String>, EncodingError> {
    if data.is_empty() {
        return Ok(None);
    }
    let trace = str::from_utf8(data).map_err(|_| EncodingError::InvalidUtf8)?;
    Ok(Some(trace.to_owned()))
}

/// One ANONYMOUS exchange.
#[derive(Debug)]
pub struct AnonymousChallenge {
    context: Context,
}

impl AnonymousChallenge {
    /// Starts an exchange as `role`.
    pub fn new(role: Role) -> AnonymousChallenge {
        AnonymousChallenge {
            context: Context::new(role),
        }
    }

    /// The client sends its trace at once; the server accepts whatever it receives.
    pub fn challenge(
        &mut self,
        received: Option<&[u8]>,
        options: &Options,
    ) -> Result<&Context, Error> {
        self.context.set_response(None);
        match self.context.role() {
            Role::Client => {
                let trace = options.trace.as_deref().or(options.username.as_deref());
                self.context.set_response(Some(encode(trace)));
                self.context.mark_complete();
                self.context.mark_authenticated();
            }
            Role::Server => {
                if let Some(data) = received {
                    let trace = decode(data)?;
                    debug!("ANONYMOUS login with trace {:?}", trace);
                    self.context.set_trace(trace);
                    self.context.mark_complete();
                    self.context.mark_authenticated();
                }
            }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_sends_trace() {
        let mut challenge = AnonymousChallenge::new(Role::Client);
        let options = Options::default()
            .with_username("user")
            .with_trace("sirhc");
        let context = challenge.challenge(None, &options).unwrap();
        assert_eq!(context.response(), Some(&b"sirhc"[..]));
        assert!(context.is_complete());
        assert!(context.is_authenticated());
    }

    #[test]
    fn client_falls_back_to_username() {
        let mut challenge = AnonymousChallenge::new(Role::Client);
        let options = Options::default().with_username("user");
        let context = challenge.challenge(None, &options).unwrap();
        assert_eq!(context.response(), Some(&b"user"[..]));

        let mut challenge = AnonymousChallenge::new(Role::Client);
        let context = challenge.challenge(None, &Options::default()).unwrap();
        assert_eq!(context.response(), Some(&b""[..]));
    }

    #[test]
    fn server_waits_then_accepts() {
        let mut challenge = AnonymousChallenge::new(Role::Server);
        let context = challenge.challenge(None, &Options::default()).unwrap();
        assert!(!context.is_complete());

        let context = challenge
            .challenge(Some(b"sirhc"), &Options::default())
            .unwrap();
        assert!(context.is_complete());
        assert!(context.is_authenticated());
        assert_eq!(context.trace(), Some("sirhc"));
        assert_eq!(context.response(), None);
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert_eq!(decode(b"\xff"), Err(EncodingError::InvalidUtf8));
        assert_eq!(decode(b""), Ok(None));
    }
}
