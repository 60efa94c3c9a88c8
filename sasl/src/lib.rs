#![deny(missing_docs)]

//! This crate provides a SASL negotiation engine for the ANONYMOUS, PLAIN, CRAM-MD5 and
//! DIGEST-MD5 mechanisms, both as a client and as a server, and the DIGEST-MD5 security layer.
//!
//! # Examples
//!
//! ```rust
//! use sasl_engine::{Mechanism, Options, Role};
//!
//! let options = Options::default()
//!     .with_username("user")
//!     .with_password("pencil");
//!
//! let mut client = Mechanism::Plain.challenge(Role::Client);
//! let context = client.challenge(None, &options).unwrap();
//! let message = context.response().unwrap().to_vec();
//! assert_eq!(message, b"user\0user\0pencil");
//!
//! let options = Options::default().with_plain_validator(|_: &str, authcid: &str, password: &str| {
//!     authcid == "user" && password == "pencil"
//! });
//! let mut server = Mechanism::Plain.challenge(Role::Server);
//! let context = server.challenge(Some(message.as_slice()), &options).unwrap();
//! assert!(context.is_authenticated());
//! ```
//!
//! Each call to `challenge` takes the message received from the peer, if any, and leaves the
//! message to send back in the returned `Context`. Once a DIGEST-MD5 exchange negotiated
//! `auth-int` or `auth-conf`, the mechanism's `SecurityLayer` wraps and unwraps application
//! data with that context. You may look at `tests/digest_md5_exchange.rs` for a full exchange.
//!
//! # Usage
//!
//! You can use this in your crate by adding this under `dependencies` in your `Cargo.toml`:
//!
//! ```toml,ignore
//! sasl-engine = "*"
//! ```
//!
//! The `des` and `rc4` features, both on by default, provide the DIGEST-MD5 ciphers.

mod error;

pub mod buffer;
pub mod common;
pub mod mechanisms;
pub mod selector;

pub use crate::common::{
    generate_nonce, Context, CramMd5Validator, Message, Options, PlainValidator, Role, Value,
};
pub use crate::error::{BufferError, EncodingError, Error, ProtocolError, SecurityLayerError};
pub use crate::mechanisms::digest_md5::{Cipher, Qop};
pub use crate::mechanisms::{Challenge, Mechanism, SecurityLayer, SecurityStrength};
pub use crate::selector::Sasl;
