//! The mechanism registry, and selection of the best mechanism both sides support.

use std::cmp::Reverse;

use log::debug;

use crate::common::Options;
use crate::error::{Error, ProtocolError};
use crate::mechanisms::Mechanism;

/// The set of mechanisms this end is willing to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sasl {
    mechanisms: Vec<Mechanism>,
}

impl Default for Sasl {
    fn default() -> Sasl {
        Sasl::new()
    }
}

impl Sasl {
    /// Registers every mechanism.
    pub fn new() -> Sasl {
        Sasl {
            mechanisms: Mechanism::ALL.to_vec(),
        }
    }

    /// Registers only the named mechanisms; an empty list registers every mechanism.
    pub fn with_supported(names: &[&str]) -> Sasl {
        let mut sasl = Sasl::new();
        if !names.is_empty() {
            sasl.mechanisms
                .retain(|mechanism| names.iter().any(|name| *name == mechanism.name()));
        }
        sasl
    }

    /// The registered mechanism called `name`.
    pub fn get(&self, name: &str) -> Result<Mechanism, Error> {
        Mechanism::from_name(name)
            .filter(|mechanism| self.mechanisms.contains(mechanism))
            .ok_or_else(|| ProtocolError::UnsupportedMechanism(name.to_owned()).into())
    }

    /// Whether a mechanism called `name` is registered.
    pub fn supports(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Registers `mechanism`, replacing any previous registration.
    pub fn add(&mut self, mechanism: Mechanism) -> &mut Sasl {
        if !self.mechanisms.contains(&mechanism) {
            self.mechanisms.push(mechanism);
        }
        self
    }

    /// Unregisters the mechanism called `name`, if present.
    pub fn remove(&mut self, name: &str) -> &mut Sasl {
        if let Some(mechanism) = Mechanism::from_name(name) {
            self.mechanisms.retain(|registered| *registered != mechanism);
        }
        self
    }

    /// The registered mechanisms.
    pub fn mechanisms(&self) -> &[Mechanism] {
        &self.mechanisms
    }

    /// Picks the strongest registered mechanism among `choices` (every registered mechanism
    /// when empty) that provides the integrity or privacy `options` ask for.
    pub fn select(&self, choices: &[&str], options: &Options) -> Result<Mechanism, Error> {
        let candidates = self.mechanisms.iter().copied().filter(|mechanism| {
            choices.is_empty()
                || choices
                    .iter()
                    .any(|choice| mechanism.name().eq_ignore_ascii_case(choice))
        });
        let selected = candidates
            .filter(|mechanism| {
                let strength = mechanism.security_strength();
                (!options.use_integrity || strength.supports_integrity())
                    && (!options.use_privacy || strength.supports_privacy())
            })
            .min_by_key(|mechanism| {
                let strength = mechanism.security_strength();
                (
                    Reverse(strength.supports_privacy()),
                    Reverse(strength.supports_integrity()),
                    Reverse(strength.max_key_size()),
                    Reverse(strength.supports_auth()),
                    strength.is_plaintext_auth(),
                )
            });

        match selected {
            Some(mechanism) => {
                debug!("Selected SASL mechanism {}", mechanism);
                Ok(mechanism)
            }
            None => Err(ProtocolError::NoSuitableMechanism(
                choices.iter().map(|choice| choice.to_string()).collect(),
            )
            .into()),
        }
    }
}
