//! Builds the three DIGEST-MD5 message shapes.

use crate::common::{
    env_fallback, generate_nonce, Message, Options, Value, DEFAULT_MAXBUF, DEFAULT_NONCE_SIZE,
};
use crate::error::{Error, ProtocolError};
use crate::mechanisms::digest_md5::{Cipher, Qop};

/// Which message to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// The client's answer to a challenge.
    ClientResponse,
    /// The server's initial challenge.
    ServerChallenge,
    /// The server's final `rspauth` message.
    ServerResponse,
}

/// Creates DIGEST-MD5 messages from options and the message they answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFactory;

impl MessageFactory {
    /// Builds a message of `kind`; a client response needs the `received` challenge.
    pub fn create(
        kind: MessageType,
        options: &Options,
        received: Option<&Message>,
    ) -> Result<Message, Error> {
        match (kind, received) {
            (MessageType::ServerChallenge, None) => server_challenge(options),
            (MessageType::ClientResponse, Some(challenge)) => client_response(options, challenge),
            (MessageType::ServerResponse, _) => server_response(options),
            _ => Err(ProtocolError::UnrecognizedMessageType.into()),
        }
    }
}

fn server_challenge(options: &Options) -> Result<Message, Error> {
    let nonce = match &options.nonce {
        Some(nonce) => nonce.clone(),
        None => generate_nonce(options.nonce_size.unwrap_or(DEFAULT_NONCE_SIZE))?,
    };

    let mut qop = vec![Qop::Auth.as_str().to_owned()];
    if options.use_integrity {
        qop.push(Qop::AuthInt.as_str().to_owned());
    }
    if options.use_privacy {
        qop.push(Qop::AuthConf.as_str().to_owned());
    }

    let realm = options
        .realm
        .clone()
        .or_else(|| env_fallback(&["USERDOMAIN", "HOSTNAME"]))
        .unwrap_or_else(|| "localhost".to_owned());

    let mut challenge = Message::new()
        .with("algorithm", "md5-sess")
        .with("nonce", nonce)
        .with("qop", qop)
        .with("realm", realm)
        .with("maxbuf", options.maxbuf.unwrap_or(DEFAULT_MAXBUF))
        .with("charset", "utf-8");

    if options.use_privacy {
        // Advertised in preference order, not in the order of the options.
        let ciphers: Vec<String> = Cipher::SERVER_PREFERENCE
            .iter()
            .filter(|cipher| options.cipher.is_empty() || options.cipher.contains(*cipher))
            .filter(|cipher| cipher.is_available())
            .map(|cipher| cipher.as_str().to_owned())
            .collect();
        if ciphers.is_empty() {
            return Err(ProtocolError::NoAvailableCiphers.into());
        }
        challenge.set("cipher", ciphers);
    }

    Ok(challenge)
}

fn client_response(options: &Options, challenge: &Message) -> Result<Message, Error> {
    let qop = select_qop(options, challenge)?;
    let realm = match &options.realm {
        Some(realm) => realm.clone(),
        None => match challenge.get("realm").map(Value::as_list) {
            Some(realms) if realms.len() == 1 => realms[0].to_owned(),
            _ => return Err(ProtocolError::NoRealm.into()),
        },
    };
    let username = options
        .username
        .clone()
        .or_else(|| env_fallback(&["USERNAME", "USER"]))
        .ok_or(ProtocolError::NoUsername)?;
    let nonce = match &options.nonce {
        Some(nonce) => nonce.clone(),
        None => challenge
            .get_str("nonce")
            .ok_or(ProtocolError::MissingDirective("nonce"))?
            .to_owned(),
    };
    let cnonce = match &options.cnonce {
        Some(cnonce) => cnonce.clone(),
        None => generate_nonce(options.nonce_size.unwrap_or(DEFAULT_NONCE_SIZE))?,
    };
    let digest_uri = match (&options.digest_uri, &options.service) {
        (Some(digest_uri), _) => digest_uri.clone(),
        (None, Some(service)) => match &options.host {
            Some(host) => format!("{}/{}", service, host),
            None => format!("{}/{}", service, realm),
        },
        (None, None) => return Err(ProtocolError::NoService.into()),
    };

    let mut response = Message::new()
        .with("algorithm", "md5-sess")
        .with("nonce", nonce)
        .with("cnonce", cnonce)
        .with("nc", options.nc.unwrap_or(1))
        .with("qop", qop.as_str())
        .with("username", username)
        .with("realm", realm)
        .with("digest-uri", digest_uri);
    if let Some(authzid) = &options.authzid {
        response.set("authzid", authzid.as_str());
    }
    if let Some(maxbuf) = options.maxbuf {
        response.set("maxbuf", maxbuf);
    }
    if qop == Qop::AuthConf {
        response.set("cipher", select_cipher(options, challenge)?.as_str());
    }

    Ok(response)
}

fn server_response(options: &Options) -> Result<Message, Error> {
    let rspauth = options
        .rspauth
        .as_deref()
        .ok_or(ProtocolError::MissingRspauth)?;
    Ok(Message::new().with("rspauth", rspauth))
}

fn select_qop(options: &Options, challenge: &Message) -> Result<Qop, ProtocolError> {
    let mut offered: Vec<&str> = challenge
        .get("qop")
        .map(|qop| qop.as_list())
        .unwrap_or_default()
        .into_iter()
        .filter(|qop| !qop.is_empty())
        .collect();
    if offered.is_empty() {
        offered.push(Qop::Auth.as_str());
    }
    let wanted = match options.qop {
        Some(qop) => vec![qop],
        None => vec![Qop::AuthConf, Qop::AuthInt, Qop::Auth],
    };
    wanted
        .into_iter()
        .find(|qop| offered.contains(&qop.as_str()))
        .ok_or_else(|| {
            ProtocolError::QopUnavailable(offered.iter().map(|s| s.to_string()).collect())
        })
}

fn select_cipher(options: &Options, challenge: &Message) -> Result<Cipher, ProtocolError> {
    let offered = match challenge.get("cipher") {
        Some(offered) if !offered.as_list().is_empty() => offered.as_list(),
        _ => return Err(ProtocolError::NoChallengeCiphers),
    };
    let wanted: &[Cipher] = if options.cipher.is_empty() {
        &Cipher::CLIENT_PREFERENCE
    } else {
        &options.cipher
    };
    wanted
        .iter()
        .copied()
        .find(|cipher| cipher.is_available() && offered.contains(&cipher.as_str()))
        .ok_or_else(|| {
            ProtocolError::CipherUnavailable(offered.iter().map(|s| s.to_string()).collect())
        })
}
