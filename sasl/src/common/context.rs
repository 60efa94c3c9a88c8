use std::fmt;

use crate::common::Role;
use crate::mechanisms::digest_md5::sealing::SealingState;
use crate::mechanisms::digest_md5::{Cipher, Qop};

/// Default maximum size of a security layer record.
pub const DEFAULT_MAXBUF: u32 = 65536;

/// The state of one authentication exchange, owned by its challenge.
///
/// The status flags only ever go from false to true.
pub struct Context {
    role: Role,
    complete: bool,
    authenticated: bool,
    security_layer: bool,
    response: Option<Vec<u8>>,
    qop: Option<Qop>,
    cipher: Option<Cipher>,
    a1: Option<Vec<u8>>,
    verification: Option<String>,
    seqnum_sent: Option<u32>,
    seqnum_received: Option<u32>,
    maxbuf: u32,
    peer_maxbuf: u32,
    challenge: Option<String>,
    trace: Option<String>,
    pub(crate) sealing: Option<SealingState>,
}

impl fmt::Debug for Context {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Context")
            .field("role", &self.role)
            .field("complete", &self.complete)
            .field("authenticated", &self.authenticated)
            .field("security_layer", &self.security_layer)
            .field("response", &self.response.as_ref().map(|r| r.len()))
            .field("qop", &self.qop)
            .field("cipher", &self.cipher)
            .field("seqnum_sent", &self.seqnum_sent)
            .field("seqnum_received", &self.seqnum_received)
            .field("maxbuf", &self.maxbuf)
            .field("peer_maxbuf", &self.peer_maxbuf)
            .finish()
    }
}

impl Context {
    /// A fresh context for `role`.
    pub fn new(role: Role) -> Context {
        Context {
            role,
            complete: false,
            authenticated: false,
            security_layer: false,
            response: None,
            qop: None,
            cipher: None,
            a1: None,
            verification: None,
            seqnum_sent: None,
            seqnum_received: None,
            maxbuf: DEFAULT_MAXBUF,
            peer_maxbuf: DEFAULT_MAXBUF,
            challenge: None,
            trace: None,
            sealing: None,
        }
    }

    /// A context which has already negotiated a DIGEST-MD5 security layer.
    ///
    /// `a1` is the raw 16 byte session key. Useful to resume a layer whose key was negotiated
    /// elsewhere, and to check recorded traffic.
    pub fn with_security_layer(
        role: Role,
        qop: Qop,
        cipher: Option<Cipher>,
        a1: Vec<u8>,
    ) -> Context {
        let mut context = Context::new(role);
        context.mark_complete();
        context.mark_authenticated();
        context.set_qop(qop);
        context.a1 = Some(a1);
        context.cipher = cipher;
        context.install_security_layer();
        context
    }

    /// Which side of the exchange this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the exchange is over, successful or not.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether the peer proved its identity.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether application data must now go through the security layer.
    pub fn has_security_layer(&self) -> bool {
        self.security_layer
    }

    /// The bytes to send for this step, if any.
    pub fn response(&self) -> Option<&[u8]> {
        self.response.as_deref()
    }

    /// The negotiated quality of protection.
    pub fn qop(&self) -> Option<Qop> {
        self.qop
    }

    /// The negotiated cipher, for auth-conf.
    pub fn cipher(&self) -> Option<Cipher> {
        self.cipher
    }

    /// The raw session key.
    pub fn a1(&self) -> Option<&[u8]> {
        self.a1.as_deref()
    }

    /// The rspauth a client expects from the server.
    pub fn verification(&self) -> Option<&str> {
        self.verification.as_deref()
    }

    /// Sequence number of the next wrapped record.
    pub fn seqnum_sent(&self) -> Option<u32> {
        self.seqnum_sent
    }

    /// Sequence number expected on the next unwrapped record.
    pub fn seqnum_received(&self) -> Option<u32> {
        self.seqnum_received
    }

    /// Largest security layer record this side accepts, as it advertised.
    pub fn maxbuf(&self) -> u32 {
        self.maxbuf
    }

    /// Overrides the largest record this side accepts.
    pub fn set_maxbuf(&mut self, maxbuf: u32) {
        self.maxbuf = maxbuf;
    }

    /// Largest security layer record the peer accepts, as it advertised.
    pub fn peer_maxbuf(&self) -> u32 {
        self.peer_maxbuf
    }

    /// Overrides the largest record the peer accepts.
    pub fn set_peer_maxbuf(&mut self, maxbuf: u32) {
        self.peer_maxbuf = maxbuf;
    }

    /// The CRAM-MD5 challenge sent or received.
    pub fn challenge(&self) -> Option<&str> {
        self.challenge.as_deref()
    }

    /// The trace sent by an ANONYMOUS client.
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub(crate) fn install_security_layer(&mut self) {
        self.security_layer = true;
        self.seqnum_sent = Some(0);
        self.seqnum_received = Some(0);
        self.sealing = None;
    }

    pub(crate) fn set_response(&mut self, response: Option<Vec<u8>>) {
        self.response = response;
    }

    pub(crate) fn set_qop(&mut self, qop: Qop) {
        self.qop = Some(qop);
    }

    pub(crate) fn set_key_material(&mut self, a1: Vec<u8>, cipher: Option<Cipher>) {
        self.a1 = Some(a1);
        self.cipher = cipher;
    }

    pub(crate) fn set_verification(&mut self, verification: String) {
        self.verification = Some(verification);
    }

    pub(crate) fn set_challenge(&mut self, challenge: String) {
        self.challenge = Some(challenge);
    }

    pub(crate) fn set_trace(&mut self, trace: Option<String>) {
        self.trace = trace;
    }

    pub(crate) fn advance_seqnum_sent(&mut self) {
        self.seqnum_sent = self.seqnum_sent.map(|seq| seq.wrapping_add(1));
    }

    pub(crate) fn advance_seqnum_received(&mut self) {
        self.seqnum_received = self.seqnum_received.map(|seq| seq.wrapping_add(1));
    }
}
