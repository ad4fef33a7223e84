// ── Backend transport seam ──
//
// Everything the connection manager needs from the nurse-call backend,
// as one object-safe trait. Production hosts plug in a real client;
// `PlaceholderTransport` simulates the backend the way the station
// behaves before one is available, and `ScriptedTransport` lets tests
// force every outcome deterministically.

mod placeholder;
mod scripted;

use futures_util::future::BoxFuture;
use secrecy::SecretString;

use crate::config::Configuration;
use crate::error::HealthcareError;
use crate::model::{AuthGrant, CallRequest};

pub use placeholder::{PlaceholderTransport, SimulatedDelays};
pub use scripted::ScriptedTransport;

/// Capability to reach the nurse-call backend.
///
/// The manager wraps every call in the configured timeout, so
/// implementations need not enforce one themselves.
pub trait CallTransport: Send + Sync {
    /// Establish network reachability to `config.base_url`.
    fn open<'a>(&'a self, config: &'a Configuration) -> BoxFuture<'a, Result<(), HealthcareError>>;

    /// Exchange the API key for a session.
    fn authenticate<'a>(
        &'a self,
        config: &'a Configuration,
    ) -> BoxFuture<'a, Result<AuthGrant, HealthcareError>>;

    /// Deliver one call request under an existing session.
    fn deliver<'a>(
        &'a self,
        request: &'a CallRequest,
        session: &'a SecretString,
    ) -> BoxFuture<'a, Result<(), HealthcareError>>;

    /// Replace an existing session with a fresh one.
    fn refresh<'a>(
        &'a self,
        config: &'a Configuration,
        session: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthGrant, HealthcareError>>;
}
