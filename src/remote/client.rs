//! Connection object tying a transport to its target descriptor cache.

use super::{RequestParams, Transport};
use crate::core::error::TransportError;
use crate::target::{HostToolchain, NativeToolchain, RemoteTarget};
use std::sync::Arc;

/// A connection to one remote array server.
///
/// The client owns the [`RemoteTarget`] cache for that server, so target
/// properties are fetched once per connection and reused by every
/// compilation made through it.
pub struct Client {
    transport: Arc<dyn Transport>,
    target: Arc<RemoteTarget>,
    host: Arc<dyn HostToolchain>,
}

impl Client {
    /// Connect through `transport`, using the LLVM host for local facts.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_host(transport, Arc::new(NativeToolchain))
    }

    /// Connect with an explicit local toolchain description.
    pub fn with_host(transport: Arc<dyn Transport>, host: Arc<dyn HostToolchain>) -> Self {
        Self::with_target(Arc::new(RemoteTarget::new(transport)), host)
    }

    /// Connect through an existing descriptor cache and its transport.
    ///
    /// Clients built from the same `target` fetch each property once between
    /// them and share one feature negotiation.
    pub fn with_target(target: Arc<RemoteTarget>, host: Arc<dyn HostToolchain>) -> Self {
        Self {
            transport: Arc::clone(target.transport()),
            target,
            host,
        }
    }

    /// Send one command and wait for its reply.
    pub fn generic_msg(&self, command: &str, params: &RequestParams) -> Result<String, TransportError> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("sending `{}` {}", command, params.to_json());
        }
        self.transport.call(command, params)
    }

    /// Cached properties of the server's CPU.
    pub fn remote_target(&self) -> &Arc<RemoteTarget> {
        &self.target
    }

    /// The client's own toolchain.
    pub fn host(&self) -> &Arc<dyn HostToolchain> {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedTransport, StaticToolchain};

    #[test]
    fn test_clients_sharing_a_target_fetch_once() {
        let transport = Arc::new(ScriptedTransport::x86_64_server());
        let first = Client::with_host(transport.clone(), Arc::new(StaticToolchain::x86_64_client()));
        let second = Client::with_target(
            Arc::clone(first.remote_target()),
            Arc::new(StaticToolchain::x86_64_client()),
        );

        assert_eq!(first.remote_target().triple().unwrap(), "x86_64-pc-linux-gnu");
        assert_eq!(second.remote_target().triple().unwrap(), "x86_64-pc-linux-gnu");
        assert_eq!(transport.requests_for("triple"), 1);

        let params = RequestParams::new().with("request", "host");
        assert_eq!(second.generic_msg("jit1D", &params).unwrap(), "x86-64");
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_separate_clients_fetch_separately() {
        let transport = Arc::new(ScriptedTransport::x86_64_server());
        let first = Client::with_host(transport.clone(), Arc::new(StaticToolchain::x86_64_client()));
        let second = Client::with_host(transport.clone(), Arc::new(StaticToolchain::x86_64_client()));

        first.remote_target().layout().unwrap();
        second.remote_target().layout().unwrap();
        assert_eq!(transport.requests_for("layout"), 2);
    }
}
