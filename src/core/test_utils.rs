//! Test utilities for exercising compilation and dispatch without a server.
//!
//! [`ScriptedTransport`] plays the server: it answers property requests from
//! a table, answers execution requests from a queue, and records every call
//! so tests can count round trips. [`StaticToolchain`] stands in for the
//! local LLVM so feature negotiation doesn't depend on the test machine.

use crate::core::error::TransportError;
use crate::remote::{RequestParams, Transport};
use crate::target::HostToolchain;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One request seen by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub command: String,
    pub params: RequestParams,
}

impl RecordedCall {
    /// The `request` parameter, if any.
    pub fn request(&self) -> Option<&str> {
        self.params.get_str("request")
    }
}

/// Scripted stand-in for the remote array server.
#[derive(Default)]
pub struct ScriptedTransport {
    properties: HashMap<String, String>,
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `request = name` with `value`.
    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    /// The four properties of an x86-64 Linux server with `+sse2`.
    pub fn x86_64_server() -> Self {
        Self::new()
            .with_property("host", "x86-64")
            .with_property("triple", "x86_64-pc-linux-gnu")
            .with_property("layout", "e-m:e-i64:64-f80:128-n8:16:32:64-S128")
            .with_property("cpu_features", "+sse2")
    }

    /// Queue the reply to the next non-property request.
    pub fn push_reply(&self, reply: &str) {
        self.lock_replies().push_back(Ok(reply.to_string()));
    }

    /// Queue a failure for the next non-property request.
    pub fn push_failure(&self, message: &str) {
        self.lock_replies().push_back(Err(TransportError::new(message)));
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls whose `request` parameter was `request`.
    pub fn requests_for(&self, request: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.request() == Some(request))
            .count()
    }

    /// The most recent call whose `request` parameter was `request`.
    pub fn last_request(&self, request: &str) -> Option<RecordedCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.request() == Some(request))
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, TransportError>>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for ScriptedTransport {
    fn call(&self, command: &str, params: &RequestParams) -> Result<String, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                command: command.to_string(),
                params: params.clone(),
            });

        let request = params.get_str("request").unwrap_or_default();
        if let Some(value) = self.properties.get(request) {
            return Ok(value.clone());
        }

        self.lock_replies()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(format!("no scripted reply for `{}`", request))))
    }
}

/// Fixed description of the local toolchain.
#[derive(Debug, Clone)]
pub struct StaticToolchain {
    pub cpu_name: String,
    pub cpu_features: String,
    pub triple: String,
}

impl StaticToolchain {
    pub fn new(cpu_name: &str, cpu_features: &str, triple: &str) -> Self {
        Self {
            cpu_name: cpu_name.to_string(),
            cpu_features: cpu_features.to_string(),
            triple: triple.to_string(),
        }
    }

    /// An x86-64 client whose LLVM knows `sse2`, `avx` and `avx2`.
    pub fn x86_64_client() -> Self {
        Self::new("x86-64", "+sse2,+avx,-avx2", "x86_64-unknown-linux-gnu")
    }
}

impl HostToolchain for StaticToolchain {
    fn cpu_name(&self) -> String {
        self.cpu_name.clone()
    }

    fn cpu_features(&self) -> String {
        self.cpu_features.clone()
    }

    fn process_triple(&self) -> String {
        self.triple.clone()
    }
}
