// This module implements the remote target descriptor cache. The server's codegen
// parameters (CPU model name, target triple, data layout and CPU features) are fixed for the
// host it runs on, so each one is fetched once with a `jit1D` property request and kept in
// a write-once cell for the lifetime of the connection. There is no invalidation path: a
// server whose hardware changes needs a new Client. The negotiated feature string derived
// from the server's features and the local toolchain's lives here too, in its own cell,
// so every cross-target code generator built for this connection shares one negotiation.

//! Write-once cache of the remote server's codegen parameters.

use super::features::negotiate;
use super::host::HostToolchain;
use crate::core::error::PropertyRetrievalError;
use crate::remote::{RequestParams, Transport, JIT_COMMAND};
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Codegen parameters the server can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetProperty {
    Host,
    Triple,
    Layout,
    CpuFeatures,
}

impl TargetProperty {
    pub const ALL: [TargetProperty; 4] = [
        TargetProperty::Host,
        TargetProperty::Triple,
        TargetProperty::Layout,
        TargetProperty::CpuFeatures,
    ];

    /// Name used in the `request` parameter.
    pub fn wire_name(&self) -> &'static str {
        match self {
            TargetProperty::Host => "host",
            TargetProperty::Triple => "triple",
            TargetProperty::Layout => "layout",
            TargetProperty::CpuFeatures => "cpu_features",
        }
    }

    pub fn from_wire(name: &str) -> Option<TargetProperty> {
        Self::ALL.into_iter().find(|p| p.wire_name() == name)
    }
}

impl fmt::Display for TargetProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Cached codegen parameters of one remote server.
///
/// Each property is requested on first access and never again. Population
/// happens during compilation, which callers serialize through
/// [`CpuTarget::lock`](crate::codegen::CpuTarget::lock); reads of filled
/// cells are safe from any thread.
pub struct RemoteTarget {
    transport: Arc<dyn Transport>,
    host: OnceLock<String>,
    triple: OnceLock<String>,
    layout: OnceLock<String>,
    cpu_features: OnceLock<String>,
    negotiated: OnceLock<String>,
}

impl RemoteTarget {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            host: OnceLock::new(),
            triple: OnceLock::new(),
            layout: OnceLock::new(),
            cpu_features: OnceLock::new(),
            negotiated: OnceLock::new(),
        }
    }

    /// Transport the properties are fetched through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn cell(&self, property: TargetProperty) -> &OnceLock<String> {
        match property {
            TargetProperty::Host => &self.host,
            TargetProperty::Triple => &self.triple,
            TargetProperty::Layout => &self.layout,
            TargetProperty::CpuFeatures => &self.cpu_features,
        }
    }

    /// Value of `property`, fetching it on first use.
    pub fn get(&self, property: TargetProperty) -> Result<&str, PropertyRetrievalError> {
        let cell = self.cell(property);
        if let Some(value) = cell.get() {
            return Ok(value.as_str());
        }

        let value = self.fetch(property)?;
        log::debug!("remote target {} = {}", property, value);
        Ok(cell.get_or_init(|| value).as_str())
    }

    /// Whether `property` has already been fetched.
    pub fn is_cached(&self, property: TargetProperty) -> bool {
        self.cell(property).get().is_some()
    }

    fn fetch(&self, property: TargetProperty) -> Result<String, PropertyRetrievalError> {
        let name = property.wire_name();
        let params = RequestParams::new().with("request", name);

        let reply = self
            .transport
            .call(JIT_COMMAND, &params)
            .map_err(|source| PropertyRetrievalError::Transport {
                property: name,
                source,
            })?;

        let value = reply.trim();
        // A server whose LLVM reports no features answers with an empty list.
        let well_formed = match property {
            TargetProperty::CpuFeatures => !value.contains('\n'),
            TargetProperty::Layout => is_valid_layout(value),
            TargetProperty::Host | TargetProperty::Triple => !value.is_empty() && !value.contains('\n'),
        };
        if !well_formed {
            return Err(PropertyRetrievalError::Malformed {
                property: name,
                reply,
            });
        }
        Ok(value.to_string())
    }

    pub fn host(&self) -> Result<&str, PropertyRetrievalError> {
        self.get(TargetProperty::Host)
    }

    pub fn triple(&self) -> Result<&str, PropertyRetrievalError> {
        self.get(TargetProperty::Triple)
    }

    pub fn layout(&self) -> Result<&str, PropertyRetrievalError> {
        self.get(TargetProperty::Layout)
    }

    pub fn cpu_features(&self) -> Result<&str, PropertyRetrievalError> {
        self.get(TargetProperty::CpuFeatures)
    }

    /// Server features restricted to names the local toolchain knows.
    ///
    /// Negotiated once; later calls return the first result even when given
    /// a different toolchain.
    pub fn negotiated_features(&self, local: &dyn HostToolchain) -> Result<&str, PropertyRetrievalError> {
        if let Some(common) = self.negotiated.get() {
            return Ok(common.as_str());
        }

        let remote = self.cpu_features()?;
        let common = negotiate(remote, &local.cpu_features());
        log::info!("negotiated target features: {}", common);
        Ok(self.negotiated.get_or_init(|| common).as_str())
    }
}

/// Whether LLVM accepts `layout` as a data layout string.
///
/// Goes through the IR parser, which reports a bad layout as a parse error.
/// Building a `TargetData` from the same string aborts the process instead.
fn is_valid_layout(layout: &str) -> bool {
    if layout.is_empty() || layout.contains(|c: char| matches!(c, '"' | '\\' | '\n')) {
        return false;
    }
    let context = Context::create();
    let source = format!("target datalayout = \"{}\"\n", layout);
    let buffer = MemoryBuffer::create_from_memory_range_copy(source.as_bytes(), "layout");
    let valid = context.create_module_from_ir(buffer).is_ok();
    valid
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("host", &self.host.get())
            .field("triple", &self.triple.get())
            .field("layout", &self.layout.get())
            .field("cpu_features", &self.cpu_features.get())
            .field("negotiated", &self.negotiated.get())
            .finish()
    }
}
