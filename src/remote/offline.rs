//! Transport that answers target queries from fixed values.

use super::{RequestParams, Transport, JIT_COMMAND};
use crate::core::error::TransportError;
use crate::target::TargetProperty;

/// Answers target property queries without a server.
///
/// Useful for producing IR for a known machine ahead of time. Execution
/// requests are refused since there is nothing to run them on.
#[derive(Debug, Clone)]
pub struct OfflineTransport {
    pub host: String,
    pub triple: String,
    pub layout: String,
    pub cpu_features: String,
}

impl OfflineTransport {
    fn property(&self, property: TargetProperty) -> &str {
        match property {
            TargetProperty::Host => &self.host,
            TargetProperty::Triple => &self.triple,
            TargetProperty::Layout => &self.layout,
            TargetProperty::CpuFeatures => &self.cpu_features,
        }
    }
}

impl Transport for OfflineTransport {
    fn call(&self, command: &str, params: &RequestParams) -> Result<String, TransportError> {
        if command != JIT_COMMAND {
            return Err(TransportError::new(format!("unknown command `{}`", command)));
        }

        let request = params
            .get_str("request")
            .ok_or_else(|| TransportError::new("missing `request` parameter"))?;

        match TargetProperty::from_wire(request) {
            Some(property) => Ok(self.property(property).to_string()),
            None => Err(TransportError::new(format!(
                "offline transport cannot serve `{}`",
                request
            ))),
        }
    }
}
