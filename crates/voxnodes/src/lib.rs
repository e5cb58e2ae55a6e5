//! Built-in node executors for the voxflow engine
//!
//! One module per capability family: call triggers, speech I/O,
//! conditional branching, and integration calls that delegate to external
//! adapters. `register_all` wires every definition into a registry
//! builder at startup.

mod adapters;
mod branch;
mod integration;
mod speech;
mod trigger;

pub use adapters::{HttpAdapter, SimulatedAdapter, StaticSecretProvider};
pub use branch::BranchNode;
pub use integration::IntegrationNode;
pub use speech::{GatherNode, SayNode};
pub use trigger::{CallTriggerNode, ManualTriggerNode};

use std::collections::HashMap;
use std::sync::Arc;
use voxcore::{IntegrationAdapter, Value};
use voxruntime::RegistryBuilder;

/// Adapters available to integration nodes, keyed by service name.
#[derive(Default)]
pub struct AdapterSet {
    adapters: HashMap<String, Arc<dyn IntegrationAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter: Arc<dyn IntegrationAdapter>) -> Self {
        self.adapters
            .insert(adapter.service().to_string(), adapter);
        self
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn IntegrationAdapter>> {
        self.adapters.get(service).cloned()
    }

    /// Simulated adapters for every built-in service family. Used by the
    /// CLI and tests to run workflows offline.
    pub fn simulated() -> Self {
        let mut set = Self::new();
        for service in integration::SERVICES {
            set = set.with(Arc::new(SimulatedAdapter::new(*service)));
        }
        set
    }
}

/// Register every built-in node definition.
///
/// Integration types whose service has no adapter in `adapters` are left
/// out of the catalog; the registry is fixed after this.
pub fn register_all(builder: &mut RegistryBuilder, adapters: &AdapterSet) {
    for definition in trigger::definitions() {
        builder.register(definition);
    }
    for definition in speech::definitions() {
        builder.register(definition);
    }
    for definition in branch::definitions() {
        builder.register(definition);
    }
    for definition in integration::definitions(adapters) {
        builder.register(definition);
    }
}

/// Substitute `{{path}}` placeholders from a scope of input values.
///
/// Unknown paths render as empty text; an unterminated placeholder is
/// copied through verbatim.
pub(crate) fn render_template(template: &str, scope: &HashMap<String, Value>) -> String {
    let scope = Value::Object(scope.clone());
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                if let Some(value) = scope.get_path(path) {
                    out.push_str(&value.to_text());
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
