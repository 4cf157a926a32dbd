//! Adapter registry - capability handshake for transport bindings
//!
//! Platform names are normalized to lowercase. Registration is atomic per
//! name: two concurrent handshakes for the same platform cannot both win.

use bicameral_core::{AdapterBinding, CapabilitySet, ConnectBody, Error, Result, TemporalSpine};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

pub struct AdapterRegistry {
    bindings: DashMap<String, AdapterBinding>,
    spine: Arc<TemporalSpine>,
}

impl AdapterRegistry {
    pub fn new(spine: Arc<TemporalSpine>) -> Self {
        Self { bindings: DashMap::new(), spine }
    }

    pub fn register(&self, body: &ConnectBody) -> Result<AdapterBinding> {
        let name = normalize(&body.platform);
        if name.is_empty() {
            return Err(Error::InvalidRequest("platform must not be empty".into()));
        }

        match self.bindings.entry(name.clone()) {
            Entry::Occupied(_) => Err(Error::AdapterConflict { platform: name }),
            Entry::Vacant(slot) => {
                let binding = AdapterBinding {
                    platform_name: name.clone(),
                    capability_set: CapabilitySet::from_names(body.capabilities.iter().map(String::as_str)),
                    version: body.version.clone(),
                    registered_at: self.spine.pulse(),
                };
                slot.insert(binding.clone());
                info!(
                    "Registered adapter '{}' ({}) capabilities={:?}",
                    name,
                    body.version.as_deref().unwrap_or("unversioned"),
                    binding.capability_set.names()
                );
                Ok(binding)
            }
        }
    }

    pub fn deregister(&self, platform: &str) -> Result<AdapterBinding> {
        let name = normalize(platform);
        match self.bindings.remove(&name) {
            Some((_, binding)) => {
                info!("Deregistered adapter '{}'", name);
                Ok(binding)
            }
            None => Err(Error::UnknownAdapter(name)),
        }
    }

    pub fn get(&self, platform: &str) -> Option<AdapterBinding> {
        self.bindings.get(&normalize(platform)).map(|b| b.clone())
    }

    /// Bindings ordered by platform name.
    pub fn list(&self) -> Vec<AdapterBinding> {
        let mut all: Vec<AdapterBinding> = self.bindings.iter().map(|b| b.value().clone()).collect();
        all.sort_by(|a, b| a.platform_name.cmp(&b.platform_name));
        all
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// A registered platform may only submit requests if it declared `send`.
    /// Unregistered callers are anonymous and always allowed.
    pub fn check_send(&self, platform: &str) -> Result<()> {
        match self.get(platform) {
            Some(binding) if !binding.capability_set.send => Err(Error::CapabilityMissing {
                platform: binding.platform_name,
                capability: "send".into(),
            }),
            _ => Ok(()),
        }
    }
}

fn normalize(platform: &str) -> String {
    platform.trim().to_lowercase()
}
