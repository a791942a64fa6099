//! Instance name registry
//!
//! Hosts that run several instances can share one registry to make sure no
//! two live instances use the same name (and therefore the same storage
//! keys). Names are released when the owning instance is dropped.

use std::collections::HashSet;

use log::debug;
use parking_lot::Mutex;

use crate::error::{MicroError, Result};

/// Names of live instances
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    names: Mutex<HashSet<String>>,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name, failing if it is already taken
    pub fn claim(&self, name: &str) -> Result<()> {
        let mut names = self.names.lock();
        if !names.insert(name.to_string()) {
            return Err(MicroError::DuplicateName {
                name: name.to_string(),
            });
        }
        debug!("Registered instance '{}'", name);
        Ok(())
    }

    /// Release a name so it can be claimed again
    pub fn release(&self, name: &str) {
        if self.names.lock().remove(name) {
            debug!("Released instance '{}'", name);
        }
    }

    /// Whether a name is currently taken
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    /// Forget every name
    pub fn clear(&self) {
        self.names.lock().clear();
    }
}
