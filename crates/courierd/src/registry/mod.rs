//! The static capability table.
//!
//! A [`Registry`] is assembled once at start-up through [`RegistryBuilder`]
//! and never changes afterwards. Connections share it through an `Arc`.

use std::collections::BTreeMap;

use courier_protocol::Envelope;
use serde_json::Value;
use thiserror::Error;

use crate::capabilities::Describe;
use crate::capability::{
    Capability, CapabilityDescriptor, CapabilityError, CapabilityKind, ErasedCapability,
    InvocationError, Schema, json_from_args,
};

/// A capability together with its cached descriptor.
pub struct RegisteredCapability {
    descriptor: CapabilityDescriptor,
    handler: Box<dyn ErasedCapability>,
}

impl RegisteredCapability {
    fn new<C: Capability>(capability: C) -> Self {
        Self {
            descriptor: CapabilityDescriptor::of(&capability),
            handler: Box::new(capability),
        }
    }

    /// Descriptor computed at registration.
    #[must_use]
    pub const fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// Command or query.
    #[must_use]
    pub const fn kind(&self) -> CapabilityKind {
        self.descriptor.kind
    }

    /// Input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Schema {
        &self.descriptor.input
    }

    /// Output schema.
    #[must_use]
    pub const fn output_schema(&self) -> &Schema {
        &self.descriptor.output
    }

    pub(crate) fn invoke(
        &self,
        data: Value,
        envelope: &Envelope,
    ) -> Result<Value, InvocationError> {
        self.handler.invoke(data, envelope)
    }

    fn data_from_args(&self, args: &[String]) -> Result<Value, CapabilityError> {
        self.handler.data_from_args(args)
    }
}

impl std::fmt::Debug for RegisteredCapability {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegisteredCapability")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Errors raised while assembling a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two capabilities claimed the same type name.
    #[error("capability '{name}' is registered more than once")]
    Duplicate {
        /// Conflicting type name.
        name: &'static str,
    },
    /// A capability name is empty.
    #[error("capability names must not be empty")]
    EmptyName,
}

/// Collects capability definitions before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<RegisteredCapability>,
}

impl RegistryBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability.
    #[must_use]
    pub fn register<C: Capability>(mut self, capability: C) -> Self {
        self.entries.push(RegisteredCapability::new(capability));
        self
    }

    /// Freezes the table.
    ///
    /// The `Syscall.Describe` introspection capability is added last, with a
    /// catalogue covering every registered capability and itself.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a name is empty or used twice.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut descriptors: Vec<CapabilityDescriptor> = self
            .entries
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect();
        let describe_descriptor = CapabilityDescriptor::of(&Describe::default());
        descriptors.push(describe_descriptor);
        descriptors.sort_by(|left, right| left.name.cmp(right.name));

        let mut entries = BTreeMap::new();
        let describe = RegisteredCapability::new(Describe::new(&descriptors));
        for entry in self.entries.into_iter().chain(std::iter::once(describe)) {
            let name = entry.descriptor.name;
            if name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if entries.insert(name, entry).is_some() {
                return Err(RegistryError::Duplicate { name });
            }
        }
        Ok(Registry { entries })
    }
}

/// Read-only mapping from type name to capability.
#[derive(Debug)]
pub struct Registry {
    entries: BTreeMap<&'static str, RegisteredCapability>,
}

impl Registry {
    /// Looks up a capability by type name.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&RegisteredCapability> {
        self.entries.get(type_name)
    }

    /// Returns `true` when `type_name` is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Descriptors in type-name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.entries.values().map(RegisteredCapability::descriptor)
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a request envelope from a flat argument list.
    ///
    /// Registered capabilities convert the arguments with their own
    /// `from_args` adapter and fix the envelope kind. Unknown types become a
    /// `command` carrying the default JSON argument form, so that dispatch
    /// can answer with `unknown capability`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidArguments`] when the arguments do
    /// not convert.
    pub fn envelope_from_args(
        &self,
        type_name: &str,
        args: &[String],
    ) -> Result<Envelope, CapabilityError> {
        match self.get(type_name) {
            Some(entry) => {
                let data = entry.data_from_args(args)?;
                Ok(Envelope::new(entry.kind().envelope_kind(), type_name, data))
            }
            None => Ok(Envelope::command(type_name, json_from_args(args)?)),
        }
    }
}

#[cfg(test)]
mod tests;
