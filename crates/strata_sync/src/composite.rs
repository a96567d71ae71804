//! # Composites
//!
//! A composite is a serialized bundle of entities and component
//! payloads — a prefab. Instantiating one allocates fresh entities,
//! builds an explicit remap table from the composite's local entity
//! ids to the allocated ones, and writes every payload as a *local*
//! write so the whole instantiation propagates to peers like any other
//! mutation.
//!
//! Broken content degrades instead of failing: an entry whose
//! component is unknown or whose payload will not decode is logged and
//! skipped, and the rest of the composite still instantiates. Only an
//! unknown root name or a reference cycle aborts.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;
use tracing::warn;

use strata_core::{ByteReader, ByteWriter, CodecError, ComponentId, EntityId, EntityRemap, World};

/// Errors aborting an instantiation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompositeError {
    /// No composite with the requested name.
    #[error("composite {0:?} not found")]
    Unknown(String),

    /// The composite references itself through its children.
    #[error("composite {0:?} contains itself")]
    Cycle(String),

    /// The serialized form could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One component payload inside a composite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeEntry {
    /// Entity id in the composite's private namespace.
    pub local_entity: EntityId,
    /// Target component.
    pub component_id: ComponentId,
    /// Encoded component value; entity references inside it are in the
    /// composite's namespace and get remapped on instantiation.
    pub payload: Vec<u8>,
}

/// A named, serializable bundle of entities and components.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositeDefinition {
    /// Name other composites and callers refer to this one by.
    pub name: String,
    /// Component payloads, in application order.
    pub entries: Vec<CompositeEntry>,
    /// Names of nested composites instantiated along with this one.
    pub children: Vec<String>,
}

impl CompositeDefinition {
    /// Serializes to the composite wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_str(&self.name);
        writer.write_seq(&self.entries, |w, entry| {
            w.write_group(|w| {
                w.write_u32(entry.local_entity.raw());
                w.write_u32(entry.component_id.0);
                w.write_bytes(&entry.payload);
            });
        });
        writer.write_seq(&self.children, |w, child| w.write_str(child));
        writer.into_bytes()
    }

    /// Deserializes the composite wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let name = reader.read_str()?;
        let entries = reader.read_seq(|r| {
            r.read_group(|g| {
                Ok(CompositeEntry {
                    local_entity: EntityId::from_raw(g.read_u32()?),
                    component_id: ComponentId(g.read_u32()?),
                    payload: g.read_bytes()?.to_vec(),
                })
            })
        })?;
        let children = reader.read_seq(ByteReader::read_str)?;
        Ok(Self {
            name,
            entries,
            children,
        })
    }
}

/// Source of composite definitions by name.
pub trait CompositeProvider {
    /// Looks up a composite definition.
    fn composite(&self, name: &str) -> Option<&CompositeDefinition>;
}

/// In-memory composite library.
#[derive(Default)]
pub struct CompositeLibrary {
    composites: BTreeMap<String, CompositeDefinition>,
}

impl CompositeLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, replacing any previous one with the name.
    pub fn insert(&mut self, definition: CompositeDefinition) {
        self.composites.insert(definition.name.clone(), definition);
    }

    /// Number of definitions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.composites.len()
    }

    /// True if the library holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }
}

impl CompositeProvider for CompositeLibrary {
    fn composite(&self, name: &str) -> Option<&CompositeDefinition> {
        self.composites.get(name)
    }
}

/// Instantiates a composite into the world.
///
/// # Returns
///
/// Every entity allocated, this composite's and its children's, in
/// allocation order.
pub fn instantiate(
    world: &mut World,
    provider: &dyn CompositeProvider,
    name: &str,
) -> Result<Vec<EntityId>, CompositeError> {
    let mut path = Vec::new();
    let mut spawned = Vec::new();
    instantiate_inner(world, provider, name, &mut path, &mut spawned)?;
    Ok(spawned)
}

fn instantiate_inner(
    world: &mut World,
    provider: &dyn CompositeProvider,
    name: &str,
    path: &mut Vec<String>,
    spawned: &mut Vec<EntityId>,
) -> Result<(), CompositeError> {
    if path.iter().any(|ancestor| ancestor == name) {
        return Err(CompositeError::Cycle(name.to_string()));
    }
    let definition = provider
        .composite(name)
        .ok_or_else(|| CompositeError::Unknown(name.to_string()))?;

    // Allocate one fresh entity per distinct local id, in ascending
    // local-id order so allocation is deterministic.
    let locals: BTreeSet<EntityId> = definition
        .entries
        .iter()
        .map(|entry| entry.local_entity)
        .collect();
    let mut remap = EntityRemap::new();
    for local in locals {
        let fresh = world.add_entity();
        remap.insert(local, fresh);
        spawned.push(fresh);
    }

    for entry in &definition.entries {
        let target = remap.resolve(entry.local_entity);
        if let Err(error) = world.insert_local(entry.component_id, target, &entry.payload, &remap) {
            warn!(
                composite = name,
                component = %entry.component_id,
                %error,
                "skipping broken composite entry"
            );
        }
    }

    path.push(name.to_string());
    for child in &definition.children {
        match instantiate_inner(world, provider, child, path, spawned) {
            Ok(()) => {}
            Err(CompositeError::Cycle(cycle)) => return Err(CompositeError::Cycle(cycle)),
            Err(error) => {
                // A missing child degrades; the parent still stands.
                warn!(composite = name, child = %child, %error, "skipping broken child composite");
            }
        }
    }
    path.pop();
    Ok(())
}
