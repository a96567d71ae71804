//! # Built-in Components
//!
//! The component schemas every engine registers out of the box. They
//! double as the reference encodings for the codec: between them they
//! cover fixed-width primitives, strings, repeated fields, enums,
//! unions, nested messages, optional fields, and entity references.
//!
//! Wire ids below 256 are reserved for built-ins; application schemas
//! should start at 256.

use crate::codec::{ByteReader, ByteWriter, CodecError};

use super::component::{Component, ComponentId, EntityRemap, StorageSemantics};
use super::entity::EntityId;

/// A 3D vector, used as a nested message inside other components.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Vec3 {
    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Unit scale vector.
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    fn encode(&self, w: &mut ByteWriter) {
        w.write_f32(self.x);
        w.write_f32(self.y);
        w.write_f32(self.z);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: r.read_f32()?,
            y: r.read_f32()?,
            z: r.read_f32()?,
        })
    }
}

/// World-space position of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Component for Position {
    const ID: ComponentId = ComponentId(1);
    const NAME: &'static str = "Position";

    fn encode(&self, w: &mut ByteWriter) {
        w.write_f32(self.x);
        w.write_f32(self.y);
        w.write_f32(self.z);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: r.read_f32()?,
            y: r.read_f32()?,
            z: r.read_f32()?,
        })
    }
}

/// Movement in world units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    /// X velocity component.
    pub x: f32,
    /// Y velocity component.
    pub y: f32,
    /// Z velocity component.
    pub z: f32,
}

impl Velocity {
    /// Creates a new velocity.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Component for Velocity {
    const ID: ComponentId = ComponentId(2);
    const NAME: &'static str = "Velocity";

    fn encode(&self, w: &mut ByteWriter) {
        w.write_f32(self.x);
        w.write_f32(self.y);
        w.write_f32(self.z);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: r.read_f32()?,
            y: r.read_f32()?,
            z: r.read_f32()?,
        })
    }
}

/// Full spatial transform with an optional parent entity.
///
/// The nested vectors are written as length-prefixed groups, so fields
/// appended to `Vec3` by a newer writer are skipped by older readers.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    /// Local position.
    pub position: Vec3,
    /// Local scale.
    pub scale: Vec3,
    /// Optional parent entity this transform is relative to.
    pub parent: Option<EntityId>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::default(),
            scale: Vec3::ONE,
            parent: None,
        }
    }
}

impl Component for Transform {
    const ID: ComponentId = ComponentId(3);
    const NAME: &'static str = "Transform";

    fn encode(&self, w: &mut ByteWriter) {
        w.write_group(|w| self.position.encode(w));
        w.write_group(|w| self.scale.encode(w));
        w.write_option(self.parent.as_ref(), |w, p| w.write_u32(p.raw()));
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            position: r.read_group(Vec3::decode)?,
            scale: r.read_group(Vec3::decode)?,
            parent: r
                .read_option(|r| r.read_u32().map(EntityId::from_raw))?,
        })
    }

    fn remap_entities(&mut self, remap: &EntityRemap) {
        if let Some(parent) = self.parent {
            self.parent = Some(remap.resolve(parent));
        }
    }
}

/// Horizontal alignment of a label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TextAlign {
    /// Left-aligned.
    #[default]
    Left = 0,
    /// Centered.
    Center = 1,
    /// Right-aligned.
    Right = 2,
}

impl TextAlign {
    fn decode(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Self::Left),
            1 => Ok(Self::Center),
            2 => Ok(Self::Right),
            other => Err(CodecError::InvalidTag {
                what: "TextAlign",
                tag: u32::from(other),
            }),
        }
    }
}

/// Display text attached to an entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Label {
    /// The display string.
    pub text: String,
    /// Free-form tags; an empty list encodes as a zero count.
    pub tags: Vec<String>,
    /// Text alignment.
    pub align: TextAlign,
}

impl Component for Label {
    const ID: ComponentId = ComponentId(4);
    const NAME: &'static str = "Label";

    fn encode(&self, w: &mut ByteWriter) {
        w.write_str(&self.text);
        w.write_seq(&self.tags, |w, tag| w.write_str(tag));
        w.write_u8(self.align as u8);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            text: r.read_str()?,
            tags: r.read_seq(ByteReader::read_str)?,
            align: TextAlign::decode(r.read_u8()?)?,
        })
    }
}

/// Collision shape union.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    /// Axis-aligned box with half-extents.
    Box {
        /// Half-extents along each axis.
        extents: Vec3,
    },
    /// Sphere with a radius.
    Sphere {
        /// Sphere radius.
        radius: f32,
    },
}

impl Default for Shape {
    fn default() -> Self {
        Self::Box {
            extents: Vec3::ONE,
        }
    }
}

/// Collision volume for an entity; the shape field is a tagged union.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Collider {
    /// The collision shape.
    pub shape: Shape,
}

impl Component for Collider {
    const ID: ComponentId = ComponentId(5);
    const NAME: &'static str = "Collider";

    fn encode(&self, w: &mut ByteWriter) {
        match &self.shape {
            Shape::Box { extents } => {
                w.write_u8(0);
                extents.encode(w);
            }
            Shape::Sphere { radius } => {
                w.write_u8(1);
                w.write_f32(*radius);
            }
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let shape = match r.read_u8()? {
            0 => Shape::Box {
                extents: Vec3::decode(r)?,
            },
            1 => Shape::Sphere {
                radius: r.read_f32()?,
            },
            other => {
                return Err(CodecError::InvalidTag {
                    what: "Shape",
                    tag: u32::from(other),
                })
            }
        };
        Ok(Self { shape })
    }
}

/// Association between a network peer and the entity it owns remotely.
///
/// Grow-only: every peer's log converges to the union of all recorded
/// mappings, and nothing is ever retracted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkMapping {
    /// Peer identifier.
    pub peer: u32,
    /// Raw handle of the entity on that peer.
    pub remote_entity: u32,
}

impl Component for NetworkMapping {
    const ID: ComponentId = ComponentId(6);
    const NAME: &'static str = "NetworkMapping";
    const SEMANTICS: StorageSemantics = StorageSemantics::GrowOnly;

    fn encode(&self, w: &mut ByteWriter) {
        w.write_u32(self.peer);
        w.write_u32(self.remote_entity);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            peer: r.read_u32()?,
            remote_entity: r.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<C: Component + std::fmt::Debug>(value: &C) {
        let bytes = value.to_bytes();
        let decoded = C::from_bytes(&bytes).unwrap();
        assert_eq!(&decoded, value);
    }

    #[test]
    fn test_roundtrip_all_builtins() {
        roundtrip(&Position::new(1.5, -2.0, 1e9));
        roundtrip(&Velocity::new(0.0, -9.81, 0.0));
        roundtrip(&Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::ONE,
            parent: Some(EntityId::new(7, 2)),
        });
        roundtrip(&Transform::default());
        roundtrip(&Label {
            text: "héllo wörld".to_string(),
            tags: vec!["a".into(), String::new()],
            align: TextAlign::Right,
        });
        roundtrip(&Label::default());
        roundtrip(&Collider {
            shape: Shape::Sphere { radius: 0.5 },
        });
        roundtrip(&Collider::default());
        roundtrip(&NetworkMapping {
            peer: 3,
            remote_entity: 41,
        });
    }

    #[test]
    fn test_absent_parent_differs_from_present() {
        let without = Transform::default().to_bytes();
        let with = Transform {
            parent: Some(EntityId::new(0, 1)),
            ..Transform::default()
        }
        .to_bytes();
        assert_ne!(without, with);
    }

    #[test]
    fn test_invalid_enum_tag_is_an_error() {
        let mut w = crate::codec::ByteWriter::new();
        w.write_str("x");
        w.write_seq::<String, _>(&[], |w, s| w.write_str(s));
        w.write_u8(9); // out-of-range TextAlign
        assert!(matches!(
            Label::from_bytes(w.as_slice()),
            Err(CodecError::InvalidTag {
                what: "TextAlign",
                ..
            })
        ));
    }

    #[test]
    fn test_transform_tolerates_newer_vec3_fields() {
        // A newer writer appends a fourth float inside the position
        // group; this reader must skip it and still decode.
        let mut w = crate::codec::ByteWriter::new();
        w.write_group(|w| {
            Vec3::new(1.0, 2.0, 3.0).encode(w);
            w.write_f32(4.0); // unknown future field
        });
        w.write_group(|w| Vec3::ONE.encode(w));
        w.write_u8(0); // no parent

        let decoded = Transform::from_bytes(w.as_slice()).unwrap();
        assert_eq!(decoded.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(decoded.scale, Vec3::ONE);
    }

    proptest::proptest! {
        /// Malformed payloads must surface as errors, never panics or
        /// unbounded allocations.
        #[test]
        fn test_decode_never_panics_on_junk(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64)) {
            let _ = Position::from_bytes(&bytes);
            let _ = Transform::from_bytes(&bytes);
            let _ = Label::from_bytes(&bytes);
            let _ = Collider::from_bytes(&bytes);
            let _ = NetworkMapping::from_bytes(&bytes);
        }
    }

    #[test]
    fn test_transform_remaps_parent_reference() {
        let mut remap = EntityRemap::new();
        remap.insert(EntityId::new(1, 0), EntityId::new(30, 4));

        let mut transform = Transform {
            parent: Some(EntityId::new(1, 0)),
            ..Transform::default()
        };
        transform.remap_entities(&remap);
        assert_eq!(transform.parent, Some(EntityId::new(30, 4)));
    }
}
