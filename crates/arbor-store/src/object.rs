use arbor_crypto::ContentHasher;
use arbor_types::ObjectId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A single node record (properties, references, children).
    Node,
    /// A block of the HAMT that indexes node records by node id.
    Hamt,
    /// A tree snapshot record: repository id plus HAMT root.
    Tree,
    /// A version (commit) record.
    Version,
}

impl ObjectKind {
    fn hasher(self) -> &'static ContentHasher {
        match self {
            Self::Node => &ContentHasher::NODE,
            Self::Hamt => &ContentHasher::HAMT,
            Self::Tree => &ContentHasher::TREE,
            Self::Version => &ContentHasher::VERSION,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Hamt => write!(f, "hamt"),
            Self::Tree => write!(f, "tree"),
            Self::Version => write!(f, "version"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// contents of the data; it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The serialized bytes of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    /// Recompute the hash and compare it with the key it was read under.
    pub fn verify(&self, id: &ObjectId) -> StoreResult<()> {
        let computed = self.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(())
    }
}

/// A typed record persisted as JSON inside a [`StoredObject`].
pub trait Record: Serialize + DeserializeOwned {
    /// The object kind records of this type are stored under.
    const KIND: ObjectKind;

    /// Convert into a `StoredObject` for storage.
    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data = serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(Self::KIND, data))
    }

    /// Decode from a `StoredObject`, checking the kind tag.
    fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != Self::KIND {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected {}, got {}", Self::KIND, obj.kind),
            });
        }
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
            id: obj.compute_id(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker {
        name: String,
    }

    impl Record for Marker {
        const KIND: ObjectKind = ObjectKind::Node;
    }

    #[test]
    fn record_roundtrip() {
        let marker = Marker {
            name: "root".into(),
        };
        let stored = marker.to_stored_object().unwrap();
        assert_eq!(stored.kind, ObjectKind::Node);
        assert_eq!(stored.size, stored.data.len() as u64);
        assert_eq!(Marker::from_stored_object(&stored).unwrap(), marker);
    }

    #[test]
    fn record_kind_mismatch() {
        let stored = StoredObject::new(ObjectKind::Version, b"{\"name\":\"x\"}".to_vec());
        let err = Marker::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn malformed_json_is_corrupt() {
        let stored = StoredObject::new(ObjectKind::Node, b"not json".to_vec());
        assert!(matches!(
            Marker::from_stored_object(&stored),
            Err(StoreError::CorruptObject { .. })
        ));
    }

    #[test]
    fn different_kinds_produce_different_ids() {
        let data = b"same data".to_vec();
        let node = StoredObject::new(ObjectKind::Node, data.clone());
        let tree = StoredObject::new(ObjectKind::Tree, data);
        assert_ne!(node.compute_id(), tree.compute_id());
    }

    #[test]
    fn verify_against_wrong_key() {
        let obj = StoredObject::new(ObjectKind::Hamt, b"block".to_vec());
        obj.verify(&obj.compute_id()).unwrap();
        let wrong = ObjectId::from_bytes(b"elsewhere");
        assert!(matches!(
            obj.verify(&wrong),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn object_kind_display() {
        assert_eq!(ObjectKind::Node.to_string(), "node");
        assert_eq!(ObjectKind::Hamt.to_string(), "hamt");
        assert_eq!(ObjectKind::Tree.to_string(), "tree");
        assert_eq!(ObjectKind::Version.to_string(), "version");
    }
}
