use crate::errors::DsError;
use crate::schema::native::NativeType;
use crate::utils::paths::PHYSICAL_SEP;
use bson::Bson;
use std::collections::BTreeMap;

pub type Fields = BTreeMap<String, SchemaNode>;

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub native_type: NativeType,
    pub reference_to: Option<String>,
    pub required: bool,
    pub default_value: Option<Bson>,
    pub enum_values: Option<Vec<String>>,
}

impl Leaf {
    #[must_use]
    pub const fn of(native_type: NativeType) -> Self {
        Self { native_type, reference_to: None, required: false, default_value: None, enum_values: None }
    }
}

/// A node of a model's schema tree.
///
/// Arrayness lives on the edge into a node: an array of strings is `Array(Leaf)`, an array
/// of subdocuments is `Array(Branch)`.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Leaf(Leaf),
    Branch(Fields),
    Array(Box<SchemaNode>),
}

impl SchemaNode {
    #[must_use]
    pub fn leaf(native_type: NativeType) -> Self {
        Self::Leaf(Leaf::of(native_type))
    }

    /// The node with every array wrapper stripped.
    #[must_use]
    pub fn element(&self) -> &Self {
        match self {
            Self::Array(inner) => inner.element(),
            other => other,
        }
    }

    fn element_mut(&mut self) -> &mut Self {
        match self {
            Self::Array(inner) => inner.element_mut(),
            other => other,
        }
    }

    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Leaves and arrays of leaves alike.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.element(), Self::Leaf(_))
    }

    /// Leaf-only accessor. A branch here would later become a wrong-type predicate, so it
    /// is an error rather than a fallback.
    pub fn as_leaf(&self, path: &str) -> Result<&Leaf, DsError> {
        match self.element() {
            Self::Leaf(leaf) => Ok(leaf),
            _ => Err(DsError::NotALeaf(path.to_string())),
        }
    }

    #[must_use]
    pub fn fields(&self) -> Option<&Fields> {
        match self.element() {
            Self::Branch(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut Fields> {
        match self.element_mut() {
            Self::Branch(fields) => Some(fields),
            _ => None,
        }
    }

    /// Walks a dotted path below this node, crossing array wrappers.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Self> {
        path.split(PHYSICAL_SEP).try_fold(self, |node, seg| node.fields()?.get(seg))
    }

    /// Inserts `node` at a dotted path, creating intermediate branches.
    pub fn insert(&mut self, path: &str, node: Self) {
        let (head, tail) = match path.split_once(PHYSICAL_SEP) {
            Some((h, t)) => (h, Some(t)),
            None => (path, None),
        };
        let Some(fields) = self.fields_mut() else { return };
        match tail {
            None => {
                fields.insert(head.to_string(), node);
            }
            Some(rest) => {
                fields
                    .entry(head.to_string())
                    .or_insert_with(|| Self::Branch(Fields::new()))
                    .insert(rest, node);
            }
        }
    }

    /// Removes the node at a dotted path. Branches left empty along the way are pruned.
    pub fn remove(&mut self, path: &str) -> Option<Self> {
        let fields = self.fields_mut()?;
        match path.split_once(PHYSICAL_SEP) {
            None => fields.remove(path),
            Some((head, rest)) => {
                let child = fields.get_mut(head)?;
                let removed = child.remove(rest);
                if child.fields().is_some_and(BTreeMap::is_empty) {
                    fields.remove(head);
                }
                removed
            }
        }
    }
}
