use crate::query::Operator;
use crate::schema::{Leaf, NativeType, SchemaNode, Stack};
use bson::Bson;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Relation declared on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Relation {
    ManyToOne { foreign_collection: String, foreign_key: String, foreign_key_target: String },
    OneToOne { foreign_collection: String, origin_key: String, origin_key_target: String },
    OneToMany { foreign_collection: String, origin_key: String, origin_key_target: String },
    ManyToMany {
        through_collection: String,
        foreign_collection: String,
        foreign_key: String,
        foreign_key_target: String,
        origin_key: String,
        origin_key_target: String,
    },
}

impl Relation {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ManyToOne { .. } => "ManyToOne",
            Self::OneToOne { .. } => "OneToOne",
            Self::OneToMany { .. } => "OneToMany",
            Self::ManyToMany { .. } => "ManyToMany",
        }
    }

    #[must_use]
    pub fn foreign_collection(&self) -> &str {
        match self {
            Self::ManyToOne { foreign_collection, .. }
            | Self::OneToOne { foreign_collection, .. }
            | Self::OneToMany { foreign_collection, .. }
            | Self::ManyToMany { foreign_collection, .. } => foreign_collection,
        }
    }
}

/// Exposed type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Primitive(NativeType),
    Array(Box<ColumnType>),
    Object(BTreeMap<String, ColumnType>),
}

impl ColumnType {
    #[must_use]
    pub fn of(node: &SchemaNode) -> Self {
        match node {
            SchemaNode::Leaf(leaf) => Self::Primitive(leaf.native_type),
            SchemaNode::Array(inner) => Self::Array(Box::new(Self::of(inner))),
            SchemaNode::Branch(fields) => {
                Self::Object(fields.iter().map(|(k, v)| (k.clone(), Self::of(v))).collect())
            }
        }
    }

    /// Native type of the scalar (or array-of-scalar) behind this column.
    #[must_use]
    pub fn native_type(&self) -> Option<NativeType> {
        match self {
            Self::Primitive(t) => Some(*t),
            Self::Array(inner) => inner.native_type(),
            Self::Object(_) => None,
        }
    }

    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub column_type: ColumnType,
    pub is_primary_key: bool,
    pub is_read_only: bool,
    pub reference_to: Option<String>,
    pub required: bool,
    pub default_value: Option<Bson>,
    pub enum_values: Option<Vec<String>>,
    pub filter_operators: BTreeSet<Operator>,
}

impl ColumnSchema {
    #[must_use]
    pub fn from_node(node: &SchemaNode) -> Self {
        let column_type = ColumnType::of(node);
        let leaf = match node.element() {
            SchemaNode::Leaf(leaf) => Some(leaf),
            _ => None,
        };
        Self {
            filter_operators: operators_for(&column_type),
            column_type,
            is_primary_key: false,
            is_read_only: false,
            reference_to: leaf.and_then(|l| l.reference_to.clone()),
            required: leaf.is_some_and(|l: &Leaf| l.required),
            default_value: leaf.and_then(|l| l.default_value.clone()),
            enum_values: leaf.and_then(|l| l.enum_values.clone()),
        }
    }

    #[must_use]
    pub fn native_type(&self) -> Option<NativeType> {
        self.column_type.native_type()
    }
}

fn operators_for(column_type: &ColumnType) -> BTreeSet<Operator> {
    use Operator as O;
    let mut ops = BTreeSet::from([O::Present, O::Equal, O::NotEqual]);
    match column_type {
        ColumnType::Array(_) => ops.extend([O::IncludesAll, O::IncludesNone]),
        ColumnType::Primitive(NativeType::String | NativeType::ObjectId) => {
            ops.extend([O::In, O::NotIn, O::LessThan, O::GreaterThan, O::Like, O::ILike, O::Match]);
        }
        ColumnType::Primitive(NativeType::Number | NativeType::Date) => {
            ops.extend([O::In, O::NotIn, O::LessThan, O::GreaterThan]);
        }
        ColumnType::Primitive(_) | ColumnType::Object(_) => {}
    }
    ops
}

/// Columns and relations a collection exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionSchema {
    pub columns: BTreeMap<String, ColumnSchema>,
    pub relations: BTreeMap<String, Relation>,
}

/// One promotion boundary crossed to reach a virtual collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Boundary {
    /// Full physical path from the model root.
    pub path: String,
    /// Path relative to the previous boundary (the model root for the first one).
    pub relative: String,
    pub is_array: bool,
    pub is_leaf: bool,
}

/// A physical or virtual collection of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDef {
    pub name: String,
    /// Physical model the records are stored in.
    pub model: String,
    /// Physical path of the promoted subdocument, `None` for a physical collection.
    pub prefix: Option<String>,
    pub stack: Stack,
    /// Boundaries from the model root down to this collection, outermost first.
    pub boundaries: Vec<Boundary>,
    /// Exposed schema, as folded from the stack.
    pub node: SchemaNode,
    /// Promoted from an array: one record per element.
    pub is_array: bool,
    /// Promoted from a leaf: the value is boxed under `content`.
    pub is_leaf: bool,
    pub schema: CollectionSchema,
}

impl CollectionDef {
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        self.prefix.is_some()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.schema.columns.get(name)
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.schema.relations.get(name)
    }

    /// Native type of a column, falling back to `Mixed` for objects.
    #[must_use]
    pub fn native_type(&self, column: &str) -> NativeType {
        self.column(column).and_then(ColumnSchema::native_type).unwrap_or(NativeType::Mixed)
    }
}
