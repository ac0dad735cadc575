use crate::errors::DsError;
use crate::schema::native::{NativeModel, NativePath, NativeSchema, NativeType};
use crate::schema::node::{Fields, Leaf, SchemaNode};
use crate::schema::stack::StackEntry;
use crate::utils::paths::{flatten_name, is_reserved, join, strip_prefix, PHYSICAL_SEP};
use std::collections::BTreeMap;

/// Synthetic fields injected into a promoted sub-schema so it can navigate back to its container.
pub const ID_FIELD: &str = "_id";
pub const PARENT_ID_FIELD: &str = "parentId";
pub const PARENT_FIELD: &str = "parent";
/// Wrapper field of a promoted leaf.
pub const CONTENT_FIELD: &str = "content";

/// Root schema of every model, built once from the native descriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    roots: BTreeMap<String, SchemaNode>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new(models: &[NativeModel]) -> Self {
        let roots = models.iter().map(|m| (m.name.clone(), ModelSchema::build(&m.schema))).collect();
        Self { roots }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.roots.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn model(&self, name: &str) -> Result<ModelSchema<'_>, DsError> {
        Ok(ModelSchema {
            registry: self,
            model_name: name.to_string(),
            node: self.root(name)?.clone(),
            is_array: false,
        })
    }

    fn root(&self, name: &str) -> Result<&SchemaNode, DsError> {
        self.roots.get(name).ok_or_else(|| DsError::UnknownModel(name.to_string()))
    }
}

/// A navigable view over (part of) a model's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema<'r> {
    registry: &'r SchemaRegistry,
    model_name: String,
    node: SchemaNode,
    is_array: bool,
}

impl<'r> ModelSchema<'r> {
    /// Builds the root node of a native schema. Reserved paths are skipped and `_id` is only
    /// kept at the root, where it is always present.
    #[must_use]
    pub fn build(native: &NativeSchema) -> SchemaNode {
        let mut root = Self::build_nested(native, true);
        if root.get(ID_FIELD).is_none() {
            root.insert(ID_FIELD, SchemaNode::leaf(NativeType::ObjectId));
        }
        root
    }

    fn build_nested(native: &NativeSchema, is_root: bool) -> SchemaNode {
        let mut node = SchemaNode::Branch(Fields::new());
        for (path, native_path) in &native.paths {
            if is_reserved(path) || (!is_root && path == ID_FIELD) {
                continue;
            }
            let (child, is_array) = match native_path {
                NativePath::Field(f) => (
                    SchemaNode::Leaf(Leaf {
                        native_type: f.native_type,
                        reference_to: f.reference_to.clone(),
                        required: f.required,
                        default_value: f.default_value.clone(),
                        enum_values: f.enum_values.clone(),
                    }),
                    f.is_array,
                ),
                NativePath::Embedded { schema, is_array } => {
                    (Self::build_nested(schema, false), *is_array)
                }
            };
            let child = if is_array { SchemaNode::Array(Box::new(child)) } else { child };
            node.insert(path, child);
        }
        node
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub const fn node(&self) -> &SchemaNode {
        &self.node
    }

    #[must_use]
    pub const fn is_array(&self) -> bool {
        self.is_array
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    pub fn leaf(&self) -> Result<&Leaf, DsError> {
        self.node.as_leaf(&self.model_name)
    }

    pub fn native_type(&self) -> Result<NativeType, DsError> {
        self.leaf().map(|l| l.native_type)
    }

    /// Whether the node at `path` below this one is an array. Unknown paths are not.
    #[must_use]
    pub fn is_array_at(&self, path: &str) -> bool {
        self.node.get(path).is_some_and(SchemaNode::is_array)
    }

    #[must_use]
    pub fn is_leaf_at(&self, path: &str) -> bool {
        self.node.get(path).is_some_and(SchemaNode::is_leaf)
    }

    #[must_use]
    pub fn fields(&self) -> Option<&Fields> {
        self.node.fields()
    }

    /// Walks `path` below this node. A reference leaf followed by more segments continues in
    /// the referenced model, so `storeId.name` reads like a nested path.
    ///
    /// With `include_parent_link` the result is a branch carrying `_id`, `parentId` and
    /// `parent`; a leaf target is boxed under `content` first.
    pub fn get_sub_schema(&self, path: Option<&str>, include_parent_link: bool) -> Result<Self, DsError> {
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            return Ok(self.clone());
        };
        let mut container: &SchemaNode = self.node.element();
        let mut current: &SchemaNode = &self.node;
        for seg in path.split(PHYSICAL_SEP) {
            let mut base = current.element();
            if let SchemaNode::Leaf(Leaf { reference_to: Some(target), .. }) = base {
                base = self.registry.root(target)?;
            }
            let fields = base.fields().ok_or_else(|| DsError::NoSuchField(path.to_string()))?;
            container = base;
            current = fields.get(seg).ok_or_else(|| DsError::NoSuchField(path.to_string()))?;
        }

        let node = if include_parent_link {
            let mut fields = match current.element() {
                SchemaNode::Branch(f) => f.clone(),
                leaf => Fields::from([(CONTENT_FIELD.to_string(), leaf.clone())]),
            };
            let parent_id =
                container.get(ID_FIELD).cloned().unwrap_or_else(|| SchemaNode::leaf(NativeType::String));
            fields.insert(ID_FIELD.to_string(), SchemaNode::leaf(NativeType::String));
            fields.insert(PARENT_ID_FIELD.to_string(), parent_id);
            fields.insert(PARENT_FIELD.to_string(), container.clone());
            SchemaNode::Branch(fields)
        } else {
            current.clone()
        };

        Ok(Self {
            registry: self.registry,
            model_name: self.model_name.clone(),
            node,
            is_array: current.is_array(),
        })
    }

    /// Folds a stack into the schema the targeted collection exposes.
    pub fn apply_stack(&self, stack: &[StackEntry]) -> Result<Self, DsError> {
        let (first, rest) = stack.split_first().ok_or(DsError::EmptyStack)?;
        let mut raw = self.get_sub_schema(first.prefix.as_deref(), first.prefix.is_some())?;
        let mut exposed = raw.flattened(&first.as_fields, &first.as_models)?;
        let mut previous = first.prefix.as_deref();

        for entry in rest {
            let prefix = entry
                .prefix
                .as_deref()
                .ok_or_else(|| self.invalid_path("", "nested stack entry without prefix"))?;
            let relative = match previous {
                None => prefix,
                Some(p) => strip_prefix(prefix, p)
                    .ok_or_else(|| self.invalid_path(prefix, "not below the previous boundary"))?,
            };
            let mut next = raw.get_sub_schema(Some(relative), true)?;
            if let Some(fields) = next.node.fields_mut() {
                fields.insert(PARENT_FIELD.to_string(), exposed.node.element().clone());
            }
            exposed = next.flattened(&entry.as_fields, &entry.as_models)?;
            raw = next;
            previous = Some(prefix);
        }
        Ok(exposed)
    }

    /// Removes promoted paths and moves flattened ones onto this node as `a@@@b` siblings.
    fn flattened(&self, as_fields: &[String], as_models: &[String]) -> Result<Self, DsError> {
        if as_fields.is_empty() && as_models.is_empty() {
            return Ok(self.clone());
        }
        let original = &self.node;
        let mut moved = Vec::with_capacity(as_fields.len());
        for field in as_fields {
            let mut sub =
                original.get(field).cloned().ok_or_else(|| self.invalid_path(field, "no such path"))?;
            for other in as_fields.iter().chain(as_models) {
                if let Some(rel) = strip_prefix(other, field) {
                    sub.remove(rel);
                }
            }
            if !sub.fields().is_some_and(BTreeMap::is_empty) {
                moved.push((flatten_name(field), sub));
            }
        }

        let mut working = self.node.clone();
        for path in as_fields.iter().chain(as_models) {
            if original.get(path).is_none() {
                return Err(self.invalid_path(path, "no such path"));
            }
            working.remove(path);
        }
        let fields = working.fields_mut().ok_or_else(|| DsError::NoSuchField(self.model_name.clone()))?;
        for (name, sub) in moved {
            fields.insert(name, sub);
        }
        Ok(Self { node: working, ..self.clone() })
    }

    /// Every path below this node (arrays crossed, references not followed) accepted by `pred`,
    /// sorted so parents come before children.
    pub fn list_paths_matching(&self, pred: impl Fn(&str, &SchemaNode) -> bool) -> Vec<String> {
        fn walk(
            node: &SchemaNode,
            prefix: Option<&str>,
            pred: &dyn Fn(&str, &SchemaNode) -> bool,
            out: &mut Vec<String>,
        ) {
            let Some(fields) = node.fields() else { return };
            for (name, child) in fields {
                let path = join(prefix, name);
                if pred(&path, child) {
                    out.push(path.clone());
                }
                walk(child, Some(&path), pred, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.node, None, &pred, &mut out);
        out.sort();
        out
    }

    fn invalid_path(&self, path: &str, reason: &str) -> DsError {
        DsError::InvalidFlattenPath {
            model: self.model_name.clone(),
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
