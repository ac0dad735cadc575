use bson::{Bson, Document, doc};
use serde::Serialize;

/// Marker a reparented record carries when its source path was null or absent.
pub const RECORD_DOES_NOT_EXIST: &str = "__record_does_not_exist__";
/// Field receiving the element index while unwinding a promoted array.
pub const INDEX_FIELD: &str = "__index__";
/// Version key of the native store, never exposed.
pub const VERSION_FIELD: &str = "__v";
/// Prefix of fields materialized only to run string operators on other types.
pub const STRING_PREFIX: &str = "__string__";
/// Computed fields per `$addFields` stage before the map is split.
pub const MAX_FIELDS_PER_STAGE: usize = 30;

/// One native pipeline stage. The compiler emits nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineStage {
    Match(Document),
    Sort(Document),
    Skip(u64),
    Limit(u64),
    Project(Document),
    Lookup(Document),
    Unwind(Document),
    AddFields(Document),
    Group(Document),
    ReplaceRoot(Document),
}

impl PipelineStage {
    #[must_use]
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Sort(_) => "$sort",
            Self::Skip(_) => "$skip",
            Self::Limit(_) => "$limit",
            Self::Project(_) => "$project",
            Self::Lookup(_) => "$lookup",
            Self::Unwind(_) => "$unwind",
            Self::AddFields(_) => "$addFields",
            Self::Group(_) => "$group",
            Self::ReplaceRoot(_) => "$replaceRoot",
        }
    }

    /// Native stage document, e.g. `{"$match": {...}}`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let body = match self {
            Self::Skip(n) | Self::Limit(n) => Bson::Int64(i64::try_from(*n).unwrap_or(i64::MAX)),
            Self::Match(d)
            | Self::Sort(d)
            | Self::Project(d)
            | Self::Lookup(d)
            | Self::Unwind(d)
            | Self::AddFields(d)
            | Self::Group(d)
            | Self::ReplaceRoot(d) => Bson::Document(d.clone()),
        };
        let mut out = Document::new();
        out.insert(self.operator(), body);
        out
    }

    /// Join on `foreign._id = local`, excluding the version key from the joined payload.
    #[must_use]
    pub fn lookup(from: &str, local_field: &str, as_field: &str) -> Self {
        Self::Lookup(doc! {
            "from": from,
            "localField": local_field,
            "foreignField": "_id",
            "as": as_field,
            "pipeline": [ { "$project": { "__v": 0 } } ],
        })
    }

    #[must_use]
    pub fn unwind(path: &str, preserve_null_and_empty_arrays: bool) -> Self {
        Self::Unwind(doc! {
            "path": format!("${path}"),
            "preserveNullAndEmptyArrays": preserve_null_and_empty_arrays,
        })
    }

    #[must_use]
    pub fn unwind_with_index(path: &str) -> Self {
        Self::Unwind(doc! { "path": format!("${path}"), "includeArrayIndex": INDEX_FIELD })
    }
}

/// Splits a computed-field map into consecutive `$addFields` stages.
#[must_use]
pub fn add_fields(fields: Document) -> Vec<PipelineStage> {
    let mut stages = Vec::new();
    let mut current = Document::new();
    for (k, v) in fields {
        if current.len() == MAX_FIELDS_PER_STAGE {
            stages.push(PipelineStage::AddFields(std::mem::take(&mut current)));
        }
        current.insert(k, v);
    }
    if !current.is_empty() {
        stages.push(PipelineStage::AddFields(current));
    }
    stages
}

/// Native stage documents, ready for the store.
#[must_use]
pub fn to_documents(stages: &[PipelineStage]) -> Vec<Document> {
    stages.iter().map(PipelineStage::to_document).collect()
}

/// `"$path"` reference to a field.
#[must_use]
pub fn field_ref(path: &str) -> Bson {
    Bson::String(format!("${path}"))
}
