//! Join descriptors and their decoded specification

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::step::{KeyFn, StepId};
use crate::value::{Record, Value};

/// How right-hand records are attached to a left record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JoinKind {
    /// At most one right record per left key, absent when unmatched
    Single,
    /// All matching right records, collected in a list
    Multi,
    /// Matching records of several right datasets, unioned in one list with a
    /// companion list of source ordinals
    MultiArray,
}

impl JoinKind {
    /// Tag naming this kind
    pub fn tag(self) -> &'static str {
        match self {
            JoinKind::Single => "right_single",
            JoinKind::Multi => "right_multi",
            JoinKind::MultiArray => "right_multi_array",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for JoinKind {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "right_single" => Ok(JoinKind::Single),
            "right_multi" => Ok(JoinKind::Multi),
            "right_multi_array" => Ok(JoinKind::MultiArray),
            other => Err(Error::InvalidJoinSpec(format!("unknown join kind `{other}`"))),
        }
    }
}

/// Right-hand side of a join descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinSource {
    /// One dataset
    Step(StepId),
    /// Several datasets, for `right_multi_array`
    Steps(Vec<StepId>),
}

/// Loosely typed description of one right-hand join, validated by
/// [`JoinSpec::decode`]
#[derive(Clone)]
pub struct JoinDescriptor {
    /// Name of the output field receiving the joined records
    pub field_name: String,
    /// Join kind tag
    pub kind_tag: String,
    /// Right-hand dataset(s)
    pub source: JoinSource,
    /// Key extraction for the right-hand records
    pub key: Option<KeyFn>,
}

impl JoinDescriptor {
    /// Describe a join from its raw parts
    pub fn new(
        field_name: &str,
        kind_tag: &str,
        source: JoinSource,
        key: Option<KeyFn>,
    ) -> Self {
        Self {
            field_name: field_name.to_string(),
            kind_tag: kind_tag.to_string(),
            source,
            key,
        }
    }

    /// At most one `source` record per left record
    pub fn single<F>(field_name: &str, source: StepId, key: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self::new(field_name, JoinKind::Single.tag(), JoinSource::Step(source), Some(Arc::new(key)))
    }

    /// All matching `source` records per left record
    pub fn multi<F>(field_name: &str, source: StepId, key: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self::new(field_name, JoinKind::Multi.tag(), JoinSource::Step(source), Some(Arc::new(key)))
    }

    /// All matching records of every dataset in `sources`
    pub fn multi_array<F>(field_name: &str, sources: Vec<StepId>, key: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self::new(
            field_name,
            JoinKind::MultiArray.tag(),
            JoinSource::Steps(sources),
            Some(Arc::new(key)),
        )
    }
}

impl fmt::Display for JoinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, ({:?}, ", self.field_name, self.kind_tag)?;
        match &self.source {
            JoinSource::Step(id) => write!(f, "{id}")?,
            JoinSource::Steps(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", ids.join(", "))?;
            }
        }
        let key = if self.key.is_some() { "<fn>" } else { "<missing>" };
        write!(f, "), (\"key\", {key}))")
    }
}

impl fmt::Debug for JoinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Validated right-hand join
#[derive(Clone)]
pub struct JoinSpec {
    field_name: String,
    kind: JoinKind,
    sources: Vec<StepId>,
    key: KeyFn,
}

impl JoinSpec {
    /// Validate a descriptor against the graph its sources belong to
    pub fn decode(pipeline: &Pipeline, descriptor: &JoinDescriptor) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidJoinSpec(format!("{reason}: {descriptor}"));

        if descriptor.field_name.is_empty() {
            return Err(invalid("missing field name"));
        }
        let kind: JoinKind = descriptor
            .kind_tag
            .parse()
            .map_err(|_| invalid("unknown join kind"))?;
        let key = descriptor.key.clone().ok_or_else(|| invalid("missing key function"))?;

        let sources = match (kind, &descriptor.source) {
            (JoinKind::MultiArray, JoinSource::Steps(ids)) => ids.clone(),
            (JoinKind::MultiArray, JoinSource::Step(_)) => {
                return Err(invalid("expecting a list of datasets"))
            }
            (_, JoinSource::Step(id)) => vec![*id],
            (_, JoinSource::Steps(_)) => return Err(invalid("expecting a single dataset")),
        };
        if let Some(missing) = sources.iter().find(|id| pipeline.step(**id).is_err()) {
            return Err(invalid(&format!("{missing} is not a dataset of this pipeline")));
        }

        Ok(Self {
            field_name: descriptor.field_name.clone(),
            kind,
            sources,
            key,
        })
    }

    /// Output field receiving the joined records
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Join kind
    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    /// Right-hand datasets, in declaration order
    pub fn sources(&self) -> &[StepId] {
        &self.sources
    }

    /// Right-hand key extraction
    pub fn key(&self) -> &KeyFn {
        &self.key
    }

    /// Companion field holding source ordinals, for `MultiArray` joins
    pub fn index_field_name(&self) -> Option<String> {
        (self.kind == JoinKind::MultiArray).then(|| format!("{}_index", self.field_name))
    }
}

impl fmt::Debug for JoinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinSpec")
            .field("field_name", &self.field_name)
            .field("kind", &self.kind)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}
