use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use docindex_protocol::{GraphQueryKind, IndexKind, IndexQuery, ObjectPointer};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: ResponseMeta,
}

impl CommandResponse {
    pub fn ok(data: Value, hints: Vec<Hint>, meta: ResponseMeta) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: None,
            hints,
            data,
            meta,
        }
    }

    pub fn error(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        Self {
            status: CommandStatus::Error,
            hints: classify_error(&message),
            message: Some(message),
            data: Value::Null,
            meta: ResponseMeta::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, CommandStatus::Error)
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize, Clone)]
pub struct Hint {
    #[serde(rename = "type")]
    pub kind: HintKind,
    pub text: String,
}

impl Hint {
    pub fn new(kind: HintKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Info,
    Action,
    Warn,
}

/// What `query` does when objects are still waiting to be indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StalePolicy {
    /// Catch up within the reindex budget first.
    #[default]
    Auto,
    /// Answer from the current indexes and report the backlog.
    Warn,
    /// Refuse to answer.
    Fail,
}

#[derive(Debug, Serialize, Default, Clone)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_updated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty_remaining: Option<usize>,
}

/// Accepts `schema-match`, `full-text`, `vector`, `graph` or `field-match:<field>`.
pub fn parse_kind(raw: &str) -> Result<IndexKind> {
    let kind = match raw.split_once(':') {
        Some((IndexKind::FIELD_MATCH, field)) if !field.is_empty() => IndexKind::field_match(field),
        Some(_) => return Err(anyhow!("Unknown index kind '{raw}'")),
        None => match raw {
            IndexKind::SCHEMA_MATCH => IndexKind::SchemaMatch,
            IndexKind::FULL_TEXT => IndexKind::FullText,
            IndexKind::VECTOR => IndexKind::Vector,
            IndexKind::GRAPH => IndexKind::Graph,
            IndexKind::FIELD_MATCH => {
                return Err(anyhow!("field-match needs a field, e.g. field-match:status"))
            }
            _ => return Err(anyhow!("Unknown index kind '{raw}'")),
        },
    };
    Ok(kind)
}

/// Query flags as given on the command line.
#[derive(Debug, Default, Clone)]
pub struct QueryFlags {
    pub json: Option<String>,
    pub typenames: Vec<String>,
    pub inverted: bool,
    pub text: Option<String>,
    pub similar: Option<String>,
    pub value: Option<String>,
    pub inbound: Vec<String>,
    pub relation_source: Vec<String>,
    pub relation_target: Vec<String>,
    pub property: Option<String>,
}

impl QueryFlags {
    pub fn build(&self) -> Result<IndexQuery> {
        if let Some(raw) = &self.json {
            return serde_json::from_str(raw).context("Failed to parse --json query");
        }

        let graph = [
            (GraphQueryKind::InboundReference, &self.inbound),
            (GraphQueryKind::RelationSource, &self.relation_source),
            (GraphQueryKind::RelationTarget, &self.relation_target),
        ]
        .into_iter()
        .filter(|(_, anchors)| !anchors.is_empty())
        .collect::<Vec<_>>();

        let mut query = match (&self.text, &self.similar, &self.value, graph.as_slice()) {
            (Some(text), None, None, []) => IndexQuery::text(text),
            (None, Some(text), None, []) => IndexQuery::vector(text),
            (None, None, Some(raw), []) => {
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
                IndexQuery::field_value(value)
            }
            (None, None, None, [(kind, anchors)]) => IndexQuery::graph(
                *kind,
                parse_pointers(anchors)?,
                self.property.as_deref(),
            ),
            (None, None, None, []) => IndexQuery::default(),
            _ => return Err(anyhow!("Give only one of --text, --similar, --value or a graph anchor")),
        };
        query.typenames = self.typenames.clone();
        query.inverted = self.inverted;
        Ok(query)
    }
}

fn parse_pointers(raw: &[String]) -> Result<Vec<ObjectPointer>> {
    raw.iter()
        .map(|pointer| {
            ObjectPointer::parse(pointer)
                .ok_or_else(|| anyhow!("Invalid pointer '{pointer}', expected space:document:object"))
        })
        .collect()
}

pub fn classify_error(message: &str) -> Vec<Hint> {
    let mut hints = Vec::new();

    if message.contains("No index registered for kind") {
        hints.push(Hint::new(
            HintKind::Action,
            "Add the kind to docindex.toml (or pass --kind to reindex) and run `docindex reindex`.",
        ));
    }

    if message.contains("Corrupt snapshot record") || message.contains("Unsupported snapshot format") {
        hints.push(Hint::new(
            HintKind::Warn,
            "A stored index could not be read; `docindex reindex` rebuilds it from the documents.",
        ));
    }

    if message.contains("Failed to open store") {
        hints.push(Hint::new(
            HintKind::Warn,
            "Check that --store points to a writable directory.",
        ));
    }

    hints
}
