use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

use super::domain::{BadgeDefinition, BadgeId};
use super::rank::{RankTable, RankThreshold};
use super::rules::parse_rule_value;

const SAMPLE_CATALOG: &str = include_str!("../../data/sample-catalog.json");

/// Badge definitions plus the rank table they are scored against. Loaded once per
/// session and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct BadgeCatalog {
    badges: Vec<BadgeDefinition>,
    index: HashMap<BadgeId, usize>,
    ranks: RankTable,
}

impl BadgeCatalog {
    /// Keeps the first definition for each id; later duplicates are logged and dropped.
    pub fn new(badges: Vec<BadgeDefinition>, ranks: RankTable) -> Self {
        let mut kept = Vec::with_capacity(badges.len());
        let mut index = HashMap::with_capacity(badges.len());
        for badge in badges {
            if index.contains_key(&badge.id) {
                warn!(badge_id = %badge.id, "duplicate badge id in catalog; keeping the first row");
                continue;
            }
            index.insert(badge.id.clone(), kept.len());
            kept.push(badge);
        }

        Self {
            badges: kept,
            index,
            ranks,
        }
    }

    /// `{ "ranks": [...], "badges": [...] }` or a bare array of badge rows.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let document: JsonCatalog = serde_json::from_reader(reader).map_err(CatalogError::Json)?;
        let (rows, ranks) = match document {
            JsonCatalog::Rows(rows) => (rows, Vec::new()),
            JsonCatalog::Document { badges, ranks } => (badges, ranks),
        };

        let badges = rows
            .into_iter()
            .enumerate()
            .filter_map(|(position, row)| row.into_definition(position))
            .collect();
        Ok(Self::new(badges, RankTable::new(ranks)))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        Self::from_json_reader(raw.as_bytes())
    }

    /// Columns `id,name,expert_name,emoji,question,theme,low_skill,answer_config`;
    /// every column but `id` and `name` may be missing.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut badges = Vec::new();
        for (position, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
            let row = record.map_err(CatalogError::Csv)?;
            if let Some(badge) = row.into_row().into_definition(position) {
                badges.push(badge);
            }
        }

        Ok(Self::new(badges, RankTable::default()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        let open = || {
            File::open(path).map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })
        };

        let catalog = match extension.as_deref() {
            Some("json") => Self::from_json_reader(io::BufReader::new(open()?))?,
            Some("csv") => Self::from_csv_reader(open()?)?,
            _ => return Err(CatalogError::UnsupportedFormat(path.to_path_buf())),
        };

        info!(
            path = %path.display(),
            badges = catalog.len(),
            ghosts = catalog.ghosts().count(),
            "badge catalog loaded"
        );
        Ok(catalog)
    }

    /// Built-in demo catalog covering every rule variant.
    pub fn sample() -> Result<Self, CatalogError> {
        Self::from_json_str(SAMPLE_CATALOG)
    }

    pub fn badges(&self) -> &[BadgeDefinition] {
        &self.badges
    }

    pub fn get(&self, id: &BadgeId) -> Option<&BadgeDefinition> {
        self.index.get(id).map(|position| &self.badges[*position])
    }

    pub fn visible(&self) -> impl Iterator<Item = &BadgeDefinition> {
        self.badges.iter().filter(|badge| !badge.is_ghost())
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &BadgeDefinition> {
        self.badges.iter().filter(|badge| badge.is_ghost())
    }

    pub fn ranks(&self) -> &RankTable {
        &self.ranks
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io { path: PathBuf, source: io::Error },
    Json(serde_json::Error),
    Csv(csv::Error),
    UnsupportedFormat(PathBuf),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io { path, .. } => {
                write!(f, "failed to read catalog at {}", path.display())
            }
            CatalogError::Json(err) => write!(f, "catalog JSON is malformed: {}", err),
            CatalogError::Csv(err) => write!(f, "catalog CSV is malformed: {}", err),
            CatalogError::UnsupportedFormat(path) => write!(
                f,
                "catalog {} must have a .json or .csv extension",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io { source, .. } => Some(source),
            CatalogError::Json(err) => Some(err),
            CatalogError::Csv(err) => Some(err),
            CatalogError::UnsupportedFormat(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCatalog {
    Rows(Vec<CatalogRow>),
    Document {
        #[serde(default)]
        ranks: Vec<RankThreshold>,
        #[serde(default)]
        badges: Vec<CatalogRow>,
    },
}

/// One catalog row as authored by the admin surface.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRow {
    #[serde(default, deserialize_with = "text_or_none")]
    id: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    name: Option<String>,
    #[serde(default, alias = "expert_name", deserialize_with = "text_or_none")]
    expert_name: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    emoji: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    question: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    theme: Option<String>,
    #[serde(default, alias = "low_skill", deserialize_with = "flag")]
    low_skill: bool,
    #[serde(default, alias = "answer_config")]
    answer_config: Value,
}

impl CatalogRow {
    fn into_definition(self, position: usize) -> Option<BadgeDefinition> {
        let (Some(id), Some(name)) = (self.id, self.name) else {
            warn!(row = position, "catalog row without id or name skipped");
            return None;
        };

        Some(BadgeDefinition {
            id: BadgeId::new(id),
            name,
            expert_name: self.expert_name,
            emoji: self.emoji.unwrap_or_default(),
            question: self.question.unwrap_or_default(),
            theme: self.theme.unwrap_or_default(),
            low_skill: self.low_skill,
            rule: parse_rule_value(&self.answer_config),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    expert_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    emoji: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    question: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    theme: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    low_skill: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    answer_config: Option<String>,
}

impl CsvRow {
    fn into_row(self) -> CatalogRow {
        CatalogRow {
            id: self.id,
            name: self.name,
            expert_name: self.expert_name,
            emoji: self.emoji,
            question: self.question,
            theme: self.theme,
            low_skill: self.low_skill.as_deref().is_some_and(is_truthy),
            answer_config: self.answer_config.map(Value::String).unwrap_or_default(),
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "oui" | "vrai"
    )
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn text_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(value) => value,
        Value::Number(value) => value.as_f64().is_some_and(|value| value != 0.0),
        Value::String(value) => is_truthy(&value),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::rules::BadgeRule;

    #[test]
    fn sample_catalog_covers_every_variant() {
        let catalog = BadgeCatalog::sample().expect("sample catalog parses");
        let kinds: Vec<&str> = catalog.badges().iter().map(|badge| badge.rule.kind()).collect();
        for kind in ["boolean", "singleSelect", "multiSelect", "range", "freeText", "ghost"] {
            assert!(kinds.contains(&kind), "sample catalog lacks a {kind} badge");
        }
        assert_eq!(catalog.ghosts().count(), 3);
        assert!(catalog
            .get(&BadgeId::new("fumeur"))
            .is_some_and(|badge| badge.low_skill));
    }

    #[test]
    fn ghost_flag_without_prerequisite_stays_visible() {
        let catalog = BadgeCatalog::sample().expect("sample catalog parses");
        let mystere = catalog.get(&BadgeId::new("mystere")).expect("mystere exists");
        assert!(matches!(mystere.rule, BadgeRule::FreeText(_)));
    }

    #[test]
    fn bare_json_array_uses_default_ranks_and_defaults_missing_fields() {
        let catalog = BadgeCatalog::from_json_str(
            r#"[{"id":"a","name":"A"},{"name":"no id"},{"id":"a","name":"dup"}]"#,
        )
        .expect("catalog parses");
        assert_eq!(catalog.len(), 1);
        let badge = &catalog.badges()[0];
        assert_eq!(badge.name, "A");
        assert_eq!(badge.emoji, "");
        assert!(!badge.low_skill);
        assert_eq!(catalog.ranks(), &RankTable::default());
    }

    #[test]
    fn csv_rows_accept_string_configs_and_missing_columns() {
        let csv = "id,name,low_skill,answer_config\n\
                   fumeur,Fumeur,oui,\"{\"\"type\"\":\"\"boolean\"\"}\"\n\
                   capitale,Géographe,,Canberra\n\
                   ,orphan,,\n";
        let catalog = BadgeCatalog::from_csv_reader(csv.as_bytes()).expect("csv parses");
        assert_eq!(catalog.len(), 2);

        let fumeur = catalog.get(&BadgeId::new("fumeur")).expect("fumeur exists");
        assert!(fumeur.low_skill);
        assert!(matches!(fumeur.rule, BadgeRule::Boolean(_)));

        let capitale = catalog.get(&BadgeId::new("capitale")).expect("capitale exists");
        match &capitale.rule {
            BadgeRule::FreeText(rule) => assert_eq!(rule.expected_answer, "canberra"),
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = BadgeCatalog::from_path("catalog.yaml").expect_err("yaml unsupported");
        assert!(matches!(err, CatalogError::UnsupportedFormat(_)));
    }
}
