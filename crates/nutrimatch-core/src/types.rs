//! Domain types shared by the lexical, vector and hybrid engines.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Stable food identifier. The Ciqual `alim_code` is used, never the row index.
pub type FoodId = String;

/// Energy density of a food, or an explicit unknown marker.
///
/// Serialized as a bare number when known and as the string `"N/A"` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calories {
    Known(f64),
    Unknown,
}

impl Calories {
    pub const UNKNOWN_MARKER: &'static str = "N/A";

    /// Parse a raw dataset cell. Decimal commas are accepted (`"22,5"`).
    /// Placeholders such as `-`, `traces` or `< 0,5` map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.trim().replace(',', ".");
        match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Self::Known(v),
            _ => Self::Unknown,
        }
    }

    pub fn per_100g(&self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(*v),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Calories for `grams` of this food.
    pub fn for_quantity(&self, grams: f64) -> Option<f64> {
        self.per_100g().map(|kcal| kcal * grams / 100.0)
    }
}

impl fmt::Display for Calories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v:.1} kcal/100g"),
            Self::Unknown => f.write_str(Self::UNKNOWN_MARKER),
        }
    }
}

impl Serialize for Calories {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => serializer.serialize_f64(*v),
            Self::Unknown => serializer.serialize_str(Self::UNKNOWN_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for Calories {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Self::Known(v),
            Raw::Text(s) => Self::parse(&s),
        })
    }
}

/// One row of the reference nutrition table.
///
/// The dense embedding of `name_en` lives next to the record in the
/// Reference Index and is not part of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub id: FoodId,
    pub name_en: String,
    pub name_fr: String,
    pub group_code: Option<String>,
    pub subgroup_code: Option<String>,
    pub subsubgroup_code: Option<String>,
    pub group_name_fr: Option<String>,
    pub subgroup_name_fr: Option<String>,
    pub calories_per_100g: Calories,
}

impl FoodEntry {
    /// Minimal entry, handy for fixtures and programmatic catalogs.
    pub fn new(id: impl Into<FoodId>, name_en: impl Into<String>, calories_per_100g: Calories) -> Self {
        Self {
            id: id.into(),
            name_en: name_en.into(),
            name_fr: String::new(),
            group_code: None,
            subgroup_code: None,
            subsubgroup_code: None,
            group_name_fr: None,
            subgroup_name_fr: None,
            calories_per_100g,
        }
    }
}

/// Immutable, position-ordered set of food entries.
///
/// Position `i` is the build-time order and the document index used by the
/// lexical ranker; `id_at` is the explicit position -> id mapping.
#[derive(Debug, Clone, Default)]
pub struct FoodCatalog {
    entries: Vec<FoodEntry>,
    by_id: HashMap<FoodId, usize>,
}

impl FoodCatalog {
    pub fn from_entries(entries: Vec<FoodEntry>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if entry.id.is_empty() {
                return Err(Error::InvalidArgument(format!("entry at position {position} has an empty id")));
            }
            if let Some(previous) = by_id.insert(entry.id.clone(), position) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate food id '{}' at positions {} and {}",
                    entry.id, previous, position
                )));
            }
        }
        Ok(Self { entries, by_id })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FoodEntry] {
        &self.entries
    }

    pub fn id_at(&self, position: usize) -> Option<&FoodId> {
        self.entries.get(position).map(|e| &e.id)
    }

    pub fn get(&self, id: &str) -> Option<&FoodEntry> {
        self.by_id.get(id).map(|&p| &self.entries[p])
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn names_en(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name_en.clone()).collect()
    }
}

/// Lexical ranker output: a corpus position and its BM25 score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub position: usize,
    pub score: f32,
}

/// Vector search output: a food id and its cosine distance (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: FoodId,
    pub distance: f32,
}

/// Which sub-search surfaced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Lexical,
    Vector,
    Both,
}

impl MatchSource {
    pub fn merge(self, other: MatchSource) -> MatchSource {
        if self == other { self } else { MatchSource::Both }
    }
}

/// One candidate returned by the hybrid retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: FoodId,
    pub name_en: String,
    pub calories_per_100g: Calories,
    pub matched_by: MatchSource,
}

impl QueryResult {
    pub fn from_entry(entry: &FoodEntry, matched_by: MatchSource) -> Self {
        Self {
            id: entry.id.clone(),
            name_en: entry.name_en.clone(),
            calories_per_100g: entry.calories_per_100g,
            matched_by,
        }
    }

    /// The plain `(id, name, calories)` tuple persisted by the application.
    pub fn as_tuple(&self) -> (&str, &str, Calories) {
        (&self.id, &self.name_en, self.calories_per_100g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calories_parse_handles_dataset_placeholders() {
        assert_eq!(Calories::parse("22"), Calories::Known(22.0));
        assert_eq!(Calories::parse(" 22,5 "), Calories::Known(22.5));
        assert_eq!(Calories::parse("-"), Calories::Unknown);
        assert_eq!(Calories::parse("traces"), Calories::Unknown);
        assert_eq!(Calories::parse("< 0,5"), Calories::Unknown);
        assert_eq!(Calories::parse(""), Calories::Unknown);
        assert_eq!(Calories::parse("N/A"), Calories::Unknown);
    }

    #[test]
    fn calories_serialize_unknown_as_marker() {
        let json = serde_json::to_string(&vec![Calories::Known(22.0), Calories::Unknown]).unwrap();
        assert_eq!(json, r#"[22.0,"N/A"]"#);
        let back: Vec<Calories> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Calories::Known(22.0), Calories::Unknown]);
    }

    #[test]
    fn calories_for_quantity() {
        assert_eq!(Calories::Known(200.0).for_quantity(150.0), Some(300.0));
        assert_eq!(Calories::Unknown.for_quantity(150.0), None);
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let err = FoodCatalog::from_entries(vec![
            FoodEntry::new("1", "apple", Calories::Known(52.0)),
            FoodEntry::new("1", "pear", Calories::Known(57.0)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn catalog_maps_positions_to_ids() {
        let catalog = FoodCatalog::from_entries(vec![
            FoodEntry::new("20010", "Mushroom, raw", Calories::Known(22.0)),
            FoodEntry::new("9100", "Rice, white", Calories::Known(130.0)),
        ])
        .unwrap();
        assert_eq!(catalog.id_at(1).map(String::as_str), Some("9100"));
        assert_eq!(catalog.position_of("20010"), Some(0));
        assert!(catalog.id_at(2).is_none());
        assert_eq!(catalog.get("9100").map(|e| e.name_en.as_str()), Some("Rice, white"));
    }

    #[test]
    fn match_source_merge() {
        assert_eq!(MatchSource::Lexical.merge(MatchSource::Lexical), MatchSource::Lexical);
        assert_eq!(MatchSource::Lexical.merge(MatchSource::Vector), MatchSource::Both);
    }
}
