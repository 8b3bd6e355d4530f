//! Resolving a detected dish's ingredients and estimating its calories.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use nutrimatch_core::traits::{LexicalRanker, VectorSearch};
use nutrimatch_core::types::QueryResult;
use nutrimatch_core::{Error, Result};

use crate::HybridRetriever;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity_grams: f64,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, quantity_grams: f64) -> Self {
        Self { name: name.into(), quantity_grams }
    }
}

/// `"<name>:<grams>"`, e.g. `"chicken breast:150"`.
impl FromStr for Ingredient {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, grams) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("expected NAME:GRAMS, got '{s}'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument(format!("ingredient name is empty in '{s}'")));
        }
        let quantity_grams: f64 = grams
            .trim()
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("'{}' is not a quantity in grams", grams.trim())))?;
        if !quantity_grams.is_finite() || quantity_grams < 0.0 {
            return Err(Error::InvalidArgument(format!("quantity must be a non-negative number, got {quantity_grams}")));
        }
        Ok(Self::new(name, quantity_grams))
    }
}

/// Candidates found for one ingredient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientMatch {
    pub ingredient: Ingredient,
    pub candidates: Vec<QueryResult>,
}

impl IngredientMatch {
    /// First candidate with a known calorie value.
    pub fn first_known(&self) -> Option<&QueryResult> {
        self.candidates.iter().find(|c| c.calories_per_100g.is_known())
    }

    /// Default pick: the first candidate with known calories, else the first candidate.
    pub fn auto_select(&self) -> Selection {
        Selection {
            ingredient: self.ingredient.clone(),
            food: self.first_known().or_else(|| self.candidates.first()).cloned(),
        }
    }
}

/// The reference food chosen for an ingredient, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub ingredient: Ingredient,
    pub food: Option<QueryResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DishLine {
    pub ingredient: String,
    pub food_id: Option<String>,
    pub food_name: Option<String>,
    pub quantity_grams: f64,
    pub kcal: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DishEstimate {
    /// Sum over the lines with known calories only.
    pub total_kcal: f64,
    pub lines: Vec<DishLine>,
    /// Ingredients left out of the total: no match, or a match without calories.
    pub unknown: Vec<String>,
}

impl DishEstimate {
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }
}

/// Match every ingredient with a single batched retrieval.
pub async fn match_dish<L, V>(
    retriever: &HybridRetriever<L, V>,
    ingredients: &[Ingredient],
    top_k: usize,
) -> Result<Vec<IngredientMatch>>
where
    L: LexicalRanker + 'static,
    V: VectorSearch,
{
    let names: Vec<String> = ingredients.iter().map(|i| i.name.clone()).collect();
    let results = retriever.retrieve_batch(&names, top_k).await?;
    Ok(ingredients
        .iter()
        .cloned()
        .zip(results)
        .map(|(ingredient, candidates)| IngredientMatch { ingredient, candidates })
        .collect())
}

pub fn estimate_dish(selections: &[Selection]) -> DishEstimate {
    let mut total_kcal = 0.0;
    let mut unknown = Vec::new();
    let lines = selections
        .iter()
        .map(|s| {
            let kcal = s
                .food
                .as_ref()
                .and_then(|f| f.calories_per_100g.for_quantity(s.ingredient.quantity_grams));
            match kcal {
                Some(k) => total_kcal += k,
                None => unknown.push(s.ingredient.name.clone()),
            }
            DishLine {
                ingredient: s.ingredient.name.clone(),
                food_id: s.food.as_ref().map(|f| f.id.clone()),
                food_name: s.food.as_ref().map(|f| f.name_en.clone()),
                quantity_grams: s.ingredient.quantity_grams,
                kcal,
            }
        })
        .collect();
    DishEstimate { total_kcal, lines, unknown }
}
