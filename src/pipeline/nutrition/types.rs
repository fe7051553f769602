use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Nutrients the parser recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientType {
    Calories,
    Protein,
    Carbohydrates,
    Fat,
    Fiber,
    Sugar,
    SaturatedFat,
    TransFat,
    Sodium,
    Cholesterol,
    Potassium,
    Calcium,
    Iron,
    VitaminA,
    VitaminC,
    VitaminD,
}

/// Confidence category a nutrient contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NutrientCategory {
    Calories,
    Macronutrient,
    Micronutrient,
}

impl NutrientType {
    pub const ALL: [NutrientType; 16] = [
        Self::Calories,
        Self::Protein,
        Self::Carbohydrates,
        Self::Fat,
        Self::Fiber,
        Self::Sugar,
        Self::SaturatedFat,
        Self::TransFat,
        Self::Sodium,
        Self::Cholesterol,
        Self::Potassium,
        Self::Calcium,
        Self::Iron,
        Self::VitaminA,
        Self::VitaminC,
        Self::VitaminD,
    ];

    pub fn category(self) -> NutrientCategory {
        match self {
            Self::Calories => NutrientCategory::Calories,
            Self::Protein
            | Self::Carbohydrates
            | Self::Fat
            | Self::Fiber
            | Self::Sugar
            | Self::SaturatedFat
            | Self::TransFat => NutrientCategory::Macronutrient,
            Self::Sodium
            | Self::Cholesterol
            | Self::Potassium
            | Self::Calcium
            | Self::Iron
            | Self::VitaminA
            | Self::VitaminC
            | Self::VitaminD => NutrientCategory::Micronutrient,
        }
    }

    /// Literal keyword whose presence in a match earns the keyword bonus.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Calories => "calories",
            Self::Protein => "protein",
            Self::Carbohydrates => "carbohydrate",
            Self::Fat => "fat",
            Self::Fiber => "fiber",
            Self::Sugar => "sugar",
            Self::SaturatedFat => "saturated",
            Self::TransFat => "trans",
            Self::Sodium => "sodium",
            Self::Cholesterol => "cholesterol",
            Self::Potassium => "potassium",
            Self::Calcium => "calcium",
            Self::Iron => "iron",
            Self::VitaminA => "vitamin a",
            Self::VitaminC => "vitamin c",
            Self::VitaminD => "vitamin d",
        }
    }

    /// Unit assumed when the label omits one.
    pub fn default_unit(self) -> &'static str {
        match self {
            Self::Calories => "kcal",
            Self::Protein
            | Self::Carbohydrates
            | Self::Fat
            | Self::Fiber
            | Self::Sugar
            | Self::SaturatedFat
            | Self::TransFat => "g",
            Self::Sodium
            | Self::Cholesterol
            | Self::Potassium
            | Self::Calcium
            | Self::Iron
            | Self::VitaminC => "mg",
            Self::VitaminA | Self::VitaminD => "mcg",
        }
    }
}

impl std::fmt::Display for NutrientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Calories => "Calories",
            Self::Protein => "Protein",
            Self::Carbohydrates => "Carbohydrates",
            Self::Fat => "Fat",
            Self::Fiber => "Fiber",
            Self::Sugar => "Sugar",
            Self::SaturatedFat => "Saturated fat",
            Self::TransFat => "Trans fat",
            Self::Sodium => "Sodium",
            Self::Cholesterol => "Cholesterol",
            Self::Potassium => "Potassium",
            Self::Calcium => "Calcium",
            Self::Iron => "Iron",
            Self::VitaminA => "Vitamin A",
            Self::VitaminC => "Vitamin C",
            Self::VitaminD => "Vitamin D",
        };
        f.write_str(name)
    }
}

/// One pattern hit in the linearized label text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientMatch {
    pub nutrient_type: NutrientType,
    pub value: f64,
    pub unit: String,
    pub original_text: String,
    /// Byte range of the match in the linearized text.
    pub source_range: Range<usize>,
    pub confidence: f32,
    pub is_estimated: bool,
}

/// The single value resolved for a nutrient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientValue {
    pub value: f64,
    pub unit: String,
    pub original_text: String,
    pub confidence: f32,
    /// "<1g", "less than 5mg", or a fuzzily corrected label.
    pub is_estimated: bool,
}

impl From<&NutrientMatch> for NutrientValue {
    fn from(m: &NutrientMatch) -> Self {
        Self {
            value: m.value,
            unit: m.unit.clone(),
            original_text: m.original_text.clone(),
            confidence: m.confidence,
            is_estimated: m.is_estimated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingInfo {
    /// Text after "Serving Size", e.g. "1 cup (228g)".
    pub description: String,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    /// Gram (or millilitre) equivalent from the parenthesized part.
    pub grams: Option<f64>,
    pub servings_per_container: Option<f64>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Macronutrients {
    pub protein: Option<NutrientValue>,
    pub carbohydrates: Option<NutrientValue>,
    pub fat: Option<NutrientValue>,
    pub fiber: Option<NutrientValue>,
    pub sugar: Option<NutrientValue>,
    pub saturated_fat: Option<NutrientValue>,
    pub trans_fat: Option<NutrientValue>,
}

impl Macronutrients {
    pub fn values(&self) -> impl Iterator<Item = &NutrientValue> {
        [
            &self.protein,
            &self.carbohydrates,
            &self.fat,
            &self.fiber,
            &self.sugar,
            &self.saturated_fat,
            &self.trans_fat,
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Micronutrients {
    pub sodium: Option<NutrientValue>,
    pub cholesterol: Option<NutrientValue>,
    pub potassium: Option<NutrientValue>,
    pub calcium: Option<NutrientValue>,
    pub iron: Option<NutrientValue>,
    pub vitamin_a: Option<NutrientValue>,
    pub vitamin_c: Option<NutrientValue>,
    pub vitamin_d: Option<NutrientValue>,
}

impl Micronutrients {
    pub fn values(&self) -> impl Iterator<Item = &NutrientValue> {
        [
            &self.sodium,
            &self.cholesterol,
            &self.potassium,
            &self.calcium,
            &self.iron,
            &self.vitamin_a,
            &self.vitamin_c,
            &self.vitamin_d,
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }
}

/// Per-category confidence plus the weighted overall score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceProfile {
    pub serving: f32,
    pub calories: f32,
    pub macronutrients: f32,
    pub micronutrients: f32,
    pub format_recognition: f32,
    /// Always within [0, 1].
    pub overall_score: f32,
}

/// Structured nutrition facts from one label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedNutritionData {
    pub serving_info: Option<ServingInfo>,
    pub calories: Option<NutrientValue>,
    pub macronutrients: Macronutrients,
    pub micronutrients: Micronutrients,
    pub confidence: ConfidenceProfile,
}

impl ParsedNutritionData {
    /// All fields absent, confidence 0.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, nutrient: NutrientType) -> Option<&NutrientValue> {
        let slot = match nutrient {
            NutrientType::Calories => &self.calories,
            NutrientType::Protein => &self.macronutrients.protein,
            NutrientType::Carbohydrates => &self.macronutrients.carbohydrates,
            NutrientType::Fat => &self.macronutrients.fat,
            NutrientType::Fiber => &self.macronutrients.fiber,
            NutrientType::Sugar => &self.macronutrients.sugar,
            NutrientType::SaturatedFat => &self.macronutrients.saturated_fat,
            NutrientType::TransFat => &self.macronutrients.trans_fat,
            NutrientType::Sodium => &self.micronutrients.sodium,
            NutrientType::Cholesterol => &self.micronutrients.cholesterol,
            NutrientType::Potassium => &self.micronutrients.potassium,
            NutrientType::Calcium => &self.micronutrients.calcium,
            NutrientType::Iron => &self.micronutrients.iron,
            NutrientType::VitaminA => &self.micronutrients.vitamin_a,
            NutrientType::VitaminC => &self.micronutrients.vitamin_c,
            NutrientType::VitaminD => &self.micronutrients.vitamin_d,
        };
        slot.as_ref()
    }

    /// Resolved values whose nutrient belongs to `category`, in table order.
    pub fn values_in(&self, category: NutrientCategory) -> impl Iterator<Item = &NutrientValue> {
        NutrientType::ALL
            .into_iter()
            .filter(move |n| n.category() == category)
            .filter_map(move |n| self.get(n))
    }

    pub(crate) fn set(&mut self, nutrient: NutrientType, value: NutrientValue) {
        let slot = match nutrient {
            NutrientType::Calories => &mut self.calories,
            NutrientType::Protein => &mut self.macronutrients.protein,
            NutrientType::Carbohydrates => &mut self.macronutrients.carbohydrates,
            NutrientType::Fat => &mut self.macronutrients.fat,
            NutrientType::Fiber => &mut self.macronutrients.fiber,
            NutrientType::Sugar => &mut self.macronutrients.sugar,
            NutrientType::SaturatedFat => &mut self.macronutrients.saturated_fat,
            NutrientType::TransFat => &mut self.macronutrients.trans_fat,
            NutrientType::Sodium => &mut self.micronutrients.sodium,
            NutrientType::Cholesterol => &mut self.micronutrients.cholesterol,
            NutrientType::Potassium => &mut self.micronutrients.potassium,
            NutrientType::Calcium => &mut self.micronutrients.calcium,
            NutrientType::Iron => &mut self.micronutrients.iron,
            NutrientType::VitaminA => &mut self.micronutrients.vitamin_a,
            NutrientType::VitaminC => &mut self.micronutrients.vitamin_c,
            NutrientType::VitaminD => &mut self.micronutrients.vitamin_d,
        };
        *slot = Some(value);
    }

    /// Calories or at least one macronutrient present.
    pub fn has_basic_nutrition(&self) -> bool {
        self.calories.is_some() || !self.macronutrients.is_empty()
    }

    pub fn has_any_data(&self) -> bool {
        self.serving_info.is_some() || self.resolved_count() > 0
    }

    /// Number of nutrients with a resolved value.
    pub fn resolved_count(&self) -> usize {
        NutrientType::ALL
            .iter()
            .filter(|n| self.get(**n).is_some())
            .count()
    }

    /// Resolved nutrients in declaration order.
    pub fn nutrients(&self) -> impl Iterator<Item = (NutrientType, &NutrientValue)> {
        NutrientType::ALL
            .into_iter()
            .filter_map(move |n| self.get(n).map(|v| (n, v)))
    }
}
