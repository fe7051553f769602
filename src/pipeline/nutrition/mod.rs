pub mod types;
pub mod patterns;
pub mod correction;
pub mod confidence;
pub mod parser;

pub use types::*;
pub use correction::{correct_keywords, CorrectedText};
pub use confidence::build_profile;
pub use parser::{resolve_first_matches, NutritionParser};
