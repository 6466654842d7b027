use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    integrations::{FetchOutcome, KeywordIdea, OutcomeStatus},
};

pub const MAX_SEEDS: usize = 10;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct RelatedKeywordsRequest {
    pub keywords: Vec<String>,
    pub limit: Option<u32>,
}

impl RelatedKeywordsRequest {
    /// Trimmed, de-duplicated seeds and the effective per-seed limit.
    pub fn validate(self) -> Result<(Vec<String>, u32), AppError> {
        let mut seeds: Vec<String> = Vec::with_capacity(self.keywords.len());
        for keyword in self.keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                return Err(AppError::Validation("keywords must not be blank".into()));
            }
            if !seeds.iter().any(|s| s == keyword) {
                seeds.push(keyword.to_string());
            }
        }
        if seeds.is_empty() {
            return Err(AppError::Validation("at least one keyword is required".into()));
        }
        if seeds.len() > MAX_SEEDS {
            return Err(AppError::Validation(format!(
                "at most {MAX_SEEDS} keywords per request"
            )));
        }

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok((seeds, limit))
    }
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub seed: String,
    pub status: OutcomeStatus,
    pub keywords: Vec<KeywordIdea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SeedResult {
    pub fn from_outcome(seed: String, outcome: FetchOutcome<Vec<KeywordIdea>>) -> Self {
        let status = outcome.status();
        let (keywords, error) = match outcome {
            FetchOutcome::Data(ideas) => (ideas, None),
            FetchOutcome::Empty => (Vec::new(), None),
            FetchOutcome::Failed(e) => (Vec::new(), Some(e.to_string())),
        };
        Self {
            seed,
            status,
            keywords,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RelatedKeywordsResponse {
    pub results: Vec<SeedResult>,
}
