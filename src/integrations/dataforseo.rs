//! DataForSEO Labs keyword research.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{FetchOutcome, IntegrationError, ResilientClient};

const SERVICE: &str = "dataforseo";
const RELATED_KEYWORDS_PATH: &str = "/v3/dataforseo_labs/google/related_keywords/live";
const STATUS_OK: i64 = 20000;
/// United States
const DEFAULT_LOCATION_CODE: u32 = 2840;
const DEFAULT_LANGUAGE_CODE: &str = "en";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeywordIdea {
    pub keyword: String,
    pub search_volume: Option<u64>,
    pub cpc: Option<f64>,
    pub competition: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status_code: i64,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Task {
    status_code: i64,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    result: Option<Vec<TaskResult>>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    #[serde(default)]
    items: Option<Vec<Item>>,
}

#[derive(Debug, Deserialize)]
struct Item {
    keyword_data: Option<KeywordData>,
}

#[derive(Debug, Deserialize)]
struct KeywordData {
    keyword: String,
    #[serde(default)]
    keyword_info: Option<KeywordInfo>,
}

#[derive(Debug, Deserialize)]
struct KeywordInfo {
    search_volume: Option<u64>,
    cpc: Option<f64>,
    competition: Option<f64>,
}

pub struct DataForSeoClient {
    client: Arc<ResilientClient>,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl DataForSeoClient {
    pub fn new(
        client: Arc<ResilientClient>,
        base_url: &str,
        credentials: Option<(String, String)>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub async fn related_keywords(&self, seed: &str, limit: u32) -> FetchOutcome<Vec<KeywordIdea>> {
        let Some((login, password)) = &self.credentials else {
            return FetchOutcome::Failed(IntegrationError::NotConfigured(SERVICE));
        };

        let url = format!("{}{}", self.base_url, RELATED_KEYWORDS_PATH);
        let body = json!([{
            "keyword": seed,
            "location_code": DEFAULT_LOCATION_CODE,
            "language_code": DEFAULT_LANGUAGE_CODE,
            "limit": limit,
        }]);

        let response: ApiResponse = match self
            .client
            .send_json(SERVICE, |http| {
                http.post(&url)
                    .basic_auth(login, Some(password))
                    .json(&body)
            })
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Failed(e),
        };

        match parse_ideas(response) {
            Ok(ideas) => {
                tracing::debug!(seed, count = ideas.len(), "related keywords fetched");
                FetchOutcome::from_items(ideas)
            }
            Err(e) => {
                tracing::warn!(seed, error = %e, "dataforseo task failed");
                FetchOutcome::Failed(e)
            }
        }
    }
}

fn parse_ideas(response: ApiResponse) -> Result<Vec<KeywordIdea>, IntegrationError> {
    if response.status_code != STATUS_OK {
        return Err(IntegrationError::Api {
            code: response.status_code,
            message: response.status_message,
        });
    }

    let mut ideas = Vec::new();
    for task in response.tasks {
        if task.status_code != STATUS_OK {
            return Err(IntegrationError::Api {
                code: task.status_code,
                message: task.status_message,
            });
        }
        let items = task
            .result
            .into_iter()
            .flatten()
            .flat_map(|r| r.items.unwrap_or_default());
        for data in items.filter_map(|item| item.keyword_data) {
            let info = data.keyword_info;
            ideas.push(KeywordIdea {
                keyword: data.keyword,
                search_volume: info.as_ref().and_then(|i| i.search_volume),
                cpc: info.as_ref().and_then(|i| i.cpc),
                competition: info.as_ref().and_then(|i| i.competition),
            });
        }
    }
    Ok(ideas)
}
