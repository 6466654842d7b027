mod handler;
mod model;

pub use handler::related_keywords;
pub use model::{RelatedKeywordsRequest, RelatedKeywordsResponse, SeedResult};
