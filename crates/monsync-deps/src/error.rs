use thiserror::Error;

#[derive(Debug, Error)]
pub enum DepsError {
    #[error("failed to encode value for relation '{relation}': {source}")]
    Encode {
        relation: String,
        #[source]
        source: serde_json::Error,
    },
}
