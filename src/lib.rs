use thiserror::Error;

pub type Result<T> = std::result::Result<T, HelperError>;

#[derive(Error, Debug)]
pub enum HelperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Index distribution error: {0}")]
    Distribution(#[from] distributor::DistributorError),

    #[error("Chat transport error: {0}")]
    Transport(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod bot;
pub mod commands;
pub mod config;
pub mod database;
pub mod distributor;
pub mod embeddings;
pub mod indexer;
pub mod llm;
pub mod sources;
