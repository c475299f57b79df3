use thiserror::Error;

#[derive(Debug, Error)]
pub enum IggytopError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Missing source asset: {0}")]
    MissingAsset(String),

    #[error("Schema drift in {source_name}: expected column '{column}' is absent")]
    SchemaDrift { source_name: String, column: String },

    #[error("Security error: {0}")]
    Security(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<quick_xml::Error> for IggytopError {
    fn from(e: quick_xml::Error) -> Self {
        IggytopError::Xml(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IggytopError>;
