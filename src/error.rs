use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("index directory error: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("invalid record id: {reason}")]
    InvalidId { reason: &'static str },

    #[error(
        "a record needs text, boolean terms or slot values before it can be \
         indexed"
    )]
    EmptyRecord,

    #[error("unsupported range processor kind '{0}'")]
    InvalidRangeProcessorKind(String),

    #[error("a search cannot be executed without a query")]
    EmptyQuery,

    #[error("no match set has been generated")]
    NoResultSet,

    #[error("unsupported access mode '{0}'")]
    UnsupportedAccessMode(String),

    #[error("the index is already connected; configure the handle first")]
    AlreadyConnected,

    #[error("the index was opened read-only")]
    ReadOnlyHandle,

    #[error("prefix labels cannot be empty")]
    EmptyLabel,

    #[error("unknown stemming language '{0}'")]
    UnknownStemLanguage(String),

    #[error("slot {slot} cannot hold {value}")]
    InvalidSlotValue { slot: u32, value: f64 },

    #[error("query parse error: {0}")]
    QueryParse(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Figment(Box::new(err))
    }
}
