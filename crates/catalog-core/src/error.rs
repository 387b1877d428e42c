use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure taxonomy shared by every layer of the search pipeline.
///
/// Adapters convert their native errors into `Infrastructure` at their
/// boundary; nothing above the executor ever sees a driver error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller broke the request contract (bad pagination, unknown
    /// strategy, missing embedding capability). Never retried.
    #[error("Contract violation: {0}")]
    Contract(String),

    /// A dependency (document store, embedding API) failed or timed out.
    #[error("Infrastructure failure: {context}")]
    Infrastructure {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A retrieved document does not satisfy the domain invariants.
    #[error("Validation failure: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap any dependency error, keeping it as the source.
    pub fn infrastructure<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Infrastructure { context: context.into(), source: source.into() }
    }

    /// Only transient dependency failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }

    /// HTTP status class the boundary should answer with.
    pub fn status_class(&self) -> u16 {
        match self {
            Self::Contract(_) => 422,
            Self::Validation(_) => 502,
            Self::Infrastructure { .. } => 503,
            Self::InvalidConfig(_) => 500,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}
