use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures delivered through the error channel of every operation.
///
/// Responses the service answered with an unexpected status are not errors; they are returned as
/// results with `success: false` and the raw response attached.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("transport error: {0:#}")]
    Transport(#[from] anyhow::Error),
    #[error("too many redirects: gave up after {0} hops")]
    TooManyRedirects(usize),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
