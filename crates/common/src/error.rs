use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not a downloadable link: {input}")]
    InvalidUrl { input: String },
}

impl Error {
    #[must_use]
    pub fn invalid_url(input: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
