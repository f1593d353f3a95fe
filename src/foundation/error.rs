pub type VizResult<T> = Result<T, VizError>;

#[derive(thiserror::Error, Debug)]
pub enum VizError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("all image formats failed to load for '{base}' (tried: {})", tried.join(", "))]
    AllFormatsFailed { base: String, tried: Vec<String> },

    #[error("asset load cancelled")]
    Cancelled,

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VizError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// True for the failure the controller turns into a `Failed` state instead of an error.
    pub fn is_asset_failure(&self) -> bool {
        matches!(self, Self::AllFormatsFailed { .. })
    }
}
