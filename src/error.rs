// ⚠️ Error taxonomy for the panel pipeline
// Per-row problems are counted, never raised. Only these reach the caller.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PanelError {
    /// A region or sub-region code was absent or non-numeric
    #[error("Missing spatial key component: {component}")]
    MissingKeyComponent { component: String },

    /// A whole source table was empty or missing
    #[error("Source unavailable: {source_id}")]
    SourceUnavailable { source_id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The positional layout of a wide table did not hold
    #[error("Malformed table layout: {0}")]
    MalformedLayout(String),
}

impl PanelError {
    pub fn missing_component(component: impl Into<String>) -> Self {
        PanelError::MissingKeyComponent {
            component: component.into(),
        }
    }

    pub fn source_unavailable(source_id: impl Into<String>) -> Self {
        PanelError::SourceUnavailable {
            source_id: source_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
