//! Error types for parsing and resolving content

use thiserror::Error;

use crate::node::NodeType;

/// Content that cannot be turned into a node tree
#[derive(Debug, Error)]
pub enum ContentError {
    /// The root is not an object, or parses to nothing
    #[error("unable to parse content into a view")]
    NotAView,

    /// A marker key holds a payload of the wrong shape
    #[error("invalid {marker} content: {reason}")]
    InvalidShape { marker: &'static str, reason: String },

    /// A template's data binding does not point at an array
    #[error("template data at '{binding}' is not an array")]
    TemplateNotArray { binding: String },

    /// A template fragment could not be re-read after substitution
    #[error("template substitution produced invalid content: {0}")]
    Substitution(#[from] serde_json::Error),
}

impl ContentError {
    pub fn invalid_shape(marker: &'static str, reason: impl Into<String>) -> Self {
        ContentError::InvalidShape {
            marker,
            reason: reason.into(),
        }
    }
}

/// Failures during a resolve pass
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Content re-parsed mid-resolve was invalid
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Before-resolve hooks kept replacing a node
    #[error("{node_type} node did not settle after {rounds} before-resolve rounds")]
    Unsettled { node_type: NodeType, rounds: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ContentError::invalid_shape("staticSwitch", "expected an array of cases");
        assert_eq!(
            err.to_string(),
            "invalid staticSwitch content: expected an array of cases"
        );

        let err = ResolveError::Unsettled {
            node_type: NodeType::Asset,
            rounds: 32,
        };
        assert_eq!(
            err.to_string(),
            "asset node did not settle after 32 before-resolve rounds"
        );
    }

    #[test]
    fn test_content_error_converts() {
        let err: ResolveError = ContentError::TemplateNotArray {
            binding: "foo.bar".to_string(),
        }
        .into();
        assert!(matches!(err, ResolveError::Content(_)));
        assert_eq!(err.to_string(), "template data at 'foo.bar' is not an array");
    }
}
