use std::sync::Arc;

use serde::Deserialize;

use crate::error::RelationError;
use crate::logger::{Logger, default_logger};

/// How invitation links are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationLinkStyle {
    /// `<base>/invite/<token>`
    #[default]
    Path,
    /// `<base>?token=<token>`
    Query,
}

/// Main configuration for the relationship engines.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RelationsConfig {
    /// Base URL of the frontend that hosts the invitation landing page.
    pub invitation_base_url: String,

    pub invitation_link_style: InvitationLinkStyle,

    /// Random bytes drawn per invitation token. At least 16.
    pub token_bytes: usize,

    /// Attempts at drawing a unique token before giving up.
    pub token_attempts: u32,

    /// Page size used when a listing does not ask for one.
    pub default_list_limit: u32,

    /// Upper bound on association, delegation and invitation page sizes.
    pub max_list_limit: u32,

    pub default_usage_history_limit: u32,

    pub max_usage_history_limit: u32,

    /// Longest accepted association or invitation message, in characters.
    pub max_message_length: usize,

    /// Logger for error-boundary messages.
    ///
    /// Defaults to a [`TracingLogger`](crate::logger::TracingLogger).
    #[serde(skip, default = "default_logger")]
    pub logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for RelationsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationsConfig")
            .field("invitation_base_url", &self.invitation_base_url)
            .field("invitation_link_style", &self.invitation_link_style)
            .field("token_bytes", &self.token_bytes)
            .field("token_attempts", &self.token_attempts)
            .field("default_list_limit", &self.default_list_limit)
            .field("max_list_limit", &self.max_list_limit)
            .field("default_usage_history_limit", &self.default_usage_history_limit)
            .field("max_usage_history_limit", &self.max_usage_history_limit)
            .field("max_message_length", &self.max_message_length)
            .finish_non_exhaustive()
    }
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            invitation_base_url: "http://localhost:3000".to_string(),
            invitation_link_style: InvitationLinkStyle::Path,
            token_bytes: 16,
            token_attempts: 3,
            default_list_limit: 50,
            max_list_limit: 100,
            default_usage_history_limit: 50,
            max_usage_history_limit: 500,
            max_message_length: 1000,
            logger: default_logger(),
        }
    }
}

impl RelationsConfig {
    pub fn new(invitation_base_url: impl Into<String>) -> Self {
        Self {
            invitation_base_url: invitation_base_url.into(),
            ..Default::default()
        }
    }

    pub fn invitation_link_style(mut self, style: InvitationLinkStyle) -> Self {
        self.invitation_link_style = style;
        self
    }

    pub fn token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes;
        self
    }

    pub fn token_attempts(mut self, attempts: u32) -> Self {
        self.token_attempts = attempts;
        self
    }

    /// Set the default and maximum page size for listings.
    pub fn list_limits(mut self, default: u32, max: u32) -> Self {
        self.default_list_limit = default;
        self.max_list_limit = max;
        self
    }

    pub fn usage_history_limits(mut self, default: u32, max: u32) -> Self {
        self.default_usage_history_limit = default;
        self.max_usage_history_limit = max;
        self
    }

    pub fn max_message_length(mut self, length: usize) -> Self {
        self.max_message_length = length;
        self
    }

    /// Set a custom logger implementation.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn validate(&self) -> Result<(), RelationError> {
        let base = self.invitation_base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(RelationError::misconfigured(
                "invitation_base_url must be an http(s) URL",
            ));
        }

        if self.token_bytes < 16 {
            return Err(RelationError::misconfigured(
                "token_bytes must be at least 16",
            ));
        }

        if self.token_attempts == 0 {
            return Err(RelationError::misconfigured(
                "token_attempts must be at least 1",
            ));
        }

        if self.default_list_limit == 0 || self.default_list_limit > self.max_list_limit {
            return Err(RelationError::misconfigured(
                "default_list_limit must be between 1 and max_list_limit",
            ));
        }

        if self.default_usage_history_limit == 0
            || self.default_usage_history_limit > self.max_usage_history_limit
        {
            return Err(RelationError::misconfigured(
                "default_usage_history_limit must be between 1 and max_usage_history_limit",
            ));
        }

        Ok(())
    }
}
