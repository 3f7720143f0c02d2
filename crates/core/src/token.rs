//! Invitation token generation and link rendering.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::InvitationLinkStyle;
use crate::error::{RelationError, RelationResult};

/// Source of cryptographically secure random bytes.
pub trait TokenSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> RelationResult<()>;
}

impl fmt::Debug for dyn TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn TokenSource")
    }
}

/// Operating-system randomness.
#[derive(Debug, Clone, Default)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn fill(&self, buf: &mut [u8]) -> RelationResult<()> {
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| RelationError::internal(format!("random source failed: {}", e)))
    }
}

pub fn default_token_source() -> Arc<dyn TokenSource> {
    Arc::new(OsTokenSource)
}

/// Draw `bytes` random bytes and encode them with the URL-safe base64 alphabet.
pub fn generate_token(source: &dyn TokenSource, bytes: usize) -> RelationResult<String> {
    let mut buf = vec![0u8; bytes];
    source.fill(&mut buf)?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// SHA-256 of a token in unpadded URL-safe base64. Used as the lookup key
/// so lookups never compare raw token prefixes.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Render the shareable link for a token.
pub fn render_link(base_url: &str, style: InvitationLinkStyle, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match style {
        InvitationLinkStyle::Path => format!("{}/invite/{}", base, token),
        InvitationLinkStyle::Query => format!("{}?token={}", base, token),
    }
}
