//! Shared helpers for engine implementations.

use std::future::Future;

use orglink_core::{
    ErrorKind, Organization, OrganizationType, RelationContext, RelationError, RelationResult,
    RelationStore, RelationsConfig, RequestScope,
};
use serde::{Deserialize, Deserializer};

/// Await an engine operation and report its failure through the configured
/// logger, tagged with the request's correlation id.
pub(crate) async fn at_boundary<T, F>(
    config: &RelationsConfig,
    scope: &RequestScope,
    operation: &'static str,
    fut: F,
) -> RelationResult<T>
where
    F: Future<Output = RelationResult<T>>,
{
    let result = fut.await;
    if let Err(err) = &result {
        report(config, scope, operation, err);
    }
    result
}

pub(crate) fn report(
    config: &RelationsConfig,
    scope: &RequestScope,
    operation: &str,
    err: &RelationError,
) {
    let message = format!(
        "{} failed [correlation_id={}]: {}",
        operation, scope.correlation_id, err
    );
    match err.kind() {
        ErrorKind::Internal | ErrorKind::Misconfigured => config.logger.error(&message),
        ErrorKind::Forbidden | ErrorKind::Unauthenticated => config.logger.warn(&message),
        _ => config.logger.debug(&message),
    }
}

/// Load an organization that a request names, requiring the given type.
pub(crate) async fn require_org_of_type<DB: RelationStore>(
    ctx: &RelationContext<DB>,
    scope: &RequestScope,
    field: &str,
    id: i64,
    expected: OrganizationType,
) -> RelationResult<Organization> {
    let organization = scope.run(ctx.database.get_organization(id)).await?;
    match organization {
        Some(org) if org.org_type == expected => Ok(org),
        Some(_) => Err(RelationError::invalid_input(format!(
            "{} must reference an {} organization",
            field, expected
        ))),
        None => Err(RelationError::invalid_input(format!(
            "{} references an unknown organization",
            field
        ))),
    }
}

pub(crate) fn check_message(
    config: &RelationsConfig,
    field: &str,
    message: Option<&str>,
) -> RelationResult<()> {
    if let Some(message) = message
        && message.chars().count() > config.max_message_length
    {
        return Err(RelationError::invalid_input(format!(
            "{} must be at most {} characters",
            field, config.max_message_length
        )));
    }
    Ok(())
}

/// Deserialize a field that distinguishes "absent" from an explicit `null`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
