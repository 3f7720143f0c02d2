use std::sync::Arc;

use orglink_api::{
    AssociationEngine, AuthorityResolver, DelegationEngine, InvitationEngine, ResolvedPrincipal,
    VisibilityProjector,
};
use orglink_core::{
    Clock, RelationContext, RelationResult, RelationStore, RelationsConfig, RequestScope,
    TokenSource,
};

/// The assembled relationship engines, generic over the store.
pub struct Relations<DB: RelationStore> {
    context: RelationContext<DB>,
    authority: AuthorityResolver<DB>,
    associations: AssociationEngine<DB>,
    delegations: DelegationEngine<DB>,
    invitations: InvitationEngine<DB>,
    visibility: VisibilityProjector<DB>,
}

/// Initial builder for configuring [`Relations`].
///
/// Call `.database(store)` to obtain a [`TypedRelationsBuilder`].
pub struct RelationsBuilder {
    config: RelationsConfig,
}

/// Typed builder returned by [`RelationsBuilder::database`].
pub struct TypedRelationsBuilder<DB: RelationStore> {
    config: RelationsConfig,
    database: Arc<DB>,
    clock: Option<Arc<dyn Clock>>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl RelationsBuilder {
    pub fn new(config: RelationsConfig) -> Self {
        Self { config }
    }

    /// Set the store, returning a [`TypedRelationsBuilder`].
    pub fn database<DB: RelationStore>(self, database: DB) -> TypedRelationsBuilder<DB> {
        self.shared_database(Arc::new(database))
    }

    /// Like [`database`](Self::database) for a store the caller keeps a handle to.
    pub fn shared_database<DB: RelationStore>(
        self,
        database: Arc<DB>,
    ) -> TypedRelationsBuilder<DB> {
        TypedRelationsBuilder {
            config: self.config,
            database,
            clock: None,
            token_source: None,
        }
    }
}

impl<DB: RelationStore> TypedRelationsBuilder<DB> {
    /// Replace the system clock.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Replace the OS random source used for invitation tokens.
    pub fn token_source<T: TokenSource + 'static>(mut self, source: T) -> Self {
        self.token_source = Some(Arc::new(source));
        self
    }

    /// Validate the configuration and assemble the engines.
    pub fn build(self) -> RelationResult<Relations<DB>> {
        self.config.validate()?;

        let mut context = RelationContext::new(Arc::new(self.config), self.database);
        if let Some(clock) = self.clock {
            context = context.with_clock(clock);
        }
        if let Some(source) = self.token_source {
            context = context.with_token_source(source);
        }

        tracing::debug!(
            base_url = %context.config.invitation_base_url,
            "relationship engines assembled"
        );

        Ok(Relations {
            authority: AuthorityResolver::new(context.clone()),
            associations: AssociationEngine::new(context.clone()),
            delegations: DelegationEngine::new(context.clone()),
            invitations: InvitationEngine::new(context.clone()),
            visibility: VisibilityProjector::new(context.clone()),
            context,
        })
    }
}

impl<DB: RelationStore> Relations<DB> {
    /// Create a new builder.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(config: RelationsConfig) -> RelationsBuilder {
        RelationsBuilder::new(config)
    }

    /// Resolve the caller of a request into a principal.
    pub async fn resolve(&self, scope: &RequestScope) -> RelationResult<ResolvedPrincipal> {
        self.authority.resolve(scope).await
    }

    pub fn authority(&self) -> &AuthorityResolver<DB> {
        &self.authority
    }

    pub fn associations(&self) -> &AssociationEngine<DB> {
        &self.associations
    }

    pub fn delegations(&self) -> &DelegationEngine<DB> {
        &self.delegations
    }

    pub fn invitations(&self) -> &InvitationEngine<DB> {
        &self.invitations
    }

    pub fn visibility(&self) -> &VisibilityProjector<DB> {
        &self.visibility
    }

    pub fn config(&self) -> &RelationsConfig {
        &self.context.config
    }

    pub fn database(&self) -> &Arc<DB> {
        &self.context.database
    }
}

impl<DB: RelationStore> Clone for Relations<DB> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            authority: self.authority.clone(),
            associations: self.associations.clone(),
            delegations: self.delegations.clone(),
            invitations: self.invitations.clone(),
            visibility: self.visibility.clone(),
        }
    }
}
