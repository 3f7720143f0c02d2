use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::adapters::RelationStore;
use crate::clock::{Clock, default_clock};
use crate::config::RelationsConfig;
use crate::token::{TokenSource, default_token_source};

/// Shared collaborators handed to every engine.
pub struct RelationContext<DB: RelationStore> {
    pub config: Arc<RelationsConfig>,
    pub database: Arc<DB>,
    pub clock: Arc<dyn Clock>,
    pub token_source: Arc<dyn TokenSource>,
}

impl<DB: RelationStore> Clone for RelationContext<DB> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            database: self.database.clone(),
            clock: self.clock.clone(),
            token_source: self.token_source.clone(),
        }
    }
}

impl<DB: RelationStore> RelationContext<DB> {
    pub fn new(config: Arc<RelationsConfig>, database: Arc<DB>) -> Self {
        Self {
            config,
            database,
            clock: default_clock(),
            token_source: default_token_source(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_source(mut self, token_source: Arc<dyn TokenSource>) -> Self {
        self.token_source = token_source;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
