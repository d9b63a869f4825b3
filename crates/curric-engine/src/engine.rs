//! The curriculum engine and its write protocol.
//!
//! [`CurriculumEngine`] owns shared handles to every collaborator and is cheap
//! to clone, so batch units can each carry their own copy onto a tokio task.
//!
//! Every mutation follows the same protocol, implemented by [`SyncTx`]:
//!
//! 1. resolve and validate the parent chain (no store is touched yet)
//! 2. open a relational transaction and write rows
//! 3. push index changes before commit, recording the compensation each
//!    successful index write owes
//! 4. commit; on any relational failure after an index write, roll back and
//!    submit the owed compensation

use std::sync::Arc;

use tracing::{error, info, warn};

use curric_core::{
    codes, curriculum_from_parents, CacheStore, CompensationTask, Compensator, CurriculumConfig,
    CurriculumType, Error, HierarchyResolver, HierarchySchema, Result, SchemaRegistry, SearchIndex,
    StoreTx, Tag, TagId, TagStore,
};
use curric_db::Database;
use curric_search::HttpSearchIndex;

use crate::cache::{DisabledCache, RedisCache};
use crate::compensation::SpawnedCompensator;
use crate::reads::CachedReads;

/// Shared handle to the stores, schema, and configuration.
#[derive(Clone)]
pub struct CurriculumEngine {
    pub(crate) store: Arc<dyn TagStore>,
    pub(crate) index: Arc<dyn SearchIndex>,
    pub(crate) reads: CachedReads,
    pub(crate) compensator: Arc<dyn Compensator>,
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) config: Arc<CurriculumConfig>,
}

impl CurriculumEngine {
    pub fn new(
        store: Arc<dyn TagStore>,
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn CacheStore>,
        compensator: Arc<dyn Compensator>,
        config: CurriculumConfig,
    ) -> Self {
        let reads = CachedReads::new(store.clone(), cache, &config);
        Self {
            store,
            index,
            reads,
            compensator,
            registry: Arc::new(SchemaRegistry::standard()),
            config: Arc::new(config),
        }
    }

    /// Replace the built-in schema tables.
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Build the production stack: PostgreSQL, the HTTP index, Redis (when
    /// enabled), and a spawning compensator.
    pub async fn connect(config: CurriculumConfig) -> Result<Self> {
        let db = Database::from_config(&config).await?;
        let index: Arc<dyn SearchIndex> = Arc::new(HttpSearchIndex::from_config(&config)?);
        let cache: Arc<dyn CacheStore> = if config.redis_enabled {
            Arc::new(RedisCache::from_config(&config).await)
        } else {
            Arc::new(DisabledCache)
        };
        let compensator = Arc::new(SpawnedCompensator::from_config(index.clone(), &config));

        info!(
            subsystem = "engine",
            redis_enabled = config.redis_enabled,
            index_url = %config.index_url,
            "Curriculum engine connected"
        );
        Ok(Self::new(
            Arc::new(db.tags),
            index,
            cache,
            compensator,
            config,
        ))
    }

    pub fn config(&self) -> &CurriculumConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn reads(&self) -> &CachedReads {
        &self.reads
    }

    pub(crate) fn resolver(&self) -> HierarchyResolver<'_> {
        HierarchyResolver::new(&self.registry)
    }

    pub(crate) fn schema(&self, curriculum_type: CurriculumType) -> Result<&HierarchySchema> {
        self.registry.curriculum(curriculum_type)
    }

    /// Fetch ancestors through the cache, keeping a `None` slot for unknown ids.
    pub(crate) async fn ancestors(&self, ids: &[TagId]) -> Result<Vec<Option<Tag>>> {
        let found = self.reads.tags(ids).await?;
        Ok(ids
            .iter()
            .map(|id| found.iter().find(|t| t.id == *id).cloned())
            .collect())
    }

    /// Concrete curriculum type for a request, deriving `default` from the ancestors.
    pub(crate) fn curriculum_for(
        &self,
        requested: CurriculumType,
        ancestors: &[Option<Tag>],
    ) -> Result<CurriculumType> {
        if requested != CurriculumType::Default {
            return Ok(requested);
        }
        curriculum_from_parents(ancestors.iter().flatten())
            .ok_or_else(|| Error::bad_request(codes::CURRICULUM_TYPE_INVALID))
    }

    /// Current row of a tag, read past the cache.
    pub(crate) async fn existing_tag(&self, id: TagId) -> Result<Tag> {
        self.store
            .get_tag(id)
            .await?
            .ok_or_else(|| Error::NotFound(codes::TAG_NOT_FOUND.to_string()))
    }

    pub(crate) async fn begin(&self, op: &'static str) -> Result<SyncTx> {
        let tx = self.store.begin().await?;
        Ok(SyncTx {
            op,
            tx,
            owed: Vec::new(),
            compensator: self.compensator.clone(),
        })
    }
}

/// A relational transaction plus the index compensation owed if it never commits.
pub(crate) struct SyncTx {
    op: &'static str,
    tx: Box<dyn StoreTx>,
    owed: Vec<CompensationTask>,
    compensator: Arc<dyn Compensator>,
}

impl SyncTx {
    pub(crate) fn tx(&mut self) -> &mut dyn StoreTx {
        self.tx.as_mut()
    }

    /// Record the inverse of an index write that just succeeded.
    pub(crate) fn owe(&mut self, task: CompensationTask) {
        if !task.is_noop() {
            self.owed.push(task);
        }
    }

    pub(crate) async fn commit(self) -> Result<()> {
        let SyncTx {
            op,
            tx,
            owed,
            compensator,
        } = self;
        match tx.commit().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    subsystem = "sync",
                    op,
                    error = %e,
                    compensations = owed.len(),
                    "Commit failed after index write"
                );
                for task in owed {
                    compensator.submit(task);
                }
                Err(Error::internal(codes::DB_COMMIT_ERROR))
            }
        }
    }

    /// Roll back and compensate, handing `err` back to the caller.
    pub(crate) async fn abort(self, err: Error) -> Error {
        let SyncTx {
            op,
            tx,
            owed,
            compensator,
        } = self;
        if let Err(e) = tx.rollback().await {
            warn!(subsystem = "sync", op, error = %e, "Rollback failed");
        }
        if !owed.is_empty() {
            warn!(
                subsystem = "sync",
                op,
                error = %err,
                compensations = owed.len(),
                "Write failed after index write"
            );
        }
        for task in owed {
            compensator.submit(task);
        }
        err
    }
}
