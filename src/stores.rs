//! Store construction from configuration

use std::sync::Arc;
use tracing::info;

use crate::config::{Backend, Config};
use crate::db::SqliteDb;
use crate::directory::{NodeDirectoryCache, SledKv};
use crate::error::StoreResult;
use crate::irreparable::sled_tree::SledIrreparable;
use crate::irreparable::sqlite::SqliteIrreparable;
use crate::irreparable::IrreparableSegmentStore;
use crate::kv::SledDb;
use crate::reputation::sled_tree::SledReputation;
use crate::reputation::sqlite::SqliteReputation;
use crate::reputation::ReputationStore;

/// The three sibling stores
pub struct Stores {
    pub reputation: Arc<ReputationStore>,
    pub directory: Arc<NodeDirectoryCache>,
    pub irreparable: Arc<IrreparableSegmentStore>,
    /// Held so the directory tree (and the sled backend, if chosen) can be flushed
    sled: SledDb,
}

impl Stores {
    /// Open the configured backend under `config.storage_dir`. The directory
    /// cache always lives in sled.
    pub fn open(config: &Config) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.storage_dir)?;
        let sled = SledDb::open(config.sled_path())?;
        let stores = Self::with_sled(sled, config)?;
        info!(backend = ?config.backend, "Stores ready");
        Ok(stores)
    }

    /// Throwaway stores (for testing)
    pub fn temporary(backend: Backend) -> StoreResult<Self> {
        let config = Config {
            backend,
            ..Config::default()
        };
        let sled = SledDb::temporary()?;
        let sqlite = match backend {
            Backend::Sqlite => Some(Arc::new(SqliteDb::open_in_memory()?)),
            Backend::Sled => None,
        };
        Self::assemble(sled, sqlite, &config)
    }

    fn with_sled(sled: SledDb, config: &Config) -> StoreResult<Self> {
        let sqlite = match config.backend {
            Backend::Sqlite => Some(Arc::new(SqliteDb::open(&config.sqlite_path())?)),
            Backend::Sled => None,
        };
        Self::assemble(sled, sqlite, config)
    }

    fn assemble(sled: SledDb, sqlite: Option<Arc<SqliteDb>>, config: &Config) -> StoreResult<Self> {
        let (reputation, irreparable) = match sqlite {
            Some(db) => (
                ReputationStore::new(Arc::new(SqliteReputation::new(db.clone()))),
                IrreparableSegmentStore::new(Arc::new(SqliteIrreparable::new(db))),
            ),
            None => (
                ReputationStore::new(Arc::new(SledReputation::open(&sled)?)),
                IrreparableSegmentStore::new(Arc::new(SledIrreparable::open(&sled)?)),
            ),
        };

        let directory = NodeDirectoryCache::new(Arc::new(SledKv::open(&sled)?));

        Ok(Self {
            reputation: Arc::new(reputation.with_max_candidates(config.max_candidates)),
            directory: Arc::new(directory),
            irreparable: Arc::new(irreparable),
            sled,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.sled.flush()
    }
}
