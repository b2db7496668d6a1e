//! The bounded replay queue and permanent store (§4.9): the queue holds the
//! most recent blocks that haven't yet been committed to the permanent
//! backend, giving O(1) reorg handling within its window and falling back to
//! a full from-genesis replay only once a reorg reaches past it.

use std::collections::VecDeque;

use catena_db::SqliteDatabase;
use tokio::sync::Mutex;

use crate::block::Block;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Ledger, LedgerEvent};
use crate::payload;

/// §4.9 "up to `maxQueueSize` (7) most recent blocks."
pub const MAX_QUEUE_SIZE: usize = 7;

/// The backend database file holding results of applied blocks, plus the
/// archive/metadata tables (§4.9). Wraps a [`SqliteDatabase`] rather than a
/// `dyn Database` because rebuilding it from scratch (`reset`) needs to
/// delete and recreate the concrete file.
pub struct PermanentStore {
    path: String,
    db: SqliteDatabase,
}

impl PermanentStore {
    pub async fn open(path: impl Into<String>) -> LedgerResult<Self> {
        let path = path.into();
        let db = SqliteDatabase::open(&path).await?;
        Ok(PermanentStore { path, db })
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    pub async fn head_index(&self) -> LedgerResult<Option<u64>> {
        Ok(crate::metadata::read_head(&self.db).await?.map(|(index, _)| index))
    }

    /// Every block this store has ever committed, in ascending index order
    /// (§4.9), reconstructed from the archive table for inspection. The
    /// archive keeps only `signature`/`index`/`previous`/`payload`, so these
    /// shells carry zeroed `version`/`miner`/`timestamp`/`nonce` and cannot
    /// be fed back through [`Ledger::receive`] (its proof-of-work check would
    /// reject them) — this is an audit accessor, not a rehydration path. A
    /// restarted process instead repopulates its in-memory ledger from peers,
    /// same as any new node joining the chain.
    pub async fn archived_blocks(&self) -> LedgerResult<Vec<Block>> {
        crate::metadata::read_archive(&self.db).await
    }

    pub async fn apply(&self, block: &Block) -> LedgerResult<()> {
        payload::apply_block(&self.db, block, true).await
    }

    /// Deletes and recreates the backing file (or re-opens a fresh
    /// in-memory database for `:memory:`), per §4.9's "delete the permanent
    /// file, create a fresh one."
    pub async fn reset(&mut self) -> LedgerResult<()> {
        if self.path != ":memory:" {
            let _ = tokio::fs::remove_file(&self.path).await;
        }
        self.db = SqliteDatabase::open(&self.path).await?;
        Ok(())
    }
}

struct ReplayQueueInner {
    queue: VecDeque<Block>,
    permanent: PermanentStore,
}

impl ReplayQueueInner {
    async fn full_reapply(&mut self, ledger: &Ledger, to: catena_types::Hash) -> LedgerResult<()> {
        let path = ledger.path_to(to).await.ok_or(LedgerError::MetadataError)?;
        self.permanent.reset().await?;
        self.queue.clear();
        for block in &path {
            self.permanent.apply(block).await?;
        }
        Ok(())
    }

    async fn handle_append(&mut self, block: Block, ledger: &Ledger) -> LedgerResult<()> {
        self.queue.push_back(block);
        if self.queue.len() <= MAX_QUEUE_SIZE {
            return Ok(());
        }
        let promoted = self.queue.pop_front().expect("just checked len > MAX_QUEUE_SIZE >= 1");
        let expected_next = self.permanent.head_index().await?.map(|h| h + 1).unwrap_or(0);
        if promoted.index == expected_next {
            self.permanent.apply(&promoted).await?;
        } else {
            // The queue's front no longer follows the permanent head (a
            // rewind happened while the queue was full) — rebuild up to its
            // predecessor, then apply it normally.
            self.full_reapply(ledger, promoted.previous).await?;
            self.permanent.apply(&promoted).await?;
        }
        Ok(())
    }

    async fn handle_unwind(&mut self, to: catena_types::Hash, ledger: &Ledger) -> LedgerResult<()> {
        let to_index = ledger.block_index_of(to).await.ok_or(LedgerError::MetadataError)?;
        let permanent_head = self.permanent.head_index().await?;
        let needs_full_replay = permanent_head.is_some_and(|h| h > to_index);
        if needs_full_replay {
            self.full_reapply(ledger, to).await?;
        } else {
            self.queue.retain(|b| b.index <= to_index);
        }
        Ok(())
    }
}

/// Owns the bounded queue and the permanent store together, since every
/// mutation of one is driven by a ledger event that may also touch the other
/// (§4.9).
pub struct ReplayQueue {
    inner: Mutex<ReplayQueueInner>,
}

impl ReplayQueue {
    pub fn new(permanent: PermanentStore) -> Self {
        ReplayQueue {
            inner: Mutex::new(ReplayQueueInner { queue: VecDeque::new(), permanent }),
        }
    }

    /// Feeds one ledger event through the queue/permanent-store algorithm
    /// (§4.9). Call this for every [`LedgerEvent`] a `Ledger::receive` call
    /// returns, in order.
    pub async fn handle_event(&self, event: LedgerEvent, ledger: &Ledger) -> LedgerResult<()> {
        let mut inner = self.inner.lock().await;
        match event {
            LedgerEvent::Append { block } => inner.handle_append(block, ledger).await,
            LedgerEvent::Unwind { to, .. } => inner.handle_unwind(to, ledger).await,
        }
    }

    pub async fn queued_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn permanent_head_index(&self) -> LedgerResult<Option<u64>> {
        self.inner.lock().await.permanent.head_index().await
    }
}
