//! Core indexer service - the sequential block-ingestion pipeline.
//!
//! The pipeline is height-driven and pull-based: it reads the checkpoint,
//! asks the chain for the latest height, and walks the gap one block at a
//! time. Within a block, transactions are processed in chain order; the
//! protocols have cross-transaction write dependencies (a mint followed by a
//! transfer in the same block), and linearizing by block order makes those
//! dependencies trivially correct.

use std::sync::Arc;
use std::time::Duration;

use sqlx::Acquire;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{
    ChainError, IndexerError, IndexerResult, ProtocolError, StorageError,
};
use crate::metrics::{
    record_block_indexed, record_protocol_error, record_transaction_indexed, ProcessingTimer,
};
use crate::models::{NewTransaction, Transaction};
use crate::ports::{
    ChainSource, DbTransaction, HandlerRegistry, RawBlock, RawTransaction, Repositories, TxContext,
};
use crate::urn::ParsedUrn;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the indexer service.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Chain identifier; every URN must match it.
    pub chain_id: String,
    /// Denom of the chain's base token, stamped on the status row.
    pub base_token: String,
    /// Time between "is there a new block?" checks when caught up.
    pub poll_interval: Duration,
    /// Maximum retries for transient chain errors.
    pub max_retries: u32,
    /// Initial delay between retries (doubles per attempt).
    pub retry_delay: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            base_token: "uatom".to_string(),
            poll_interval: Duration::from_secs(6),
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Hard ceiling for the retry backoff.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

// =============================================================================
// IndexerService
// =============================================================================

/// Main indexer service.
///
/// # Flow
///
/// 1. Read `status.last_processed_height`, fetch the chain's latest height
/// 2. For each missing height, fetch the block and walk its transactions
/// 3. Persist every inscription-bearing transaction; route its URN to the
///    registered metaprotocol processor inside a savepoint
/// 4. After each height, run the protocol height-end hooks (deposit timeout
///    sweeper) and advance the checkpoint in one transaction
///
/// Replaying a height is safe: the unique transaction hash turns duplicates
/// into no-ops before any protocol work happens.
pub struct IndexerService<C: ChainSource, R: Repositories> {
    config: IndexerConfig,
    chain: Arc<C>,
    repositories: Arc<R>,
    handlers: Arc<HandlerRegistry>,
}

impl<C: ChainSource, R: Repositories + 'static> IndexerService<C, R> {
    pub fn new(
        config: IndexerConfig,
        chain: Arc<C>,
        repositories: Arc<R>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            config,
            chain,
            repositories,
            handlers,
        }
    }

    /// Start the indexer and run until shutdown is requested.
    #[instrument(skip_all, fields(chain = %self.config.chain_id))]
    pub async fn run(
        &self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        info!("⛓️  Starting indexer");

        self.verify_chain_id().await?;

        let status = self
            .repositories
            .ensure_status(&self.config.chain_id, &self.config.base_token)
            .await?;
        debug!(
            last_processed = status.last_processed_height,
            "Checkpoint loaded"
        );

        self.pump(&mut shutdown_rx).await
    }

    /// Verify the connected node serves the configured chain.
    async fn verify_chain_id(&self) -> IndexerResult<()> {
        let connected = self.chain.chain_id().await?;
        if connected != self.config.chain_id {
            return Err(IndexerError::ChainMismatch {
                connected,
                expected: self.config.chain_id.clone(),
            });
        }
        debug!("Chain ID verified");
        Ok(())
    }

    /// The height-driven pump. Exits only on shutdown or an unrecoverable
    /// error; protocol-level failures never stop it.
    async fn pump(&self, shutdown_rx: &mut watch::Receiver<bool>) -> IndexerResult<()> {
        loop {
            if *shutdown_rx.borrow() {
                return Err(IndexerError::ShutdownRequested);
            }

            let status = self
                .repositories
                .status(&self.config.chain_id)
                .await?
                .ok_or_else(|| IndexerError::Internal("status row vanished".to_string()))?;

            let known = self.latest_height_with_retry(shutdown_rx).await?;

            if known <= status.last_processed_height {
                trace!(height = known, "Caught up, polling");
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return Err(IndexerError::ShutdownRequested);
                        }
                    }
                }
                continue;
            }

            for height in status.last_processed_height + 1..=known {
                if *shutdown_rx.borrow() {
                    return Err(IndexerError::ShutdownRequested);
                }

                let block = self.fetch_block_with_retry(height, shutdown_rx).await?;
                self.process_block(&block, known, shutdown_rx).await?;

                info!(
                    height,
                    txs = block.transactions.len(),
                    "⛓️  Block indexed"
                );
                record_block_indexed();
            }
        }
    }

    /// Process a single block: every transaction in chain order, then the
    /// height-end hooks and the checkpoint in one transaction.
    #[instrument(skip_all, fields(height = block.height))]
    async fn process_block(
        &self,
        block: &RawBlock,
        known_height: u64,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        let _timer = ProcessingTimer::new();

        for raw in &block.transactions {
            // Cancellation is honored between transactions, never mid-transaction.
            if *shutdown_rx.borrow() {
                return Err(IndexerError::ShutdownRequested);
            }
            self.process_transaction(block, raw).await?;
        }

        let handlers = self.handlers.clone();
        let repositories = self.repositories.clone();
        let chain_id = self.config.chain_id.clone();
        let height = block.height;

        self.repositories
            .within_tx(move |conn| {
                Box::pin(async move {
                    for handler in handlers.all() {
                        handler.on_height_end(&mut *conn, height).await?;
                    }
                    repositories
                        .checkpoint(&mut *conn, &chain_id, height, known_height)
                        .await
                })
            })
            .await?;

        Ok(())
    }

    /// Persist one transaction and run its metaprotocol operation.
    ///
    /// The transaction row commits regardless of the protocol outcome;
    /// protocol writes live inside a savepoint that is rolled back on
    /// rejection, with the reason recorded in `status_message`.
    async fn process_transaction(
        &self,
        block: &RawBlock,
        raw: &RawTransaction,
    ) -> IndexerResult<()> {
        let memo = raw.memo.trim();
        if !memo.starts_with("urn:") {
            return Ok(());
        }

        let mut dbtx = self.repositories.begin().await?;

        let new_tx = NewTransaction {
            height: block.height,
            hash: raw.hash.clone(),
            content: raw.content.clone(),
            gas_used: raw.gas_used,
            fees: raw.fees.clone(),
            content_length: raw.content.len() as u64,
            date_created: block.time,
        };

        let Some(tx_row) = self
            .repositories
            .insert_transaction(&mut *dbtx, &new_tx)
            .await?
        else {
            trace!(hash = %raw.hash, "Transaction already indexed, skipping");
            let _ = dbtx.rollback().await;
            return Ok(());
        };
        record_transaction_indexed();

        if let Err(e) = self.dispatch(&mut dbtx, &tx_row, raw).await? {
            debug!(hash = %raw.hash, error = %e, "Protocol operation rejected");
            self.repositories
                .set_transaction_error(&mut *dbtx, tx_row.id, &e.to_string())
                .await?;
        }

        dbtx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(())
    }

    /// Parse, route and apply one metaprotocol operation.
    ///
    /// The inner `Result` is the expected protocol outcome; the outer one is
    /// reserved for infrastructure failures that must interrupt the height.
    async fn dispatch(
        &self,
        dbtx: &mut DbTransaction,
        tx_row: &Transaction,
        raw: &RawTransaction,
    ) -> IndexerResult<Result<(), ProtocolError>> {
        let urn = match ParsedUrn::parse(raw.memo.trim()) {
            Ok(urn) => urn,
            Err(e) => return Ok(Err(e)),
        };

        if urn.chain_id != self.config.chain_id {
            return Ok(Err(ProtocolError::ChainMismatch));
        }

        let Some(handler) = self.handlers.get(&urn.protocol) else {
            record_protocol_error("unknown");
            return Ok(Err(ProtocolError::UnknownProtocol(urn.protocol.clone())));
        };

        let sender = match self.chain.sender_address(raw) {
            Ok(sender) => sender,
            Err(e) => return Ok(Err(ProtocolError::SenderUnresolved(e.to_string()))),
        };

        let ctx = TxContext {
            chain_id: &self.config.chain_id,
            transaction: tx_row,
            urn: &urn,
            raw,
            sender: &sender,
        };

        let mut savepoint = dbtx
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        match handler.process(&mut *savepoint, &ctx).await {
            Ok(()) => {
                savepoint
                    .commit()
                    .await
                    .map_err(|e| StorageError::TransactionError(e.to_string()))?;
                Ok(Ok(()))
            }
            Err(e) if e.is_expected() => {
                let _ = savepoint.rollback().await;
                record_protocol_error(&urn.protocol);
                Ok(Err(e))
            }
            // Storage failures abort the height so the pipeline retries.
            Err(e) => Err(IndexerError::Protocol(e)),
        }
    }

    /// Ask for the latest height, retrying transient failures with backoff.
    async fn latest_height_with_retry(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<u64> {
        let mut delay = self.config.retry_delay;
        let mut attempt = 0u32;
        loop {
            match self.chain.latest_height().await {
                Ok(height) => return Ok(height),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "⚠️  Latest height fetch failed, retrying");
                    self.backoff(&mut delay, shutdown_rx).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch one block, retrying transient failures with backoff.
    async fn fetch_block_with_retry(
        &self,
        height: u64,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<RawBlock> {
        let mut delay = self.config.retry_delay;
        let mut attempt = 0u32;
        loop {
            match self.chain.block(height).await {
                Ok(block) => {
                    if block.height != height {
                        return Err(IndexerError::Chain(ChainError::RpcError(format!(
                            "asked for height {} but node returned {}",
                            height, block.height
                        ))));
                    }
                    return Ok(block);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(height, error = %e, attempt, "⚠️  Block fetch failed, retrying");
                    self.backoff(&mut delay, shutdown_rx).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sleep for the current delay (shutdown-aware), then double it.
    async fn backoff(
        &self,
        delay: &mut Duration,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(*delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return Err(IndexerError::ShutdownRequested);
                }
            }
        }
        *delay = (*delay * 2).min(MAX_RETRY_DELAY);
        Ok(())
    }
}
