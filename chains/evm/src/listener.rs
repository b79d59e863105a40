// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, H256};
use tokio::sync::mpsc;

use crossbridge_relayer_config::evm::{EvmChainConfig, HandlerKind};
use crossbridge_relayer_context::Shutdown;
use crossbridge_relayer_core::EventSource;
use crossbridge_relayer_store::BlockCursorStore;
use crossbridge_relayer_types::{DomainId, Message};
use crossbridge_relayer_utils::retry::ConstantWithMaxRetryCount;
use crossbridge_relayer_utils::{probe, Error, Result};

use crate::client::BridgeClient;
use crate::handlers;

/// Polls one EVM chain for confirmed deposits and turns them into
/// messages.
///
/// Blocks are processed strictly in order, one at a time, and the cursor
/// is only advanced after every deposit in the block has been handed to
/// the router. A crash therefore re-processes at most one block, and the
/// destination's on-chain proposal status absorbs the replay.
pub struct EvmListener<C, S> {
    chain_name: String,
    domain_id: DomainId,
    client: Arc<C>,
    store: S,
    // handler contract address -> the codec it speaks.
    decoders: HashMap<Address, HandlerKind>,
    block_confirmations: u64,
    polling_interval: Duration,
    block_retries: usize,
    block_retry_interval: Duration,
}

impl<C, S> EvmListener<C, S>
where
    C: BridgeClient,
    S: BlockCursorStore,
{
    /// Builds a listener for the configured chain.
    pub fn new(config: &EvmChainConfig, client: Arc<C>, store: S) -> Self {
        let decoders = config
            .resources
            .iter()
            .map(|r| (r.handler, r.kind))
            .collect();
        Self {
            chain_name: config.name.clone(),
            domain_id: config.domain_id,
            client,
            store,
            decoders,
            block_confirmations: u64::from(config.block_confirmations),
            polling_interval: Duration::from_millis(config.polling_interval),
            block_retries: config.block_retries,
            block_retry_interval: Duration::from_millis(
                config.block_retry_interval,
            ),
        }
    }

    /// Sleeps one polling interval, returning `true` if shutdown fired.
    async fn sleep_or_shutdown(&self, shutdown: &mut Shutdown) -> bool {
        tokio::select! {
            _ = shutdown.recv() => true,
            _ = tokio::time::sleep(self.polling_interval) => false,
        }
    }

    async fn process_block_with_retry(
        &self,
        block: u64,
        last_hash: &mut Option<H256>,
        messages: &mpsc::Sender<Message>,
    ) -> Result<()> {
        let backoff = ConstantWithMaxRetryCount::new(
            self.block_retry_interval,
            self.block_retries,
        );
        let hash = backoff::future::retry(backoff, || async {
            self.process_block(block, last_hash.as_ref(), messages)
                .await
                .map_err(|e| {
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Retry,
                        chain = %self.chain_name,
                        block,
                        error = %e,
                    );
                    backoff::Error::transient(e)
                })
        })
        .await?;
        // only remember the hash of a fully processed block.
        *last_hash = Some(hash);
        Ok(())
    }

    /// Fetches one confirmed block, decodes its deposits and forwards
    /// them in log order, returning the block's hash. Sends block on the
    /// channel, so a slow router applies backpressure here instead of
    /// dropping messages.
    async fn process_block(
        &self,
        block: u64,
        last_hash: Option<&H256>,
        messages: &mpsc::Sender<Message>,
    ) -> Result<H256> {
        let info = self.client.block_info(block).await?;
        if let Some(prev) = last_hash {
            // a broken parent link means the chain reorganized under us;
            // retrying re-reads the canonical block.
            if info.parent_hash != *prev {
                tracing::warn!(
                    block,
                    "parent hash mismatch, chain reorganized",
                );
                return Err(Error::Generic(
                    "parent hash mismatch after a reorg",
                ));
            }
        }
        let logs = self.client.deposit_logs_in_block(block).await?;
        for log in &logs {
            let kind = match self.decoders.get(&log.handler) {
                Some(kind) => *kind,
                None => {
                    // a deposit through a handler we are not configured
                    // to relay; other relayers may carry it.
                    tracing::warn!(
                        handler = ?log.handler,
                        deposit_nonce = log.deposit_nonce,
                        "skipping deposit: {}",
                        Error::UnregisteredHandler {
                            handler: log.handler
                        },
                    );
                    continue;
                }
            };
            let message =
                match handlers::decode_deposit(kind, self.domain_id, log) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(
                            deposit_nonce = log.deposit_nonce,
                            "skipping undecodable deposit: {}",
                            e,
                        );
                        continue;
                    }
                };
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Relay,
                chain = %self.chain_name,
                message = %message,
            );
            messages
                .send(message)
                .await
                .map_err(|_| Error::EventStreamClosed)?;
        }
        Ok(info.hash)
    }
}

#[async_trait::async_trait]
impl<C, S> EventSource for EvmListener<C, S>
where
    C: BridgeClient,
    S: BlockCursorStore + 'static,
{
    /// Polls for deposits until the shutdown signal fires.
    ///
    /// Never returns an error directly: anything unrecoverable, such as a
    /// block that still fails after the bounded retries, is reported on
    /// `sys_err` and the listener stops.
    #[tracing::instrument(
        skip_all,
        fields(chain = %self.chain_name, domain_id = %self.domain_id),
    )]
    async fn listen_to_events(
        &self,
        start_block: u64,
        mut shutdown: Shutdown,
        messages: mpsc::Sender<Message>,
        sys_err: mpsc::Sender<Error>,
    ) {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            chain = %self.chain_name,
            started = true,
            start_block,
        );
        let mut next_block = start_block;
        let mut last_hash: Option<H256> = None;
        loop {
            // only stop at a block boundary, never mid-block.
            if shutdown.is_shutdown() {
                tracing::debug!("listener stopping on shutdown");
                return;
            }
            let head = match self.client.latest_block().await {
                Ok(head) => head,
                Err(e) => {
                    // transient node trouble; try again next tick.
                    tracing::warn!("failed to fetch chain head: {}", e);
                    if self.sleep_or_shutdown(&mut shutdown).await {
                        return;
                    }
                    continue;
                }
            };
            if head < next_block + self.block_confirmations {
                tracing::trace!(
                    head,
                    next_block,
                    "waiting for more confirmations",
                );
                if self.sleep_or_shutdown(&mut shutdown).await {
                    return;
                }
                continue;
            }
            match self
                .process_block_with_retry(next_block, &mut last_hash, &messages)
                .await
            {
                Ok(()) => {
                    if let Err(e) =
                        self.store.store_block(self.domain_id, next_block)
                    {
                        // losing the cursor means losing restart safety.
                        tracing::error!(
                            "failed to persist block cursor: {}",
                            e
                        );
                        let _ = sys_err.send(e).await;
                        return;
                    }
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Sync,
                        chain = %self.chain_name,
                        block = next_block,
                    );
                    next_block += 1;
                }
                Err(e) => {
                    tracing::error!(
                        block = next_block,
                        "giving up on block: {}",
                        e,
                    );
                    let _ = sys_err
                        .send(Error::BlockRetriesExhausted {
                            domain_id: self.domain_id.0,
                            block: next_block,
                        })
                        .await;
                    return;
                }
            }
        }
    }
}
