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

//! # Crossbridge EVM Module 🕸️
//!
//! The EVM implementation of a relayed chain: a confirmed-block deposit
//! listener, the handler codecs, and a replace-by-fee proposal voter,
//! composed into one [`EvmChain`] the relayer core can route through.

use std::sync::Arc;

use ethers::middleware::SignerMiddleware;
use tokio::sync::mpsc;

use crossbridge_relayer_config::evm::EvmChainConfig;
use crossbridge_relayer_context::RelayerContext;
use crossbridge_relayer_core::{EventSource, ProposalSubmitter, RelayedChain};
use crossbridge_relayer_store::BlockCursorStore;
use crossbridge_relayer_types::{DomainId, Message};
use crossbridge_relayer_utils::{Error, Result};

pub mod client;
pub mod gas;
pub mod handlers;
pub mod listener;
pub mod voter;

#[cfg(test)]
mod tests;

use client::{BridgeClient, EvmClient};
use listener::EvmListener;
use voter::EvmVoter;

/// One EVM chain the relayer listens to and votes on.
pub struct EvmChain<C, S> {
    config: EvmChainConfig,
    client: Arc<C>,
    listener: EvmListener<C, S>,
    voter: EvmVoter<C>,
    store: S,
}

impl<C, S> EvmChain<C, S>
where
    C: BridgeClient,
    S: BlockCursorStore,
{
    /// Composes the listener and the voter over one client and store.
    pub fn new(config: EvmChainConfig, client: Arc<C>, store: S) -> Self {
        let listener =
            EvmListener::new(&config, Arc::clone(&client), store.clone());
        let voter = EvmVoter::new(&config, Arc::clone(&client));
        Self {
            config,
            client,
            listener,
            voter,
            store,
        }
    }

    /// Resolves the first block to poll, from the persisted cursor and
    /// the chain configuration.
    async fn resolve_start_block(&self) -> Result<u64> {
        let configured_start = if self.config.latest_block {
            self.client.latest_block().await?
        } else {
            self.config.start_block
        };
        self.store.starting_block(
            self.config.domain_id,
            configured_start,
            self.config.fresh_start,
        )
    }
}

#[async_trait::async_trait]
impl<C, S> RelayedChain for EvmChain<C, S>
where
    C: BridgeClient,
    S: BlockCursorStore + 'static,
{
    fn domain_id(&self) -> DomainId {
        self.config.domain_id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn poll_events(
        &self,
        ctx: RelayerContext,
        messages: mpsc::Sender<Message>,
        sys_err: mpsc::Sender<Error>,
    ) {
        let start_block = match self.resolve_start_block().await {
            Ok(block) => block,
            Err(e) => {
                tracing::error!(
                    chain = %self.config.name,
                    "failed to resolve the starting block: {}",
                    e,
                );
                let _ = sys_err.send(e).await;
                return;
            }
        };
        let shutdown = ctx.shutdown_signal();
        self.listener
            .listen_to_events(start_block, shutdown, messages, sys_err)
            .await;
    }

    async fn write(&self, message: Message) -> Result<()> {
        self.voter.vote_proposal(&message).await
    }
}

/// Builds a production [`EvmChain`] for one configured chain, wiring the
/// provider, the signing wallet and the bridge contract from the
/// relayer context.
pub fn setup_evm_chain(
    ctx: &RelayerContext,
    config: &EvmChainConfig,
) -> Result<EvmChain<EvmClient, crossbridge_relayer_store::SledStore>> {
    let provider = ctx.evm_provider(&config.name)?;
    let wallet = ctx.evm_wallet(&config.name)?;
    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    let bridge_client = Arc::new(EvmClient::new(client, config.bridge));
    Ok(EvmChain::new(
        config.clone(),
        bridge_client,
        ctx.store().clone(),
    ))
}
