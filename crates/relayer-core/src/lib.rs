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

#![warn(missing_docs)]
//! # Relayer Core Module 🕸️
//!
//! The chain-agnostic heart of the relayer: the [`RelayedChain`]
//! abstraction and the [`Relayer`] that fans deposit messages from all
//! source chains into a single router and dispatches each one to its
//! destination chain.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crossbridge_relayer_context::{RelayerContext, Shutdown};
use crossbridge_relayer_types::{DomainId, Message};
use crossbridge_relayer_utils::Result;

/// Capacity of the fan-in message channel shared by all chain listeners.
const MESSAGE_CHANNEL_CAPACITY: usize = 512;
/// Capacity of the fatal-error channel.
const SYS_ERR_CHANNEL_CAPACITY: usize = 16;

/// A source of deposit messages from one chain.
///
/// Implementations poll their chain in block order and emit each decoded
/// deposit on `messages`. The loop only exits at a block boundary, on
/// shutdown or after reporting an unrecoverable error on `sys_err`.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Polls from `start_block` until shutdown or a fatal error.
    async fn listen_to_events(
        &self,
        start_block: u64,
        shutdown: Shutdown,
        messages: mpsc::Sender<Message>,
        sys_err: mpsc::Sender<crossbridge_relayer_utils::Error>,
    );
}

/// A sink that turns messages into destination-chain proposal votes.
#[async_trait::async_trait]
pub trait ProposalSubmitter: Send + Sync {
    /// Votes the message's proposal. Must be idempotent against the
    /// destination's on-chain proposal state.
    async fn vote_proposal(&self, message: &Message) -> Result<()>;
}

/// A chain the relayer both listens to and writes to.
///
/// One instance per configured chain. The relayer only ever talks to a
/// chain through this trait, so chain families other than EVM can be
/// plugged in without touching the router.
#[async_trait::async_trait]
pub trait RelayedChain: Send + Sync {
    /// The bridge domain id this chain is registered under.
    fn domain_id(&self) -> DomainId;

    /// Human-readable chain name, used only for logging.
    fn name(&self) -> &str;

    /// Polls the chain for new deposits, forever.
    ///
    /// Every decoded deposit is sent on `messages`. The task must only
    /// return after the shutdown signal fires; any error it cannot
    /// recover from is reported on `sys_err` instead of being returned.
    async fn poll_events(
        &self,
        ctx: RelayerContext,
        messages: mpsc::Sender<Message>,
        sys_err: mpsc::Sender<crossbridge_relayer_utils::Error>,
    );

    /// Votes the message's proposal on this chain's bridge.
    ///
    /// Must be idempotent: re-delivering an already executed or already
    /// voted proposal is a no-op `Ok(())`.
    async fn write(&self, message: Message) -> Result<()>;
}

/// The relayer itself: a set of chains and the router between them.
#[derive(Default)]
pub struct Relayer {
    chains: Vec<Arc<dyn RelayedChain>>,
}

impl Relayer {
    /// Creates an empty relayer. Chains are added with [`Self::add_chain`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chain as both an event source and a write target.
    pub fn add_chain(&mut self, chain: Arc<dyn RelayedChain>) {
        self.chains.push(chain);
    }

    /// Starts all chain listeners and runs the message router until the
    /// shutdown signal fires or a fatal error occurs.
    ///
    /// A single fatal error anywhere (a listener giving up on a block, a
    /// vote submission failing, a message for an unknown destination)
    /// brings the whole relayer down: partial operation would silently
    /// strand deposits, so we shut down every chain and return the error.
    pub async fn start(&self, ctx: RelayerContext) -> Result<()> {
        let routes: HashMap<DomainId, Arc<dyn RelayedChain>> = self
            .chains
            .iter()
            .map(|c| (c.domain_id(), Arc::clone(c)))
            .collect();

        let (messages_tx, mut messages_rx) =
            mpsc::channel::<Message>(MESSAGE_CHANNEL_CAPACITY);
        let (sys_err_tx, mut sys_err_rx) =
            mpsc::channel::<crossbridge_relayer_utils::Error>(
                SYS_ERR_CHANNEL_CAPACITY,
            );

        for chain in &self.chains {
            let chain = Arc::clone(chain);
            let ctx = ctx.clone();
            let messages_tx = messages_tx.clone();
            let sys_err_tx = sys_err_tx.clone();
            tracing::info!(
                chain = %chain.name(),
                domain_id = %chain.domain_id(),
                "starting chain listener",
            );
            tokio::spawn(async move {
                chain.poll_events(ctx, messages_tx, sys_err_tx).await;
            });
        }
        // the router holds no sender of its own; once every listener is
        // gone the message channel closes and we can tell.
        drop(messages_tx);
        drop(sys_err_tx);

        let mut shutdown_signal = ctx.shutdown_signal();
        loop {
            tokio::select! {
                // check shutdown before the channels, so that the
                // listeners dropping their senders on shutdown is not
                // mistaken for an abnormal stop.
                biased;
                _ = shutdown_signal.recv() => {
                    tracing::info!("router received shutdown signal");
                    return Ok(());
                }
                fatal = sys_err_rx.recv() => {
                    let e = fatal.unwrap_or(
                        crossbridge_relayer_utils::Error::TaskStoppedAbnormally,
                    );
                    tracing::error!("fatal chain error: {}", e);
                    ctx.shutdown();
                    return Err(e);
                }
                maybe_msg = messages_rx.recv() => {
                    let msg = match maybe_msg {
                        Some(msg) => msg,
                        None => {
                            ctx.shutdown();
                            return Err(
                                crossbridge_relayer_utils::Error::EventStreamClosed,
                            );
                        }
                    };
                    if let Err(e) = self.dispatch(&routes, msg).await {
                        ctx.shutdown();
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn dispatch(
        &self,
        routes: &HashMap<DomainId, Arc<dyn RelayedChain>>,
        msg: Message,
    ) -> Result<()> {
        let destination = routes.get(&msg.destination).ok_or(
            crossbridge_relayer_utils::Error::UnconfiguredDomain {
                domain_id: msg.destination.0,
            },
        )?;
        tracing::debug!(
            message = %msg,
            chain = %destination.name(),
            "routing message to destination chain",
        );
        destination.write(msg).await
    }
}
