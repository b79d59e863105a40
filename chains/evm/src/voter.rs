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

use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use tokio::sync::Mutex;

use crossbridge_relayer_config::evm::{
    EvmChainConfig, FeeConfig, HandlerKind,
};
use crossbridge_relayer_core::ProposalSubmitter;
use crossbridge_relayer_types::{Message, ResourceId};
use crossbridge_relayer_utils::{probe, Error, Result};

use crate::client::BridgeClient;
use crate::gas::{FeeQuote, FeeStrategy, LondonFeeStrategy};
use crate::handlers;

/// Votes messages as proposals on this chain's bridge contract.
///
/// Votes are idempotent against the on-chain proposal status, so the
/// voter can safely see the same message twice, whether from a listener
/// replay after a crash or from another relayer racing us.
pub struct EvmVoter<C> {
    chain_name: String,
    client: Arc<C>,
    // resource id -> (the destination handler, its codec).
    handlers: HashMap<ResourceId, (Address, HandlerKind)>,
    fees: FeeConfig,
    strategy: LondonFeeStrategy,
    // locally tracked account nonce; one vote in flight at a time.
    next_nonce: Mutex<Option<U256>>,
}

impl<C> EvmVoter<C>
where
    C: BridgeClient,
{
    /// Builds a voter for the configured chain.
    pub fn new(config: &EvmChainConfig, client: Arc<C>) -> Self {
        let handlers = config
            .resources
            .iter()
            .map(|r| (r.resource_id, (r.handler, r.kind)))
            .collect();
        Self {
            chain_name: config.name.clone(),
            client,
            handlers,
            strategy: LondonFeeStrategy::new(&config.fees),
            fees: config.fees.clone(),
            next_nonce: Mutex::new(None),
        }
    }

    /// Whether the proposal no longer needs a vote from us: it reached
    /// the threshold or a terminal state, or we already voted.
    async fn already_handled(
        &self,
        message: &Message,
        data_hash: H256,
    ) -> Result<bool> {
        let status = self
            .client
            .proposal_status(message.source, message.deposit_nonce, data_hash)
            .await?;
        if status.is_terminal() {
            tracing::debug!(?status, "proposal already settled, skipping");
            return Ok(true);
        }
        if status == crossbridge_relayer_types::ProposalStatus::Passed {
            tracing::debug!("proposal already passed, no vote needed");
            return Ok(true);
        }
        let voted = self
            .client
            .has_voted(
                message.source,
                message.deposit_nonce,
                data_hash,
                self.client.relayer_address(),
            )
            .await?;
        if voted {
            tracing::debug!("already voted on this proposal, skipping");
        }
        Ok(voted)
    }

    /// Broadcasts the vote and waits for inclusion, replacing the
    /// transaction with a higher-fee copy (same account nonce) each time
    /// the inclusion deadline passes, up to `max_fee_bumps` times.
    async fn submit_with_bumps(
        &self,
        message: &Message,
        data: Vec<u8>,
        data_hash: H256,
    ) -> Result<()> {
        // serialize submissions so two votes never race on one nonce.
        let mut nonce_slot = self.next_nonce.lock().await;
        let mut tx_nonce = match *nonce_slot {
            Some(nonce) => nonce,
            None => self.client.pending_nonce().await?,
        };
        let estimated = self.client.estimate_fees().await?;
        let mut quote = self.strategy.quote(estimated);
        let mut refreshed_nonce = false;
        let mut last_hash = H256::zero();

        for attempt in 0..=self.fees.max_fee_bumps {
            if attempt > 0 {
                quote = self.strategy.bump(&quote);
            }
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Voting,
                chain = %self.chain_name,
                message = %message,
                attempt,
                max_fee_per_gas = %quote.max_fee_per_gas,
            );
            let submitted = self
                .client
                .submit_vote(
                    message.source,
                    message.deposit_nonce,
                    message.resource_id,
                    data.clone(),
                    &quote,
                    tx_nonce,
                )
                .await;
            let tx_hash = match submitted {
                Ok(tx_hash) => tx_hash,
                Err(e) if is_nonce_error(&e) && !refreshed_nonce => {
                    // our local nonce went stale; resync once and retry.
                    tracing::warn!("stale account nonce, refreshing: {}", e);
                    *nonce_slot = None;
                    tx_nonce = self.client.pending_nonce().await?;
                    refreshed_nonce = true;
                    continue;
                }
                Err(e) => {
                    // the node may reject the call because another
                    // relayer settled the proposal between our status
                    // check and the broadcast.
                    if self.already_handled(message, data_hash).await? {
                        return Ok(());
                    }
                    return Err(e);
                }
            };
            last_hash = tx_hash;
            match self.wait_for_receipt(tx_hash).await? {
                Some(receipt) => {
                    *nonce_slot = Some(tx_nonce + 1);
                    if receipt.status == Some(0.into()) {
                        // reverted; benign if the proposal got settled
                        // under us.
                        if self.already_handled(message, data_hash).await? {
                            return Ok(());
                        }
                        return Err(Error::Generic(
                            "vote transaction reverted",
                        ));
                    }
                    tracing::info!(
                        tx_hash = ?tx_hash,
                        message = %message,
                        "vote included",
                    );
                    return Ok(());
                }
                None => {
                    tracing::warn!(
                        tx_hash = ?tx_hash,
                        attempt,
                        "vote not included in time, bumping fees",
                    );
                }
            }
        }
        Err(Error::TxInclusionTimeout { tx_hash: last_hash })
    }

    /// Polls for the receipt until `inclusion_timeout` elapses.
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<ethers::types::TransactionReceipt>> {
        let deadline = Duration::from_millis(self.fees.inclusion_timeout);
        let poll = Duration::from_millis(
            (self.fees.inclusion_timeout / 10).max(10),
        );
        let waiting = async {
            loop {
                if let Some(receipt) =
                    self.client.transaction_receipt(tx_hash).await?
                {
                    return Ok(Some(receipt));
                }
                tokio::time::sleep(poll).await;
            }
        };
        match tokio::time::timeout(deadline, waiting).await {
            Ok(result) => result,
            Err(_elapsed) => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl<C> ProposalSubmitter for EvmVoter<C>
where
    C: BridgeClient,
{
    /// Votes the message's proposal, unless the chain already knows about
    /// it. Returns `Ok(())` both for a confirmed vote and for a no-op.
    #[tracing::instrument(
        skip_all,
        fields(chain = %self.chain_name, message = %message),
    )]
    async fn vote_proposal(&self, message: &Message) -> Result<()> {
        let (handler, kind) = self
            .handlers
            .get(&message.resource_id)
            .copied()
            .ok_or_else(|| Error::UnregisteredResource {
                resource_id: message.resource_id.to_string(),
            })?;
        let data = handlers::encode_proposal_data(kind, message)?;
        let data_hash = proposal_data_hash(handler, &data);

        if self.already_handled(message, data_hash).await? {
            return Ok(());
        }
        self.submit_with_bumps(message, data, data_hash).await
    }
}

/// The hash the bridge contract keys proposals by: the destination
/// handler address concatenated with the proposal calldata.
pub fn proposal_data_hash(handler: Address, data: &[u8]) -> H256 {
    let mut buf = Vec::with_capacity(20 + data.len());
    buf.extend_from_slice(handler.as_bytes());
    buf.extend_from_slice(data);
    H256::from(keccak256(buf))
}

/// Recognizes node-side nonce rejections worth one local resync.
///
/// Matches the exact phrases the JSON-RPC nodes use for a bad account
/// nonce, not any error that mentions a nonce, so a contract revert
/// reason cannot trigger a spurious resync.
fn is_nonce_error(e: &Error) -> bool {
    let text = e.to_string().to_lowercase();
    text.contains("nonce too low")
        || text.contains("nonce is too low")
        || text.contains("nonce too high")
        || text.contains("invalid nonce")
}
