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

use std::sync::Arc;

use ethers::contract::abigen;
use ethers::middleware::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, TransactionReceipt, H256, U256};

use crossbridge_relayer_types::{DepositNonce, DomainId, ProposalStatus, ResourceId};
use crossbridge_relayer_utils::{Result, SignerClient};

use crate::gas::FeeQuote;

abigen!(
    BridgeContract,
    r#"[
        event Deposit(uint8 destinationDomainID, bytes32 resourceID, uint64 depositNonce, address handler, bytes data)
        function getProposalStatus(uint8 originDomainID, uint64 depositNonce, bytes32 dataHash) external view returns (uint8)
        function hasVotedOnProposal(uint8 originDomainID, uint64 depositNonce, bytes32 dataHash, address relayer) external view returns (bool)
        function voteProposal(uint8 originDomainID, uint64 depositNonce, bytes32 resourceID, bytes data) external
    ]"#
);

/// One `Deposit` event, pulled off the bridge contract's logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLog {
    /// Domain id the deposit is addressed to.
    pub destination_domain_id: DomainId,
    /// Resource id the deposit is for.
    pub resource_id: ResourceId,
    /// The deposit nonce, monotonic per source domain.
    pub deposit_nonce: DepositNonce,
    /// The handler contract that recorded the deposit.
    pub handler: Address,
    /// Handler-specific calldata recorded alongside the deposit.
    pub data: Vec<u8>,
}

/// The header fields the listener needs for continuity checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: H256,
    /// The hash of the parent block.
    pub parent_hash: H256,
}

/// Everything the listener and the voter need from an EVM node and its
/// bridge contract, behind one trait so tests can run against a scripted
/// chain.
#[async_trait::async_trait]
pub trait BridgeClient: Send + Sync + 'static {
    /// The current head block number.
    async fn latest_block(&self) -> Result<u64>;

    /// Header info for the given block.
    async fn block_info(&self, number: u64) -> Result<BlockInfo>;

    /// All `Deposit` events the bridge contract emitted in the block.
    async fn deposit_logs_in_block(&self, number: u64)
        -> Result<Vec<DepositLog>>;

    /// The proposal status for `(origin, nonce, data_hash)`.
    async fn proposal_status(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        data_hash: H256,
    ) -> Result<ProposalStatus>;

    /// Whether `voter` already voted on `(origin, nonce, data_hash)`.
    async fn has_voted(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        data_hash: H256,
        voter: Address,
    ) -> Result<bool>;

    /// The address votes are signed with.
    fn relayer_address(&self) -> Address;

    /// The account's next nonce, including pending transactions.
    async fn pending_nonce(&self) -> Result<U256>;

    /// Estimated `(max_fee_per_gas, max_priority_fee_per_gas)` for the
    /// next block.
    async fn estimate_fees(&self) -> Result<(U256, U256)>;

    /// Broadcasts a `voteProposal` transaction and returns its hash.
    /// Does not wait for inclusion.
    async fn submit_vote(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        resource_id: ResourceId,
        data: Vec<u8>,
        fees: &FeeQuote,
        tx_nonce: U256,
    ) -> Result<H256>;

    /// The receipt for the transaction, if it was included.
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>>;
}

/// The production [`BridgeClient`], an ethers signing client plus the
/// bridge contract binding.
pub struct EvmClient {
    client: Arc<SignerClient>,
    contract: BridgeContract<SignerClient>,
    address: Address,
}

impl EvmClient {
    /// Wraps a signing client and the bridge contract deployed at
    /// `bridge`.
    pub fn new(client: Arc<SignerClient>, bridge: Address) -> Self {
        use ethers::signers::Signer;
        let address = client.signer().address();
        let contract = BridgeContract::new(bridge, Arc::clone(&client));
        Self {
            client,
            contract,
            address,
        }
    }
}

#[async_trait::async_trait]
impl BridgeClient for EvmClient {
    async fn latest_block(&self) -> Result<u64> {
        let number = self.client.get_block_number().await?;
        Ok(number.as_u64())
    }

    async fn block_info(&self, number: u64) -> Result<BlockInfo> {
        let block = self
            .client
            .get_block(number)
            .await?
            .ok_or(crossbridge_relayer_utils::Error::Generic(
                "block not yet available on the node",
            ))?;
        Ok(BlockInfo {
            number,
            hash: block.hash.unwrap_or_default(),
            parent_hash: block.parent_hash,
        })
    }

    async fn deposit_logs_in_block(
        &self,
        number: u64,
    ) -> Result<Vec<DepositLog>> {
        let events = self
            .contract
            .event::<DepositFilter>()
            .from_block(number)
            .to_block(number)
            .query()
            .await?;
        Ok(events
            .into_iter()
            .map(|e| DepositLog {
                destination_domain_id: DomainId(e.destination_domain_id),
                resource_id: ResourceId(e.resource_id),
                deposit_nonce: e.deposit_nonce,
                handler: e.handler,
                data: e.data.to_vec(),
            })
            .collect())
    }

    async fn proposal_status(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        data_hash: H256,
    ) -> Result<ProposalStatus> {
        let raw = self
            .contract
            .get_proposal_status(origin.0, nonce, data_hash.into())
            .call()
            .await?;
        ProposalStatus::try_from(raw)
    }

    async fn has_voted(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        data_hash: H256,
        voter: Address,
    ) -> Result<bool> {
        let voted = self
            .contract
            .has_voted_on_proposal(origin.0, nonce, data_hash.into(), voter)
            .call()
            .await?;
        Ok(voted)
    }

    fn relayer_address(&self) -> Address {
        self.address
    }

    async fn pending_nonce(&self) -> Result<U256> {
        let nonce = self
            .client
            .get_transaction_count(
                self.address,
                Some(BlockNumber::Pending.into()),
            )
            .await?;
        Ok(nonce)
    }

    async fn estimate_fees(&self) -> Result<(U256, U256)> {
        let fees = self.client.estimate_eip1559_fees(None).await?;
        Ok(fees)
    }

    async fn submit_vote(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        resource_id: ResourceId,
        data: Vec<u8>,
        fees: &FeeQuote,
        tx_nonce: U256,
    ) -> Result<H256> {
        let call = self.contract.vote_proposal(
            origin.0,
            nonce,
            resource_id.into_bytes(),
            data.into(),
        );
        let mut tx = call.tx.clone();
        tx.set_gas(fees.gas_limit);
        tx.set_nonce(tx_nonce);
        if let TypedTransaction::Eip1559(inner) = &mut tx {
            inner.max_fee_per_gas = Some(fees.max_fee_per_gas);
            inner.max_priority_fee_per_gas =
                Some(fees.max_priority_fee_per_gas);
        }
        let pending = self.client.send_transaction(tx, None).await?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        let receipt = self.client.get_transaction_receipt(tx_hash).await?;
        Ok(receipt)
    }
}
