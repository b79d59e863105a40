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

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, TransactionReceipt, H256, U256};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crossbridge_relayer_config::evm::{
    EvmChainConfig, FeeConfig, HandlerKind, ResourceConfig,
};
use crossbridge_relayer_context::{RelayerContext, Shutdown};
use crossbridge_relayer_core::{
    EventSource, ProposalSubmitter, RelayedChain, Relayer,
};
use crossbridge_relayer_store::{BlockCursorStore, InMemoryStore};
use crossbridge_relayer_types::{
    DepositNonce, DomainId, Message, ProposalStatus, ResourceId,
};
use crossbridge_relayer_utils::{Error, Result};

use crate::client::{BlockInfo, BridgeClient, DepositLog};
use crate::gas::FeeQuote;
use crate::listener::EvmListener;
use crate::voter::EvmVoter;
use crate::EvmChain;

const RESOURCE: ResourceId = ResourceId([0xaa; 32]);

fn handler_address() -> Address {
    Address::repeat_byte(0x11)
}

fn chain_config(name: &str, domain: u8) -> EvmChainConfig {
    EvmChainConfig {
        name: name.to_string(),
        enabled: true,
        http_endpoint: url::Url::parse("http://localhost:8545")
            .unwrap()
            .into(),
        chain_id: 1337,
        domain_id: DomainId(domain),
        private_key: None,
        bridge: Address::repeat_byte(0x22),
        resources: vec![ResourceConfig {
            resource_id: RESOURCE,
            handler: handler_address(),
            kind: HandlerKind::Erc20,
        }],
        start_block: 100,
        latest_block: false,
        fresh_start: false,
        block_confirmations: 5,
        polling_interval: 10,
        block_retries: 2,
        block_retry_interval: 10,
        fees: FeeConfig {
            gas_limit: 2_000_000,
            max_gas_price: u64::MAX,
            max_fee_bumps: 5,
            inclusion_timeout: 100,
        },
    }
}

fn erc20_deposit_data(amount: u64, recipient: &[u8]) -> Vec<u8> {
    let mut word = [0u8; 32];
    U256::from(amount).to_big_endian(&mut word);
    let mut data = word.to_vec();
    U256::from(recipient.len()).to_big_endian(&mut word);
    data.extend_from_slice(&word);
    data.extend_from_slice(recipient);
    data
}

fn deposit_log(destination: u8, nonce: DepositNonce) -> DepositLog {
    DepositLog {
        destination_domain_id: DomainId(destination),
        resource_id: RESOURCE,
        deposit_nonce: nonce,
        handler: handler_address(),
        data: erc20_deposit_data(1000, &[0xbe, 0xef]),
    }
}

fn erc20_message(
    source: u8,
    destination: u8,
    nonce: DepositNonce,
) -> Message {
    Message {
        source: DomainId(source),
        destination: DomainId(destination),
        deposit_nonce: nonce,
        resource_id: RESOURCE,
        payload: vec![vec![0x03, 0xe8], vec![0xbe, 0xef]],
    }
}

#[derive(Debug, Clone)]
struct Submission {
    origin: DomainId,
    nonce: DepositNonce,
    fees: FeeQuote,
    tx_nonce: U256,
}

/// A scripted chain: a fixed head, deposits keyed by block number, and a
/// proposal/vote ledger keyed by `(origin, nonce)`.
#[derive(Default)]
struct MockClient {
    head: AtomicU64,
    deposits: Mutex<HashMap<u64, Vec<DepositLog>>>,
    failing_blocks: Mutex<HashSet<u64>>,
    // blocks whose first read reports a parent off the canonical chain.
    stale_parents: Mutex<HashSet<u64>>,
    statuses: Mutex<HashMap<(u8, u64), ProposalStatus>>,
    voted: Mutex<HashSet<(u8, u64)>>,
    submissions: Mutex<Vec<Submission>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    // the chain's pending account nonce; lower submissions bounce.
    pending: AtomicU64,
    pending_nonce_calls: AtomicU64,
    // how many submissions are ignored before one gets included.
    ignore_first_submissions: usize,
    revert_votes: bool,
    reject_submissions_with: Option<&'static str>,
}

impl MockClient {
    fn with_head(head: u64) -> Self {
        let client = Self::default();
        client.head.store(head, Ordering::SeqCst);
        client.pending.store(5, Ordering::SeqCst);
        client
    }

    fn add_deposit(&self, block: u64, log: DepositLog) {
        self.deposits.lock().entry(block).or_default().push(log);
    }

    fn set_status(&self, origin: u8, nonce: u64, status: ProposalStatus) {
        self.statuses.lock().insert((origin, nonce), status);
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

#[async_trait::async_trait]
impl BridgeClient for MockClient {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_info(&self, number: u64) -> Result<BlockInfo> {
        if self.failing_blocks.lock().contains(&number) {
            return Err(Error::Generic("scripted block fetch failure"));
        }
        let parent_hash = if self.stale_parents.lock().remove(&number) {
            H256::repeat_byte(0xdd)
        } else {
            H256::from_low_u64_be(number.saturating_sub(1))
        };
        Ok(BlockInfo {
            number,
            hash: H256::from_low_u64_be(number),
            parent_hash,
        })
    }

    async fn deposit_logs_in_block(
        &self,
        number: u64,
    ) -> Result<Vec<DepositLog>> {
        Ok(self.deposits.lock().get(&number).cloned().unwrap_or_default())
    }

    async fn proposal_status(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        _data_hash: H256,
    ) -> Result<ProposalStatus> {
        Ok(self
            .statuses
            .lock()
            .get(&(origin.0, nonce))
            .copied()
            .unwrap_or(ProposalStatus::Inactive))
    }

    async fn has_voted(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        _data_hash: H256,
        _voter: Address,
    ) -> Result<bool> {
        Ok(self.voted.lock().contains(&(origin.0, nonce)))
    }

    fn relayer_address(&self) -> Address {
        Address::repeat_byte(0x77)
    }

    async fn pending_nonce(&self) -> Result<U256> {
        self.pending_nonce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from(self.pending.load(Ordering::SeqCst)))
    }

    async fn estimate_fees(&self) -> Result<(U256, U256)> {
        Ok((U256::from(100), U256::from(10)))
    }

    async fn submit_vote(
        &self,
        origin: DomainId,
        nonce: DepositNonce,
        _resource_id: ResourceId,
        _data: Vec<u8>,
        fees: &FeeQuote,
        tx_nonce: U256,
    ) -> Result<H256> {
        if let Some(reason) = self.reject_submissions_with {
            return Err(Error::Generic(reason));
        }
        if tx_nonce < U256::from(self.pending.load(Ordering::SeqCst)) {
            return Err(Error::Generic("nonce too low"));
        }
        let mut submissions = self.submissions.lock();
        submissions.push(Submission {
            origin,
            nonce,
            fees: fees.clone(),
            tx_nonce,
        });
        let tx_hash = H256::from_low_u64_be(submissions.len() as u64);
        if submissions.len() > self.ignore_first_submissions {
            let receipt = TransactionReceipt {
                transaction_hash: tx_hash,
                status: Some(if self.revert_votes { 0 } else { 1 }.into()),
                ..Default::default()
            };
            self.receipts.lock().insert(tx_hash, receipt);
            if !self.revert_votes {
                self.statuses
                    .lock()
                    .insert((origin.0, nonce), ProposalStatus::Executed);
            }
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        Ok(self.receipts.lock().get(&tx_hash).cloned())
    }
}

fn shutdown_pair() -> (broadcast::Sender<()>, Shutdown) {
    let (tx, rx) = broadcast::channel(2);
    (tx, Shutdown::new(rx))
}

async fn wait_until<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

mod listener {
    use super::*;

    #[tokio::test]
    async fn delivers_confirmed_deposits_and_advances_the_cursor() {
        let client = Arc::new(MockClient::with_head(110));
        client.add_deposit(101, deposit_log(2, 7));
        let store = InMemoryStore::default();
        let config = chain_config("source", 1);
        let listener = Arc::new(EvmListener::new(
            &config,
            Arc::clone(&client),
            store.clone(),
        ));
        let (messages_tx, mut messages_rx) = mpsc::channel(16);
        let (sys_err_tx, _sys_err_rx) = mpsc::channel(16);
        let (stop, shutdown) = shutdown_pair();
        let task = tokio::spawn({
            let listener = Arc::clone(&listener);
            async move {
                listener
                    .listen_to_events(100, shutdown, messages_tx, sys_err_tx)
                    .await;
            }
        });

        let msg = tokio::time::timeout(
            Duration::from_secs(2),
            messages_rx.recv(),
        )
        .await
        .expect("a message within the deadline")
        .expect("channel open");
        assert_eq!(msg.source, DomainId(1));
        assert_eq!(msg.destination, DomainId(2));
        assert_eq!(msg.deposit_nonce, 7);
        assert_eq!(msg.resource_id, RESOURCE);
        assert_eq!(U256::from_big_endian(&msg.payload[0]), U256::from(1000));
        assert_eq!(msg.payload[1], vec![0xbe, 0xef]);

        // head 110 with 5 confirmations lets the cursor reach 105.
        let caught_up = wait_until(Duration::from_secs(2), || {
            store.last_block(DomainId(1)).unwrap() == Some(105)
        })
        .await;
        assert!(caught_up);

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn emits_messages_in_block_order() {
        let client = Arc::new(MockClient::with_head(110));
        client.add_deposit(101, deposit_log(2, 1));
        client.add_deposit(102, deposit_log(2, 2));
        client.add_deposit(103, deposit_log(2, 3));
        let config = chain_config("source", 1);
        let listener = Arc::new(EvmListener::new(
            &config,
            client,
            InMemoryStore::default(),
        ));
        let (messages_tx, mut messages_rx) = mpsc::channel(16);
        let (sys_err_tx, _sys_err_rx) = mpsc::channel(16);
        let (stop, shutdown) = shutdown_pair();
        let task = tokio::spawn(async move {
            listener.listen_to_events(100, shutdown, messages_tx, sys_err_tx).await;
        });

        let mut nonces = vec![];
        for _ in 0..3 {
            let msg = tokio::time::timeout(
                Duration::from_secs(2),
                messages_rx.recv(),
            )
            .await
            .expect("a message within the deadline")
            .expect("channel open");
            nonces.push(msg.deposit_nonce);
        }
        assert_eq!(nonces, vec![1, 2, 3]);

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reorged_blocks_are_retried_until_the_link_repairs() {
        let client = Arc::new(MockClient::with_head(110));
        client.add_deposit(101, deposit_log(2, 7));
        // the first read of block 101 does not chain onto block 100.
        client.stale_parents.lock().insert(101);
        let store = InMemoryStore::default();
        let config = chain_config("source", 1);
        let listener = Arc::new(EvmListener::new(
            &config,
            Arc::clone(&client),
            store.clone(),
        ));
        let (messages_tx, mut messages_rx) = mpsc::channel(16);
        let (sys_err_tx, _sys_err_rx) = mpsc::channel(16);
        let (stop, shutdown) = shutdown_pair();
        let task = tokio::spawn({
            let listener = Arc::clone(&listener);
            async move {
                listener
                    .listen_to_events(100, shutdown, messages_tx, sys_err_tx)
                    .await;
            }
        });

        // the broken link fails the first attempt and the retry re-reads
        // the canonical block, so the deposit still comes through once.
        let msg = tokio::time::timeout(
            Duration::from_secs(2),
            messages_rx.recv(),
        )
        .await
        .expect("a message within the deadline")
        .expect("channel open");
        assert_eq!(msg.deposit_nonce, 7);
        assert!(client.stale_parents.lock().is_empty());

        let caught_up = wait_until(Duration::from_secs(2), || {
            store.last_block(DomainId(1)).unwrap() == Some(105)
        })
        .await;
        assert!(caught_up);

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    /// A store whose writes always fail, to model a broken disk.
    #[derive(Clone)]
    struct FailingStore;

    impl BlockCursorStore for FailingStore {
        fn store_block(
            &self,
            _domain_id: DomainId,
            _block_number: u64,
        ) -> Result<()> {
            Err(Error::Generic("scripted storage failure"))
        }

        fn last_block(&self, _domain_id: DomainId) -> Result<Option<u64>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn storage_failure_halts_the_chain() {
        let client = Arc::new(MockClient::with_head(110));
        let config = chain_config("source", 1);
        let listener =
            Arc::new(EvmListener::new(&config, client, FailingStore));
        let (messages_tx, _messages_rx) = mpsc::channel(16);
        let (sys_err_tx, mut sys_err_rx) = mpsc::channel(16);
        let (_stop, shutdown) = shutdown_pair();
        let task = tokio::spawn(async move {
            listener.listen_to_events(100, shutdown, messages_tx, sys_err_tx).await;
        });

        let fatal = tokio::time::timeout(
            Duration::from_secs(2),
            sys_err_rx.recv(),
        )
        .await
        .expect("a fatal error within the deadline")
        .expect("channel open");
        assert!(matches!(fatal, Error::Generic(_)));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn holds_back_unconfirmed_blocks() {
        let client = Arc::new(MockClient::with_head(102));
        client.add_deposit(101, deposit_log(2, 7));
        let store = InMemoryStore::default();
        let config = chain_config("source", 1);
        let listener =
            Arc::new(EvmListener::new(&config, client, store.clone()));
        let (messages_tx, mut messages_rx) = mpsc::channel(16);
        let (sys_err_tx, _sys_err_rx) = mpsc::channel(16);
        let (stop, shutdown) = shutdown_pair();
        let task = tokio::spawn(async move {
            listener.listen_to_events(100, shutdown, messages_tx, sys_err_tx).await;
        });

        // head is only one block past the deposit, five are required.
        let delivered = tokio::time::timeout(
            Duration::from_millis(200),
            messages_rx.recv(),
        )
        .await;
        assert!(delivered.is_err());
        assert_eq!(store.last_block(DomainId(1)).unwrap(), None);

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn halts_the_chain_when_block_retries_are_exhausted() {
        let client = Arc::new(MockClient::with_head(110));
        client.failing_blocks.lock().insert(101);
        let store = InMemoryStore::default();
        let config = chain_config("source", 1);
        let listener =
            Arc::new(EvmListener::new(&config, client, store.clone()));
        let (messages_tx, _messages_rx) = mpsc::channel(16);
        let (sys_err_tx, mut sys_err_rx) = mpsc::channel(16);
        let (_stop, shutdown) = shutdown_pair();
        let task = tokio::spawn(async move {
            listener.listen_to_events(100, shutdown, messages_tx, sys_err_tx).await;
        });

        let fatal = tokio::time::timeout(
            Duration::from_secs(2),
            sys_err_rx.recv(),
        )
        .await
        .expect("a fatal error within the deadline")
        .expect("channel open");
        assert!(matches!(
            fatal,
            Error::BlockRetriesExhausted {
                domain_id: 1,
                block: 101,
            }
        ));
        // block 100 succeeded before the failure.
        assert_eq!(store.last_block(DomainId(1)).unwrap(), Some(100));
        task.await.unwrap();
    }
}

mod voter {
    use super::*;

    fn voter_for(client: &Arc<MockClient>) -> EvmVoter<MockClient> {
        EvmVoter::new(&chain_config("dest", 2), Arc::clone(client))
    }

    #[tokio::test]
    async fn votes_a_fresh_proposal_once() {
        let client = Arc::new(MockClient::with_head(0));
        let voter = voter_for(&client);
        voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap();
        assert_eq!(client.submission_count(), 1);
        let submission = client.submissions.lock()[0].clone();
        assert_eq!(submission.origin, DomainId(1));
        assert_eq!(submission.nonce, 7);
        assert_eq!(submission.tx_nonce, U256::from(5));
    }

    #[tokio::test]
    async fn replay_after_execution_issues_no_transaction() {
        let client = Arc::new(MockClient::with_head(0));
        client.set_status(1, 7, ProposalStatus::Executed);
        let voter = voter_for(&client);
        voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap();
        assert_eq!(client.submission_count(), 0);
    }

    #[tokio::test]
    async fn passed_proposals_need_no_further_votes() {
        let client = Arc::new(MockClient::with_head(0));
        client.set_status(1, 7, ProposalStatus::Passed);
        let voter = voter_for(&client);
        voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap();
        assert_eq!(client.submission_count(), 0);
    }

    #[tokio::test]
    async fn does_not_vote_twice() {
        let client = Arc::new(MockClient::with_head(0));
        client.voted.lock().insert((1, 7));
        let voter = voter_for(&client);
        voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap();
        assert_eq!(client.submission_count(), 0);
    }

    #[tokio::test]
    async fn bumps_fees_until_the_vote_lands() {
        let mut client = MockClient::with_head(0);
        client.ignore_first_submissions = 2;
        let client = Arc::new(client);
        let voter = voter_for(&client);
        voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap();

        let submissions = client.submissions.lock().clone();
        assert_eq!(submissions.len(), 3);
        for pair in submissions.windows(2) {
            // every replacement pays more and reuses the nonce.
            assert!(
                pair[1].fees.max_fee_per_gas > pair[0].fees.max_fee_per_gas
            );
            assert_eq!(pair[1].tx_nonce, pair[0].tx_nonce);
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_fee_bumps() {
        let mut client = MockClient::with_head(0);
        client.ignore_first_submissions = usize::MAX;
        let client = Arc::new(client);
        let voter = voter_for(&client);
        let err = voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap_err();
        assert!(matches!(err, Error::TxInclusionTimeout { .. }));
        // the initial broadcast plus the configured five bumps.
        assert_eq!(client.submission_count(), 6);
    }

    #[tokio::test]
    async fn resyncs_a_stale_account_nonce_and_retries() {
        let client = Arc::new(MockClient::with_head(0));
        let voter = voter_for(&client);
        voter.vote_proposal(&erc20_message(1, 2, 7)).await.unwrap();
        // someone else spent nonces from this account in the meantime,
        // so our cached next nonce is stale.
        client.pending.store(9, Ordering::SeqCst);
        voter.vote_proposal(&erc20_message(1, 2, 8)).await.unwrap();

        let submissions = client.submissions.lock().clone();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].tx_nonce, U256::from(5));
        assert_eq!(submissions[1].tx_nonce, U256::from(9));
        // one sync for the first vote, one resync after the rejection.
        assert_eq!(client.pending_nonce_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resyncs_the_account_nonce_at_most_once() {
        let mut client = MockClient::with_head(0);
        client.reject_submissions_with = Some("nonce too low");
        let client = Arc::new(client);
        let voter = voter_for(&client);
        let err = voter
            .vote_proposal(&erc20_message(1, 2, 7))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generic(_)));
        assert_eq!(client.submission_count(), 0);
        // one sync at the start, one resync, then the rejection is
        // surfaced instead of resyncing forever.
        assert_eq!(client.pending_nonce_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn revert_reasons_mentioning_nonces_do_not_resync() {
        let mut client = MockClient::with_head(0);
        client.reject_submissions_with =
            Some("execution reverted: proposal nonce already used");
        let client = Arc::new(client);
        let voter = voter_for(&client);
        assert!(voter.vote_proposal(&erc20_message(1, 2, 7)).await.is_err());
        // the revert reason is not an account nonce rejection.
        assert_eq!(client.pending_nonce_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reverted_vote_surfaces_an_error() {
        let mut client = MockClient::with_head(0);
        client.revert_votes = true;
        let client = Arc::new(client);
        let voter = voter_for(&client);
        assert!(voter.vote_proposal(&erc20_message(1, 2, 7)).await.is_err());
    }

    #[tokio::test]
    async fn unknown_resources_are_rejected() {
        let client = Arc::new(MockClient::with_head(0));
        let voter = voter_for(&client);
        let mut message = erc20_message(1, 2, 7);
        message.resource_id = ResourceId([0xbb; 32]);
        let err = voter.vote_proposal(&message).await.unwrap_err();
        assert!(matches!(err, Error::UnregisteredResource { .. }));
        assert_eq!(client.submission_count(), 0);
    }
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn relays_a_deposit_across_two_chains_exactly_once() {
        let source_client = Arc::new(MockClient::with_head(110));
        source_client.add_deposit(101, deposit_log(2, 7));
        let dest_client = Arc::new(MockClient::with_head(110));

        let store = InMemoryStore::default();
        let source_chain = Arc::new(EvmChain::new(
            chain_config("source", 1),
            Arc::clone(&source_client),
            store.clone(),
        ));
        let dest_chain = Arc::new(EvmChain::new(
            chain_config("dest", 2),
            Arc::clone(&dest_client),
            store.clone(),
        ));

        let ctx = RelayerContext::new(
            crossbridge_relayer_config::CrossbridgeRelayerConfig::default(),
            crossbridge_relayer_store::SledStore::temporary().unwrap(),
        );
        let mut relayer = Relayer::new();
        relayer.add_chain(Arc::clone(&source_chain) as Arc<dyn RelayedChain>);
        relayer.add_chain(Arc::clone(&dest_chain) as Arc<dyn RelayedChain>);
        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move { relayer.start(ctx).await })
        };

        // the deposit at block 101 becomes exactly one vote on chain 2.
        let voted = wait_until(Duration::from_secs(3), || {
            dest_client.submission_count() == 1
        })
        .await;
        assert!(voted);
        let cursor_moved = wait_until(Duration::from_secs(3), || {
            store.last_block(DomainId(1)).unwrap() >= Some(101)
        })
        .await;
        assert!(cursor_moved);

        // a replayed message is absorbed by the on-chain status.
        dest_chain.write(erc20_message(1, 2, 7)).await.unwrap();
        assert_eq!(dest_client.submission_count(), 1);

        ctx.shutdown();
        handle.await.unwrap().unwrap();
    }
}
