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

//! # Relayer Utils Module 🕸️
//!
//! Common error types, retry policies and probe targets shared by all
//! crossbridge relayer crates.

use ethers::middleware::signer::SignerMiddlewareError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{H160, H256};

/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// The signing client every EVM chain component operates over.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// An enum of all possible errors that could be encountered during the
/// execution of the crossbridge relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Error from the signing middleware.
    #[error(transparent)]
    EthersSignerMiddleware(
        #[from] SignerMiddlewareError<Provider<Http>, LocalWallet>,
    ),
    /// Smart contract error.
    #[error(transparent)]
    EthersContractCall(#[from] ethers::contract::ContractError<SignerClient>),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// EVM Chain not found.
    #[error("Chain Not Found: {}", chain_id)]
    ChainNotFound {
        /// The chain id of the chain.
        chain_id: String,
    },
    /// Missing Secrets in the config, either private key, ...etc.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// A message arrived for a destination domain no chain is configured for.
    #[error("No chain configured for destination domain {}", domain_id)]
    UnconfiguredDomain {
        /// The destination domain id of the message.
        domain_id: u8,
    },
    /// No message handler was registered for the resource id.
    #[error("No handler registered for resource {}", resource_id)]
    UnregisteredResource {
        /// The resource id, hex encoded.
        resource_id: String,
    },
    /// No event decoder was registered for the handler contract.
    #[error("No decoder registered for handler contract {:?}", handler)]
    UnregisteredHandler {
        /// The handler contract address.
        handler: H160,
    },
    /// A deposit record could not be decoded into a message.
    #[error("Invalid deposit data for nonce {}", deposit_nonce)]
    InvalidDepositData {
        /// The deposit nonce of the offending record.
        deposit_nonce: u64,
    },
    /// The bounded per-block retry policy was exhausted.
    #[error("Exhausted retries for block {} on domain {}", block, domain_id)]
    BlockRetriesExhausted {
        /// The domain id of the halted chain.
        domain_id: u8,
        /// The block that could not be processed.
        block: u64,
    },
    /// A broadcast vote was never included, even after fee bumps.
    #[error("Transaction {:?} not included before the deadline", tx_hash)]
    TxInclusionTimeout {
        /// Hash of the last broadcast attempt.
        tx_hash: H256,
    },
    /// The on-chain proposal status byte was not a known state.
    #[error("Unknown proposal status: {}", _0)]
    UnknownProposalStatus(u8),
    /// The shared message channel closed while chains were still running.
    #[error("Event stream closed unexpectedly")]
    EventStreamClosed,
    /// a background task failed and stopped abnormally.
    #[error("Task Stopped Abnormally")]
    TaskStoppedAbnormally,
}

/// A type alias for the result for the crossbridge relayer, that uses the
/// `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
