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

use ethers::types::Address;

use crossbridge_relayer_types::private_key::PrivateKey;
use crossbridge_relayer_types::rpc_url::RpcUrl;
use crossbridge_relayer_types::{DomainId, ResourceId};

use super::*;
use crate::defaults;

/// EvmChainConfig is the configuration for the EVM based networks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Boolean indicating EVM based networks are enabled or not.
    #[serde(default)]
    pub enabled: bool,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u32,
    /// The domain id this chain is known by inside the relayer. Must be
    /// unique across all configured chains.
    #[serde(rename(serialize = "domainId"))]
    pub domain_id: DomainId,
    /// The Private Key of this account on this network.
    /// the format is more dynamic here:
    /// 1. if it starts with '0x' then this would be raw (64 bytes) hex encoded
    ///    private key.
    ///    Example: 0x8917174396171783496173419137618235192359106130478137647163400318
    ///
    /// 2. if it starts with '$' then it would be considered as an Enviroment variable
    ///    of a hex-encoded private key.
    ///    Example: $HARMONY_PRIVATE_KEY
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// The bridge contract that emits deposits and accepts votes.
    pub bridge: Address,
    /// The resources relayed over this chain.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// The first block polled when no cursor was persisted yet.
    #[serde(default = "defaults::start_block")]
    pub start_block: u64,
    /// Seed the starting block from the chain's current head instead of
    /// `start_block`. Only consulted when no cursor exists.
    #[serde(default)]
    pub latest_block: bool,
    /// Ignore any persisted cursor and start over from `start_block`.
    #[serde(default)]
    pub fresh_start: bool,
    /// How many blocks the head must advance beyond a block before it is
    /// processed, a safety margin against short reorgs.
    #[serde(default = "defaults::block_confirmations")]
    pub block_confirmations: u32,
    /// How long to sleep between head polls, in milliseconds.
    #[serde(default = "defaults::polling_interval")]
    pub polling_interval: u64,
    /// How many times to retry fetching one block before the chain halts.
    #[serde(default = "defaults::block_retries")]
    pub block_retries: usize,
    /// The pause between block fetch retries, in milliseconds.
    #[serde(default = "defaults::block_retry_interval")]
    pub block_retry_interval: u64,
    /// Fee and submission settings for outgoing votes.
    #[serde(default)]
    pub fees: FeeConfig,
}

/// Maps one resource id to the handler contract that understands it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceConfig {
    /// The resource id, a 32 byte hex string.
    pub resource_id: ResourceId,
    /// The handler contract address on this chain.
    pub handler: Address,
    /// Which codec the handler speaks.
    pub kind: HandlerKind,
}

/// The deposit/proposal codecs this relayer knows how to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// Fungible token transfers: amount + recipient.
    Erc20,
    /// Arbitrary call data: opaque metadata blob.
    Generic,
}

/// Fee and submission settings for outgoing votes on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeeConfig {
    /// Gas limit attached to every vote transaction.
    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,
    /// Upper bound on `max_fee_per_gas`, in wei.
    #[serde(default = "defaults::max_gas_price")]
    pub max_gas_price: u64,
    /// How many replace-by-fee bumps to attempt before giving up.
    #[serde(default = "defaults::max_fee_bumps")]
    pub max_fee_bumps: usize,
    /// How long to wait for inclusion before bumping, in milliseconds.
    #[serde(default = "defaults::inclusion_timeout")]
    pub inclusion_timeout: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            gas_limit: defaults::gas_limit(),
            max_gas_price: defaults::max_gas_price(),
            max_fee_bumps: defaults::max_fee_bumps(),
            inclusion_timeout: defaults::inclusion_timeout(),
        }
    }
}
