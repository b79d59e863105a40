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

//! # Relayer Types Module 🕸️
//!
//! Chain-agnostic value types shared by every crossbridge relayer crate:
//! the cross-chain [`Message`], domain and resource identifiers, and the
//! destination-chain proposal lifecycle.

use serde::{Deserialize, Serialize};

pub mod private_key;
pub mod rpc_url;

/// Small integer uniquely identifying one configured chain within this
/// relayer instance.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct DomainId(pub u8);

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for DomainId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// Per-source-domain monotonic counter uniquely identifying a bridge
/// deposit event.
pub type DepositNonce = u64;

/// Fixed-size identifier naming an asset/resource type understood by both
/// source and destination handlers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub [u8; 32]);

impl ResourceId {
    /// Returns the raw bytes of the resource id.
    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Parses a resource id from a hex string, with or without the `0x`
    /// prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceId({self})")
    }
}

impl From<[u8; 32]> for ResourceId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceId::from_hex(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "expected a 32 byte hex string, got {s:?}"
            ))
        })
    }
}

/// The lifecycle of a destination-chain proposal, as reported by the
/// bridge contract. This relayer observes the state, it never owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// No vote has been cast yet.
    Inactive,
    /// At least one relayer voted, threshold not reached.
    Active,
    /// The vote threshold was reached, execution pending.
    Passed,
    /// The proposal was executed on the destination chain.
    Executed,
    /// The proposal was cancelled and will never execute.
    Cancelled,
}

impl ProposalStatus {
    /// Whether the proposal reached a terminal state and no further vote
    /// can change it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled)
    }
}

impl TryFrom<u8> for ProposalStatus {
    type Error = crossbridge_relayer_utils::Error;

    fn try_from(status: u8) -> Result<Self, Self::Error> {
        match status {
            0 => Ok(Self::Inactive),
            1 => Ok(Self::Active),
            2 => Ok(Self::Passed),
            3 => Ok(Self::Executed),
            4 => Ok(Self::Cancelled),
            s => Err(
                crossbridge_relayer_utils::Error::UnknownProposalStatus(s),
            ),
        }
    }
}

/// The chain-agnostic unit of cross-chain intent, produced by a source
/// chain listener and consumed by a destination chain voter.
///
/// `(source, deposit_nonce)` uniquely identifies a message. Replay of the
/// same pair must be filtered by the destination's on-chain proposal
/// status, not by local bookkeeping alone, because this process is not
/// the only voter in a multi-relayer deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Domain id of the chain the deposit was observed on.
    pub source: DomainId,
    /// Domain id of the chain the proposal must be voted on.
    pub destination: DomainId,
    /// Idempotency key, monotonic per source domain.
    pub deposit_nonce: DepositNonce,
    /// Names the asset/resource type for handler dispatch.
    pub resource_id: ResourceId,
    /// Ordered handler-specific payload parts, e.g. `[amount, recipient]`
    /// for a fungible transfer.
    pub payload: Vec<Vec<u8>>,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message({} => {}, nonce {}, resource {})",
            self.source, self.destination, self.deposit_nonce, self.resource_id
        )
    }
}
