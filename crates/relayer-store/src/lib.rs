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

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store module persists per-domain block cursors, the
//! durable progress markers that make restart-safe polling possible.

use crossbridge_relayer_types::DomainId;
use crossbridge_relayer_utils::Result;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// BlockCursorStore is the durable mapping from a domain id to the last
/// fully processed block number on that chain.
///
/// Each cursor has exactly one writer, the chain component that owns the
/// domain; distinct domains never contend on the same key. Any storage
/// I/O error is surfaced to the caller as-is, progress tracking must not
/// be allowed to silently corrupt.
pub trait BlockCursorStore: Clone + Send + Sync {
    /// Persists the last fully processed block for the domain.
    ///
    /// Writes are monotonic: a block number lower than the persisted one
    /// is ignored, so a cursor can never move backwards.
    fn store_block(
        &self,
        domain_id: DomainId,
        block_number: u64,
    ) -> Result<()>;

    /// Returns the persisted cursor for the domain, if any.
    fn last_block(&self, domain_id: DomainId) -> Result<Option<u64>>;

    /// Resolves the block a chain should start polling from.
    ///
    /// With `fresh_start` any persisted cursor is ignored and the
    /// configured start wins. Otherwise configuration can only move
    /// progress forward, never backward: the larger of the persisted
    /// cursor and the configured start is returned.
    fn starting_block(
        &self,
        domain_id: DomainId,
        configured_start: u64,
        fresh_start: bool,
    ) -> Result<u64> {
        if fresh_start {
            return Ok(configured_start);
        }
        Ok(match self.last_block(domain_id)? {
            Some(persisted) => persisted.max(configured_start),
            None => configured_start,
        })
    }
}
