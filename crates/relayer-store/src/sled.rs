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

use std::path::Path;

use crossbridge_relayer_types::DomainId;

use super::BlockCursorStore;

/// The tree that holds one cursor per domain id.
const CURSOR_TREE: &str = "block_cursors";

/// SledStore is a store that persists block cursors in a
/// [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(
        path: P,
    ) -> crossbridge_relayer_utils::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> crossbridge_relayer_utils::Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }

    fn decode_block_number(bytes: &[u8]) -> u64 {
        let mut output = [0u8; 8];
        output.copy_from_slice(bytes);
        u64::from_be_bytes(output)
    }
}

impl BlockCursorStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn store_block(
        &self,
        domain_id: DomainId,
        block_number: u64,
    ) -> crossbridge_relayer_utils::Result<()> {
        let tree = self.db.open_tree(CURSOR_TREE)?;
        let key = [domain_id.0];
        // single writer per key, so read-then-write is race free here.
        let old = tree.get(key)?.map(|v| Self::decode_block_number(&v));
        if matches!(old, Some(persisted) if persisted >= block_number) {
            tracing::trace!(
                %domain_id,
                block_number,
                ?old,
                "skipping non-monotonic cursor write",
            );
            return Ok(());
        }
        tree.insert(key, &block_number.to_be_bytes())?;
        // flush so a crash right after dispatch cannot lose progress.
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn last_block(
        &self,
        domain_id: DomainId,
    ) -> crossbridge_relayer_utils::Result<Option<u64>> {
        let tree = self.db.open_tree(CURSOR_TREE)?;
        let val = tree.get([domain_id.0])?;
        Ok(val.map(|v| Self::decode_block_number(&v)))
    }
}
