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

use crossbridge_relayer_types::DomainId;
use parking_lot::RwLock;

use super::BlockCursorStore;

/// InMemoryStore keeps block cursors in memory, mainly for tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    cursors: Arc<RwLock<HashMap<DomainId, u64>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl BlockCursorStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn store_block(
        &self,
        domain_id: DomainId,
        block_number: u64,
    ) -> crossbridge_relayer_utils::Result<()> {
        let mut guard = self.cursors.write();
        let entry = guard.entry(domain_id).or_insert(block_number);
        *entry = (*entry).max(block_number);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn last_block(
        &self,
        domain_id: DomainId,
    ) -> crossbridge_relayer_utils::Result<Option<u64>> {
        Ok(self.cursors.read().get(&domain_id).copied())
    }
}
