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

//! A module for starting the relayer's long-running chain tasks.

use std::sync::Arc;

use crossbridge_relayer_context::RelayerContext;
use crossbridge_relayer_core::Relayer;
use crossbridge_relayer_utils::Result;

/// Builds a [`Relayer`] from every enabled chain in the context's
/// configuration.
pub fn build_relayer(ctx: &RelayerContext) -> Result<Relayer> {
    let mut relayer = Relayer::new();
    for (name, chain_config) in ctx.config.enabled_chains() {
        tracing::info!(
            chain = %name,
            domain_id = %chain_config.domain_id,
            "setting up EVM chain",
        );
        let chain = crossbridge_evm::setup_evm_chain(ctx, chain_config)?;
        relayer.add_chain(Arc::new(chain));
    }
    Ok(relayer)
}

/// Starts the relayer on a background task.
///
/// This does not block; the returned handle resolves when the relayer
/// stops, either cleanly on shutdown or with the fatal error that
/// brought it down.
pub fn ignite(
    ctx: &RelayerContext,
) -> Result<tokio::task::JoinHandle<Result<()>>> {
    let relayer = build_relayer(ctx)?;
    let ctx = ctx.clone();
    Ok(tokio::spawn(async move { relayer.start(ctx).await }))
}
