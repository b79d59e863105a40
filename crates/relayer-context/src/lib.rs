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

#![warn(missing_docs)]
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer.
use std::time::Duration;

use tokio::sync::broadcast;

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};

use crossbridge_relayer_store::SledStore;

/// RelayerContext contains the relayer's configuration, its persistent
/// store and the process-wide shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: crossbridge_relayer_config::CrossbridgeRelayerConfig,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// The initial `shutdown` trigger is provided by the `run` caller.
    /// When a chain task is spawned, it is passed a broadcast receiver
    /// handle. When a graceful shutdown is initiated, a `()` value is
    /// sent via the broadcast::Sender. Each task receives it, reaches a
    /// safe block boundary, and completes.
    notify_shutdown: broadcast::Sender<()>,
    store: SledStore,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: crossbridge_relayer_config::CrossbridgeRelayerConfig,
        store: SledStore,
    ) -> Self {
        let (notify_shutdown, _) = broadcast::channel(2);
        Self {
            config,
            notify_shutdown,
            store,
        }
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns a new `Provider` for the named chain.
    pub fn evm_provider(
        &self,
        chain_name: &str,
    ) -> crossbridge_relayer_utils::Result<Provider<Http>> {
        let chain_config =
            self.config.evm.get(chain_name).ok_or_else(|| {
                crossbridge_relayer_utils::Error::ChainNotFound {
                    chain_id: chain_name.to_string(),
                }
            })?;
        let provider =
            Provider::try_from(chain_config.http_endpoint.as_str())?
                .interval(Duration::from_millis(5u64));
        Ok(provider)
    }

    /// Sets up and returns an EVM wallet for the named chain.
    pub fn evm_wallet(
        &self,
        chain_name: &str,
    ) -> crossbridge_relayer_utils::Result<LocalWallet> {
        let chain_config =
            self.config.evm.get(chain_name).ok_or_else(|| {
                crossbridge_relayer_utils::Error::ChainNotFound {
                    chain_id: chain_name.to_string(),
                }
            })?;
        let private_key = chain_config
            .private_key
            .as_ref()
            .ok_or(crossbridge_relayer_utils::Error::MissingSecrets)?;
        let wallet = LocalWallet::from_bytes(private_key.as_bytes())?
            .with_chain_id(chain_config.chain_id);
        Ok(wallet)
    }

    /// Returns the [Sled](https://sled.rs)-based database store.
    pub fn store(&self) -> &SledStore {
        &self.store
    }
}

/// Listens for the process shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single
/// value is ever sent. Once a value has been sent via the broadcast
/// channel, every task should shut down.
///
/// The `Shutdown` struct listens for the signal and tracks that the
/// signal has been received. Callers may query for whether the shutdown
/// signal has been received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }

    /// Non-blocking check, used by polling loops that must only exit at
    /// a block boundary.
    pub fn is_shutdown(&mut self) -> bool {
        if self.shutdown {
            return true;
        }
        match self.notify.try_recv() {
            Ok(()) => {
                self.shutdown = true;
                true
            }
            Err(broadcast::error::TryRecvError::Empty) => false,
            // closed or lagged both mean the signal fired.
            Err(_) => {
                self.shutdown = true;
                true
            }
        }
    }
}
