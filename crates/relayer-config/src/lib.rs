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
//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the relayer. Configuration is loaded from a
//! directory of TOML/JSON files, merged with the environment, validated
//! once at startup, and treated as immutable afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// CLI configuration
pub mod cli;
/// Per-chain defaults
pub mod defaults;
/// EVM chain configuration
pub mod evm;
/// Configuration loading utilities
pub mod utils;

/// CrossbridgeRelayerConfig is the configuration for the entire relayer
/// instance, one entry per configured chain keyed by chain name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossbridgeRelayerConfig {
    /// EVM based networks and the configuration.
    ///
    /// a map of chain name to the chain configuration.
    #[serde(default)]
    pub evm: HashMap<String, evm::EvmChainConfig>,
}

impl CrossbridgeRelayerConfig {
    /// Returns an iterator over the enabled chains only.
    pub fn enabled_chains(
        &self,
    ) -> impl Iterator<Item = (&String, &evm::EvmChainConfig)> {
        self.evm.iter().filter(|(_, c)| c.enabled)
    }
}
