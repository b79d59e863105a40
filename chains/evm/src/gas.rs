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

use ethers::types::U256;

use crossbridge_relayer_config::evm::FeeConfig;

/// Everything attached to one broadcast attempt of a vote transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeQuote {
    /// EIP-1559 fee cap for this attempt.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee (tip) for this attempt.
    pub max_priority_fee_per_gas: U256,
    /// Gas limit, fixed across attempts.
    pub gas_limit: U256,
}

/// Prices the initial broadcast of a vote and reprices it for
/// replace-by-fee when the previous attempt was not included in time.
pub trait FeeStrategy: Send + Sync {
    /// Prices the first attempt from the node's
    /// `(max_fee_per_gas, max_priority_fee_per_gas)` estimate.
    fn quote(&self, estimated: (U256, U256)) -> FeeQuote;

    /// Reprices for a replacement of the previous attempt. Fees never
    /// decrease across bumps, otherwise the node rejects the
    /// replacement.
    fn bump(&self, previous: &FeeQuote) -> FeeQuote;
}

/// EIP-1559 fee strategy: quotes from the node estimate clamped to the
/// configured `max_gas_price` cap, bumps by ten percent per attempt.
#[derive(Debug, Clone)]
pub struct LondonFeeStrategy {
    gas_limit: U256,
    max_gas_price: U256,
}

impl LondonFeeStrategy {
    /// Builds the strategy from the chain's fee configuration.
    pub fn new(fees: &FeeConfig) -> Self {
        Self {
            gas_limit: U256::from(fees.gas_limit),
            max_gas_price: U256::from(fees.max_gas_price),
        }
    }

    fn ten_percent_more(value: U256) -> U256 {
        // at least one wei more, so tiny values still move.
        value + (value / 10).max(U256::one())
    }
}

impl FeeStrategy for LondonFeeStrategy {
    fn quote(&self, estimated: (U256, U256)) -> FeeQuote {
        let (max_fee, priority) = estimated;
        let max_fee_per_gas = max_fee.min(self.max_gas_price);
        FeeQuote {
            max_fee_per_gas,
            max_priority_fee_per_gas: priority.min(max_fee_per_gas),
            gas_limit: self.gas_limit,
        }
    }

    fn bump(&self, previous: &FeeQuote) -> FeeQuote {
        let priority =
            Self::ten_percent_more(previous.max_priority_fee_per_gas);
        let bumped = Self::ten_percent_more(previous.max_fee_per_gas);
        // respect the cap, but never go below the previous attempt.
        let max_fee_per_gas = bumped
            .min(self.max_gas_price)
            .max(previous.max_fee_per_gas);
        FeeQuote {
            max_fee_per_gas,
            max_priority_fee_per_gas: priority.min(max_fee_per_gas),
            gas_limit: previous.gas_limit,
        }
    }
}
