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

//! Default values used by the serde `default` attributes of the
//! configuration structs.

/// The block a chain starts polling from when nothing else is configured.
pub const fn start_block() -> u64 {
    1
}

/// How many blocks beyond a block the chain head must be before the block
/// is considered final enough to process.
pub const fn block_confirmations() -> u32 {
    5
}

/// How long to sleep between head polls, in milliseconds.
pub const fn polling_interval() -> u64 {
    6_000
}

/// How many times a block fetch is retried before the chain halts.
pub const fn block_retries() -> usize {
    5
}

/// The pause between block fetch retries, in milliseconds.
pub const fn block_retry_interval() -> u64 {
    5_000
}

/// Gas limit attached to every vote transaction.
pub const fn gas_limit() -> u64 {
    2_000_000
}

/// Upper bound on `max_fee_per_gas`, in wei (20 gwei).
pub const fn max_gas_price() -> u64 {
    20_000_000_000
}

/// How many replace-by-fee bumps are attempted before a vote is declared
/// stuck.
pub const fn max_fee_bumps() -> usize {
    5
}

/// How long to wait for a broadcast vote to be included before bumping,
/// in milliseconds.
pub const fn inclusion_timeout() -> u64 {
    60_000
}
