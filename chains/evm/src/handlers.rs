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

//! Handler codecs: turning raw deposit calldata into chain-agnostic
//! [`Message`] payloads on the way in, and back into proposal calldata on
//! the way out.
//!
//! Fungible (erc20) deposit layout:
//!
//! ```text
//! amount        uint256   bytes  0..32
//! len(recipient) uint256  bytes 32..64
//! recipient     bytes     bytes 64..64+len
//! ```
//!
//! Generic deposit layout is a single length-prefixed metadata blob.

use ethers::types::U256;

use crossbridge_relayer_config::evm::HandlerKind;
use crossbridge_relayer_types::{DomainId, Message};
use crossbridge_relayer_utils::{Error, Result};

use crate::client::DepositLog;

const WORD: usize = 32;

/// Decodes one deposit log into a message using the handler's codec.
pub fn decode_deposit(
    kind: HandlerKind,
    source: DomainId,
    log: &DepositLog,
) -> Result<Message> {
    let payload = match kind {
        HandlerKind::Erc20 => decode_erc20_payload(log)?,
        HandlerKind::Generic => decode_generic_payload(log)?,
    };
    Ok(Message {
        source,
        destination: log.destination_domain_id,
        deposit_nonce: log.deposit_nonce,
        resource_id: log.resource_id,
        payload,
    })
}

/// Re-encodes a message's payload into the proposal calldata the
/// destination handler expects. The layout is byte-identical to the
/// deposit calldata, so the destination contract can hash and compare.
pub fn encode_proposal_data(
    kind: HandlerKind,
    message: &Message,
) -> Result<Vec<u8>> {
    match kind {
        HandlerKind::Erc20 => encode_erc20_data(message),
        HandlerKind::Generic => encode_generic_data(message),
    }
}

fn decode_erc20_payload(log: &DepositLog) -> Result<Vec<Vec<u8>>> {
    let data = &log.data;
    if data.len() < 2 * WORD {
        return Err(Error::InvalidDepositData {
            deposit_nonce: log.deposit_nonce,
        });
    }
    let amount = data[..WORD].to_vec();
    let recipient_len = U256::from_big_endian(&data[WORD..2 * WORD]);
    let recipient_len = usize::try_from(recipient_len).map_err(|_| {
        Error::InvalidDepositData {
            deposit_nonce: log.deposit_nonce,
        }
    })?;
    // compare against the remaining bytes instead of computing a range
    // end, which a hostile length word could overflow.
    if recipient_len > data.len() - 2 * WORD {
        return Err(Error::InvalidDepositData {
            deposit_nonce: log.deposit_nonce,
        });
    }
    let recipient = data[2 * WORD..2 * WORD + recipient_len].to_vec();
    Ok(vec![amount, recipient])
}

fn decode_generic_payload(log: &DepositLog) -> Result<Vec<Vec<u8>>> {
    let data = &log.data;
    if data.len() < WORD {
        return Err(Error::InvalidDepositData {
            deposit_nonce: log.deposit_nonce,
        });
    }
    let metadata_len = U256::from_big_endian(&data[..WORD]);
    let metadata_len = usize::try_from(metadata_len).map_err(|_| {
        Error::InvalidDepositData {
            deposit_nonce: log.deposit_nonce,
        }
    })?;
    if metadata_len > data.len() - WORD {
        return Err(Error::InvalidDepositData {
            deposit_nonce: log.deposit_nonce,
        });
    }
    let metadata = data[WORD..WORD + metadata_len].to_vec();
    Ok(vec![metadata])
}

fn encode_erc20_data(message: &Message) -> Result<Vec<u8>> {
    let [amount, recipient] = message.payload.as_slice() else {
        return Err(Error::InvalidDepositData {
            deposit_nonce: message.deposit_nonce,
        });
    };
    if amount.len() > WORD {
        return Err(Error::InvalidDepositData {
            deposit_nonce: message.deposit_nonce,
        });
    }
    let mut data = Vec::with_capacity(2 * WORD + recipient.len());
    // left-pad the amount to a full word.
    data.extend(std::iter::repeat(0u8).take(WORD - amount.len()));
    data.extend_from_slice(amount);
    data.extend_from_slice(&encode_word(recipient.len()));
    data.extend_from_slice(recipient);
    Ok(data)
}

fn encode_generic_data(message: &Message) -> Result<Vec<u8>> {
    let [metadata] = message.payload.as_slice() else {
        return Err(Error::InvalidDepositData {
            deposit_nonce: message.deposit_nonce,
        });
    };
    let mut data = Vec::with_capacity(WORD + metadata.len());
    data.extend_from_slice(&encode_word(metadata.len()));
    data.extend_from_slice(metadata);
    Ok(data)
}

fn encode_word(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    U256::from(value).to_big_endian(&mut word);
    word
}
