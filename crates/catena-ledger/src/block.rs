//! Block header + payload container, canonical bytes-for-signing, and
//! proof-of-work mining (§3 "Block", §4.7).

use std::sync::atomic::{AtomicBool, Ordering};

use catena_tx::{Transaction, TransactionWire};
use catena_types::Hash;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedgerError, LedgerResult};

/// §4.7: mining increments `nonce` until the digest has at least this many
/// leading zero bits. No retargeting algorithm is specified (Nakamoto-style
/// longest-chain without finality, §1) — the difficulty is a fixed constant.
pub const INITIAL_DIFFICULTY: u32 = 10;

/// §3 "Limits": at most 100 transactions per block.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 100;

/// §3 "Limits": payload-for-signing must not exceed 1 MiB.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// How many nonces the mining loop tries between abort-flag checks (§5
/// "Cancellation": the inner loop cooperatively checks an abort flag rather
/// than being preemptible).
const ABORT_CHECK_INTERVAL: u64 = 1024;

/// A block's payload (§3): the genesis seed string, or an ordered list of
/// signed transactions. Serializes to exactly the shape §3/§6 describe — a
/// JSON string or a JSON array — rather than a tagged enum, since that's
/// what travels over the gossip wire and into the `blocks` archive BLOB.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPayload {
    Seed(String),
    Transactions(Vec<Transaction>),
}

impl BlockPayload {
    /// The bytes covered by the block's signature (§4.7): the seed's UTF-8
    /// bytes for genesis, or the concatenation of each transaction's raw
    /// 64-byte signature, in payload order.
    pub fn bytes_for_signing(&self) -> Vec<u8> {
        match self {
            BlockPayload::Seed(seed) => seed.as_bytes().to_vec(),
            BlockPayload::Transactions(txs) => {
                let mut out = Vec::with_capacity(txs.len() * 64);
                for tx in txs {
                    out.extend_from_slice(tx.signature.as_bytes());
                }
                out
            }
        }
    }

    pub fn transaction_count(&self) -> usize {
        match self {
            BlockPayload::Seed(_) => 0,
            BlockPayload::Transactions(txs) => txs.len(),
        }
    }
}

impl Serialize for BlockPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            BlockPayload::Seed(seed) => seed.serialize(serializer),
            BlockPayload::Transactions(txs) => {
                let wire: Vec<TransactionWire> = txs.iter().map(TransactionWire::from).collect();
                wire.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for BlockPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(seed) => Ok(BlockPayload::Seed(seed)),
            serde_json::Value::Array(_) => {
                let wires: Vec<TransactionWire> =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                let txs = wires
                    .into_iter()
                    .map(Transaction::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(D::Error::custom)?;
                Ok(BlockPayload::Transactions(txs))
            }
            other => Err(D::Error::custom(format!(
                "block payload must be a JSON string or array, got {other}"
            ))),
        }
    }
}

/// §3 "Block": header plus payload, signed by proof-of-work (§4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub version: u32,
    pub index: u64,
    pub previous: Hash,
    pub miner: Hash,
    pub timestamp: u64,
    pub nonce: u64,
    pub payload: BlockPayload,
    pub signature: Hash,
}

impl Block {
    /// Builds the genesis block's unsigned skeleton (`previous = Hash::ZERO`,
    /// `index = 0`, no transactions, §3).
    pub fn genesis_unsigned(seed: impl Into<String>, miner: Hash, timestamp: u64) -> Block {
        Block {
            version: 1,
            index: 0,
            previous: Hash::ZERO,
            miner,
            timestamp,
            nonce: 0,
            payload: BlockPayload::Seed(seed.into()),
            signature: Hash::ZERO,
        }
    }

    /// Builds an unsigned successor block carrying `transactions` (§3).
    pub fn unsigned(
        index: u64,
        previous: Hash,
        miner: Hash,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Block {
        Block {
            version: 1,
            index,
            previous,
            miner,
            timestamp,
            nonce: 0,
            payload: BlockPayload::Transactions(transactions),
            signature: Hash::ZERO,
        }
    }

    /// §3 "Limits": rejects oversized payloads before mining even starts.
    pub fn validate_limits(&self) -> LedgerResult<()> {
        if self.payload.transaction_count() > MAX_TRANSACTIONS_PER_BLOCK {
            return Err(LedgerError::TooManyTransactions(self.payload.transaction_count()));
        }
        let payload_bytes = self.payload.bytes_for_signing().len();
        if payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(LedgerError::PayloadTooLarge(payload_bytes));
        }
        Ok(())
    }

    /// The canonical bytes-for-signing (§4.7): `version ‖ index ‖ previous ‖
    /// miner ‖ timestamp ‖ nonce ‖ payload-for-signing`, all integers
    /// big-endian fixed-width.
    pub fn bytes_for_signing(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 8 + 32 + 32 + 8 + 8 + 64);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.miner.as_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&self.payload.bytes_for_signing());
        out
    }

    /// Mines the block in place: increments `nonce` until
    /// `SHA256(bytes_for_signing())` has at least `difficulty` leading zero
    /// bits (§4.7), then stores that hash as `signature`. Checks `abort`
    /// every [`ABORT_CHECK_INTERVAL`] nonces (§5 "Cancellation") and returns
    /// `false` without mutating `nonce`/`signature` further if it fires.
    pub fn mine(&mut self, difficulty: u32, abort: &AtomicBool) -> bool {
        loop {
            for _ in 0..ABORT_CHECK_INTERVAL {
                let hash = catena_crypto::sha256(&self.bytes_for_signing());
                if hash.leading_zero_bits() >= difficulty {
                    self.signature = hash;
                    return true;
                }
                self.nonce = self.nonce.wrapping_add(1);
            }
            if abort.load(Ordering::Relaxed) {
                return false;
            }
        }
    }

    /// §8 invariant: for `index > 0`, the stored signature must actually be
    /// `SHA256(bytes_for_signing())` and meet `difficulty`. Genesis blocks
    /// (`index == 0`) are exempt from the difficulty floor but still must
    /// carry the hash that's actually implied by their fields.
    pub fn verify_proof_of_work(&self, difficulty: u32) -> bool {
        let hash = catena_crypto::sha256(&self.bytes_for_signing());
        if hash != self.signature {
            return false;
        }
        self.index == 0 || hash.leading_zero_bits() >= difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::KeyPair;
    use catena_sql::parse_statement;

    #[test]
    fn genesis_mines_to_meet_difficulty() {
        let mut block = Block::genesis_unsigned("", Hash::from([0u8; 32]), 0);
        let abort = AtomicBool::new(false);
        assert!(block.mine(INITIAL_DIFFICULTY, &abort));
        assert!(block.signature.leading_zero_bits() >= INITIAL_DIFFICULTY);
        assert!(block.verify_proof_of_work(INITIAL_DIFFICULTY));
    }

    #[test]
    fn mining_is_deterministic_given_the_same_seed_and_version() {
        let mut a = Block::genesis_unsigned("", Hash::from([0u8; 32]), 0);
        let mut b = Block::genesis_unsigned("", Hash::from([0u8; 32]), 0);
        let abort = AtomicBool::new(false);
        a.mine(INITIAL_DIFFICULTY, &abort);
        b.mine(INITIAL_DIFFICULTY, &abort);
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.nonce, b.nonce);
    }

    #[test]
    fn abort_flag_stops_mining() {
        let mut block = Block::genesis_unsigned("x", Hash::from([9u8; 32]), 1);
        let abort = AtomicBool::new(true);
        assert!(!block.mine(64, &abort));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let mut block = Block::genesis_unsigned("", Hash::from([0u8; 32]), 0);
        let abort = AtomicBool::new(false);
        block.mine(INITIAL_DIFFICULTY, &abort);
        block.signature = Hash::from([1u8; 32]);
        assert!(!block.verify_proof_of_work(INITIAL_DIFFICULTY));
    }

    #[test]
    fn block_with_too_many_transactions_is_rejected() {
        let kp = KeyPair::generate();
        let txs: Vec<_> = (0..101u64)
            .map(|i| {
                Transaction::sign(
                    &kp,
                    "db",
                    i,
                    parse_statement("INSERT INTO t (x) VALUES (1)").unwrap(),
                )
                .unwrap()
            })
            .collect();
        let block = Block::unsigned(1, Hash::ZERO, Hash::ZERO, 0, txs);
        assert!(matches!(
            block.validate_limits(),
            Err(LedgerError::TooManyTransactions(101))
        ));
    }

    #[test]
    fn payload_round_trips_through_json_as_array_or_string() {
        let genesis = Block::genesis_unsigned("seed-text", Hash::ZERO, 0);
        let json = serde_json::to_string(&genesis.payload).unwrap();
        assert_eq!(json, "\"seed-text\"");
        let back: BlockPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, genesis.payload);

        let kp = KeyPair::generate();
        let tx = Transaction::sign(&kp, "db", 0, parse_statement("SELECT 1").unwrap()).unwrap();
        let with_txs = BlockPayload::Transactions(vec![tx]);
        let json = serde_json::to_string(&with_txs).unwrap();
        assert!(json.starts_with('['));
        let back: BlockPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, with_txs);
    }
}
