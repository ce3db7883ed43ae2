//! Decoding of `eth_getBlockByNumber` / `eth_getTransactionByHash` results.

use serde_json::Value;

use chainagent_core::{Block, Transaction};

/// Parse a hex quantity (with or without `0x`).
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

fn hex_field(v: &Value, key: &str) -> Option<u64> {
    parse_hex_u64(v[key].as_str()?)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v[key].as_str().map(str::to_string)
}

/// Decode a block fetched with full transaction objects.
///
/// Returns `None` for `null` (unknown block) or a block missing header fields.
pub fn block_from_json(v: &Value) -> Option<Block> {
    let transactions = match v["transactions"].as_array() {
        Some(txs) => txs.iter().map(tx_from_json).collect::<Option<Vec<_>>>()?,
        None => vec![],
    };
    Some(Block {
        transactions,
        ..header_from_json(v)?
    })
}

/// Decode only the header fields of a block, a `newHeads` notification or a
/// block fetched with transaction hashes.
pub fn header_from_json(v: &Value) -> Option<Block> {
    Some(Block {
        number: hex_field(v, "number")?,
        hash: str_field(v, "hash")?,
        parent_hash: str_field(v, "parentHash").unwrap_or_default(),
        timestamp: hex_field(v, "timestamp")? as i64,
        transactions: vec![],
        synthetic: false,
    })
}

/// Decode a mined transaction. Pending transactions (no block yet) give `None`.
pub fn tx_from_json(v: &Value) -> Option<Transaction> {
    Some(Transaction {
        hash: str_field(v, "hash")?,
        block_number: hex_field(v, "blockNumber")?,
        block_hash: str_field(v, "blockHash")?,
        index: hex_field(v, "transactionIndex")? as u32,
        from: str_field(v, "from")?,
        to: str_field(v, "to"),
        value: str_field(v, "value").unwrap_or_else(|| "0x0".into()),
        input: str_field(v, "input").unwrap_or_else(|| "0x".into()),
    })
}
