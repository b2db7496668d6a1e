use catena_crypto::{KeyPair, PublicKey, Signature};
use catena_sql::Statement;
use serde::Serialize;

use crate::error::{TxError, TxResult};

/// A database name is lowercased before it ever reaches here (the parser
/// case-folds identifiers, §4.1); this only checks the shape (§3).
fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// The four fields that are actually signed. Serializing this (rather than
/// the full [`Transaction`], which also carries the signature) to a
/// `serde_json::Value` and back to a string is what produces the "stable
/// JSON with sorted keys" canonical form from §3: `serde_json::Value`'s
/// object variant is a `BTreeMap` unless the `preserve_order` feature is
/// enabled (it is not, anywhere in this workspace), so keys come out sorted
/// automatically, recursively, with no extra canonicalization pass needed.
#[derive(Serialize)]
struct SignedFields<'a> {
    invoker: &'a PublicKey,
    database: &'a str,
    counter: u64,
    statement: &'a Statement,
}

/// The canonical bytes a transaction's signature covers (§3).
pub fn canonical_signing_bytes(
    invoker: &PublicKey,
    database: &str,
    counter: u64,
    statement: &Statement,
) -> TxResult<Vec<u8>> {
    let fields = SignedFields {
        invoker,
        database,
        counter,
        statement,
    };
    let value = serde_json::to_value(&fields)?;
    Ok(serde_json::to_string(&value)?.into_bytes())
}

/// A signed SQL statement bound to an invoker, a target database, and a
/// replay-protection counter (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub invoker: PublicKey,
    pub database: String,
    pub counter: u64,
    pub statement: Statement,
    pub signature: Signature,
}

impl Transaction {
    /// Signs `statement` with `keypair`, producing a transaction whose
    /// invariants (§3) hold by construction.
    pub fn sign(
        keypair: &KeyPair,
        database: impl Into<String>,
        counter: u64,
        statement: Statement,
    ) -> TxResult<Self> {
        let database = database.into();
        if statement.requires_database_context() && !is_valid_database_name(&database) {
            return Err(TxError::InvalidDatabaseName(database));
        }
        let invoker = keypair.public_key();
        let bytes = canonical_signing_bytes(&invoker, &database, counter, &statement)?;
        let signature = keypair.sign(&bytes);
        Ok(Self {
            invoker,
            database,
            counter,
            statement,
            signature,
        })
    }

    /// Reconstructs a transaction received over the wire and checks every
    /// invariant from §3: the database name shape, and that the signature
    /// verifies against the invoker's public key over the canonical bytes.
    pub fn from_parts(
        invoker: PublicKey,
        database: String,
        counter: u64,
        statement: Statement,
        signature: Signature,
    ) -> TxResult<Self> {
        if statement.requires_database_context() && !is_valid_database_name(&database) {
            return Err(TxError::InvalidDatabaseName(database));
        }
        let bytes = canonical_signing_bytes(&invoker, &database, counter, &statement)?;
        if !invoker.verify(&bytes, &signature) {
            return Err(TxError::SignatureError);
        }
        Ok(Self {
            invoker,
            database,
            counter,
            statement,
            signature,
        })
    }

    /// Re-derives the signing bytes and confirms the signature still
    /// verifies — used when a transaction crosses a trust boundary (e.g.
    /// deserialized from a peer) without having gone through
    /// [`Transaction::from_parts`].
    pub fn verify(&self) -> TxResult<()> {
        let bytes = canonical_signing_bytes(
            &self.invoker,
            &self.database,
            self.counter,
            &self.statement,
        )?;
        if self.invoker.verify(&bytes, &self.signature) {
            Ok(())
        } else {
            Err(TxError::SignatureError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_sql::parse_statement;

    fn stmt(sql: &str) -> Statement {
        parse_statement(sql).unwrap()
    }

    #[test]
    fn signed_transaction_verifies() {
        let kp = KeyPair::generate();
        let tx = Transaction::sign(&kp, "mydb", 0, stmt("INSERT INTO t (x) VALUES (1)")).unwrap();
        tx.verify().unwrap();
    }

    #[test]
    fn tampering_with_counter_breaks_verification() {
        let kp = KeyPair::generate();
        let mut tx =
            Transaction::sign(&kp, "mydb", 0, stmt("INSERT INTO t (x) VALUES (1)")).unwrap();
        tx.counter = 1;
        assert!(tx.verify().is_err());
    }

    #[test]
    fn from_parts_rejects_forged_signature() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let signed =
            Transaction::sign(&kp, "mydb", 0, stmt("INSERT INTO t (x) VALUES (1)")).unwrap();
        let err = Transaction::from_parts(
            other.public_key(),
            signed.database,
            signed.counter,
            signed.statement,
            signed.signature,
        )
        .unwrap_err();
        assert!(matches!(err, TxError::SignatureError));
    }

    #[test]
    fn rejects_invalid_database_name_for_scoped_statement() {
        let kp = KeyPair::generate();
        let err =
            Transaction::sign(&kp, "My DB!", 0, stmt("INSERT INTO t (x) VALUES (1)")).unwrap_err();
        assert!(matches!(err, TxError::InvalidDatabaseName(_)));
    }

    #[test]
    fn empty_database_allowed_for_database_scoped_ddl() {
        let kp = KeyPair::generate();
        Transaction::sign(&kp, "", 0, stmt("CREATE DATABASE newdb")).unwrap();
    }

    #[test]
    fn canonical_bytes_have_sorted_top_level_keys() {
        let kp = KeyPair::generate();
        let bytes =
            canonical_signing_bytes(&kp.public_key(), "mydb", 0, &stmt("SELECT * FROM t")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let counter_pos = text.find("\"counter\"").unwrap();
        let database_pos = text.find("\"database\"").unwrap();
        let invoker_pos = text.find("\"invoker\"").unwrap();
        let statement_pos = text.find("\"statement\"").unwrap();
        assert!(counter_pos < database_pos);
        assert!(database_pos < invoker_pos);
        assert!(invoker_pos < statement_pos);
    }
}
