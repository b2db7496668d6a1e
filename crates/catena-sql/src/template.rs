//! Template hashing (§4.2). A transaction's grant lookup can short-circuit
//! on the hash of its *unbound* statement text — the SHA-256 of the
//! canonical standard-dialect rendering, computed before any variable or
//! parameter is resolved. Two statements that differ only in which values
//! are bound to the same `?parameter` names share a template hash, which is
//! what lets a grant behave like a stored procedure: the grantor is
//! authorizing the shape of the statement, not one particular invocation.

use catena_types::Hash;

use crate::ast::Statement;
use crate::dialect::{render_statement, Dialect};

pub fn template_hash(stmt: &Statement) -> Hash {
    let text = render_statement(stmt, Dialect::Standard);
    catena_crypto::sha256(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    #[test]
    fn same_shape_different_bound_values_share_a_template_hash() {
        let a = parse_statement("UPDATE accounts SET balance = 100 WHERE id = ?id").unwrap();
        let b = parse_statement("UPDATE accounts SET balance = 100 WHERE id = ?id").unwrap();
        assert_eq!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn same_shape_with_differing_bound_parameter_values_share_a_template_hash() {
        let a = parse_statement("UPDATE accounts SET balance = ?bal:100 WHERE id = ?id:1").unwrap();
        let b = parse_statement("UPDATE accounts SET balance = ?bal:200 WHERE id = ?id:2").unwrap();
        assert_eq!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn different_shape_yields_different_template_hash() {
        let a = parse_statement("SELECT * FROM t").unwrap();
        let b = parse_statement("SELECT * FROM u").unwrap();
        assert_ne!(template_hash(&a), template_hash(&b));
    }
}
