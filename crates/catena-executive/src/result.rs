use catena_db::{QueryResult, Row};

/// What running a statement produced, with the backend's internal mangling
/// (§4.4 closing paragraph) already undone: callers never see `$rowid`/
/// `$oid`, and never see the `<db>$` table-name prefix (it never appears in
/// a result set to begin with — only in table names, which rows don't
/// carry).
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rows(Vec<Row>),
    Affected { rows_affected: u64, last_insert_rowid: i64 },
}

impl From<QueryResult> for ExecutionOutcome {
    fn from(result: QueryResult) -> Self {
        ExecutionOutcome::Affected {
            rows_affected: result.rows_affected,
            last_insert_rowid: result.last_insert_rowid,
        }
    }
}

/// Renames `$rowid`/`$oid` result columns back to their user-facing spelling
/// (§4.2 scoped them this way precisely so a user table could never shadow
/// them; that scoping is an implementation detail the caller shouldn't see).
pub fn unmangle_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            for column in &mut row.columns {
                match column.as_str() {
                    "$rowid" => *column = "rowid".to_string(),
                    "$oid" => *column = "oid".to_string(),
                    _ => {}
                }
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_db::Value;

    #[test]
    fn unmangle_rows_restores_rowid_column_name() {
        let rows = vec![Row {
            columns: vec!["$rowid".to_string(), "name".to_string()],
            values: vec![Value::Int(1), Value::Text("a".to_string())],
        }];
        let unmangled = unmangle_rows(rows);
        assert_eq!(unmangled[0].columns[0], "rowid");
    }
}
