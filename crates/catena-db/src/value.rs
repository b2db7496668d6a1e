/// A dynamically-typed cell, matching SQLite's own column affinity model —
/// close enough to the dialect's three types (`TEXT`, `INT`, `BLOB`) plus
/// `NULL` that no information is lost translating to/from `catena-sql`
/// literals.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows_affected: u64,
    pub last_insert_rowid: i64,
}
