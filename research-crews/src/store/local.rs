//! Local SQLite file backend.

use rusqlite::types::ValueRef;

use super::value::{Row, Value};
use crate::error::{Error, Result};

pub struct LocalConnection {
    conn: rusqlite::Connection,
}

impl LocalConnection {
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(n) => Value::Integer(n),
                    ValueRef::Real(f) => Value::Real(f),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => {
                        return Err(Error::Persistence("blob columns are not supported".into()));
                    }
                });
            }
            out.push(values);
        }
        Ok(out)
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let n = self.conn.execute(sql, rusqlite::params_from_iter(params.iter()))?;
        Ok(n as u64)
    }

    pub fn close(self) {
        if let Err((_, e)) = self.conn.close() {
            tracing::warn!(error = %e, "Failed to close SQLite connection");
        }
    }
}
