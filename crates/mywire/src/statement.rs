//! Server-side prepared statements.

use std::sync::Arc;

use crate::types::ColumnDef;

/// A statement prepared with COM_STMT_PREPARE.
///
/// Owned by the caller and bound to the connection that prepared it; pass
/// it back to [`MySqlConnection::close_statement`](crate::MySqlConnection::close_statement)
/// to release the server-side handle.
#[derive(Debug, Clone)]
pub struct Statement {
    pub(crate) id: u32,
    pub(crate) connection_id: u32,
    pub(crate) sql: String,
    pub(crate) params: Vec<ColumnDef>,
    pub(crate) columns: Arc<Vec<ColumnDef>>,
    pub(crate) warnings: u16,
}

impl Statement {
    /// Server-assigned statement id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// SQL text the statement was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parameter descriptors sent by the server.
    pub fn params(&self) -> &[ColumnDef] {
        &self.params
    }

    /// Result column descriptors; empty for statements without rows.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Warnings raised while preparing.
    pub fn warnings(&self) -> u16 {
        self.warnings
    }
}
