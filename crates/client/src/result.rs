//! Result of a write statement or batch.

use dsql_proto::rpc::ExecResponse;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// How many rows the statement affected.
    pub rows_affected: u64,
    /// Row id of the last inserted row, when the miner reports one.
    pub last_insert_id: i64,
}

impl From<ExecResponse> for ExecResult {
    fn from(res: ExecResponse) -> Self {
        ExecResult {
            rows_affected: res.rows_affected,
            last_insert_id: res.last_insert_id,
        }
    }
}
