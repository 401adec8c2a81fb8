use alloy_rpc_types_eth::Log;

use crate::models::events::RawLog;

pub trait LogParser {
    fn parse_raw_logs(self) -> Vec<RawLog>;
}

impl LogParser for Vec<Log> {
    fn parse_raw_logs(self) -> Vec<RawLog> {
        self.into_iter().map(into_raw_log).collect()
    }
}

pub fn into_raw_log(log: Log) -> RawLog {
    RawLog {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        tx_hash: log.transaction_hash,
        block_number: log.block_number,
        log_index: log.log_index,
        removed: log.removed,
    }
}
