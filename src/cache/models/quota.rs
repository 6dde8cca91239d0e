use serde::{Deserialize, Serialize};

/// 配额记录缓存数据模型
///
/// `used` 为当前批次已消耗的次数，`block_until` 为冷却结束的毫秒时间戳。
/// 冷却生效期间 `used` 固定等于批次上限。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub used: u32,
    pub block_until: Option<i64>, // Unix timestamp, millis
}

/// 一次配额检查的结果，由存储层返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub allowed: bool,
    pub used: u32,
    pub block_until: Option<i64>,
}

impl QuotaRecord {
    /// 计算一次尝试后的结果以及需要写回的记录
    ///
    /// 返回的记录为 `None` 表示冷却仍在生效，不应修改存储。
    pub fn consume(
        &self,
        limit: u32,
        cooldown_ms: i64,
        now_ms: i64,
    ) -> (ConsumeOutcome, Option<QuotaRecord>) {
        let mut used = self.used;

        match self.block_until {
            Some(until) if until > now_ms => {
                return (
                    ConsumeOutcome {
                        allowed: false,
                        used,
                        block_until: Some(until),
                    },
                    None,
                );
            }
            // 冷却已结束，开始新的批次
            Some(_) => used = 0,
            None => {}
        }

        if used >= limit {
            let block_until = now_ms + cooldown_ms;
            let record = QuotaRecord {
                used: limit,
                block_until: Some(block_until),
            };
            return (
                ConsumeOutcome {
                    allowed: false,
                    used: limit,
                    block_until: Some(block_until),
                },
                Some(record),
            );
        }

        let record = QuotaRecord {
            used: used + 1,
            block_until: None,
        };
        (
            ConsumeOutcome {
                allowed: true,
                used: record.used,
                block_until: None,
            },
            Some(record),
        )
    }
}
