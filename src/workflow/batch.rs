//! 批量结果
//!
//! 月份列表 / 逐月区间报表中，每一项的成败都显式记录下来，
//! 单项失败只记日志，不中断整个批次。

use std::fmt;

use tracing::{error, info};

use crate::error::AppResult;

/// 批次中单项的失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub label: String,
    pub error: String,
}

/// 批量执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一项结果；失败时写错误日志后继续
    pub fn record<T>(&mut self, context: &str, label: &str, result: AppResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.succeeded.push(label.to_string());
                Some(value)
            }
            Err(e) => {
                error!("❌ 无法下载 {} 报表 ({}): {}", context, label, e);
                self.failed.push(BatchFailure {
                    label: label.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// 合并另一批结果
    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// 输出批次统计
    pub fn log_summary(&self, context: &str) {
        info!("{}", "-".repeat(40));
        info!(
            "📊 {} 批量完成: 成功 {}/{}, 失败 {}",
            context,
            self.succeeded.len(),
            self.total(),
            self.failed.len()
        );
        for failure in &self.failed {
            info!("   ✗ {}: {}", failure.label, failure.error);
        }
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} 成功", self.succeeded.len(), self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ReportError};

    #[test]
    fn failures_are_recorded_and_iteration_continues() {
        let mut outcome = BatchOutcome::new();
        let results: Vec<(&str, AppResult<u32>)> = vec![
            ("Jan 2024", Ok(1)),
            ("BAD", Err(AppError::from(ReportError::PopupNotLoaded {
                    reason: "timeout".to_string(),
                }))),
            ("Mar 2024", Ok(3)),
        ];

        let values: Vec<u32> = results
            .into_iter()
            .filter_map(|(label, result)| outcome.record("CNT 4", label, result))
            .collect();

        assert_eq!(values, vec![1, 3]);
        assert_eq!(outcome.succeeded, vec!["Jan 2024", "Mar 2024"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].label, "BAD");
        assert!(!outcome.is_complete());
        assert_eq!(outcome.to_string(), "2/3 成功");
    }

    #[test]
    fn merge_keeps_order() {
        let mut first = BatchOutcome::new();
        first.record::<()>("X", "a", Ok(()));
        let mut second = BatchOutcome::new();
        second.record::<()>("X", "b", Ok(()));

        first.merge(second);
        assert_eq!(first.succeeded, vec!["a", "b"]);
        assert!(first.is_complete());
    }
}
