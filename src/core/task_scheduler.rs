//! 任务调度：工具执行并发池
//!
//! 同一推理步提出的多个工具调用并发执行，使用 Semaphore 限制同时在途的调用数。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 任务调度器
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    /// 工具并发限制（默认 3）
    tool_semaphore: Arc<Semaphore>,
    max_concurrent_tools: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        let max_concurrent_tools = max_concurrent_tools.max(1);
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent_tools)),
            max_concurrent_tools,
        }
    }

    /// 获取工具执行许可；信号量从不关闭，None 只在关闭后出现，此时不限流
    pub async fn acquire_tool(&self) -> Option<OwnedSemaphorePermit> {
        self.tool_semaphore.clone().acquire_owned().await.ok()
    }

    pub fn max_concurrent_tools(&self) -> usize {
        self.max_concurrent_tools
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.tool_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let s = TaskScheduler::new(2);
        let a = s.acquire_tool().await;
        let _b = s.acquire_tool().await;
        assert_eq!(s.available(), 0);
        drop(a);
        assert_eq!(s.available(), 1);
    }

    #[test]
    fn test_zero_is_clamped() {
        assert_eq!(TaskScheduler::new(0).max_concurrent_tools(), 1);
        assert_eq!(TaskScheduler::default().max_concurrent_tools(), 3);
    }
}
