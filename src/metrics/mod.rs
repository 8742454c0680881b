use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 简单的指标收集器
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    provider_attempts: AtomicU64,
    provider_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功请求
    pub fn record_success(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录失败请求
    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次提供商调用
    pub fn record_attempt(&self) {
        self.provider_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        format!(
            "# HELP devmaster_requests_total Total number of generation requests\n\
             # TYPE devmaster_requests_total counter\n\
             devmaster_requests_total {}\n\
             # HELP devmaster_requests_successful Successful generation requests\n\
             # TYPE devmaster_requests_successful counter\n\
             devmaster_requests_successful {}\n\
             # HELP devmaster_requests_failed Failed generation requests\n\
             # TYPE devmaster_requests_failed counter\n\
             devmaster_requests_failed {}\n\
             # HELP devmaster_provider_attempts_total Outbound provider calls\n\
             # TYPE devmaster_provider_attempts_total counter\n\
             devmaster_provider_attempts_total {}\n\
             # HELP devmaster_provider_failures_total Provider calls that failed\n\
             # TYPE devmaster_provider_failures_total counter\n\
             devmaster_provider_failures_total {}\n",
            self.total_requests.load(Ordering::Relaxed),
            self.successful_requests.load(Ordering::Relaxed),
            self.failed_requests.load(Ordering::Relaxed),
            self.provider_attempts.load(Ordering::Relaxed),
            self.provider_failures.load(Ordering::Relaxed)
        )
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}
