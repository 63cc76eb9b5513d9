use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

/// 分发指标收集器
///
/// 记录每次模型分发的次数、成功/失败、延迟与token用量，按提供商和模型分组
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// 分发总数
    request_count: Arc<AtomicU64>,
    /// 成功次数
    success_count: Arc<AtomicU64>,
    /// 失败次数
    error_count: Arc<AtomicU64>,
    /// 累计token用量
    total_tokens: Arc<AtomicU64>,
    /// 延迟统计信息
    latency_stats: Arc<RwLock<LatencyStats>>,
    /// 按提供商分组的指标
    provider_metrics: Arc<RwLock<HashMap<String, DispatchMetrics>>>,
    /// 按模型分组的指标
    model_metrics: Arc<RwLock<HashMap<String, DispatchMetrics>>>,
    /// 按错误类型分组的失败次数
    error_kinds: Arc<RwLock<HashMap<String, u64>>>,
    /// 启动时间
    start_time: Instant,
}

/// 延迟统计信息
#[derive(Debug, Clone, Serialize)]
pub struct LatencyStats {
    pub total_latency_ms: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub request_count: u64,
}

/// 单个提供商或模型的分发指标
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_latency_ms: f64,
    pub total_tokens: u64,
    pub last_request_time: Option<String>,
}

/// Outcome of one dispatch as seen by the collector
#[derive(Debug, Clone, Copy)]
pub enum DispatchRecord<'a> {
    Success { tokens: Option<u64> },
    Failure { kind: &'a str },
}

/// 指标摘要
#[derive(Debug, Serialize)]
pub struct MetricsSummary {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate_percent: f64,
    pub avg_latency_ms: f64,
    pub total_tokens: u64,
    pub latency_stats: LatencyStats,
    pub provider_metrics: HashMap<String, DispatchMetrics>,
    pub model_metrics: HashMap<String, DispatchMetrics>,
    pub errors_by_kind: HashMap<String, u64>,
    pub timestamp: String,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            total_latency_ms: 0,
            min_latency_ms: u64::MAX,
            max_latency_ms: 0,
            request_count: 0,
        }
    }
}

impl DispatchMetrics {
    fn record(&mut self, latency_ms: u64, record: DispatchRecord<'_>) {
        self.total_requests += 1;
        match record {
            DispatchRecord::Success { tokens } => {
                self.successful_requests += 1;
                self.total_tokens += tokens.unwrap_or(0);
            }
            DispatchRecord::Failure { .. } => self.failed_requests += 1,
        }

        // 更新平均延迟
        let total_latency =
            (self.avg_latency_ms * (self.total_requests - 1) as f64) + latency_ms as f64;
        self.avg_latency_ms = total_latency / self.total_requests as f64;
        self.last_request_time = Some(chrono::Utc::now().to_rfc3339());
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            success_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_tokens: Arc::new(AtomicU64::new(0)),
            latency_stats: Arc::new(RwLock::new(LatencyStats::default())),
            provider_metrics: Arc::new(RwLock::new(HashMap::new())),
            model_metrics: Arc::new(RwLock::new(HashMap::new())),
            error_kinds: Arc::new(RwLock::new(HashMap::new())),
            start_time: Instant::now(),
        }
    }

    /// 记录分发开始，返回开始时间用于计算延迟
    pub fn record_dispatch_start(&self) -> Instant {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        Instant::now()
    }

    /// 记录分发结束
    ///
    /// ## 参数说明
    /// - `start_time`: `record_dispatch_start`返回的开始时间
    /// - `provider`: 提供商名称；模型无法解析时为"unknown"
    /// - `model`: 模型名称
    /// - `record`: 成功（含token用量）或失败（含错误类型）
    pub async fn record_dispatch_end(
        &self,
        start_time: Instant,
        provider: &str,
        model: &str,
        record: DispatchRecord<'_>,
    ) {
        let latency_ms = start_time.elapsed().as_millis() as u64;

        match record {
            DispatchRecord::Success { tokens } => {
                self.success_count.fetch_add(1, Ordering::Relaxed);
                self.total_tokens.fetch_add(tokens.unwrap_or(0), Ordering::Relaxed);
            }
            DispatchRecord::Failure { kind } => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                *self.error_kinds.write().await.entry(kind.to_string()).or_insert(0) += 1;
            }
        }

        {
            let mut stats = self.latency_stats.write().await;
            stats.total_latency_ms += latency_ms;
            stats.request_count += 1;
            stats.min_latency_ms = stats.min_latency_ms.min(latency_ms);
            stats.max_latency_ms = stats.max_latency_ms.max(latency_ms);
        }

        self.provider_metrics
            .write()
            .await
            .entry(provider.to_string())
            .or_default()
            .record(latency_ms, record);

        self.model_metrics
            .write()
            .await
            .entry(model.to_string())
            .or_default()
            .record(latency_ms, record);
    }

    /// 获取指标摘要
    pub async fn get_metrics_summary(&self) -> MetricsSummary {
        let total_requests = self.request_count.load(Ordering::Relaxed);
        let successful_requests = self.success_count.load(Ordering::Relaxed);
        let failed_requests = self.error_count.load(Ordering::Relaxed);

        let success_rate_percent = if total_requests > 0 {
            (successful_requests as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        let mut latency_stats = self.latency_stats.read().await.clone();
        // No sample yet: report 0 rather than the u64::MAX seed
        if latency_stats.request_count == 0 {
            latency_stats.min_latency_ms = 0;
        }
        let avg_latency_ms = if latency_stats.request_count > 0 {
            latency_stats.total_latency_ms as f64 / latency_stats.request_count as f64
        } else {
            0.0
        };

        MetricsSummary {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            total_requests,
            successful_requests,
            failed_requests,
            success_rate_percent,
            avg_latency_ms,
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            latency_stats,
            provider_metrics: self.provider_metrics.read().await.clone(),
            model_metrics: self.model_metrics.read().await.clone(),
            errors_by_kind: self.error_kinds.read().await.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// (总数, 成功数, 失败数)
    pub fn get_basic_stats(&self) -> (u64, u64, u64) {
        (
            self.request_count.load(Ordering::Relaxed),
            self.success_count.load(Ordering::Relaxed),
            self.error_count.load(Ordering::Relaxed),
        )
    }
}
