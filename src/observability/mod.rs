pub mod metrics;
pub mod tracing;

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// 新しいTelemetryインスタンスを作成し、トレーシングとメトリクスを初期化する。
    ///
    /// # Errors
    /// サブスクライバの初期化またはメトリクス登録に失敗した場合はエラーを返す。
    pub fn new() -> Result<Self> {
        tracing::init()?;
        Self::with_registry(Registry::new())
    }

    /// Builds metrics on `registry` without touching the global subscriber.
    ///
    /// # Errors
    /// メトリクス登録に失敗した場合はエラーを返す。
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let registry = Arc::new(registry);
        let metrics = Arc::new(Metrics::new(Arc::clone(&registry))?);
        Ok(Self { registry, metrics })
    }

    /// メトリクスへのアクセスを提供する。
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn metrics_handle(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// 準備完了プローブを記録する。
    pub fn record_ready_probe(&self, ready: bool) {
        ::tracing::debug!(ready, "ready probe recorded");
    }

    /// ライブプローブを記録する。
    pub fn record_live_probe(&self) {
        ::tracing::debug!("service live probe");
    }

    /// 管理者による手動スイープ呼び出しを記録する。
    pub fn record_admin_sweep_invocation(&self) {
        ::tracing::info!("admin sweep invoked");
    }

    /// Prometheusメトリクスをレンダリングする。
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(error) = encoder.encode(&metric_families, &mut buffer) {
            ::tracing::warn!(%error, "failed to encode prometheus metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
