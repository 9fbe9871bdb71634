/// 失敗したスイープの再実行間隔を決める指数バックオフ+ジッター。
///
/// AWS推奨のFull Jitter戦略に、`base_delay / 2` の下限を加えたもの。
use std::time::Duration;

use rand::Rng;

/// 再実行バックオフの設定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// ベースとなる遅延時間
    pub base_delay: Duration,
    /// 最大遅延時間
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// 連続失敗回数に対する待機時間を計算する（下限付きFull Jitter戦略）。
    ///
    /// 失敗直後に即座に再実行しないよう、`base_delay / 2` を下回らない。
    ///
    /// # Arguments
    /// * `failures` - 連続失敗回数（0なら待機なし）
    #[must_use]
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        // 指数バックオフ: base * 2^(failures-1)
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let exponential = base_ms.saturating_mul(1_u64.checked_shl(failures - 1).unwrap_or(u64::MAX));
        let capped = exponential.min(max_ms);

        let floor = (base_ms / 2).min(capped);
        Duration::from_millis(rand::rng().random_range(floor..=capped))
    }

    /// Same policy with the ceiling lowered to `ceiling` (never raised).
    #[must_use]
    pub fn capped_at(self, ceiling: Duration) -> Self {
        Self {
            base_delay: self.base_delay.min(ceiling),
            max_delay: self.max_delay.min(ceiling),
        }
    }
}
