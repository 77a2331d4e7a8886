pub mod time;

use crate::bar::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 一分钟的秒数。
pub const MINUTE_SECS: u32 = 60;
/// 一小时的秒数。
pub const HOUR_SECS: u32 = 3_600;
/// 一天的秒数。
pub const DAY_SECS: u32 = 86_400;
/// 允许的最大周期（十年）。
pub const MAX_INTERVAL_SECS: u32 = 10 * 365 * DAY_SECS;

/// # Summary
/// 分区键，标识一条独立聚合的数据流（例如某个交易市场）。
///
/// # Invariants
/// - 对聚合引擎而言是不透明的标识，只参与相等性比较与哈希。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Summary
/// 桶对齐粒度：分桶时需要清零的最粗日历字段。
///
/// # Invariants
/// - 由周期的原始秒数决定，与周期取整无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketAlignment {
    // 只清零秒
    Minute,
    // 清零分钟
    Hour,
    // 清零小时
    Day,
    // 回到当年第一天
    Year,
}

impl BucketAlignment {
    /// 按原始秒数选择对齐粒度
    pub fn for_seconds(seconds: f64) -> Self {
        if seconds > f64::from(DAY_SECS) {
            Self::Year
        } else if seconds > f64::from(HOUR_SECS) {
            Self::Day
        } else if seconds > f64::from(MINUTE_SECS) {
            Self::Hour
        } else {
            Self::Minute
        }
    }
}

/// # Summary
/// Bar 周期，随每条观测值一起携带。
///
/// # Invariants
/// - 构造时只取整一次：超过一天按天取整，超过一小时按小时取整，其余按分钟取整。
/// - 最小为一分钟（桶边界最细只到分钟），最大为 `MAX_INTERVAL_SECS`。
/// - 对齐粒度在取整之前由原始秒数确定，61 秒按小时对齐，尽管取整后为 60 秒。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IntervalRepr", into = "f64")]
pub struct BarInterval {
    // 取整后的秒数
    seconds: u32,
    // 分桶对齐粒度
    alignment: BucketAlignment,
}

/// 配置与输入中周期的两种写法：秒数或带单位的文本。
#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalRepr {
    Seconds(f64),
    Text(String),
}

impl TryFrom<IntervalRepr> for BarInterval {
    type Error = ConfigError;

    fn try_from(value: IntervalRepr) -> Result<Self, Self::Error> {
        match value {
            IntervalRepr::Seconds(seconds) => Self::from_seconds(seconds),
            IntervalRepr::Text(text) => text.parse(),
        }
    }
}

impl BarInterval {
    /// 一分钟周期。
    pub const MINUTE1: BarInterval = BarInterval {
        seconds: MINUTE_SECS,
        alignment: BucketAlignment::Minute,
    };
    /// 一小时周期。
    pub const HOUR1: BarInterval = BarInterval {
        seconds: HOUR_SECS,
        alignment: BucketAlignment::Hour,
    };
    /// 一天周期。
    pub const DAY1: BarInterval = BarInterval {
        seconds: DAY_SECS,
        alignment: BucketAlignment::Day,
    };

    /// # Summary
    /// 由秒数构造周期。
    ///
    /// # Logic
    /// 1. 拒绝非有限值与非正数。
    /// 2. 由原始秒数确定对齐粒度。
    /// 3. 选择取整单位：大于一天取天，大于一小时取小时，否则取分钟。
    /// 4. 四舍五入到单位的整数倍，且至少为一个单位。
    /// 5. 超过上限则拒绝。
    ///
    /// # Arguments
    /// * `seconds`: 原始周期秒数。
    ///
    /// # Returns
    /// 成功返回取整后的周期，否则返回 `ConfigError`。
    pub fn from_seconds(seconds: f64) -> Result<Self, ConfigError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(ConfigError::NonPositiveInterval(seconds));
        }
        if seconds > f64::from(MAX_INTERVAL_SECS) {
            return Err(ConfigError::IntervalTooLarge(seconds));
        }

        let unit = if seconds > f64::from(DAY_SECS) {
            DAY_SECS
        } else if seconds > f64::from(HOUR_SECS) {
            HOUR_SECS
        } else {
            MINUTE_SECS
        };
        let units = (seconds / f64::from(unit)).round().max(1.0);
        let rounded = units * f64::from(unit);
        if rounded > f64::from(MAX_INTERVAL_SECS) {
            return Err(ConfigError::IntervalTooLarge(seconds));
        }

        // 上面已限定在 [unit, MAX_INTERVAL_SECS] 区间内
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = rounded as u32;
        Ok(Self {
            seconds: rounded,
            alignment: BucketAlignment::for_seconds(seconds),
        })
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn alignment(&self) -> BucketAlignment {
        self.alignment
    }

    pub fn millis(&self) -> i64 {
        i64::from(self.seconds) * 1_000
    }
}

impl TryFrom<f64> for BarInterval {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_seconds(value)
    }
}

impl From<BarInterval> for f64 {
    fn from(value: BarInterval) -> Self {
        f64::from(value.seconds)
    }
}

impl FromStr for BarInterval {
    type Err = ConfigError;

    /// 支持纯秒数 (`"300"`) 以及带单位后缀的写法 (`"90s"`, `"5m"`, `"1h"`, `"1d"`)。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_lowercase();
        let unknown = || ConfigError::UnknownInterval(s.to_string());

        let (number, scale) = match text.char_indices().last() {
            Some((idx, 's')) => (&text[..idx], 1.0),
            Some((idx, 'm')) => (&text[..idx], f64::from(MINUTE_SECS)),
            Some((idx, 'h')) => (&text[..idx], f64::from(HOUR_SECS)),
            Some((idx, 'd')) => (&text[..idx], f64::from(DAY_SECS)),
            Some(_) => (text.as_str(), 1.0),
            None => return Err(unknown()),
        };
        let value: f64 = number.trim().parse().map_err(|_| unknown())?;
        Self::from_seconds(value * scale)
    }
}

impl std::fmt::Display for BarInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.seconds;
        if s % DAY_SECS == 0 {
            write!(f, "{}d", s / DAY_SECS)
        } else if s % HOUR_SECS == 0 {
            write!(f, "{}h", s / HOUR_SECS)
        } else {
            write!(f, "{}m", s / MINUTE_SECS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_rounds_once_per_unit() {
        assert_eq!(BarInterval::from_seconds(60.0).unwrap().seconds(), 60);
        assert_eq!(BarInterval::from_seconds(89.0).unwrap().seconds(), 60);
        assert_eq!(BarInterval::from_seconds(300.0).unwrap().seconds(), 300);
        assert_eq!(BarInterval::from_seconds(5_500.0).unwrap().seconds(), 7_200);
        assert_eq!(BarInterval::from_seconds(100_000.0).unwrap().seconds(), 86_400);
        assert_eq!(BarInterval::from_seconds(150_000.0).unwrap().seconds(), 172_800);
    }

    #[test]
    fn test_sub_minute_interval_is_promoted() {
        assert_eq!(BarInterval::from_seconds(0.5).unwrap(), BarInterval::MINUTE1);
        assert_eq!(BarInterval::from_seconds(30.0).unwrap(), BarInterval::MINUTE1);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        assert!(matches!(
            BarInterval::from_seconds(0.0),
            Err(ConfigError::NonPositiveInterval(_))
        ));
        assert!(BarInterval::from_seconds(-60.0).is_err());
        assert!(BarInterval::from_seconds(f64::NAN).is_err());
        assert!(BarInterval::from_seconds(f64::INFINITY).is_err());
        assert!(matches!(
            BarInterval::from_seconds(1e12),
            Err(ConfigError::IntervalTooLarge(_))
        ));
    }

    #[test]
    fn test_interval_parse_and_display() {
        assert_eq!("5m".parse::<BarInterval>().unwrap().seconds(), 300);
        assert_eq!("1H".parse::<BarInterval>().unwrap(), BarInterval::HOUR1);
        assert_eq!("1d".parse::<BarInterval>().unwrap(), BarInterval::DAY1);
        assert_eq!("120".parse::<BarInterval>().unwrap().seconds(), 120);
        assert_eq!("90s".parse::<BarInterval>().unwrap().seconds(), 120);
        assert!("abc".parse::<BarInterval>().is_err());
        assert!("".parse::<BarInterval>().is_err());

        assert_eq!(BarInterval::MINUTE1.to_string(), "1m");
        assert_eq!(BarInterval::from_seconds(300.0).unwrap().to_string(), "5m");
        assert_eq!(BarInterval::from_seconds(7_200.0).unwrap().to_string(), "2h");
        assert_eq!(BarInterval::DAY1.to_string(), "1d");
    }

    #[test]
    fn test_alignment_follows_unrounded_seconds() {
        let cases = [
            (60.0, 60, BucketAlignment::Minute),
            (61.0, 60, BucketAlignment::Hour),
            (3_600.0, 3_600, BucketAlignment::Hour),
            (3_601.0, 3_600, BucketAlignment::Day),
            (86_400.0, 86_400, BucketAlignment::Day),
            (86_401.0, 86_400, BucketAlignment::Year),
        ];
        for (raw, seconds, alignment) in cases {
            let interval = BarInterval::from_seconds(raw).unwrap();
            assert_eq!(interval.seconds(), seconds);
            assert_eq!(interval.alignment(), alignment);
        }
        assert_eq!(BarInterval::MINUTE1.alignment(), BucketAlignment::Minute);
        assert_eq!(BarInterval::HOUR1.alignment(), BucketAlignment::Hour);
        assert_eq!(BarInterval::DAY1.alignment(), BucketAlignment::Day);
    }

    #[test]
    fn test_interval_serde_as_seconds() {
        let interval: BarInterval = serde_json::from_str("3600").unwrap();
        assert_eq!(interval, BarInterval::HOUR1);
        assert_eq!(serde_json::to_string(&interval).unwrap(), "3600.0");
        assert!(serde_json::from_str::<BarInterval>("-1").is_err());

        let text: BarInterval = serde_json::from_str(r#""5m""#).unwrap();
        assert_eq!(text.seconds(), 300);
        assert!(serde_json::from_str::<BarInterval>(r#""soon""#).is_err());
    }
}
