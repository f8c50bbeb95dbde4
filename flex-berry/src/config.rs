//! 运行配置.
//!
//! 配置以 JSON 文件给出, 所有字段均可省略.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CONDITION_WARN, DEFAULT_MAX_FRAME_RATE, DEFAULT_RCOND, DEFAULT_TRAJECTORY_POINTS,
};
use crate::error::{FlexError, FlexResult};
use crate::flow::CachePolicy;

/// 直方图默认区间数.
pub const DEFAULT_HISTOGRAM_BINS: usize = 50;

/// 动画查看器配置.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// 查看器可执行文件. 为 `None` 时不启动查看器.
    pub command: Option<String>,

    /// 是否循环播放.
    #[serde(rename = "loop")]
    pub looping: bool,

    /// 是否往返播放.
    pub oscillate: bool,

    /// 最大帧率.
    pub max_frame_rate: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            command: None,
            looping: true,
            oscillate: true,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
        }
    }
}

/// 一次运行的配置.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlexConfig {
    /// 光流文件目录. 默认为 `<运行目录>/optical_flows`.
    pub flow_dir: Option<PathBuf>,

    /// 参考体数据. 默认为 `<运行目录>/reference.spi`.
    pub reference: Option<PathBuf>,

    /// 光流样本数. 默认为降维结果矩阵的行数.
    pub sample_count: Option<usize>,

    /// 降维方法名, 如 `sklearn_PCA`.
    pub method: Option<String>,

    /// 缓存有效性策略.
    pub cache_policy: CachePolicy,

    /// 伪逆相对截断阈值.
    pub rcond: f64,

    /// 条件数警告阈值.
    pub condition_warn: f64,

    /// 由控制点生成轨迹时的点数.
    pub trajectory_points: usize,

    /// 直方图区间数.
    pub histogram_bins: usize,

    /// 是否并行生成动画帧. 未启用 `rayon` 特性时忽略.
    pub parallel: bool,

    /// 是否为每一帧写出预览图.
    pub previews: bool,

    /// 查看器.
    pub viewer: ViewerConfig,
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            flow_dir: None,
            reference: None,
            sample_count: None,
            method: None,
            cache_policy: CachePolicy::default(),
            rcond: DEFAULT_RCOND,
            condition_warn: DEFAULT_CONDITION_WARN,
            trajectory_points: DEFAULT_TRAJECTORY_POINTS,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            parallel: true,
            previews: false,
            viewer: ViewerConfig::default(),
        }
    }
}

impl FlexConfig {
    /// 读取 JSON 配置并校验.
    pub fn load<P: AsRef<Path>>(path: P) -> FlexResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FlexError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验数值参数.
    pub fn validate(&self) -> FlexResult<()> {
        let bad = |msg: String| Err(FlexError::InvalidInput(msg));
        if !(self.rcond >= 0.0 && self.rcond < 1.0) {
            return bad(format!("rcond must be in [0, 1), got {}", self.rcond));
        }
        if !(self.condition_warn > 1.0) {
            return bad(format!("condition_warn must be > 1, got {}", self.condition_warn));
        }
        if self.sample_count == Some(0) {
            return bad("sample_count must be positive".to_string());
        }
        if self.trajectory_points == 0 || self.histogram_bins == 0 {
            return bad("trajectory_points and histogram_bins must be positive".to_string());
        }
        if self.viewer.max_frame_rate == 0 {
            return bad("viewer.max_frame_rate must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let c: FlexConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, FlexConfig::default());
        assert!(c.validate().is_ok());
        assert_eq!(c.viewer.max_frame_rate, 5);
        assert_eq!(c.cache_policy, CachePolicy::Validate);
    }

    #[test]
    fn test_load_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flex.json");
        fs::write(
            &path,
            r#"{
                "method": "sklearn_PCA",
                "cache_policy": "trust_existing",
                "sample_count": 12,
                "viewer": { "command": "ChimeraX", "loop": false }
            }"#,
        )
        .unwrap();

        let c = FlexConfig::load(&path).unwrap();
        assert_eq!(c.method.as_deref(), Some("sklearn_PCA"));
        assert_eq!(c.cache_policy, CachePolicy::TrustExisting);
        assert_eq!(c.sample_count, Some(12));
        assert!(!c.viewer.looping);
        assert!(c.viewer.oscillate);
        assert_eq!(c.rcond, DEFAULT_RCOND);
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flex.json");

        fs::write(&path, r#"{ "rcond": -1.0 }"#).unwrap();
        assert!(matches!(FlexConfig::load(&path), Err(FlexError::InvalidInput(_))));

        fs::write(&path, r#"{ "unknown": 1 }"#).unwrap();
        assert!(matches!(FlexConfig::load(&path), Err(FlexError::Json(_))));

        assert!(matches!(
            FlexConfig::load(dir.path().join("none.json")),
            Err(FlexError::MissingInput(_))
        ));
    }
}
