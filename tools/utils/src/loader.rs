//! 对 `flex-berry::dataset` 的更一层封装. 提供更直接的运行目录和配置加载.

use flex_berry::config::FlexConfig;
use flex_berry::FlexResult;
use std::env;
use std::path::{Path, PathBuf};

/// 运行目录环境变量.
pub const RUN_DIR_ENV: &str = "FLEX_RUN_DIR";

/// 获取运行目录.
///
/// 1. 若环境变量 `$FLEX_RUN_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/flexdata/run`;
/// 3. 无法确定用户主目录时返回 `None`.
pub fn run_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(RUN_DIR_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => flex_berry::dataset::home_flex_dir_with(["run"]),
    }
}

/// 加载配置. 未给出配置文件时使用默认配置.
pub fn config_or_default<P: AsRef<Path>>(path: Option<P>) -> FlexResult<FlexConfig> {
    match path {
        Some(p) => FlexConfig::load(p),
        None => Ok(FlexConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_without_file() {
        let c = config_or_default(None::<&Path>).unwrap();
        assert_eq!(c, FlexConfig::default());
    }
}
