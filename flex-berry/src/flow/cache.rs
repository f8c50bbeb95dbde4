//! 光流矩阵及其伪逆的磁盘缓存.
//!
//! 解析顺序:
//!
//! 1. 伪逆缓存存在 (且有效) 时直接使用;
//! 2. 否则光流矩阵缓存存在 (且有效) 时加载并求伪逆;
//! 3. 否则从光流文件构建光流矩阵, 持久化后求伪逆.
//!
//! 求得伪逆后先释放光流矩阵, 再写出伪逆缓存.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};

use super::{FlowBank, FlowFieldLoader};
use crate::consts::{files, CACHE_VERSION};
use crate::error::{FlexError, FlexResult};
use crate::linalg::{pseudo_inverse, PinvReport};
use crate::volume::VoxelGrid;
use crate::Idx3d;

/// 缓存有效性策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// 以缓存键校验缓存; 缺少键或键不一致时忽略缓存并重新计算.
    #[default]
    Validate,

    /// 文件存在即视为有效.
    TrustExisting,
}

/// 缓存键, 与缓存文件一同写在运行目录下.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    /// 缓存格式版本.
    pub version: u32,

    /// 样本数.
    pub sample_count: usize,

    /// 参考体数据网格 `(z, y, x)`.
    pub grid: Idx3d,
}

impl CacheKey {
    /// 当前版本的缓存键.
    pub fn new(sample_count: usize, grid: Idx3d) -> Self {
        Self {
            version: CACHE_VERSION,
            sample_count,
            grid,
        }
    }

    /// 伪逆期望的形状 `[3 * Z * Y * X, N]`.
    #[inline]
    pub fn pinv_shape(&self) -> (usize, usize) {
        let (z, y, x) = self.grid;
        (3 * z * y * x, self.sample_count)
    }
}

/// 伪逆的来源.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinvSource {
    /// 伪逆缓存.
    Cached,

    /// 由光流矩阵缓存计算.
    CachedBank,

    /// 由光流文件重新构建.
    Built,
}

/// 解析得到的伪逆.
#[derive(Debug)]
pub struct ResolvedPinv {
    /// `[3 * Z * Y * X, N]` 伪逆矩阵.
    pub matrix: Array2<f64>,

    /// 本次计算的数值质量报告. 来自缓存时为 `None`.
    pub report: Option<PinvReport>,

    /// 来源.
    pub source: PinvSource,
}

/// 运行目录下的光流缓存.
#[derive(Clone, Debug)]
pub struct FlowCache {
    dir: PathBuf,
    policy: CachePolicy,
}

impl FlowCache {
    /// 在 `dir` 下创建缓存.
    pub fn new<P: AsRef<Path>>(dir: P, policy: CachePolicy) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
            policy,
        }
    }

    /// 光流矩阵缓存路径.
    #[inline]
    pub fn bank_path(&self) -> PathBuf {
        self.dir.join(files::FLOW_BANK)
    }

    /// 伪逆缓存路径.
    #[inline]
    pub fn pinv_path(&self) -> PathBuf {
        self.dir.join(files::FLOW_BANK_PINV)
    }

    /// 缓存键路径.
    #[inline]
    pub fn key_path(&self) -> PathBuf {
        self.dir.join(files::CACHE_KEY)
    }

    /// 按缓存解析顺序获得伪逆.
    ///
    /// `loader` 只在两个缓存都不可用时才会被调用.
    pub fn resolve_pinv<L: FlowFieldLoader + ?Sized>(
        &self,
        key: &CacheKey,
        loader: &mut L,
        rcond: f64,
        condition_warn: f64,
    ) -> FlexResult<ResolvedPinv> {
        let trusted = self.key_matches(key)?;
        if !trusted {
            self.discard_stale()?;
        }

        let pinv_path = self.pinv_path();
        if trusted && pinv_path.is_file() {
            let matrix: Array2<f64> = read_npy(&pinv_path)?;
            if self.shape_ok("pseudo-inverse", matrix.dim(), key.pinv_shape()) {
                log::info!("using cached pseudo-inverse `{}`", pinv_path.display());
                return Ok(ResolvedPinv {
                    matrix,
                    report: None,
                    source: PinvSource::Cached,
                });
            }
        }

        let (bank, source) = match self.cached_bank(trusted, key)? {
            Some(bank) => (bank, PinvSource::CachedBank),
            None => {
                let count = u32::try_from(key.sample_count).map_err(|_| {
                    FlexError::InvalidInput(format!(
                        "sample count {} exceeds the flow file numbering range",
                        key.sample_count
                    ))
                })?;
                let bank = FlowBank::build(count, loader)?;
                if bank.grid() != key.grid {
                    return Err(FlexError::shape(
                        "flow field grid vs reference",
                        format!("{:?}", key.grid),
                        format!("{:?}", bank.grid()),
                    ));
                }
                write_npy(self.bank_path(), &bank.matrix())?;
                self.write_key(key)?;
                log::info!("flow bank cached to `{}`", self.bank_path().display());
                (bank, PinvSource::Built)
            }
        };

        let pinv = pseudo_inverse(bank.matrix(), rcond)?;
        drop(bank);
        pinv.report.log(condition_warn);

        write_npy(&pinv_path, &pinv.matrix)?;
        self.write_key(key)?;
        log::info!("pseudo-inverse cached to `{}`", pinv_path.display());

        Ok(ResolvedPinv {
            matrix: pinv.matrix,
            report: Some(pinv.report),
            source,
        })
    }

    fn cached_bank(&self, trusted: bool, key: &CacheKey) -> FlexResult<Option<FlowBank>> {
        let bank_path = self.bank_path();
        if !(trusted && bank_path.is_file()) {
            return Ok(None);
        }
        let matrix: Array2<f64> = read_npy(&bank_path)?;
        let (rows, cols) = key.pinv_shape();
        if !self.shape_ok("flow bank", matrix.dim(), (cols, rows)) {
            return Ok(None);
        }
        log::info!("using cached flow bank `{}`", bank_path.display());
        FlowBank::from_matrix(matrix, key.grid).map(Some)
    }

    /// 在 [`CachePolicy::TrustExisting`] 下形状不一致同样被接受, 由后续步骤报错.
    fn shape_ok(&self, what: &str, found: (usize, usize), expected: (usize, usize)) -> bool {
        if found == expected || self.policy == CachePolicy::TrustExisting {
            return true;
        }
        log::warn!("cached {what} has shape {found:?}, expected {expected:?}; recomputing");
        false
    }

    fn key_matches(&self, key: &CacheKey) -> FlexResult<bool> {
        if self.policy == CachePolicy::TrustExisting {
            return Ok(true);
        }
        let path = self.key_path();
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.bank_path().is_file() || self.pinv_path().is_file() {
                    log::warn!("flow caches without `{}` are ignored", files::CACHE_KEY);
                }
                return Ok(false);
            }
            Err(e) => return Err(FlexError::io(path, e)),
        };
        match serde_json::from_str::<CacheKey>(&text) {
            Ok(stored) if stored == *key => Ok(true),
            Ok(stored) => {
                log::warn!("flow cache key {stored:?} does not match {key:?}; recomputing");
                Ok(false)
            }
            Err(e) => {
                log::warn!("unreadable flow cache key ({e}); recomputing");
                Ok(false)
            }
        }
    }

    /// 删除失效的缓存, 避免写出新键后旧伪逆被误认为有效.
    fn discard_stale(&self) -> FlexResult<()> {
        for path in [self.pinv_path(), self.bank_path(), self.key_path()] {
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("removed stale cache `{}`", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(FlexError::io(path, e)),
            }
        }
        Ok(())
    }

    fn write_key(&self, key: &CacheKey) -> FlexResult<()> {
        let path = self.key_path();
        let text = serde_json::to_string_pretty(key)?;
        fs::write(&path, text).map_err(|e| FlexError::io(path, e))
    }
}
