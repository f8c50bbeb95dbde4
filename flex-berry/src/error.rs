//! 运行时错误.

use std::path::PathBuf;

use ndarray_linalg::error::LinalgError;
use ndarray_npy::{ReadNpyError, WriteNpyError};
use thiserror::Error;

use crate::volume::VolumeError;

/// 重建流水线的运行时错误.
///
/// 所有错误都是致命的: 流水线不做重试, 也不认为部分输出有效.
#[derive(Debug, Error)]
pub enum FlexError {
    /// 必需的输入文件不存在.
    #[error("missing input file `{}`", .0.display())]
    MissingInput(PathBuf),

    /// 底层 I/O 错误.
    #[error("I/O error on `{}`: {source}", path.display())]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 原始错误.
        #[source]
        source: std::io::Error,
    },

    /// 体数据读写错误.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// 文本矩阵等文本文件解析错误. `line` 从 1 开始.
    #[error("parse error in `{}` line {line}: {message}", path.display())]
    Parse {
        /// 出错的文件.
        path: PathBuf,
        /// 行号.
        line: usize,
        /// 描述.
        message: String,
    },

    /// 形状不一致, 属于配置错误.
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        /// 不一致的对象.
        what: &'static str,
        /// 期望值.
        expected: String,
        /// 实际值.
        found: String,
    },

    /// 非法输入参数.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 线性代数后端错误.
    #[error("linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    /// 读取 npy 缓存错误.
    #[error("failed to read npy cache: {0}")]
    ReadNpy(#[from] ReadNpyError),

    /// 写入 npy 缓存错误.
    #[error("failed to write npy cache: {0}")]
    WriteNpy(#[from] WriteNpyError),

    /// JSON 序列化错误.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// 预览图写出错误.
    #[error("preview image error: {0}")]
    Preview(#[from] image::ImageError),

    /// 外部查看器启动或运行失败.
    #[error("viewer error: {0}")]
    Viewer(String),
}

impl FlexError {
    /// 将 `std::io::Error` 与路径绑定. 文件不存在时转换为 [`FlexError::MissingInput`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::MissingInput(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// 构造形状不一致错误.
    pub fn shape(what: &'static str, expected: impl ToString, found: impl ToString) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// 重建流水线运行时结果.
pub type FlexResult<T> = Result<T, FlexError>;
