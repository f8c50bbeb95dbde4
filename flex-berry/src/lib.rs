#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 将 HeteroFlow 降维空间中的轨迹还原为 3D 光流形变, 并生成参考体数据的动画.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 体数据统一按 `[z, y, x]` 访问, 光流场按 `[3, Z, Y, X]` 堆叠, 通道顺序为 x/y/z.
//! 2. 所有错误都是致命的, 以 [`FlexError`] 返回; 流水线不做重试, 也不会留下
//!   被认为有效的部分输出.
//!
//! # 开发计划
//!
//! ### Spider / NIfTI 体数据读写 ✅
//!
//! Spider 读取时自动判断字节序, 写出时使用小端序. NIfTI 借助 `nifti` crate.
//!
//! 实现位于 `flex-berry/src/volume`.
//!
//! ### 光流矩阵及其伪逆 ✅
//!
//! 伪逆由经济分治 SVD 求得, 病态时给出警告而不失败.
//!
//! 实现位于 `flex-berry/src/flow` 和 `flex-berry/src/linalg.rs`.
//!
//! ### 缓存 ✅
//!
//! 光流矩阵和伪逆以 `.npy` 缓存在运行目录下, 并以缓存键校验.
//!
//! 实现位于 `flex-berry/src/flow/cache.rs`.
//!
//! ### 形变向量重建 ✅
//!
//! 1. 线性投影矩阵的伪逆; ✅
//! 2. 拟合好的 PCA 模型; ✅
//! 3. 没有映射时退化为最近邻. ✅
//!
//! 实现位于 `flex-berry/src/reconstruct`.
//!
//! ### 动画生成 ✅
//!
//! 三线性插值反向映射形变, 可选 `rayon` 并行. 同时生成 ChimeraX 播放脚本.
//!
//! 实现位于 `flex-berry/src/animation.rs`.
//!
//! ### 小功能 ✅
//!
//! 1. 坐标轴直方图 / 散点数据. ✅
//! 2. 聚类点选择. ✅
//! 3. 控制点折线按弧长重采样. ✅
//! 4. 重新加载已生成的动画. ✅
//! 5. 帧预览图. ✅

/// 三维索引 `(z, y, x)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

pub mod animation;
pub mod config;
pub mod consts;
pub mod dataset;
pub mod embedding;
mod error;
pub mod flow;
pub mod linalg;
pub mod pipeline;
pub mod prelude;
pub mod reconstruct;
pub mod trajectory;
pub mod volume;

pub use error::{FlexError, FlexResult};
