//! 通用常量.
//!
//! 文件命名规则均与上游 (光流提取 / 降维) 步骤保持一致, 不要随意修改.

/// 运行目录下的文件名.
pub mod files {
    /// 降维结果矩阵, 行 = 样本, 列 = 降维维度.
    pub const OUTPUT_MATRIX: &str = "output_matrix.txt";

    /// 原始高维形变向量矩阵, 行 = 样本.
    pub const DEFORMATIONS: &str = "deformations.txt";

    /// 线性投影矩阵 `M`. 存在时动画是降维的精确逆映射.
    pub const PROJECTOR: &str = "projector.txt";

    /// 拟合好的 PCA 模型 (JSON).
    pub const PCA_MODEL: &str = "pca_model.json";

    /// 参考体数据.
    pub const REFERENCE: &str = "reference.spi";

    /// 光流矩阵缓存.
    pub const FLOW_BANK: &str = "bigmat.npy";

    /// 光流矩阵伪逆缓存.
    pub const FLOW_BANK_PINV: &str = "bigmat_inverse.npy";

    /// 缓存键.
    pub const CACHE_KEY: &str = "bigmat.key.json";

    /// ChimeraX 控制脚本.
    pub const CHIMERA_SCRIPT: &str = "chimera.cxc";

    /// 光流文件所在的子目录.
    pub const OPTICAL_FLOWS_DIR: &str = "optical_flows";
}

/// 光流文件索引的零填充宽度. `1` -> `000001`.
pub const FLOW_INDEX_WIDTH: usize = 6;

/// 动画帧索引的零填充宽度. `1` -> `001`.
pub const FRAME_INDEX_WIDTH: usize = 3;

/// 动画帧文件名后缀.
pub const FRAME_SUFFIX: &str = "deformed_by_opflow.vol";

/// 动画轨迹文件名后缀.
pub const TRAJECTORY_SUFFIX: &str = "trajectory.txt";

/// 动画目录 / 文件名前缀.
pub const ANIMATION_PREFIX: &str = "animation_";

/// 轨迹工具默认的轨迹点个数.
pub const DEFAULT_TRAJECTORY_POINTS: usize = 10;

/// 动画播放的默认最大帧率.
pub const DEFAULT_MAX_FRAME_RATE: u32 = 5;

/// 伪逆默认相对截断阈值. 奇异值 `σ <= rcond * σ_max` 时被丢弃.
///
/// SVD 舍入噪声产生的奇异值约为 `eps * σ_max` 的小倍数, 阈值需高于该量级.
pub const DEFAULT_RCOND: f64 = 1e-12;

/// 伪逆条件数超过该值时给出警告.
pub const DEFAULT_CONDITION_WARN: f64 = 1e6;

/// 缓存键格式版本. 缓存布局变更时递增.
pub const CACHE_VERSION: u32 = 1;

/// 光流分量.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FlowAxis {
    /// x 分量 (沿体数据最快变化的轴).
    X,

    /// y 分量.
    Y,

    /// z 分量 (沿切片方向).
    Z,
}

impl FlowAxis {
    /// 按堆叠顺序排列的三个分量.
    pub const ALL: [FlowAxis; 3] = [FlowAxis::X, FlowAxis::Y, FlowAxis::Z];

    /// 在 `[3, Z, Y, X]` 堆叠中的通道号.
    #[inline]
    pub const fn channel(&self) -> usize {
        match self {
            FlowAxis::X => 0,
            FlowAxis::Y => 1,
            FlowAxis::Z => 2,
        }
    }

    /// 文件名中使用的小写字母.
    #[inline]
    pub const fn letter(&self) -> char {
        match self {
            FlowAxis::X => 'x',
            FlowAxis::Y => 'y',
            FlowAxis::Z => 'z',
        }
    }
}
