//! 运行目录操作.
//!
//! 一次分析运行的全部输入和输出都位于同一个运行目录下, 文件名见 [`crate::consts::files`].

use std::path::{Path, PathBuf};

use crate::consts::{
    files, ANIMATION_PREFIX, FRAME_INDEX_WIDTH, FRAME_SUFFIX, TRAJECTORY_SUFFIX,
};

mod flow_loader;
pub mod textmat;

pub use flow_loader::{spider_flow_name, DirFlowLoader, FlowFilenameBuilder};

/// 获取 `{用户主目录}/flexdata` 目录.
pub fn home_flex_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("flexdata");
    Some(ans)
}

/// 获取 `{用户主目录}/flexdata` 目录下给定继续项组成的全路径.
pub fn home_flex_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("flexdata");
    ans.extend(it);
    Some(ans)
}

/// 运行目录下各文件的路径.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    /// 以 `root` 为运行目录.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 运行目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// 降维结果矩阵.
    pub fn output_matrix(&self) -> PathBuf {
        self.file(files::OUTPUT_MATRIX)
    }

    /// 原始形变向量矩阵.
    pub fn deformations(&self) -> PathBuf {
        self.file(files::DEFORMATIONS)
    }

    /// 线性投影矩阵.
    pub fn projector(&self) -> PathBuf {
        self.file(files::PROJECTOR)
    }

    /// PCA 模型.
    pub fn pca_model(&self) -> PathBuf {
        self.file(files::PCA_MODEL)
    }

    /// 默认参考体数据.
    pub fn reference(&self) -> PathBuf {
        self.file(files::REFERENCE)
    }

    /// 默认光流目录.
    pub fn flow_dir(&self) -> PathBuf {
        self.file(files::OPTICAL_FLOWS_DIR)
    }

    /// ChimeraX 控制脚本.
    pub fn chimera_script(&self) -> PathBuf {
        self.file(files::CHIMERA_SCRIPT)
    }

    /// 名为 `name` 的动画在运行目录下的目录名, 即 `animation_<name>`.
    #[inline]
    pub fn animation_stem(name: &str) -> String {
        format!("{ANIMATION_PREFIX}{name}")
    }

    /// 名为 `name` 的动画目录.
    pub fn animation_dir(&self, name: &str) -> PathBuf {
        self.file(&Self::animation_stem(name))
    }

    /// 第 `index` 帧 (从 0 开始) 的文件路径.
    pub fn frame_path(&self, name: &str, index: usize) -> PathBuf {
        let stem = Self::animation_stem(name);
        let mut ans = self.file(&stem);
        ans.push(format!(
            "{stem}{index:0width$}{FRAME_SUFFIX}",
            width = FRAME_INDEX_WIDTH
        ));
        ans
    }

    /// 动画轨迹文件路径.
    pub fn trajectory_path(&self, name: &str) -> PathBuf {
        let stem = Self::animation_stem(name);
        let mut ans = self.file(&stem);
        ans.push(format!("{stem}{TRAJECTORY_SUFFIX}"));
        ans
    }

    /// 聚类选择结果文件路径.
    pub fn cluster_file(&self, name: &str) -> PathBuf {
        self.file(&format!("cluster_{name}.txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::RunPaths;
    use std::path::Path;

    #[test]
    fn test_animation_layout() {
        let p = RunPaths::new("/run");
        assert_eq!(
            p.frame_path("walk", 7),
            Path::new("/run/animation_walk/animation_walk007deformed_by_opflow.vol")
        );
        assert_eq!(
            p.frame_path("walk", 1234),
            Path::new("/run/animation_walk/animation_walk1234deformed_by_opflow.vol")
        );
        assert_eq!(
            p.trajectory_path("walk"),
            Path::new("/run/animation_walk/animation_walktrajectory.txt")
        );
        assert_eq!(p.animation_dir("walk"), Path::new("/run/animation_walk"));
    }

    #[test]
    fn test_run_files() {
        let p = RunPaths::new("/run");
        assert_eq!(p.output_matrix(), Path::new("/run/output_matrix.txt"));
        assert_eq!(p.deformations(), Path::new("/run/deformations.txt"));
        assert_eq!(p.chimera_script(), Path::new("/run/chimera.cxc"));
        assert_eq!(p.flow_dir(), Path::new("/run/optical_flows"));
        assert_eq!(p.cluster_file("a"), Path::new("/run/cluster_a.txt"));
    }
}
