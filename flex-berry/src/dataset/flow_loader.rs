//! 从目录按样本索引加载光流场.

use std::path::{Path, PathBuf};

use crate::consts::{FlowAxis, FLOW_INDEX_WIDTH};
use crate::error::{FlexError, FlexResult};
use crate::flow::{FlowField, FlowFieldLoader};
use crate::volume::Volume;

/// 文件名构造器. 接受样本索引和光流分量, 获得文件名.
pub type FlowFilenameBuilder = fn(u32, FlowAxis) -> String;

/// 默认文件名: `000001_opflowx.spi`.
pub fn spider_flow_name(index: u32, axis: FlowAxis) -> String {
    format!(
        "{index:0width$}_opflow{}.spi",
        axis.letter(),
        width = FLOW_INDEX_WIDTH
    )
}

/// 光流场加载器, 并在内部自动转换文件名.
#[derive(Debug, Clone)]
pub struct DirFlowLoader {
    path: PathBuf,
    builder: FlowFilenameBuilder,
}

impl DirFlowLoader {
    /// 从目录 `path` 和文件名构造器创建加载器.
    ///
    /// 目录不存在不会立即报错; 第一次加载时返回 [`FlexError::MissingInput`].
    pub fn new<P: AsRef<Path>>(path: P, builder: FlowFilenameBuilder) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            builder,
        }
    }

    /// 使用默认文件名 ([`spider_flow_name`]) 创建加载器.
    #[inline]
    pub fn spider<P: AsRef<Path>>(path: P) -> Self {
        Self::new(path, spider_flow_name)
    }

    /// 光流文件所在目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.path
    }

    fn load_component(&mut self, index: u32, axis: FlowAxis) -> FlexResult<Volume> {
        self.path.push((self.builder)(index, axis));
        let ans = Volume::open(self.path.as_path()).map_err(|e| {
            if e.is_not_found() {
                FlexError::MissingInput(self.path.clone())
            } else {
                FlexError::from(e)
            }
        });
        self.path.pop();
        ans
    }
}

impl FlowFieldLoader for DirFlowLoader {
    fn load(&mut self, index: u32) -> FlexResult<FlowField> {
        let x = self.load_component(index, FlowAxis::X)?;
        let y = self.load_component(index, FlowAxis::Y)?;
        let z = self.load_component(index, FlowAxis::Z)?;
        FlowField::from_components(&x, &y, &z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VoxelGrid;
    use ndarray::Array3;

    #[test]
    fn test_flow_name() {
        assert_eq!(spider_flow_name(1, FlowAxis::X), "000001_opflowx.spi");
        assert_eq!(spider_flow_name(42, FlowAxis::Z), "000042_opflowz.spi");
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        for axis in FlowAxis::ALL {
            let c = axis.channel() as f32;
            let v = Volume::new(Array3::from_elem((2, 3, 4), c + 0.5));
            v.save(dir.path().join(spider_flow_name(1, axis))).unwrap();
        }

        let mut loader = DirFlowLoader::spider(dir.path());
        let f = loader.load(1).unwrap();
        assert_eq!(f.grid(), (2, 3, 4));
        assert_eq!(f.stacked()[(2, 1, 1, 1)], 2.5);
        // 路径在加载后复原.
        assert_eq!(loader.dir(), dir.path());

        match loader.load(2) {
            Err(FlexError::MissingInput(p)) => {
                assert!(p.ends_with("000002_opflowx.spi"))
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(loader.dir(), dir.path());
    }
}
