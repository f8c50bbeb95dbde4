//! 以稠密位移场对体数据进行形变 (warp).
//!
//! 采用反向映射: 输出体素 `(z, y, x)` 的值取自参考体数据在
//! `(z + f_z, y + f_y, x + f_x)` 处的三线性插值, 网格外的采样点视为 0.
//! 位移场按 `[3, Z, Y, X]` 堆叠, 通道 0/1/2 依次为 x/y/z 分量.

use ndarray::{Array3, ArrayView3, ArrayView4, Axis, Zip};

use crate::error::{FlexError, FlexResult};

/// 在 `(z, y, x)` 处对 `vol` 做三线性插值. 网格外的角点按 0 计;
/// 非有限坐标或完全落在网格外的坐标返回 0.
pub fn trilinear(vol: &ArrayView3<f32>, z: f32, y: f32, x: f32) -> f32 {
    if !(z.is_finite() && y.is_finite() && x.is_finite()) {
        return 0.0;
    }
    let (nz, ny, nx) = vol.dim();
    // 所有角点都在网格外. 先于整数转换判断, 避免极大坐标饱和后溢出.
    let outside = |c: f32, n: usize| c <= -1.0 || c >= n as f32;
    if outside(z, nz) || outside(y, ny) || outside(x, nx) {
        return 0.0;
    }
    let (fz, fy, fx) = (z.floor(), y.floor(), x.floor());
    let (dz, dy, dx) = (z - fz, y - fy, x - fx);
    let (z0, y0, x0) = (fz as i64, fy as i64, fx as i64);

    let at = |k: i64, j: i64, i: i64| -> f32 {
        if k < 0 || j < 0 || i < 0 || k >= nz as i64 || j >= ny as i64 || i >= nx as i64 {
            0.0
        } else {
            vol[(k as usize, j as usize, i as usize)]
        }
    };

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

    let c00 = lerp(at(z0, y0, x0), at(z0, y0, x0 + 1), dx);
    let c01 = lerp(at(z0, y0 + 1, x0), at(z0, y0 + 1, x0 + 1), dx);
    let c10 = lerp(at(z0 + 1, y0, x0), at(z0 + 1, y0, x0 + 1), dx);
    let c11 = lerp(at(z0 + 1, y0 + 1, x0), at(z0 + 1, y0 + 1, x0 + 1), dx);

    let c0 = lerp(c00, c01, dy);
    let c1 = lerp(c10, c11, dy);
    lerp(c0, c1, dz)
}

/// 用位移场 `flow` (`[3, Z, Y, X]`) 对 `reference` (`[Z, Y, X]`) 做形变.
///
/// 位移场的网格必须与参考体数据一致, 否则返回 [`FlexError::ShapeMismatch`].
/// 该函数是输入的纯函数, 相同输入总是得到逐位相同的输出.
pub fn warp_by_flow(reference: ArrayView3<f32>, flow: ArrayView4<f32>) -> FlexResult<Array3<f32>> {
    let (nz, ny, nx) = reference.dim();
    if flow.dim() != (3, nz, ny, nx) {
        return Err(FlexError::shape(
            "flow field",
            format!("{:?}", (3, nz, ny, nx)),
            format!("{:?}", flow.dim()),
        ));
    }

    let fx = flow.index_axis(Axis(0), 0);
    let fy = flow.index_axis(Axis(0), 1);
    let fz = flow.index_axis(Axis(0), 2);

    let mut out = Array3::<f32>::zeros((nz, ny, nx));
    Zip::indexed(&mut out)
        .and(&fx)
        .and(&fy)
        .and(&fz)
        .for_each(|(z, y, x), o, &dx, &dy, &dz| {
            *o = trilinear(&reference, z as f32 + dz, y as f32 + dy, x as f32 + dx);
        });
    Ok(out)
}
