//! 纯文本矩阵.
//!
//! 与上游降维步骤交换数据所用的格式: 每行一条记录, 数值以空白分隔,
//! `#` 之后为注释, 空行被忽略. 写出时每个数值使用 `%.18e` 格式.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::{Array2, ArrayView2};

use crate::error::{FlexError, FlexResult};

/// 读取文本矩阵. 文件不存在时返回 [`FlexError::MissingInput`].
pub fn read_matrix<P: AsRef<Path>>(path: P) -> FlexResult<Array2<f64>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| FlexError::io(path, e))?;
    read_matrix_from(BufReader::new(file), path)
}

/// 从 `reader` 读取文本矩阵. `path` 仅用于错误信息.
///
/// 所有数据行的列数必须一致, 且至少有一行数据.
pub fn read_matrix_from<R: BufRead>(reader: R, path: &Path) -> FlexResult<Array2<f64>> {
    let parse_err = |line: usize, message: String| FlexError::Parse {
        path: path.to_owned(),
        line,
        message,
    };

    let mut cols = None;
    let mut rows = 0usize;
    let mut values = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|e| FlexError::io(path, e))?;
        let content = line.split('#').next().unwrap_or_default();

        let before = values.len();
        for tok in content.split_whitespace() {
            let v = tok
                .parse::<f64>()
                .map_err(|_| parse_err(line_no, format!("`{tok}` is not a number")))?;
            values.push(v);
        }
        let n = values.len() - before;
        if n == 0 {
            continue;
        }
        match cols {
            None => cols = Some(n),
            Some(c) if c != n => {
                return Err(parse_err(
                    line_no,
                    format!("expected {c} columns, found {n}"),
                ))
            }
            _ => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or_else(|| parse_err(0, "no data rows".to_string()))?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| parse_err(0, e.to_string()))
}

/// 按 `%.18e` 格式化, 与常见科学计算工具的默认文本输出保持一致.
pub(crate) fn format_sci(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{v:.18e}");
    // Rust 的指数格式为 `1.5e-3`, 转换为 `1.5e-03`.
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

/// 写出文本矩阵. 每行一条记录, 数值以单个空格分隔.
pub fn write_matrix<P: AsRef<Path>>(path: P, m: ArrayView2<f64>) -> FlexResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| FlexError::io(path, e))?;
    let mut w = BufWriter::new(file);
    let io = |e| FlexError::io(path, e);
    for row in m.rows() {
        let line = row.iter().map(|v| format_sci(*v)).join(" ");
        writeln!(w, "{line}").map_err(io)?;
    }
    w.flush().map_err(io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Cursor;

    fn parse(s: &str) -> FlexResult<Array2<f64>> {
        read_matrix_from(Cursor::new(s), Path::new("mem.txt"))
    }

    #[test]
    fn test_parse_with_comments_and_blank_lines() {
        let m = parse("# header\n1 2 3\n\n  4\t5 6  # trailing\n").unwrap();
        assert_eq!(m, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_single_column_stays_2d() {
        let m = parse("1\n2\n3\n").unwrap();
        assert_eq!(m.dim(), (3, 1));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        match parse("1 2\n3\n") {
            Err(FlexError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_and_empty() {
        assert!(matches!(parse("1 x\n"), Err(FlexError::Parse { line: 1, .. })));
        assert!(matches!(parse("# nothing\n\n"), Err(FlexError::Parse { line: 0, .. })));
    }

    #[test]
    fn test_format_sci() {
        assert_eq!(format_sci(1.0), "1.000000000000000000e+00");
        assert_eq!(format_sci(150.0), "1.500000000000000000e+02");
        assert_eq!(format_sci(-3.0 / 2048.0), "-1.464843750000000000e-03");
        let big = format_sci(2f64.powi(400));
        assert!(big.starts_with("2.58224987808690") && big.ends_with("e+120"));
        assert_eq!(format_sci(f64::NAN), "nan");
        assert_eq!(format_sci(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_written_matrix_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        let m = array![[0.1, -2.5e-7], [3.0, 1e10]];
        write_matrix(&path, m.view()).unwrap();
        assert_eq!(read_matrix(&path).unwrap(), m);
    }

    #[test]
    fn test_missing_file() {
        let err = read_matrix("/no/such/output_matrix.txt").unwrap_err();
        assert!(matches!(err, FlexError::MissingInput(_)));
    }
}
