//! Binary-table (`XTENSION = 'BINTABLE'`) columns.
//!
//! `fitsrs` yields table cells one element at a time in row order. They are
//! gathered into positional columns using the `TFORMn` repeat counts, and read
//! back as typed vectors, widening where a caller asks for a wider type.

use std::path::Path;

use fitsrs::hdu::data::bintable::DataValue;

use crate::error::{Error, Result};

use super::header::Header;

/// One column definition from `TFORMn`/`TTYPEn`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: Option<String>,
    pub code: char,
    pub repeat: usize,
}

/// Parse a `TFORM` value such as `1J`, `E` or `1024E`.
pub fn parse_tform(tform: &str) -> Option<(usize, char)> {
    let tform = tform.trim();
    let digits = tform.chars().take_while(|c| c.is_ascii_digit()).count();
    let repeat = if digits == 0 {
        1
    } else {
        tform[..digits].parse().ok()?
    };
    let code = tform[digits..].chars().next()?;
    match code {
        'L' | 'B' | 'I' | 'J' | 'K' | 'E' | 'D' | 'A' => Some((repeat, code)),
        _ => None,
    }
}

/// One table element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Logical(bool),
    Char(char),
    Unsupported,
}

impl From<DataValue> for Cell {
    fn from(value: DataValue) -> Self {
        match value {
            DataValue::Logical { value, .. } => Cell::Logical(value),
            DataValue::UnsignedByte { value, .. } => Cell::Int(i64::from(value)),
            DataValue::Short { value, .. } => Cell::Int(i64::from(value)),
            DataValue::Integer { value, .. } => Cell::Int(i64::from(value)),
            DataValue::Long { value, .. } => Cell::Int(value),
            DataValue::Float { value, .. } => Cell::Float(f64::from(value)),
            DataValue::Double { value, .. } => Cell::Float(value),
            DataValue::Character { value, .. } => Cell::Char(value),
            _ => Cell::Unsupported,
        }
    }
}

/// Decoded values of one column, row-major with `repeat` elements per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<T> {
    pub repeat: usize,
    pub values: Vec<T>,
}

impl<T> Column<T> {
    /// Elements belonging to row `i`.
    pub fn row(&self, i: usize) -> Option<&[T]> {
        let start = i.checked_mul(self.repeat)?;
        self.values.get(start..start + self.repeat)
    }

    pub fn rows(&self) -> usize {
        if self.repeat == 0 {
            0
        } else {
            self.values.len() / self.repeat
        }
    }
}

/// Columns of one binary-table HDU.
#[derive(Debug, Clone)]
pub(crate) struct TableData {
    rows: usize,
    columns: Vec<ColumnSpec>,
    cells: Vec<Vec<Cell>>,
}

impl TableData {
    /// Distributes `cells` over the columns described by `header`.
    pub(crate) fn decode(
        path: &Path,
        header: &Header,
        cells: impl IntoIterator<Item = Cell>,
    ) -> Result<Self> {
        let get = |key: &str| -> Result<usize> {
            header
                .get_i64(key)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| Error::format(path, format!("missing or invalid {key}")))
        };
        let rows = get("NAXIS2")?;
        let tfields = get("TFIELDS")?;

        let mut columns = Vec::with_capacity(tfields);
        for n in 1..=tfields {
            let tform = header
                .get_str(&format!("TFORM{n}"))
                .ok_or_else(|| Error::format(path, format!("missing TFORM{n}")))?;
            let (repeat, code) = parse_tform(&tform)
                .ok_or_else(|| Error::format(path, format!("unsupported TFORM{n} '{tform}'")))?;
            columns.push(ColumnSpec {
                name: header.get_str(&format!("TTYPE{n}")),
                code,
                repeat,
            });
        }

        let mut out: Vec<Vec<Cell>> = columns
            .iter()
            .map(|c| Vec::with_capacity(rows * c.repeat))
            .collect();
        let slots: Vec<usize> = columns
            .iter()
            .enumerate()
            .flat_map(|(i, c)| std::iter::repeat(i).take(c.repeat))
            .collect();
        if !slots.is_empty() {
            for (n, cell) in cells.into_iter().enumerate() {
                out[slots[n % slots.len()]].push(cell);
            }
        }
        for (spec, values) in columns.iter().zip(&out) {
            if values.len() != rows * spec.repeat {
                return Err(Error::format(
                    path,
                    format!(
                        "binary table data is truncated: column {} has {} of {} values",
                        spec.name.as_deref().unwrap_or("unnamed"),
                        values.len(),
                        rows * spec.repeat
                    ),
                ));
            }
        }
        Ok(Self {
            rows,
            columns,
            cells: out,
        })
    }
}

/// A binary-table HDU borrowed from its file.
#[derive(Debug)]
pub struct BinTable<'a> {
    path: &'a Path,
    data: &'a TableData,
}

impl<'a> BinTable<'a> {
    pub(crate) fn new(path: &'a Path, data: &'a TableData) -> Self {
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    pub fn rows(&self) -> usize {
        self.data.rows
    }

    pub fn num_columns(&self) -> usize {
        self.data.columns.len()
    }

    pub fn column_spec(&self, index: usize) -> Option<&ColumnSpec> {
        self.data.columns.get(index)
    }

    fn column(&self, index: usize) -> Result<(&ColumnSpec, &[Cell])> {
        match (self.data.columns.get(index), self.data.cells.get(index)) {
            (Some(spec), Some(cells)) => Ok((spec, cells)),
            _ => Err(Error::format(
                self.path,
                format!(
                    "column {} requested but table has {} columns",
                    index,
                    self.data.columns.len()
                ),
            )),
        }
    }

    fn wrong_type(&self, index: usize, spec: &ColumnSpec, wanted: &str) -> Error {
        Error::format(
            self.path,
            format!(
                "column {} ({}) has type '{}', expected {}",
                index,
                spec.name.as_deref().unwrap_or("unnamed"),
                spec.code,
                wanted
            ),
        )
    }

    fn convert<T>(
        &self,
        index: usize,
        wanted: &str,
        f: impl Fn(Cell) -> Option<T>,
    ) -> Result<Column<T>> {
        let (spec, cells) = self.column(index)?;
        let values = cells
            .iter()
            .map(|&c| f(c))
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| self.wrong_type(index, spec, wanted))?;
        Ok(Column {
            repeat: spec.repeat,
            values,
        })
    }

    /// Integer column within `i32` range.
    pub fn read_i32(&self, index: usize) -> Result<Column<i32>> {
        self.convert(index, "an integer type", |c| match c {
            Cell::Int(v) => i32::try_from(v).ok(),
            _ => None,
        })
    }

    /// Float column, or widened integers.
    pub fn read_f32(&self, index: usize) -> Result<Column<f32>> {
        self.convert(index, "a numeric type", |c| match c {
            Cell::Float(v) => Some(v as f32),
            Cell::Int(v) => Some(v as f32),
            _ => None,
        })
    }

    pub fn read_f64(&self, index: usize) -> Result<Column<f64>> {
        self.convert(index, "a numeric type", |c| match c {
            Cell::Float(v) => Some(v),
            Cell::Int(v) => Some(v as f64),
            _ => None,
        })
    }

    /// Logical column; integer columns read as nonzero.
    pub fn read_bool(&self, index: usize) -> Result<Column<bool>> {
        self.convert(index, "a logical type", |c| match c {
            Cell::Logical(b) => Some(b),
            Cell::Int(v) => Some(v != 0),
            _ => None,
        })
    }

    /// Character column, one trimmed string per row.
    pub fn read_str(&self, index: usize) -> Result<Vec<String>> {
        let chars = self.convert(index, "a character type", |c| match c {
            Cell::Char(ch) => Some(ch),
            _ => None,
        })?;
        Ok((0..self.rows())
            .filter_map(|r| chars.row(r))
            .map(|row| {
                row.iter()
                    .collect::<String>()
                    .trim_end_matches(['\0', ' '])
                    .to_string()
            })
            .collect())
    }
}
