//! Read-only access to FITS containers through `fitsrs`.
//!
//! HDUs are decoded in file order and kept with the path they came from, so
//! errors can name the file. Callers that only need the leading HDUs (the
//! primary header of a snapshot, or a series' cadence column) stop early with
//! [`FitsFile::open_leading`] and never read the rest of the file.

pub mod header;
pub mod table;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use fitsrs::fits::Fits;
use fitsrs::hdu::HDU;

pub use header::{Header, HeaderValue};
pub use table::{BinTable, Column, ColumnSpec};

use crate::error::{Error, Result};
use table::{Cell, TableData};

/// One header/data unit.
#[derive(Debug)]
pub struct Hdu {
    pub header: Header,
    table: Option<TableData>,
}

impl Hdu {
    pub fn is_table(&self) -> bool {
        self.table.is_some()
    }
}

/// A decoded FITS file.
#[derive(Debug)]
pub struct FitsFile {
    path: PathBuf,
    hdus: Vec<Hdu>,
}

impl FitsFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_leading(path, usize::MAX)
    }

    /// Decodes at most `count` HDUs from the start of the file.
    pub fn open_leading(path: impl AsRef<Path>, count: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut fits = Fits::from_reader(BufReader::new(file));

        let mut hdus = Vec::new();
        while hdus.len() < count {
            let hdu = match fits.next() {
                None => break,
                Some(Ok(hdu)) => hdu,
                Some(Err(e)) => {
                    return Err(Error::format(path, format!("HDU {}: {:?}", hdus.len(), e)));
                }
            };
            let decoded = match hdu {
                HDU::Primary(hdu) | HDU::XImage(hdu) => Hdu {
                    header: Header::new(move |k| {
                        hdu.get_header().get(k).and_then(HeaderValue::from_card)
                    }),
                    table: None,
                },
                HDU::XBinaryTable(hdu) => {
                    let cells: Vec<Cell> = fits.get_data(&hdu).map(Cell::from).collect();
                    let header = Header::new(move |k| {
                        hdu.get_header().get(k).and_then(HeaderValue::from_card)
                    });
                    let table = TableData::decode(path, &header, cells)?;
                    Hdu {
                        header,
                        table: Some(table),
                    }
                }
                _ => Hdu {
                    header: Header::default(),
                    table: None,
                },
            };
            hdus.push(decoded);
        }

        if hdus.is_empty() {
            return Err(Error::format(path, "file contains no HDUs"));
        }
        Ok(Self {
            path: path.to_path_buf(),
            hdus,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_hdus(&self) -> usize {
        self.hdus.len()
    }

    pub fn hdus(&self) -> impl Iterator<Item = &Hdu> {
        self.hdus.iter()
    }

    pub fn hdu(&self, index: usize) -> Result<&Hdu> {
        self.hdus.get(index).ok_or_else(|| {
            Error::format(
                &self.path,
                format!("HDU {} requested but file has {}", index, self.hdus.len()),
            )
        })
    }

    /// `open_leading` guarantees at least one HDU.
    pub fn primary(&self) -> &Header {
        &self.hdus[0].header
    }

    pub fn bintable(&self, index: usize) -> Result<BinTable<'_>> {
        match &self.hdu(index)?.table {
            Some(data) => Ok(BinTable::new(&self.path, data)),
            None => Err(Error::format(
                &self.path,
                format!("HDU {index} is not a binary table"),
            )),
        }
    }

    /// The extension whose MODULE and OUTPUT keywords match.
    pub fn find_module_output(&self, module: i32, output: i32) -> Result<BinTable<'_>> {
        let found = self.hdus.iter().enumerate().skip(1).find(|(_, hdu)| {
            hdu.header.get_i64("MODULE") == Some(i64::from(module))
                && hdu.header.get_i64("OUTPUT") == Some(i64::from(output))
        });
        match found {
            Some((index, _)) => self.bintable(index),
            None => Err(Error::format(
                &self.path,
                format!("no extension for module/output {module}/{output}"),
            )),
        }
    }

    pub fn keyword_i64(&self, hdu: usize, keyword: &str) -> Result<i64> {
        self.hdu(hdu)?.header.get_i64(keyword).ok_or_else(|| {
            Error::format(
                &self.path,
                format!("missing or non-integer {keyword} in HDU {hdu}"),
            )
        })
    }

    pub fn keyword_i32(&self, hdu: usize, keyword: &str) -> Result<i32> {
        let v = self.keyword_i64(hdu, keyword)?;
        i32::try_from(v)
            .map_err(|_| Error::format(&self.path, format!("{keyword} = {v} is out of range")))
    }

    pub fn keyword_str(&self, hdu: usize, keyword: &str) -> Result<String> {
        self.hdu(hdu)?.header.get_str(keyword).ok_or_else(|| {
            Error::format(
                &self.path,
                format!("missing or non-string {keyword} in HDU {hdu}"),
            )
        })
    }
}
