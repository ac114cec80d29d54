//! Writing collocation records.
//!
//! The collocation file is plain text with one record per line. Runs always append, so a series
//! of runs over consecutive periods builds up a single file.

use crate::{collocate::CollocationRecord, error::FluxValResult};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
};

/// A collocation file opened for appending.
pub struct CollocationFile(BufWriter<File>);

impl CollocationFile {
    /// Open a file for appending, creating it if needed.
    pub fn append<P: AsRef<Path>>(pth: P) -> FluxValResult<Self> {
        let f = OpenOptions::new().create(true).append(true).open(pth.as_ref())?;
        Ok(CollocationFile(BufWriter::new(f)))
    }
}

impl CollocationWriter for CollocationFile {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.0
    }
}

impl Drop for CollocationFile {
    fn drop(&mut self) {
        if let Err(err) = self.0.flush() {
            log::error!("error flushing collocation file: {}", err);
        }
    }
}

pub trait CollocationWriter {
    fn output(&mut self) -> &mut dyn Write;

    /// Write a single record on its own line.
    fn write_record(&mut self, record: &CollocationRecord) -> FluxValResult<()> {
        writeln!(self.output(), "{}", record)?;
        Ok(())
    }

    /// Write records in order, returning how many were written.
    fn write_records(&mut self, records: &[CollocationRecord]) -> FluxValResult<usize> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(records.len())
    }

    fn flush(&mut self) -> FluxValResult<()> {
        self.output().flush()?;
        Ok(())
    }
}

impl CollocationWriter for Vec<u8> {
    fn output(&mut self) -> &mut dyn Write {
        self
    }
}
