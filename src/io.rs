//! Reading spectra from MGF files and writing search results.
pub mod compression;
pub mod matches;
pub mod mgf;

use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use flate2::bufread::GzDecoder;

use crate::io::compression::is_gzipped;
use crate::peaks::QuerySpectrum;

pub use crate::io::matches::write_matches;
pub use crate::io::mgf::{MgfError, MgfReader, MgfRecord};

/// Open `path` for buffered reading, decompressing it on the fly when it
/// starts with the gzip magic bytes.
pub fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let handle = fs::File::open(path.as_ref())?;
    let mut handle = io::BufReader::new(handle);
    let gzipped = is_gzipped(handle.fill_buf()?);
    if gzipped {
        Ok(Box::new(io::BufReader::new(GzDecoder::new(handle))))
    } else {
        Ok(Box::new(handle))
    }
}

/// Read every query spectrum from the MGF file at `path`, numbering them in file order
pub fn read_queries<P: AsRef<Path>>(path: P) -> Result<Vec<QuerySpectrum>, MgfError> {
    let reader = MgfReader::new(open_path(path)?);
    reader
        .enumerate()
        .map(|(i, record)| record.and_then(|r| r.into_query(i as u64)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    const TEXT: &str = "BEGIN IONS\nTITLE=q1\nPEPMASS=500.0\n100 50\n200 80\nEND IONS\n";

    #[test_log::test]
    fn test_open_plain_and_gzipped() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain = dir.path().join("queries.mgf");
        fs::write(&plain, TEXT)?;

        let zipped = dir.path().join("queries.mgf.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&zipped)?, Compression::default());
        encoder.write_all(TEXT.as_bytes())?;
        encoder.finish()?;

        for path in [plain, zipped] {
            let mut buf = String::new();
            open_path(&path)?.read_to_string(&mut buf)?;
            assert_eq!(buf, TEXT);
        }
        Ok(())
    }

    #[test]
    fn test_read_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.mgf");
        fs::write(&path, TEXT.repeat(2)).unwrap();
        let queries = read_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].id, 1);
        assert_eq!(queries[0].title, "q1");
        assert_eq!(queries[0].peaks.len(), 2);
    }
}
