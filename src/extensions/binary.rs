// Raw binary input reader, the one reader that ships with the crate

use std::io::Read;

use crate::extensions::provider::{InputReader, InputReaderFactory};

pub const RAW_BINARY_READER_ID: &str = "reader.RawBinary";

/// Passes file contents through untouched.
#[derive(Debug, Default)]
pub struct RawBinaryReaderFactory;

struct RawBinaryReader;

impl InputReader for RawBinaryReader {
    fn read(&mut self, source: &mut dyn Read) -> anyhow::Result<Vec<u8>> {
        let mut payload = Vec::new();
        source.read_to_end(&mut payload)?;
        if payload.is_empty() {
            anyhow::bail!("input is empty");
        }
        Ok(payload)
    }
}

impl InputReaderFactory for RawBinaryReaderFactory {
    fn format_name(&self) -> &str {
        "Raw binary"
    }

    fn file_extensions(&self) -> &[&str] {
        &["bin", "com", "rom"]
    }

    fn create(&self) -> Box<dyn InputReader> {
        Box::new(RawBinaryReader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_everything() {
        let mut reader = RawBinaryReaderFactory.create();
        let payload = reader.read(&mut Cursor::new(vec![0xc3, 0x00, 0x10])).unwrap();
        assert_eq!(payload, vec![0xc3, 0x00, 0x10]);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let mut reader = RawBinaryReaderFactory.create();
        assert!(reader.read(&mut Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_extensions() {
        assert!(RawBinaryReaderFactory.file_extensions().contains(&"bin"));
    }
}
