//! Partition file encoder/decoder: one block id per line, one line per
//! vertex.

use std::fmt;
use std::io;
use std::io::BufRead as _;
use std::io::Write as _;
use std::num;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    BadInteger { lineno: usize, err: num::ParseIntError },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(_) => write!(f, "read/write error"),
            Error::BadInteger { lineno, .. } => write!(f, "at line {lineno}: expected a block id"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::BadInteger { err, .. } => Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Wrapping `r` in a [`io::BufReader`] is recommended.
pub fn read<R>(r: R) -> Result<Vec<i32>>
where
    R: io::Read,
{
    let mut partition = Vec::new();
    for (i, line) in io::BufReader::new(r).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let block = line.parse().map_err(|err| Error::BadInteger {
            lineno: i + 1,
            err,
        })?;
        partition.push(block);
    }
    Ok(partition)
}

/// Wrapping `w` in a [`io::BufWriter`] is recommended.
pub fn write<I, W>(mut w: W, partition: I) -> Result<()>
where
    I: IntoIterator<Item = i32>,
    W: io::Write,
{
    for block in partition {
        writeln!(w, "{block}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let partition = vec![0, 1, 1, 0, 2];
        let mut buffer = Vec::new();
        write(&mut buffer, partition.iter().copied()).unwrap();
        assert_eq!(buffer, b"0\n1\n1\n0\n2\n");
        assert_eq!(read(buffer.as_slice()).unwrap(), partition);
    }

    #[test]
    fn rejects_garbage() {
        let err = read("0\nx\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BadInteger { lineno: 2, .. }));
    }
}
