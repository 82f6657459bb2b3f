//! Decoder for the hMetis-like hypergraph format.
//!
//! The header line is `m n [fmt]`, where `fmt` is a two-digit flag: a set
//! tens digit means hyperedge weights are present, a set ones digit means
//! vertex weights are. The next `m` lines each hold one hyperedge,
//! `[w_e] p1 p2 ... pk` with 1-based pin ids; if vertex weights are
//! present, `n` more lines follow with one weight each. Lines starting
//! with `%` are comments.

use std::error;
use std::fmt;
use std::io;
use std::io::BufRead as _;
use std::num;

#[derive(Debug)]
pub enum ErrorKind {
    Io(io::Error),
    BadInteger(num::ParseIntError),
    BadHeader,
    PinOutOfRange { pin: u64, num_nodes: u64 },
    EmptyHyperedge,
    NonPositiveWeight(i64),
    TooFewLines,
}

/// A decoding failure, with the 1-based line it happened on.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub lineno: usize,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io(err) => write!(f, "io error: {err}"),
            ErrorKind::BadInteger(err) => write!(f, "when parsing integer: {err}"),
            ErrorKind::BadHeader => write!(f, "expected header \"m n [fmt]\""),
            ErrorKind::PinOutOfRange { pin, num_nodes } => {
                write!(f, "pin {pin} out of range (vertices are 1..={num_nodes})")
            }
            ErrorKind::EmptyHyperedge => write!(f, "hyperedge has no pins"),
            ErrorKind::NonPositiveWeight(w) => write!(f, "non-positive weight {w}"),
            ErrorKind::TooFewLines => write!(f, "file ends before all entities are declared"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at line {}: {}", self.lineno, self.kind)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(err) => Some(err),
            ErrorKind::BadInteger(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error {
            kind: ErrorKind::Io(err),
            lineno: 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A decoded hypergraph file: hyperedges as pin lists with 0-based ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HypergraphFile {
    pub num_nodes: usize,
    /// One `(weight, pins)` entry per hyperedge; unit weights when the
    /// format flag says none are present.
    pub edges: Vec<(i64, Vec<u32>)>,
    /// One weight per vertex; unit weights when absent.
    pub node_weights: Vec<i64>,
}

struct Lines<R> {
    reader: R,
    buffer: String,
    lineno: usize,
}

impl<R: io::BufRead> Lines<R> {
    /// The next non-comment, non-blank line.
    fn next(&mut self) -> Result<Option<(&str, usize)>> {
        loop {
            self.buffer.clear();
            let read = self.reader.read_line(&mut self.buffer).map_err(|err| Error {
                kind: ErrorKind::Io(err),
                lineno: self.lineno + 1,
            })?;
            if read == 0 {
                return Ok(None);
            }
            self.lineno += 1;
            let line = self.buffer.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }
            // Reborrow through the field to end the loop borrow.
            let line = self.buffer.trim();
            return Ok(Some((line, self.lineno)));
        }
    }
}

fn parse_int<T: std::str::FromStr<Err = num::ParseIntError>>(
    token: &str,
    lineno: usize,
) -> Result<T> {
    token.parse().map_err(|err| Error {
        kind: ErrorKind::BadInteger(err),
        lineno,
    })
}

/// Wrapping `r` in a [`io::BufReader`] is recommended.
pub fn read<R>(r: R) -> Result<HypergraphFile>
where
    R: io::Read,
{
    let mut lines = Lines {
        reader: io::BufReader::new(r),
        buffer: String::new(),
        lineno: 0,
    };

    let (header, lineno) = lines.next()?.ok_or(Error {
        kind: ErrorKind::TooFewLines,
        lineno: 1,
    })?;
    let mut tokens = header.split_whitespace();
    let (Some(m), Some(n)) = (tokens.next(), tokens.next()) else {
        return Err(Error {
            kind: ErrorKind::BadHeader,
            lineno,
        });
    };
    let m: u64 = parse_int(m, lineno)?;
    let n: u64 = parse_int(n, lineno)?;
    let fmt: u32 = match tokens.next() {
        Some(token) => parse_int(token, lineno)?,
        None => 0,
    };
    if tokens.next().is_some() || fmt > 11 || fmt % 10 > 1 {
        return Err(Error {
            kind: ErrorKind::BadHeader,
            lineno,
        });
    }
    let has_edge_weights = fmt / 10 == 1;
    let has_node_weights = fmt % 10 == 1;

    let mut edges = Vec::with_capacity(m as usize);
    for _ in 0..m {
        let (line, lineno) = lines.next()?.ok_or(Error {
            kind: ErrorKind::TooFewLines,
            lineno: 0,
        })?;
        let mut tokens = line.split_whitespace();
        let weight = if has_edge_weights {
            let token = tokens.next().ok_or(Error {
                kind: ErrorKind::EmptyHyperedge,
                lineno,
            })?;
            let weight: i64 = parse_int(token, lineno)?;
            if weight <= 0 {
                return Err(Error {
                    kind: ErrorKind::NonPositiveWeight(weight),
                    lineno,
                });
            }
            weight
        } else {
            1
        };
        let mut pins = Vec::new();
        for token in tokens {
            let pin: u64 = parse_int(token, lineno)?;
            if pin == 0 || pin > n {
                return Err(Error {
                    kind: ErrorKind::PinOutOfRange { pin, num_nodes: n },
                    lineno,
                });
            }
            pins.push((pin - 1) as u32);
        }
        if pins.is_empty() {
            return Err(Error {
                kind: ErrorKind::EmptyHyperedge,
                lineno,
            });
        }
        edges.push((weight, pins));
    }

    let mut node_weights = Vec::with_capacity(n as usize);
    if has_node_weights {
        for _ in 0..n {
            let (line, lineno) = lines.next()?.ok_or(Error {
                kind: ErrorKind::TooFewLines,
                lineno: 0,
            })?;
            let weight: i64 = parse_int(line.split_whitespace().next().unwrap_or(""), lineno)?;
            if weight <= 0 {
                return Err(Error {
                    kind: ErrorKind::NonPositiveWeight(weight),
                    lineno,
                });
            }
            node_weights.push(weight);
        }
    } else {
        node_weights.resize(n as usize, 1);
    }

    Ok(HypergraphFile {
        num_nodes: n as usize,
        edges,
        node_weights,
    })
}
