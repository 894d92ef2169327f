// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The upstream TCP channel's record framing: ASCII decimal length, `_`,
//! UTF-8 JSON body. [`RecordReader`] is a stateful incremental parser so the
//! receiver loop can feed it whatever a non-blocking read happened to
//! return, including a read that lands mid-frame.

use std::io::{self, Write};

/// Serialize `json` as `"<len>_<json>"` and write it to `out` in one call.
pub fn write_record(out: &mut impl Write, json: &[u8]) -> io::Result<()> {
    let header = format!("{}_", json.len());
    out.write_all(header.as_bytes())?;
    out.write_all(json)?;
    out.flush()
}

/// Accumulates bytes across reads and yields complete JSON bodies once their
/// length prefix and full payload have both arrived.
#[derive(Debug, Default)]
pub struct RecordReader {
    buf: Vec<u8>,
}

impl RecordReader {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete record out of the buffer, if one has fully
    /// arrived. Malformed length prefixes are dropped one byte at a time so
    /// a corrupt stream cannot wedge the parser forever.
    pub fn next_record(&mut self) -> Option<Vec<u8>> {
        loop {
            let underscore = self.buf.iter().position(|&b| b == b'_')?;
            let len_str = std::str::from_utf8(&self.buf[..underscore]).ok();
            let parsed_len = len_str.and_then(|s| s.parse::<usize>().ok());
            let Some(len) = parsed_len else {
                // Not a valid decimal prefix; resync by dropping one byte.
                self.buf.remove(0);
                continue;
            };
            let body_start = underscore + 1;
            if self.buf.len() < body_start + len {
                return None;
            }
            let record = self.buf[body_start..body_start + len].to_vec();
            self.buf.drain(..body_start + len);
            return Some(record);
        }
    }
}
