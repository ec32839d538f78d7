// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt::Write;

/// Formats into a fixed, caller-owned buffer
///
/// Output that does not fit is dropped; writing never fails.
pub struct TruncatingWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> TruncatingWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Number of bytes written into the buffer.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Write for TruncatingWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let Some(remaining) = self.buf.get_mut(self.len..) else {
            return Ok(());
        };

        // Never cut a character in half
        let mut n = s.len().min(remaining.len());
        while !s.is_char_boundary(n) {
            n -= 1;
        }

        if let (Some(dst), Some(src)) = (remaining.get_mut(..n), s.as_bytes().get(..n)) {
            dst.copy_from_slice(src);
            self.len += n;
        }

        Ok(())
    }
}
