//! Block-data framing and mode switching.

use super::{ObjectInputStream, TC_BASE, TC_BLOCKDATA, TC_BLOCKDATALONG, TC_MAX, TC_RESET};
use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

impl ObjectInputStream {
    /// Switches block-data mode and returns the previous mode
    ///
    /// Leaving block-data mode with unread block bytes is an
    /// [`Error::IllegalMode`].
    pub(crate) fn set_block_data_mode(&mut self, mode: bool) -> Result<bool> {
        if self.block_mode == mode {
            return Ok(mode);
        }
        if !mode && self.remaining > 0 {
            return Err(Error::illegal_mode(format!(
                "{} bytes of block data left unread",
                self.remaining
            )));
        }
        self.remaining = 0;
        self.block_mode = mode;
        Ok(!mode)
    }

    /// Whether the current class data ended at its declared fields
    pub(crate) fn default_end_data(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.default_end_data)
    }

    /// Looks at the next readable byte without consuming it
    ///
    /// In block-data mode this refills from the next block header and yields
    /// `None` when no block data follows.
    pub(crate) fn peek1(&mut self) -> Result<Option<u8>> {
        if self.block_mode && self.remaining == 0 {
            self.refill()?;
            if self.remaining == 0 {
                return Ok(None);
            }
        }
        Ok(self.data.get(self.offset).copied())
    }

    /// Like [`peek1`](Self::peek1), but running out of input is an error
    pub(crate) fn peek_byte(&mut self) -> Result<u8> {
        self.peek1()?.ok_or(Error::UnexpectedEof {
            offset: self.offset,
        })
    }

    fn refill(&mut self) -> Result<()> {
        loop {
            match self.read_block_header()? {
                None => return Ok(()),
                Some(0) => continue,
                Some(len) => {
                    if self.data.len() - self.offset < len {
                        return Err(Error::stream_corrupted(
                            self.offset,
                            "unexpected EOF in middle of data block",
                        ));
                    }
                    trace!("Entered block of {} bytes at offset {}", len, self.offset);
                    self.remaining = len;
                    return Ok(());
                }
            }
        }
    }

    fn read_block_header(&mut self) -> Result<Option<usize>> {
        if self.default_end_data() {
            return Ok(None);
        }
        let old = self.set_block_data_mode(false)?;
        let header = self.read_block_header_raw();
        self.set_block_data_mode(old)?;
        header
    }

    fn read_block_header_raw(&mut self) -> Result<Option<usize>> {
        loop {
            let offset = self.offset;
            match self.peek1()? {
                Some(TC_RESET) => self.read_reset()?,
                Some(TC_BLOCKDATA) => {
                    self.offset += 1;
                    return Ok(Some(self.read_unsigned_byte()? as usize));
                }
                Some(TC_BLOCKDATALONG) => {
                    self.offset += 1;
                    let len = self.read_int()?;
                    return usize::try_from(len).map(Some).map_err(|_| {
                        Error::stream_corrupted(offset, format!("illegal block data header length: {len}"))
                    });
                }
                Some(tc) if !(TC_BASE..=TC_MAX).contains(&tc) => {
                    return Err(Error::stream_corrupted(
                        offset,
                        format!("invalid type code: {:02X}", tc),
                    ));
                }
                _ => return Ok(None),
            }
        }
    }

    /// Consumes a reset marker and clears the handle table
    pub(crate) fn read_reset(&mut self) -> Result<()> {
        self.read_tc()?;
        self.handles.reset();
        debug!("Handle table reset at offset {}", self.offset);
        Ok(())
    }

    /// Consumes one raw tag byte
    pub(crate) fn read_tc(&mut self) -> Result<u8> {
        let tc = self.data.get(self.offset).copied().ok_or(Error::UnexpectedEof {
            offset: self.offset,
        })?;
        self.offset += 1;
        Ok(tc)
    }

    /// Reads up to `len` bytes
    ///
    /// In block-data mode the read spans consecutive blocks and stops at the
    /// first non-block content; otherwise it stops at the end of the input.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        if !self.block_mode {
            let n = len.min(self.data.len() - self.offset);
            let bytes = self.data.slice(self.offset..self.offset + n);
            self.offset += n;
            return Ok(bytes);
        }

        let mut chunks: Vec<Bytes> = Vec::new();
        let mut left = len;
        while left > 0 && self.peek1()?.is_some() {
            let n = left.min(self.remaining);
            chunks.push(self.data.slice(self.offset..self.offset + n));
            self.offset += n;
            self.remaining -= n;
            left -= n;
        }
        if chunks.len() <= 1 {
            return Ok(chunks.pop().unwrap_or_default());
        }
        let total: usize = chunks.iter().map(Bytes::len).sum();
        let mut joined = BytesMut::with_capacity(total);
        for chunk in &chunks {
            joined.extend_from_slice(chunk);
        }
        Ok(joined.freeze())
    }

    /// Reads exactly `len` bytes
    pub fn read_fully(&mut self, len: usize) -> Result<Bytes> {
        let bytes = self.read_bytes(len)?;
        if bytes.len() < len {
            return Err(Error::UnexpectedEof {
                offset: self.offset,
            });
        }
        Ok(bytes)
    }

    /// Reads exactly `N` bytes without allocating
    pub(crate) fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        let mut filled = 0;
        while filled < N {
            let available = if self.block_mode {
                if self.peek1()?.is_none() {
                    break;
                }
                self.remaining
            } else {
                self.data.len() - self.offset
            };
            let n = available.min(N - filled);
            if n == 0 {
                break;
            }
            buf[filled..filled + n].copy_from_slice(&self.data[self.offset..self.offset + n]);
            self.offset += n;
            if self.block_mode {
                self.remaining -= n;
            }
            filled += n;
        }
        if filled < N {
            return Err(Error::UnexpectedEof {
                offset: self.offset,
            });
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stream(body: &[u8]) -> ObjectInputStream {
        let mut data = vec![0xAC, 0xED, 0x00, 0x05];
        data.extend_from_slice(body);
        ObjectInputStream::new(data).unwrap()
    }

    #[test]
    fn test_read_spans_blocks() {
        let mut s = stream(&[0x77, 2, 1, 2, 0x77, 0, 0x7A, 0, 0, 0, 2, 3, 4]);
        let bytes = s.read_fully(4).unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3, 4]);
        assert!(s.is_at_end());
    }

    #[test]
    fn test_single_block_is_zero_copy() {
        let mut s = stream(&[0x77, 3, 9, 8, 7]);
        let bytes = s.read_bytes(usize::MAX).unwrap();
        assert_eq!(&bytes[..], &[9, 8, 7]);
    }

    #[test]
    fn test_read_stops_at_object() {
        let mut s = stream(&[0x77, 1, 5, 0x70]);
        let bytes = s.read_bytes(10).unwrap();
        assert_eq!(&bytes[..], &[5]);
        assert_eq!(s.peek1().unwrap(), None);
    }

    #[test]
    fn test_truncated_block_is_corrupt() {
        let mut s = stream(&[0x77, 5, 1, 2]);
        assert!(matches!(
            s.read_bytes(1),
            Err(Error::StreamCorrupted { .. })
        ));
    }

    #[test]
    fn test_reset_between_blocks() {
        let mut s = stream(&[0x77, 1, 1, 0x79, 0x77, 1, 2]);
        assert_eq!(&s.read_fully(2).unwrap()[..], &[1, 2]);
        assert_eq!(s.handles().epoch(), 1);
    }

    #[test]
    fn test_leaving_block_mode_with_pending_data() {
        let mut s = stream(&[0x77, 2, 1, 2]);
        s.read_unsigned_byte().unwrap();
        assert!(matches!(
            s.set_block_data_mode(false),
            Err(Error::IllegalMode(_))
        ));
    }

    #[test]
    fn test_invalid_block_tag() {
        let mut s = stream(&[0x69]);
        assert!(matches!(s.peek1(), Err(Error::StreamCorrupted { .. })));
    }
}
