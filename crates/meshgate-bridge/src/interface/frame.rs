//! Radio stream framing
//!
//! Every protobuf travelling over the serial or TCP stream is framed as:
//! - 2 bytes: magic `0x94 0xC3`
//! - 2 bytes: payload length (big-endian, at most 512)
//! - N bytes: protobuf payload
//!
//! Anything between frames is device console output and is discarded.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{GatewayError, Result};

/// Frame start marker
pub const FRAME_MAGIC: u16 = 0x94C3;

/// Largest payload a frame may carry
pub const MAX_FRAME_LEN: usize = 512;

/// Bytes sent before the first frame to wake a sleeping radio
pub const WAKE_PREAMBLE: [u8; 32] = [0xC3; 32];

const HEADER_LEN: usize = 4;

/// Frame a payload with the stream header
pub fn frame_packet(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(GatewayError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Incremental frame decoder
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN * 2),
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Take the next complete frame payload
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. A header declaring
    /// an oversized payload is skipped and reported as
    /// [`GatewayError::FrameTooLarge`]; decoding can continue afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let magic = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
        if magic != FRAME_MAGIC {
            if let Some(pos) = self.find_magic() {
                trace!(discarded = pos, "Discarding bytes before frame magic");
                self.buffer.advance(pos);
            } else {
                // Keep a trailing 0x94, it may start the next header
                let keep = usize::from(self.buffer.last() == Some(&0x94));
                let discard = self.buffer.len() - keep;
                if discard > 0 {
                    trace!(discarded = discard, "Discarding unframed bytes");
                    self.buffer.advance(discard);
                }
                return Ok(None);
            }

            if self.buffer.len() < HEADER_LEN {
                return Ok(None);
            }
        }

        let length = u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize;
        if length > MAX_FRAME_LEN {
            self.buffer.advance(2);
            return Err(GatewayError::FrameTooLarge {
                len: length,
                max: MAX_FRAME_LEN,
            });
        }

        let total = HEADER_LEN + length;
        if self.buffer.len() < total {
            trace!(have = self.buffer.len(), need = total, "Waiting for complete frame");
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(total);
        frame.advance(HEADER_LEN);
        debug!(size = frame.len(), "Received complete frame");
        Ok(Some(frame.freeze()))
    }

    fn find_magic(&self) -> Option<usize> {
        self.buffer.windows(2).position(|w| w == [0x94, 0xC3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_packet() {
        let framed = frame_packet(b"hello").unwrap();
        assert_eq!(framed[0], 0x94);
        assert_eq!(framed[1], 0xC3);
        assert_eq!(u16::from_be_bytes([framed[2], framed[3]]), 5);
        assert_eq!(&framed[4..], b"hello");
    }

    #[test]
    fn test_frame_too_large() {
        let err = frame_packet(&[0u8; MAX_FRAME_LEN + 1]).unwrap_err();
        assert!(matches!(err, GatewayError::FrameTooLarge { len: 513, .. }));
    }

    #[test]
    fn test_parse_complete_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame_packet(b"test").unwrap());

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"test");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_parse_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x94, 0xC3, 0x00, 0x05]);

        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 4);

        decoder.extend(b"abcde");
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"abcde");
    }

    #[test]
    fn test_skip_console_output_before_magic() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"INFO | booting\r\n");
        decoder.extend(&WAKE_PREAMBLE);
        decoder.extend(&frame_packet(b"test").unwrap());

        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"test");
    }

    #[test]
    fn test_trailing_magic_byte_is_kept() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"noise\x94");
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 1);

        decoder.extend(&[0xC3, 0x00, 0x02, b'o', b'k']);
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn test_oversized_header_is_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x94, 0xC3, 0xFF, 0xFF]);
        decoder.extend(&frame_packet(b"next").unwrap());

        assert!(decoder.next_frame().is_err());
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"next");
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame_packet(b"one").unwrap());
        decoder.extend(&frame_packet(b"two").unwrap());

        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"one");
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"two");
        assert!(decoder.next_frame().unwrap().is_none());
    }
}
