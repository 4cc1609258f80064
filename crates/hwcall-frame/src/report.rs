//! HID report segmentation.
//!
//! HID transports move frames in fixed 64-byte reports. Each report starts
//! with the `?` report id followed by up to 63 bytes of frame data; the last
//! report of a frame is zero-padded.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{frame_len, DEFAULT_MAX_PAYLOAD, MAGIC};
use crate::error::{FrameError, Result};

/// Size of one HID report on the wire.
pub const REPORT_SIZE: usize = 64;

/// Report id byte leading every report.
pub const REPORT_ID: u8 = b'?';

/// Frame bytes carried per report.
pub const SEGMENT_SIZE: usize = REPORT_SIZE - 1;

/// Split an encoded frame into zero-padded reports.
pub fn segment_reports(frame: &[u8]) -> Vec<[u8; REPORT_SIZE]> {
    frame
        .chunks(SEGMENT_SIZE)
        .map(|chunk| {
            let mut report = [0u8; REPORT_SIZE];
            report[0] = REPORT_ID;
            report[1..=chunk.len()].copy_from_slice(chunk);
            report
        })
        .collect()
}

/// Reassembles reports into complete frames.
///
/// Push reports as they arrive; a complete frame comes back once the header
/// and the declared payload length have been received. Padding in the final
/// report is discarded.
#[derive(Debug)]
pub struct ReportAssembler {
    buf: BytesMut,
    expected: Option<usize>,
    max_payload_size: usize,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl ReportAssembler {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(REPORT_SIZE * 4),
            expected: None,
            max_payload_size,
        }
    }

    /// Feed one report. Returns the encoded frame (header included) when done.
    pub fn push(&mut self, report: &[u8]) -> Result<Option<Bytes>> {
        let (&id, data) = match report.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };
        if id != REPORT_ID {
            return Err(FrameError::InvalidReportId(id));
        }

        if self.buf.is_empty() && data.len() >= MAGIC.len() && data[..MAGIC.len()] != MAGIC {
            return Err(FrameError::InvalidMagic([data[0], data[1]]));
        }
        self.buf.extend_from_slice(data);

        if self.expected.is_none() {
            match frame_len(&self.buf, self.max_payload_size) {
                Ok(expected) => self.expected = expected,
                Err(err) => {
                    self.reset();
                    return Err(err);
                }
            }
        }

        match self.expected {
            Some(expected) if self.buf.len() >= expected => {
                let frame = self.buf.split_to(expected).freeze();
                trace!(len = frame.len(), "reassembled frame from reports");
                self.reset();
                Ok(Some(frame))
            }
            _ => Ok(None),
        }
    }

    /// Whether a partially received frame is buffered.
    pub fn is_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.expected = None;
    }
}
