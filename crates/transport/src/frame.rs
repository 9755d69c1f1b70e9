use tracing::warn;

/// The two wire transports the core supports. Each delimits packets with a
/// distinct four-byte sentinel rather than a length prefix, since the
/// serial link in particular cannot be trusted to deliver whole reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Serial,
    Tcp,
}

impl Framing {
    pub const fn sentinel(self) -> [u8; 4] {
        match self {
            Framing::Serial => [0x00, 0x80, 0xEE, 0xFF],
            Framing::Tcp => [0x10, 0x20, 0x33, 0x44],
        }
    }
}

fn find_sentinel(buffer: &[u8], sentinel: &[u8; 4]) -> Option<usize> {
    buffer.windows(4).position(|w| w == sentinel)
}

/// Accumulates raw bytes from a stream and splits them into packet bodies
/// on the configured sentinel. A sentinel that never arrives just leaves
/// bytes buffered; a read that produces data with no sentinel in it is not
/// an error by itself.
#[derive(Debug)]
pub struct FrameReader {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new(framing: Framing) -> Self {
        Self { framing, buffer: Vec::new() }
    }

    /// Feeds newly read bytes in and returns every complete frame they
    /// completed, in arrival order. Framing errors (per spec §7, a
    /// malformed frame) are handled by the caller discarding the frame and
    /// this reader simply resyncing at the next sentinel on the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);
        let sentinel = self.framing.sentinel();
        let mut frames = Vec::new();

        while let Some(pos) = find_sentinel(&self.buffer, &sentinel) {
            let frame: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.drain(..4); // remove the sentinel itself
            if frame.is_empty() {
                warn!("empty frame, resyncing");
                continue;
            }
            frames.push(frame);
        }
        frames
    }
}

pub fn encode_frame(payload: &[u8], framing: Framing) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(payload);
    out.extend_from_slice(&framing.sentinel());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_splits_on_serial_sentinel() {
        let mut reader = FrameReader::new(Framing::Serial);
        let mut bytes = b"hello".to_vec();
        bytes.extend_from_slice(&Framing::Serial.sentinel());
        bytes.extend_from_slice(b"world");
        bytes.extend_from_slice(&Framing::Serial.sentinel());

        let frames = reader.feed(&bytes);
        assert_eq!(frames, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn partial_frame_stays_buffered_across_feeds() {
        let mut reader = FrameReader::new(Framing::Tcp);
        let frames = reader.feed(b"partial");
        assert!(frames.is_empty());

        let mut rest = b" complete".to_vec();
        rest.extend_from_slice(&Framing::Tcp.sentinel());
        let frames = reader.feed(&rest);
        assert_eq!(frames, vec![b"partial complete".to_vec()]);
    }
}
