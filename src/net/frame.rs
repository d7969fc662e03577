use std::io::{Read, Write};

/// Hard cap on a single frame payload. Large enough for a 128x128 RGBA
/// pixel buffer plus geometry, small enough to bound a hostile peer.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

#[derive(Debug)]
pub enum FrameError {
    Timeout,
    Closed,
    Io(std::io::Error),
    Protocol(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Timeout => write!(f, "frame read timed out"),
            FrameError::Closed => write!(f, "connection closed"),
            FrameError::Io(err) => write!(f, "frame io error: {}", err),
            FrameError::Protocol(message) => write!(f, "frame protocol error: {}", message),
        }
    }
}

impl std::error::Error for FrameError {}

/// Reads one length-prefixed frame: a little-endian u32 payload length
/// followed by the payload bytes.
pub fn read_frame(stream: &mut impl Read, max_payload: usize) -> Result<Vec<u8>, FrameError> {
    let mut header = [0u8; 4];
    if let Err(err) = stream.read_exact(&mut header) {
        return Err(map_read_error(err));
    }
    let len = u32::from_le_bytes(header) as usize;
    if len > max_payload {
        return Err(FrameError::Protocol(format!(
            "frame payload {} exceeds max {}",
            len, max_payload
        )));
    }
    let mut payload = vec![0u8; len];
    if !payload.is_empty() {
        if let Err(err) = stream.read_exact(&mut payload) {
            return Err(map_read_error(err));
        }
    }
    Ok(payload)
}

pub fn write_frame(stream: &mut impl Write, payload: &[u8]) -> Result<(), FrameError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameError::Protocol(format!(
            "refusing to write frame of {} bytes",
            payload.len()
        )));
    }
    let header = (payload.len() as u32).to_le_bytes();
    stream.write_all(&header).map_err(FrameError::Io)?;
    if !payload.is_empty() {
        stream.write_all(payload).map_err(FrameError::Io)?;
    }
    stream.flush().map_err(FrameError::Io)?;
    Ok(())
}

fn map_read_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => FrameError::Timeout,
        std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
        _ => FrameError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_roundtrip() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"hello relay").unwrap();
        let mut cursor = Cursor::new(buffer);
        let payload = read_frame(&mut cursor, MAX_FRAME_BYTES).unwrap();
        assert_eq!(payload, b"hello relay");
    }

    #[test]
    fn empty_frame_roundtrip() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &[]).unwrap();
        let mut cursor = Cursor::new(buffer);
        let payload = read_frame(&mut cursor, MAX_FRAME_BYTES).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(64u32).to_le_bytes());
        buffer.extend_from_slice(&[0u8; 64]);
        let mut cursor = Cursor::new(buffer);
        match read_frame(&mut cursor, 16) {
            Err(FrameError::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn truncated_frame_reports_closed() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(8u32).to_le_bytes());
        buffer.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(buffer);
        match read_frame(&mut cursor, MAX_FRAME_BYTES) {
            Err(FrameError::Closed) => {}
            other => panic!("expected closed, got {:?}", other),
        }
    }
}
