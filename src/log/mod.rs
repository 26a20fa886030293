//! Session Frame Log
//!
//! Every frame the broadcast actor emits is captured in memory and can be
//! flushed to a file: opaque byte blocks (each one full JSON wire message)
//! separated by a fixed literal delimiter. The replay server streams such
//! a file back to viewers without interpreting the blocks.

pub mod replay;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Literal byte sequence separating frames in a log file.
///
/// serde_json escapes control characters inside strings and emits no raw
/// newlines elsewhere, so this sequence cannot occur inside a frame.
pub const FRAME_DELIMITER: &[u8] = b"!\n|\n!";

// =============================================================================
// Session Log
// =============================================================================

/// Append-only capture of emitted frames
#[derive(Debug, Default)]
pub struct SessionLog {
    frames: Vec<Vec<u8>>,
    enabled: bool,
}

impl SessionLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            frames: Vec::new(),
            enabled,
        }
    }

    /// Record one emitted frame (no-op when capture is disabled)
    pub fn append(&mut self, frame: &[u8]) {
        if self.enabled {
            self.frames.push(frame.to_vec());
        }
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Flush all captured frames to `path`, delimiter-separated
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(fs::File::create(path)?);
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                out.write_all(FRAME_DELIMITER)?;
            }
            out.write_all(frame)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Load a captured log back into its frame sequence
pub fn read_log(path: &Path) -> Result<Vec<Vec<u8>>> {
    Ok(split_frames(&fs::read(path)?))
}

fn split_frames(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + FRAME_DELIMITER.len() <= bytes.len() {
        if &bytes[i..i + FRAME_DELIMITER.len()] == FRAME_DELIMITER {
            frames.push(bytes[start..i].to_vec());
            i += FRAME_DELIMITER.len();
            start = i;
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        frames.push(bytes[start..].to_vec());
    }
    frames
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_round_trip() {
        let mut log = SessionLog::new(true);
        log.append(br#"{"type":"snapshot","data":{}}"#);
        log.append(br#"[{"type":"setValue","data":{"path":"data.count"}}]"#);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        log.write_to(&path).unwrap();

        let frames = read_log(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], log.frames()[0]);
        assert_eq!(frames[1], log.frames()[1]);
    }

    #[test]
    fn test_disabled_log_captures_nothing() {
        let mut log = SessionLog::new(false);
        log.append(b"frame");
        assert!(log.is_empty());
    }

    #[test]
    fn test_empty_file_has_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, b"").unwrap();
        assert!(read_log(&path).unwrap().is_empty());
    }

    #[test]
    fn test_split_single_frame() {
        assert_eq!(split_frames(b"{\"a\":1}"), vec![b"{\"a\":1}".to_vec()]);
    }
}
