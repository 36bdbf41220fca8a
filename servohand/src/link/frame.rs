//! Line-oriented device command frames: `idx0:angle0,idx1:angle1,…\n`.

use thiserror::Error;

use crate::segment::SegmentId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not newline terminated")]
    Unterminated,

    #[error("malformed pair '{0}'")]
    MalformedPair(String),
}

/// Encode `(segment, device angle)` pairs in ascending segment order.
pub fn encode_frame(pairs: &[(SegmentId, i32)]) -> String {
    let mut sorted = pairs.to_vec();
    sorted.sort_by_key(|&(segment, _)| segment);

    let mut frame = sorted
        .iter()
        .map(|(segment, angle)| format!("{}:{}", segment.index(), angle))
        .collect::<Vec<_>>()
        .join(",");
    frame.push('\n');
    frame
}

/// Parse one frame back into `(index, angle)` pairs.
///
/// Used by the mock device and diagnostics; the controller never receives frames.
pub fn decode_frame(line: &str) -> Result<Vec<(usize, i32)>, FrameError> {
    let body = line.strip_suffix('\n').ok_or(FrameError::Unterminated)?;
    if body.is_empty() {
        return Ok(Vec::new());
    }

    body.split(',')
        .map(|pair| {
            let (index, angle) = pair
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedPair(pair.to_string()))?;
            match (index.parse::<usize>(), angle.parse::<i32>()) {
                (Ok(index), Ok(angle)) => Ok((index, angle)),
                _ => Err(FrameError::MalformedPair(pair.to_string())),
            }
        })
        .collect()
}
