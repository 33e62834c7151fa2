use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::LogError;

/// Separator used when joining lines read from a log file
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

const BLOCK_SIZE: u64 = 8 * 1024;

/// Read the last `lines` lines of a file, returned top to bottom and joined
/// with [`LINE_SEPARATOR`].
///
/// The file is read backwards in fixed-size blocks until enough line breaks
/// have been seen, so only the tail is ever held in memory. A terminator at
/// the very end of the file does not count as an extra empty line, and
/// `\r\n` terminators are accepted.
pub fn read_tail(path: &Path, lines: usize) -> Result<String, LogError> {
    if lines == 0 {
        return Err(LogError::InvalidLineCount);
    }

    let mut file = File::open(path)?;
    let mut position = file.metadata()?.len();

    // Blocks in reverse file order
    let mut blocks: Vec<Vec<u8>> = Vec::new();
    let mut breaks = 0usize;

    while position > 0 && breaks < lines {
        let size = BLOCK_SIZE.min(position);
        position -= size;

        let mut block = vec![0u8; size as usize];
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(&mut block)?;

        if blocks.is_empty() && block.last() == Some(&b'\n') {
            block.pop();
        }

        breaks += block.iter().filter(|byte| **byte == b'\n').count();
        blocks.push(block);
    }

    let mut tail = Vec::with_capacity(blocks.iter().map(Vec::len).sum());
    for block in blocks.iter().rev() {
        tail.extend_from_slice(block);
    }

    let text = String::from_utf8_lossy(&tail);
    let all: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let skip = all.len().saturating_sub(lines);

    Ok(all[skip..].join(LINE_SEPARATOR))
}
