// src/supervisor/output.rs

//! Reading captured task output.
//!
//! Logs are append-only and written by a single child, so they can be read
//! at any time without taking the store lock.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::errors::Result;
use crate::exec::read_exit_code;
use crate::process::ProcessProbe;
use crate::store::TaskRecord;

const FOLLOW_POLL: Duration = Duration::from_millis(200);

/// Bytes read per step when scanning a log backwards for `--tail`.
const TAIL_CHUNK: u64 = 8 * 1024;

/// Raw contents of the record's log, or only its last `tail` lines.
///
/// Bytes are returned as written by the task; nothing is re-encoded.
pub fn read_output(record: &TaskRecord, tail: Option<usize>) -> Result<Vec<u8>> {
    let path = &record.output_path;
    let bytes = match tail {
        None => std::fs::read(path).with_context(|| format!("reading output log {:?}", path))?,
        Some(n) => read_tail(path, n).with_context(|| format!("reading output log {:?}", path))?,
    };
    Ok(bytes)
}

/// Read backwards from the end of `path` until the last `n` lines are in
/// memory, without loading the rest of the file.
fn read_tail(path: &Path, n: usize) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut pos = file.metadata()?.len();
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 && !holds_lines(&buf, n) {
        let step = pos.min(TAIL_CHUNK);
        pos -= step;
        let mut chunk = vec![0u8; step as usize];
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    Ok(tail_bytes(&buf, n).to_vec())
}

/// True once `buf` (a suffix of the log) contains the start of its n-th
/// last line.
fn holds_lines(buf: &[u8], n: usize) -> bool {
    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    body.iter().filter(|&&b| b == b'\n').count() >= n
}

/// The suffix of `data` holding its last `n` lines.
///
/// A trailing newline does not count as an extra empty line.
pub fn tail_bytes(data: &[u8], n: usize) -> &[u8] {
    if n == 0 {
        return &[];
    }
    let body = data.strip_suffix(b"\n").unwrap_or(data);
    let mut seen = 0;
    for (idx, _) in body.iter().enumerate().rev().filter(|(_, b)| **b == b'\n') {
        seen += 1;
        if seen == n {
            return &data[idx + 1..];
        }
    }
    data
}

/// Write the selected output to `out`, then keep streaming appended bytes
/// until the task is no longer running.
///
/// "No longer running" means the exit sentinel exists or the process is gone,
/// judged the same way reconciliation does. The store is not modified.
pub async fn follow_output<W>(
    record: &TaskRecord,
    probe: &dyn ProcessProbe,
    tail: Option<usize>,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(&record.output_path)
        .await
        .with_context(|| format!("opening output log {:?}", record.output_path))?;

    let mut initial = Vec::new();
    file.read_to_end(&mut initial).await?;
    let selected = match tail {
        Some(n) => tail_bytes(&initial, n),
        None => &initial[..],
    };
    out.write_all(selected).await?;
    out.flush().await?;

    let mut offset = initial.len() as u64;
    let mut buf = Vec::new();

    loop {
        let finished = !record.is_running() || task_has_stopped(record, probe);

        file.seek(SeekFrom::Start(offset)).await?;
        buf.clear();
        let n = file.read_to_end(&mut buf).await?;
        if n > 0 {
            offset += n as u64;
            out.write_all(&buf).await?;
            out.flush().await?;
        }

        if finished {
            debug!(task = %record.id, "task stopped; done following output");
            return Ok(());
        }
        tokio::time::sleep(FOLLOW_POLL).await;
    }
}

fn task_has_stopped(record: &TaskRecord, probe: &dyn ProcessProbe) -> bool {
    if matches!(read_exit_code(&record.sentinel_path()), Ok(Some(_))) {
        return true;
    }
    match probe.inspect(record.pid) {
        Ok(state) => !state.is_same_process(record.pid_start_ticks),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskId, TaskStatus};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record_with_log(path: PathBuf) -> TaskRecord {
        TaskRecord {
            id: TaskId::from_seq(1),
            name: "t".to_string(),
            command: "true".to_string(),
            pid: 42,
            pid_start_ticks: None,
            cwd: PathBuf::from("."),
            start_time: Utc::now(),
            timeout_seconds: None,
            status: TaskStatus::Completed,
            exit_code: Some(0),
            output_path: path,
            end_time: Some(Utc::now()),
            probe_error: None,
        }
    }

    #[test]
    fn tail_returns_last_lines() {
        let text = b"one\ntwo\nthree\n";
        assert_eq!(tail_bytes(text, 1), b"three\n");
        assert_eq!(tail_bytes(text, 2), b"two\nthree\n");
        assert_eq!(tail_bytes(text, 3), text);
        assert_eq!(tail_bytes(text, 10), text);
        assert_eq!(tail_bytes(text, 0), b"");
    }

    #[test]
    fn tail_handles_missing_trailing_newline() {
        assert_eq!(tail_bytes(b"a\nb\nc", 2), b"b\nc");
        assert_eq!(tail_bytes(b"", 3), b"");
    }

    #[test]
    fn output_is_returned_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ralph_0001.log");
        let raw: &[u8] = b"caf\xe9 \xff\xfe\nsecond\n";
        std::fs::write(&path, raw).unwrap();
        let record = record_with_log(path);

        assert_eq!(read_output(&record, None).unwrap(), raw);
        assert_eq!(read_output(&record, Some(1)).unwrap(), b"second\n");
        assert_eq!(read_output(&record, Some(5)).unwrap(), raw);
    }

    #[test]
    fn tail_of_a_large_log_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ralph_0001.log");
        let text: String = (0..10_000).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, &text).unwrap();
        let record = record_with_log(path);

        let expected: String = (7_000..10_000).map(|i| format!("line {i}\n")).collect();
        assert_eq!(read_output(&record, Some(3_000)).unwrap(), expected.as_bytes());
        assert_eq!(read_output(&record, Some(1)).unwrap(), b"line 9999\n");
        assert_eq!(read_output(&record, None).unwrap(), text.as_bytes());
    }
}
