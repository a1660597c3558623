// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `bufpool replay` command: replay an allocation trace.
//!
//! # Trace Format
//! One operation per line; blank lines and `#` comments are ignored.
//! ```text
//! config vp9 1920 1080 8     # update_video_config
//! alloc  a1 262144 64        # allocate <id> <size> <alignment>
//! free   a1                  # free the record allocated as <id>
//! suspend
//! resume
//! ```
//! Records still live at the end of the trace are freed before the
//! statistics are printed.

use super::{banner, print_stats};
use anyhow::{bail, Context};
use decoder_buffer::{Allocations, BufferAllocator, BufferPoolConfig, VideoCodec, VideoConfig};
use std::collections::HashMap;
use std::path::PathBuf;

/// One trace operation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TraceOp {
    Alloc { id: String, size: usize, alignment: usize },
    Free { id: String },
    Config(VideoConfig),
    Suspend,
    Resume,
}

/// Parses one line. Returns `None` for blank and comment lines.
fn parse_line(line: &str) -> anyhow::Result<Option<TraceOp>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let number = |i: usize, what: &str| -> anyhow::Result<usize> {
        let field = fields.get(i).with_context(|| format!("missing {what}"))?;
        field.parse().with_context(|| format!("invalid {what} '{field}'"))
    };

    let op = match fields[0] {
        "alloc" if fields.len() == 4 => TraceOp::Alloc {
            id: fields[1].to_string(),
            size: number(2, "size")?,
            alignment: number(3, "alignment")?,
        },
        "free" if fields.len() == 2 => TraceOp::Free {
            id: fields[1].to_string(),
        },
        "config" if fields.len() == 5 => {
            let codec: VideoCodec = fields[1].parse()?;
            let dimension = |i, what| -> anyhow::Result<u32> {
                u32::try_from(number(i, what)?).with_context(|| format!("{what} out of range"))
            };
            TraceOp::Config(VideoConfig::new(
                codec,
                dimension(2, "width")?,
                dimension(3, "height")?,
                dimension(4, "bits per pixel")?,
            ))
        }
        "suspend" if fields.len() == 1 => TraceOp::Suspend,
        "resume" if fields.len() == 1 => TraceOp::Resume,
        "alloc" | "free" | "config" | "suspend" | "resume" => {
            bail!("wrong number of fields for '{}'", fields[0])
        }
        other => bail!("unknown operation '{other}'"),
    };
    Ok(Some(op))
}

/// Parses a whole trace, reporting the first bad line by number.
fn parse_trace(text: &str) -> anyhow::Result<Vec<(usize, TraceOp)>> {
    let mut ops = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        if let Some(op) = parse_line(line).with_context(|| format!("line {line_no}"))? {
            ops.push((line_no, op));
        }
    }
    Ok(ops)
}

/// What happened while replaying.
#[derive(Debug, Default, PartialEq, Eq)]
struct Outcome {
    /// Line numbers of denied allocations.
    denied_lines: Vec<usize>,
    /// Records freed after the last line.
    leftover: usize,
}

/// Applies `ops` to `allocator`. Freeing an id that is not live is an
/// error in the trace, not a pool contract violation.
fn replay(allocator: &dyn BufferAllocator, ops: Vec<(usize, TraceOp)>) -> anyhow::Result<Outcome> {
    let mut live: HashMap<String, Allocations> = HashMap::new();
    let mut outcome = Outcome::default();

    let result = (|| -> anyhow::Result<()> {
        for (line_no, op) in ops {
            match op {
                TraceOp::Alloc { id, size, alignment } => {
                    if live.contains_key(&id) {
                        bail!("line {line_no}: id '{id}' is already live");
                    }
                    let record = allocator.allocate(size, alignment, line_no);
                    if record.is_empty() {
                        tracing::info!(line = line_no, id = %id, size, "allocation denied");
                        outcome.denied_lines.push(line_no);
                    } else {
                        live.insert(id, record);
                    }
                }
                TraceOp::Free { id } => match live.remove(&id) {
                    Some(record) => allocator.free(record),
                    None => bail!("line {line_no}: id '{id}' is not live"),
                },
                TraceOp::Config(video) => allocator.update_video_config(&video),
                TraceOp::Suspend => allocator.suspend(),
                TraceOp::Resume => allocator.resume(),
            }
        }
        Ok(())
    })();

    // Return everything, also when the trace was bad.
    outcome.leftover = live.len();
    for (_, record) in live.drain() {
        allocator.free(record);
    }
    result.map(|()| outcome)
}

pub async fn execute(config: BufferPoolConfig, trace: PathBuf, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&trace)
        .with_context(|| format!("cannot read trace '{}'", trace.display()))?;
    let ops = parse_trace(&text).with_context(|| format!("in trace '{}'", trace.display()))?;

    let allocator = config.create_allocator()?;
    let outcome = replay(allocator.as_ref(), ops)?;

    if !json {
        banner("Trace Replay");
        println!("  Trace: {}", trace.display());
        println!("  Strategy: {}", allocator.name());
        if outcome.denied_lines.is_empty() {
            println!("  No allocations were denied.");
        } else {
            let lines: Vec<String> = outcome.denied_lines.iter().map(ToString::to_string).collect();
            println!("  Denied at lines: {}", lines.join(", "));
        }
        if outcome.leftover > 0 {
            println!("  {} records were still live at the end of the trace.", outcome.leftover);
        }
        println!();
    }
    print_stats(&allocator.stats(), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use decoder_buffer::{BudgetRule, ByteSize};

    fn small_pool() -> Box<dyn BufferAllocator> {
        BufferPoolConfig {
            initial_capacity: ByteSize::from_kb(256),
            allocation_unit: ByteSize::from_kb(256),
            budgets: vec![BudgetRule::any_codec(1920, 1080, 8, ByteSize::from_mb(1))],
            ..Default::default()
        }
        .create_allocator()
        .unwrap()
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  # comment").unwrap(), None);
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(
            parse_line("alloc v1 4096 64 # frame").unwrap(),
            Some(TraceOp::Alloc {
                id: "v1".into(),
                size: 4096,
                alignment: 64
            })
        );
        assert_eq!(parse_line("free v1").unwrap(), Some(TraceOp::Free { id: "v1".into() }));
        assert_eq!(
            parse_line("config hevc 3840 2160 10").unwrap(),
            Some(TraceOp::Config(VideoConfig::new(VideoCodec::H265, 3840, 2160, 10)))
        );
        assert_eq!(parse_line("suspend").unwrap(), Some(TraceOp::Suspend));
        assert_eq!(parse_line("resume").unwrap(), Some(TraceOp::Resume));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("alloc v1 4096").is_err());
        assert!(parse_line("alloc v1 big 64").is_err());
        assert!(parse_line("config mjpeg 1 1 8").is_err());
        assert!(parse_line("explode").is_err());
        let err = parse_trace("suspend\nfree\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_replay_reports_denials() {
        let trace = "\
config h264 1920 1080 8
alloc a 600000 16
alloc b 600000 16
free a
alloc c 600000 16
";
        let a = small_pool();
        let outcome = replay(a.as_ref(), parse_trace(trace).unwrap()).unwrap();
        assert_eq!(outcome.denied_lines, vec![3]);
        assert_eq!(outcome.leftover, 1);
        assert_eq!(a.allocated_memory(), 0);
    }

    #[test]
    fn test_replay_rejects_unknown_free() {
        let a = small_pool();
        let ops = parse_trace("alloc a 100 16\nfree b\n").unwrap();
        let err = replay(a.as_ref(), ops).unwrap_err();
        assert!(err.to_string().contains("'b' is not live"));
        assert_eq!(a.allocated_memory(), 0);
    }

    #[test]
    fn test_replay_suspend_resume() {
        let a = small_pool();
        let ops = parse_trace("suspend\nresume\nalloc a 1000 16\nfree a\n").unwrap();
        let outcome = replay(a.as_ref(), ops).unwrap();
        assert!(outcome.denied_lines.is_empty());
        assert_eq!(a.current_memory_capacity(), 256 * 1024);
    }
}
