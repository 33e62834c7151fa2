use std::fmt;
use std::io::{self, Write};

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use super::{lock_slot, SinkSlot};

/// Longest logger name written before package segments are abbreviated
const MAX_TARGET_WIDTH: usize = 36;

/// Fixed line format of the log file:
/// `HH:MM:SS.mmm [thread] LEVEL target - message`
#[derive(Debug, Clone, Copy, Default)]
pub struct LinePattern;

impl<S, N> FormatEvent<S, N> for LinePattern
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let thread = std::thread::current();
        let thread_name = thread
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread.id()));
        let level = metadata.level().to_string();

        write!(
            writer,
            "{} [{}] {:<5} {} - ",
            Local::now().format("%H:%M:%S%.3f"),
            thread_name,
            level,
            abbreviate_target(metadata.target(), MAX_TARGET_WIDTH)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Shorten a `::`-separated target to fit `width` by reducing leading
/// segments to their first character. The last segment is never shortened.
pub fn abbreviate_target(target: &str, width: usize) -> String {
    if target.len() <= width {
        return target.to_string();
    }

    let mut segments: Vec<String> = target.split("::").map(str::to_string).collect();
    let last = segments.len().saturating_sub(1);

    for index in 0..last {
        if segments.join("::").len() <= width {
            break;
        }
        if let Some(first) = segments[index].chars().next() {
            segments[index] = first.to_string();
        }
    }

    segments.join("::")
}

/// `MakeWriter` that writes into whichever sink is attached at write time.
/// Output is discarded while no sink is attached.
#[derive(Clone)]
pub struct SinkWriter {
    slot: SinkSlot,
}

impl SinkWriter {
    pub(crate) fn new(slot: SinkSlot) -> Self {
        Self { slot }
    }
}

/// Per-event writer handed out by [`SinkWriter`]
pub struct SinkWriterGuard {
    slot: SinkSlot,
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriterGuard {
            slot: self.slot.clone(),
        }
    }
}

impl Write for SinkWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match lock_slot(&self.slot).as_mut() {
            Some(sink) => sink.file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock_slot(&self.slot).as_mut() {
            Some(sink) => sink.file.flush(),
            None => Ok(()),
        }
    }
}
