//! Prometheus text exposition (format version 0.0.4)
//!
//! Output goes to any [`core::fmt::Write`] sink, one collector at a time, so
//! the whole document never has to exist in memory at once. Transports that
//! need bytes use a [`LineBuffer`] per collector block.

use core::fmt::{self, Write};

use log::warn;

use super::labels::write_pair;
use super::{
    Collector, EscapedHelp, FullName, GlobalLabel, MAX_CARDINALITY, Registry, Sample,
};

/// Render every collector in `registry`, in registration order.
pub fn encode<W: Write + ?Sized>(registry: &Registry<'_>, out: &mut W) -> fmt::Result {
    for collector in registry.collectors() {
        encode_collector(registry.global_labels(), collector, out)?;
    }
    Ok(())
}

/// Render one collector block: `# HELP`, `# TYPE`, its samples and a
/// trailing blank line.
pub fn encode_collector<W: Write + ?Sized>(
    global_labels: &[GlobalLabel<'_>],
    collector: &dyn Collector,
    out: &mut W,
) -> fmt::Result {
    let descriptor = collector.descriptor();
    let name = descriptor.full_name();

    writeln!(out, "# HELP {} {}", name, EscapedHelp(descriptor.help))?;
    writeln!(out, "# TYPE {} {}", name, collector.kind().as_str())?;

    let mut stage = [Sample::EMPTY; MAX_CARDINALITY];
    let expected = collector.sample_count();
    if expected > stage.len() {
        warn!(
            "{} reports {} samples, exporting the first {}",
            name,
            expected,
            stage.len()
        );
    }

    let filled = collector.fill(&mut stage[..expected.min(MAX_CARDINALITY)]);
    for sample in &stage[..filled] {
        write_sample(out, name, global_labels, collector.label_names(), sample)?;
    }

    out.write_char('\n')
}

fn write_sample<W: Write + ?Sized>(
    out: &mut W,
    name: FullName<'_>,
    global_labels: &[GlobalLabel<'_>],
    label_names: &[&'static str],
    sample: &Sample,
) -> fmt::Result {
    write!(out, "{}", name)?;

    let mut separator = "{";
    for label in global_labels {
        out.write_str(separator)?;
        write_pair(out, label.name, label.value)?;
        separator = ", ";
    }
    for (label, value) in label_names.iter().zip(sample.labels.values()) {
        out.write_str(separator)?;
        write_pair(out, label, value)?;
        separator = ", ";
    }
    if separator == ", " {
        out.write_char('}')?;
    }

    write!(out, " {}", SampleValue(sample.value))?;
    if sample.timestamp_ms != 0 {
        write!(out, " {}", sample.timestamp_ms)?;
    }
    out.write_char('\n')
}

/// Sample value in exposition syntax: six fractional digits, `NaN`, `+Inf`
/// and `-Inf`.
#[derive(Debug, Clone, Copy)]
pub struct SampleValue(pub f64);

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v.is_nan() {
            f.write_str("NaN")
        } else if v.is_infinite() {
            f.write_str(if v > 0.0 { "+Inf" } else { "-Inf" })
        } else {
            write!(f, "{:.6}", v)
        }
    }
}

/// Fixed-capacity text sink that only ever exposes whole lines.
///
/// Text after the last newline is held back until its line is finished.
/// When a write does not fit, everything after the last complete line is
/// dropped, the buffer is marked as overflowed and further writes fail.
pub struct LineBuffer<const N: usize> {
    buf: heapless::String<N>,
    committed: usize,
    overflowed: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::String::new(),
            committed: 0,
            overflowed: false,
        }
    }

    /// Completed lines written so far.
    pub fn as_str(&self) -> &str {
        &self.buf[..self.committed]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.committed = 0;
        self.overflowed = false;
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.overflowed {
            return Err(fmt::Error);
        }

        if self.buf.push_str(s).is_err() {
            self.buf.truncate(self.committed);
            self.overflowed = true;
            return Err(fmt::Error);
        }

        if let Some(pos) = s.rfind('\n') {
            self.committed = self.buf.len() - (s.len() - pos - 1);
        }
        Ok(())
    }
}
