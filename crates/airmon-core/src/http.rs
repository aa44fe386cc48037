//! Minimal HTTP/1.1 front for the metrics endpoint
//!
//! The exporter answers exactly one resource. It reads the request head,
//! looks only at the request line, writes one response and closes the
//! connection. Socket handling (accept, timeouts, buffers) belongs to the
//! caller; everything here works on byte slices and an
//! [`embedded_io_async::Write`] sink.

use embedded_io_async::{ErrorKind, Write};
use log::{debug, error};
use thiserror_no_std::Error;

use crate::clock::WallClock;
use crate::metrics::Registry;
use crate::metrics::exposition::{LineBuffer, encode_collector};
use crate::watchdog::LivenessWatchdog;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Room for the largest collector block (8 samples with a handful of labels).
pub const BLOCK_BUF_LEN: usize = 2048;

const OK_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/plain; version=0.0.4\r\n\
Connection: close\r\n\r\n";

const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\n\
Content-Type: text/plain\r\n\
Connection: close\r\n\r\n\
Not Found\n";

const METHOD_NOT_ALLOWED: &[u8] = b"HTTP/1.1 405 Method Not Allowed\r\n\
Allow: GET, HEAD\r\n\
Content-Type: text/plain\r\n\
Connection: close\r\n\r\n\
Method Not Allowed\n";

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\
Content-Type: text/plain\r\n\
Connection: close\r\n\r\n\
Bad Request\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: Method,
    /// Request target with any query string removed.
    pub path: &'a str,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("request line not terminated yet")]
    Incomplete,
    #[error("malformed request line")]
    Malformed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportError {
    #[error("socket write failed: {kind:?}")]
    Io { kind: ErrorKind },
}

/// Summary of one successful scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub collectors: usize,
    pub bytes: usize,
    /// Collectors whose block did not fit in [`BLOCK_BUF_LEN`] and were cut
    /// at the last whole line.
    pub truncated: usize,
}

/// What [`Exporter::handle`] answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Scraped(ExportStats),
    HeadOnly,
    NotFound,
    MethodNotAllowed,
    BadRequest,
}

/// Whether `buf` holds a full request head (request line plus headers).
pub fn head_complete(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
}

/// Parse the first line of a request head.
pub fn parse_request_line(head: &[u8]) -> Result<RequestLine<'_>, HttpError> {
    let end = head
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(HttpError::Incomplete)?;
    let line = core::str::from_utf8(&head[..end]).map_err(|_| HttpError::Malformed)?;
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut parts = line.split(' ').filter(|part| !part.is_empty());
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed);
    };

    if !version.starts_with("HTTP/1.") || !target.starts_with('/') {
        return Err(HttpError::Malformed);
    }

    let method = match method {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        _ => Method::Other,
    };
    let path = target.split_once('?').map_or(target, |(path, _)| path);

    Ok(RequestLine { method, path })
}

/// Serves the registry on one path and feeds the liveness watchdog.
pub struct Exporter<'a> {
    registry: &'a Registry<'a>,
    watchdog: &'a LivenessWatchdog,
    clock: &'a dyn WallClock,
    path: &'a str,
}

impl<'a> Exporter<'a> {
    pub fn new(
        registry: &'a Registry<'a>,
        watchdog: &'a LivenessWatchdog,
        clock: &'a dyn WallClock,
        path: &'a str,
    ) -> Self {
        Self {
            registry,
            watchdog,
            clock,
            path,
        }
    }

    /// Answer the request whose head is in `head`.
    pub async fn handle<W: Write>(&self, head: &[u8], out: &mut W) -> Result<Outcome, ExportError> {
        let request = match parse_request_line(head) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejecting request: {}", e);
                write_all(out, BAD_REQUEST).await?;
                return Ok(Outcome::BadRequest);
            }
        };

        if request.path != self.path {
            write_all(out, NOT_FOUND).await?;
            return Ok(Outcome::NotFound);
        }

        match request.method {
            Method::Get => self.serve_metrics(out).await.map(Outcome::Scraped),
            Method::Head => {
                write_all(out, OK_HEAD).await?;
                Ok(Outcome::HeadOnly)
            }
            Method::Other => {
                write_all(out, METHOD_NOT_ALLOWED).await?;
                Ok(Outcome::MethodNotAllowed)
            }
        }
    }

    /// Write a `200 OK` response carrying the whole registry.
    ///
    /// Each collector is rendered into a bounded buffer and sent as one
    /// chunk, so only whole lines ever reach the socket. The watchdog is fed
    /// once the last byte has been written.
    pub async fn serve_metrics<W: Write>(&self, out: &mut W) -> Result<ExportStats, ExportError> {
        write_all(out, OK_HEAD).await?;

        let mut stats = ExportStats::default();
        let mut block: LineBuffer<BLOCK_BUF_LEN> = LineBuffer::new();

        for collector in self.registry.collectors() {
            block.clear();
            if encode_collector(self.registry.global_labels(), collector, &mut block).is_err() {
                error!(
                    "{} does not fit in {} bytes, sending whole lines only",
                    collector.descriptor().full_name(),
                    BLOCK_BUF_LEN
                );
                stats.truncated += 1;
            }

            write_all(out, block.as_bytes()).await?;
            stats.collectors += 1;
            stats.bytes += block.as_bytes().len();
        }

        out.flush().await.map_err(io_error)?;

        self.watchdog.on_scrape(self.clock.now_millis());
        debug!(
            "Scrape served: {} collectors, {} bytes",
            stats.collectors, stats.bytes
        );
        Ok(stats)
    }
}

async fn write_all<W: Write>(out: &mut W, bytes: &[u8]) -> Result<(), ExportError> {
    out.write_all(bytes).await.map_err(io_error)
}

fn io_error<E: embedded_io_async::Error>(e: E) -> ExportError {
    ExportError::Io { kind: e.kind() }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embassy_futures::block_on;
    use embassy_time::Duration;
    use embedded_io_async::ErrorType;

    use super::*;
    use crate::clock::ManualClock;
    use crate::metrics::{Counter, Gauge, MetricDescriptor};

    #[derive(Default)]
    struct Sink(Vec<u8>);

    impl ErrorType for Sink {
        type Error = Infallible;
    }

    impl Write for Sink {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Sink {
        fn text(&self) -> &str {
            core::str::from_utf8(&self.0).unwrap()
        }
    }

    struct BrokenPipe;

    impl ErrorType for BrokenPipe {
        type Error = ErrorKind;
    }

    impl Write for BrokenPipe {
        async fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
            Err(ErrorKind::BrokenPipe)
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_request_line() {
        let request = parse_request_line(b"GET /metrics HTTP/1.1\r\nHost: airmon\r\n\r\n").unwrap();
        assert_eq!(
            request,
            RequestLine {
                method: Method::Get,
                path: "/metrics"
            }
        );

        let request = parse_request_line(b"HEAD /metrics?x=1 HTTP/1.0\n\n").unwrap();
        assert_eq!(request.method, Method::Head);
        assert_eq!(request.path, "/metrics");

        let request = parse_request_line(b"POST / HTTP/1.1\r\n").unwrap();
        assert_eq!(request.method, Method::Other);
    }

    #[test]
    fn test_parse_rejects_bad_request_lines() {
        assert_eq!(parse_request_line(b"GET /metr"), Err(HttpError::Incomplete));
        assert_eq!(parse_request_line(b"GET\r\n"), Err(HttpError::Malformed));
        assert_eq!(
            parse_request_line(b"GET /metrics SMTP/1.0\r\n"),
            Err(HttpError::Malformed)
        );
        assert_eq!(
            parse_request_line(b"GET metrics HTTP/1.1\r\n"),
            Err(HttpError::Malformed)
        );
        assert_eq!(
            parse_request_line(b"GET /a /b HTTP/1.1\r\n"),
            Err(HttpError::Malformed)
        );
    }

    #[test]
    fn test_head_complete() {
        assert!(!head_complete(b"GET / HTTP/1.1\r\nHost: x\r\n"));
        assert!(head_complete(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(head_complete(b"GET / HTTP/1.0\n\n"));
    }

    #[test]
    fn test_scrape_writes_response_and_feeds_watchdog() {
        static CLOCK: ManualClock = ManualClock::new(0);
        let watchdog = LivenessWatchdog::new(Duration::from_secs(10), 0);

        let errors: Counter = Counter::new_vec(
            MetricDescriptor::new("errors", "Sensor read errors").with_subsystem("sensors"),
            &["sensor", "code"],
        )
        .unwrap();
        errors.inc(&["BME280", "0x103"]).unwrap();
        let up: Gauge = Gauge::new(MetricDescriptor::new("up", "Exporter up"));
        up.set(&[], 1.0).unwrap();

        let mut registry = Registry::new();
        registry.register_all(&[&errors, &up]).unwrap();

        let exporter = Exporter::new(&registry, &watchdog, &CLOCK, "/metrics");
        CLOCK.set(7_000);

        let mut sink = Sink::default();
        let outcome =
            block_on(exporter.handle(b"GET /metrics HTTP/1.1\r\n\r\n", &mut sink)).unwrap();

        let text = sink.text();
        assert!(text.starts_with(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nConnection: close\r\n\r\n"
        ));
        assert!(text.contains("sensors_errors{sensor=\"BME280\", code=\"0x103\"} 1.000000\n"));
        assert!(text.ends_with("# HELP up Exporter up\n# TYPE up gauge\nup 1.000000\n\n"));

        let Outcome::Scraped(stats) = outcome else {
            panic!("expected a scrape, got {:?}", outcome);
        };
        assert_eq!(stats.collectors, 2);
        assert_eq!(stats.truncated, 0);
        assert_eq!(watchdog.last_scrape_ms(), 7_000);
    }

    #[test]
    fn test_other_paths_and_methods() {
        static CLOCK: ManualClock = ManualClock::new(0);
        let watchdog = LivenessWatchdog::new(Duration::from_secs(10), 0);
        let registry = Registry::new();
        let exporter = Exporter::new(&registry, &watchdog, &CLOCK, "/metrics");
        CLOCK.set(5_000);

        let mut sink = Sink::default();
        let outcome = block_on(exporter.handle(b"GET / HTTP/1.1\r\n\r\n", &mut sink)).unwrap();
        assert_eq!(outcome, Outcome::NotFound);
        assert!(sink.text().starts_with("HTTP/1.1 404 Not Found\r\n"));

        let mut sink = Sink::default();
        let outcome =
            block_on(exporter.handle(b"DELETE /metrics HTTP/1.1\r\n\r\n", &mut sink)).unwrap();
        assert_eq!(outcome, Outcome::MethodNotAllowed);
        assert!(sink.text().starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        let mut sink = Sink::default();
        let outcome = block_on(exporter.handle(b"HEAD /metrics HTTP/1.1\r\n\r\n", &mut sink)).unwrap();
        assert_eq!(outcome, Outcome::HeadOnly);
        assert!(sink.text().ends_with("Connection: close\r\n\r\n"));

        let mut sink = Sink::default();
        let outcome = block_on(exporter.handle(b"\xff\xfe\r\n\r\n", &mut sink)).unwrap();
        assert_eq!(outcome, Outcome::BadRequest);

        // None of those count as a scrape
        assert_eq!(watchdog.last_scrape_ms(), 0);
    }

    #[test]
    fn test_failed_write_does_not_feed_watchdog() {
        static CLOCK: ManualClock = ManualClock::new(0);
        let watchdog = LivenessWatchdog::new(Duration::from_secs(10), 0);
        let registry = Registry::new();
        let exporter = Exporter::new(&registry, &watchdog, &CLOCK, "/metrics");
        CLOCK.set(3_000);

        let result = block_on(exporter.serve_metrics(&mut BrokenPipe));
        assert_eq!(
            result,
            Err(ExportError::Io {
                kind: ErrorKind::BrokenPipe
            })
        );
        assert_eq!(watchdog.last_scrape_ms(), 0);
    }
}
