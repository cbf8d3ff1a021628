// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event formatter for the forwarder's own diagnostics.
//!
//! The forwarder writes to the same log stream as the function it runs in,
//! so every line is prefixed to tell it apart from forwarded logs:
//! ```text
//! NR_LOG_FORWARDER | LEVEL | [span{fields}: ]message fields
//! NR_LOG_FORWARDER | ERROR | invocation{kind=s3}: object{bucket=logs key=a.gz}: failed to get S3 object: object not found
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_PREFIX: &str = "NR_LOG_FORWARDER";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{LOG_PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span, warn};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_ansi(false)
            .event_format(Formatter)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_prefix_and_level() {
        let output = capture(|| info!("forwarder started"));

        assert_eq!(output, "NR_LOG_FORWARDER | INFO | forwarder started\n");
    }

    #[test]
    fn test_span_context() {
        let output = capture(|| {
            let invocation = info_span!("invocation", kind = "s3");
            let _outer = invocation.enter();
            let object = info_span!("object", bucket = "logs");
            let _inner = object.enter();
            warn!(lines = 3, "partial read");
        });

        assert_eq!(
            output,
            "NR_LOG_FORWARDER | WARN | invocation{kind=\"s3\"}: object{bucket=\"logs\"}: partial read lines=3\n"
        );
    }
}
