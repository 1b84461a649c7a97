use std::{
    fmt::{self, Write},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use arc_swap::ArcSwapOption;
use tracing::{Event, Subscriber, field, span};
use tracing_subscriber::{
    Registry,
    filter::{Filtered, Targets},
    layer::{Context, Layer, Layered, SubscriberExt},
    registry::{LookupSpan, SpanRef},
    util::SubscriberInitExt,
};

/// Receives formatted log lines on the host side (e.g. the mobile app's log
/// console). Called from whichever thread emitted the log.
pub trait HostLogSink: Send + Sync + 'static {
    fn log(&self, line: String);
}

/// The current host sink. Swappable so a host that restarts its runtime
/// without restarting the process can register a fresh sink.
static HOST_LOG_SINK: ArcSwapOption<Box<dyn HostLogSink>> =
    ArcSwapOption::const_empty();

/// A [`Layer`] which formats each event and hands it to the [`HostLogSink`].
pub struct HostLogLayer;

/// Span fields are formatted when an enabled span is first created.
struct FormattedSpanFields {
    buf: String,
}

pub type HostSubscriber =
    Layered<Filtered<HostLogLayer, Targets, Registry>, Registry>;

/// Init the global logger so that log lines are shipped to `sink`.
///
/// `rust_log`: env vars don't work well on mobile, so the host passes the
/// equivalent of `$RUST_LOG` through here.
///
/// Does _not_ panic if a global logger is already set; the sink is still
/// replaced, so the new host sink receives all future log lines.
pub fn init_host(sink: impl HostLogSink, rust_log: &str) {
    HOST_LOG_SINK.store(Some(Arc::new(Box::new(sink))));
    let _ = subscriber(rust_log).try_init();
}

/// A [`HostLogLayer`] subscriber filtered by `rust_log`, for callers which
/// install it themselves, e.g. with [`tracing::subscriber::with_default`].
pub fn subscriber(rust_log: &str) -> HostSubscriber {
    let rust_log_filter = crate::targets_or_info(Some(rust_log));
    let host_log_layer = HostLogLayer.with_filter(rust_log_filter);
    tracing_subscriber::registry().with(host_log_layer)
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for HostLogLayer {
    fn on_new_span(
        &self,
        attrs: &span::Attributes<'_>,
        id: &span::Id,
        ctx: Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else { return };
        let mut exts = span.extensions_mut();

        if exts.get_mut::<FormattedSpanFields>().is_none() {
            let mut fields = FormattedSpanFields { buf: String::new() };
            attrs.record(&mut FieldVisitor::new(&mut fields.buf));
            exts.insert(fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let sink = HOST_LOG_SINK.load();
        let Some(sink) = sink.as_ref() else { return };

        let mut line = String::new();
        if fmt_event(&mut line, event, ctx).is_ok() {
            sink.log(line);
        }
    }
}

// ex: "1682371943.448209 R  INFO (app):(repo): wallet_bridge::repository: \
//      Applied event kind=TxMined"
fn fmt_event<S: Subscriber + for<'a> LookupSpan<'a>>(
    buf: &mut String,
    event: &Event<'_>,
    ctx: Context<'_, S>,
) -> fmt::Result {
    let meta = event.metadata();
    let level = meta.level().as_str();

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();

    // pad INFO and WARN so log messages align
    let level_pad = if level.len() == 4 { " " } else { "" };
    let target = meta.target();

    write!(buf, "{timestamp:.06} R {level_pad}{level}")?;

    let parent_span = event
        .parent()
        .and_then(|id| ctx.span(id))
        .or_else(|| ctx.lookup_current());
    fmt_span_names(buf, parent_span.as_ref())?;
    write!(buf, " {target}:")?;

    let mut visitor = FieldVisitor::new(buf);
    event.record(&mut visitor);
    visitor.result?;

    fmt_span_fields(buf, parent_span.as_ref())
}

struct FieldVisitor<'a> {
    buf: &'a mut String,
    result: fmt::Result,
}

impl<'a> FieldVisitor<'a> {
    fn new(buf: &'a mut String) -> Self {
        Self {
            buf,
            result: Ok(()),
        }
    }
}

impl field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == "message" {
            self.record_debug(field, &format_args!("{value}"))
        } else {
            self.record_debug(field, &value)
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        if self.result.is_err() {
            return;
        }
        self.result = match field.name() {
            "message" => write!(self.buf, " {value:?}"),
            // skip `log` crate metadata
            name if name.starts_with("log.") => Ok(()),
            name => write!(self.buf, " {name}={value:?}"),
        };
    }
}

fn fmt_span_names<S: Subscriber + for<'a> LookupSpan<'a>>(
    buf: &mut String,
    span: Option<&SpanRef<S>>,
) -> fmt::Result {
    let scope = span.into_iter().flat_map(|span| span.scope().from_root());

    let mut first = true;
    for span in scope {
        if first {
            buf.write_char(' ')?;
            first = false;
        }
        write!(buf, "{}:", span.metadata().name())?;
    }

    Ok(())
}

fn fmt_span_fields<S: Subscriber + for<'a> LookupSpan<'a>>(
    buf: &mut String,
    span: Option<&SpanRef<S>>,
) -> fmt::Result {
    let scope = span.into_iter().flat_map(|span| span.scope().from_root());

    for span in scope {
        let exts = span.extensions();
        if let Some(fields) = exts.get::<FormattedSpanFields>()
            && !fields.buf.is_empty()
        {
            buf.write_str(&fields.buf)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use tracing::{debug, info, info_span};

    use super::*;

    #[derive(Clone, Default)]
    struct VecSink(Arc<Mutex<Vec<String>>>);

    impl HostLogSink for VecSink {
        fn log(&self, line: String) {
            self.0.lock().unwrap().push(line);
        }
    }

    #[test]
    fn formats_spans_and_fields() {
        let sink = VecSink::default();
        HOST_LOG_SINK.store(Some(Arc::new(Box::new(sink.clone()))));

        tracing::subscriber::with_default(subscriber("info"), || {
            let span = info_span!("(repo)", wallet = 7);
            let _guard = span.enter();
            info!(kind = "TxMined", "Applied event");
            // Filtered out by the `info` targets
            debug!("noisy");
        });

        let lines = sink.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.contains(" R  INFO (repo):"), "{line}");
        assert!(line.contains("Applied event kind=\"TxMined\""), "{line}");
        assert!(line.ends_with(" wallet=7"), "{line}");
    }
}
