//! Span and event capture for asserting on instrumentation.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

#[derive(Default)]
struct Fields(Vec<(String, String)>);

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }
}

struct RecordedEvent {
    message: String,
    scope: Vec<&'static str>,
}

/// Records every span's initial fields and every event's enclosing spans.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    spans: Arc<Mutex<Vec<(&'static str, Vec<(String, String)>)>>>,
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl Recorder {
    /// Install as the thread's default subscriber until the guard is dropped.
    pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// Value recorded for `field` when the first span called `span` opened.
    pub(crate) fn span_field(&self, span: &str, field: &str) -> Option<String> {
        let spans = self.spans.lock().unwrap();
        let (_, fields) = spans.iter().find(|(name, _)| *name == span)?;
        fields.iter().find(|(name, _)| name == field).map(|(_, value)| value.clone())
    }

    /// Names of the spans enclosing the first event logged as `message`,
    /// innermost first.
    pub(crate) fn event_scope(&self, message: &str) -> Option<Vec<&'static str>> {
        let events = self.events.lock().unwrap();
        events.iter().find(|event| event.message == message).map(|event| event.scope.clone())
    }
}

impl<S> Layer<S> for Recorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        self.spans.lock().unwrap().push((attrs.metadata().name(), fields.0));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let message = fields
            .0
            .into_iter()
            .find(|(name, _)| name == "message")
            .map(|(_, value)| value)
            .unwrap_or_default();
        let scope = ctx
            .event_scope(event)
            .map(|scope| scope.map(|span| span.name()).collect())
            .unwrap_or_default();
        self.events.lock().unwrap().push(RecordedEvent { message, scope });
    }
}
