//! Trace spans
//!
//! A span names a unit of work inside a trace. Ending a span (explicitly or
//! on drop) reports it to the exporter with its wall-clock duration; with no
//! exporter registered, spans are free.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

/// Sink receiving spans as they end
pub trait SpanExporter: Send + Sync {
    /// Called once per span on exit
    fn export(&self, span: &Span, duration_sec: f64);
}

/// A unit of work within a trace
#[derive(Debug, Clone)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_id: Option<String>,
    pub name: String,
}

/// Builds spans sharing one trace id and exporter
#[derive(Clone, Default)]
pub struct Tracer {
    exporter: Option<Arc<dyn SpanExporter>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracer reporting ended spans to the exporter
    pub fn with_exporter(exporter: Arc<dyn SpanExporter>) -> Self {
        Self {
            exporter: Some(exporter),
        }
    }

    /// Start a root span
    pub fn span(&self, name: impl Into<String>) -> ActiveSpan {
        self.child_span(name, Uuid::new_v4().to_string(), None)
    }

    /// Start a span inside an existing trace
    pub fn child_span(
        &self,
        name: impl Into<String>,
        trace_id: String,
        parent_id: Option<String>,
    ) -> ActiveSpan {
        ActiveSpan {
            span: Span {
                trace_id,
                span_id: Uuid::new_v4().to_string(),
                parent_id,
                name: name.into(),
            },
            started: Instant::now(),
            exporter: self.exporter.clone(),
            ended: false,
        }
    }
}

/// A running span; ends on `end()` or drop
pub struct ActiveSpan {
    span: Span,
    started: Instant,
    exporter: Option<Arc<dyn SpanExporter>>,
    ended: bool,
}

impl ActiveSpan {
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Start a child of this span within the same trace
    pub fn child(&self, tracer: &Tracer, name: impl Into<String>) -> ActiveSpan {
        tracer.child_span(
            name,
            self.span.trace_id.clone(),
            Some(self.span.span_id.clone()),
        )
    }

    /// End the span now, reporting it to the exporter
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if let Some(exporter) = &self.exporter {
            exporter.export(&self.span, self.started.elapsed().as_secs_f64());
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.finish();
    }
}
