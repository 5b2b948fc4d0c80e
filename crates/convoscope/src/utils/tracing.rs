use std::fmt;
use std::sync::OnceLock;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::{propagation::TraceContextPropagator, Resource};
use time::macros::format_description;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format, time::FormatTime, FmtContext, FormatEvent, FormatFields, FormattedFields,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use common::configuration::Tracing;

const SERVICE_NAME: &str = "convoscope";

struct BracketedTime;

impl FormatTime for BracketedTime {
    fn format_time(&self, w: &mut format::Writer<'_>) -> fmt::Result {
        let now = time::OffsetDateTime::now_utc();
        let formatted = now
            .format(&format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(w, "[{}]", formatted)
    }
}

/// `[time][level] request_id=.. fields`, with the request id lifted from the
/// enclosing request span
struct BracketedFormatter;

impl<S, N> FormatEvent<S, N> for BracketedFormatter
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
        BracketedTime.format_time(&mut writer)?;

        write!(
            writer,
            "[{}]",
            event.metadata().level().to_string().to_lowercase()
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let Some(fields) = extensions.get::<FormattedFields<N>>() else {
                    continue;
                };
                if let Some(request_id) = field_value(fields.fields.as_str(), "request_id") {
                    write!(writer, " request_id={}", request_id)?;
                    break;
                }
            }
        }

        write!(writer, " ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Value of `name=...` inside formatted span fields
fn field_value<'a>(fields: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=", name);
    let start = fields.find(&needle)? + needle.len();
    let rest = &fields[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end])
}

static INIT_LOGGER: OnceLock<SdkTracerProvider> = OnceLock::new();

fn fmt_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    // no ANSI to keep fields parseable
    tracing_subscriber::fmt::layer()
        .event_format(BracketedFormatter)
        .fmt_fields(format::DefaultFields::new())
        .with_ansi(false)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Build an OTLP-exporting provider, `None` when export is disabled or the
/// exporter cannot be built
fn otlp_provider(endpoint: &str, random_sampling: u32) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("failed to create OTLP span exporter, tracing export disabled: {}", e);
            return None;
        }
    };

    let ratio = f64::from(random_sampling.min(100)) / 100.0;
    Some(
        SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                ratio,
            ))))
            .with_batch_exporter(exporter)
            .build(),
    )
}

pub fn init_tracer(tracing_config: Option<&Tracing>) -> &'static SdkTracerProvider {
    INIT_LOGGER.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let otel_endpoint = tracing_config.and_then(|t| t.opentracing_grpc_endpoint.clone());
        let random_sampling = tracing_config.and_then(|t| t.random_sampling).unwrap_or(0);

        let exporting_provider = match (&otel_endpoint, random_sampling) {
            (Some(endpoint), sampling) if sampling > 0 => otlp_provider(endpoint, sampling),
            _ => None,
        };
        eprintln!(
            "initializing tracing: tracing_enabled={}, otel_endpoint={:?}, random_sampling={}",
            exporting_provider.is_some(),
            otel_endpoint,
            random_sampling
        );

        match exporting_provider {
            Some(provider) => {
                global::set_tracer_provider(provider.clone());
                let telemetry_layer =
                    tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME));

                let result = tracing_subscriber::registry()
                    .with(telemetry_layer)
                    .with(env_filter())
                    .with(fmt_layer())
                    .try_init();
                if let Err(e) = result {
                    eprintln!("tracing subscriber already set: {}", e);
                }
                provider
            }
            None => {
                // no-op provider
                let provider = SdkTracerProvider::builder().build();
                global::set_tracer_provider(provider.clone());

                let result = tracing_subscriber::registry()
                    .with(env_filter())
                    .with(fmt_layer())
                    .try_init();
                if let Err(e) = result {
                    eprintln!("tracing subscriber already set: {}", e);
                }
                provider
            }
        }
    })
}
