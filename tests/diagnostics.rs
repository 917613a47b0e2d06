use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use fanout::config::InputPolicy;
use fanout::plan::plan;
use fanout::reassemble::reassemble;
use fanout::{CallArgs, Fanout, FanoutConfig, OutputPolicy, TaskArgs, TaskFn, Value};

/// One recorded event
#[derive(Debug, Clone)]
struct Captured {
    level: Level,
    fields: Vec<(String, String)>,
}

impl Captured {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn message(&self) -> &str {
        self.field("message").unwrap_or("")
    }
}

#[derive(Default)]
struct FieldRecorder(Vec<(String, String)>);

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{:?}", value)));
    }
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<Captured>>>);

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        if let Ok(mut events) = self.0.lock() {
            events.push(Captured {
                level: *event.metadata().level(),
                fields: recorder.0,
            });
        }
    }
}

/// Run `f` with a subscriber that records events from this thread
fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<Captured>) {
    let layer = Capture::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    let events = layer.0.lock().map(|e| e.clone()).unwrap_or_default();
    (out, events)
}

fn at_level(events: &[Captured], level: Level) -> Vec<&Captured> {
    events.iter().filter(|e| e.level == level).collect()
}

#[test]
fn reassembly_fallback_warns_with_detail() {
    let results = vec![Value::Int(1), Value::Int(2)];
    let (out, events) = capture(|| reassemble(results.clone(), Some(&OutputPolicy::TableConcat)));

    assert_eq!(out.into_raw(), Some(results));
    let warnings = at_level(&events, Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("label"), Some("reassembly_not_a_table"));
    assert_eq!(warnings[0].field("policy"), Some("table-concat"));
    assert_eq!(warnings[0].field("error"), Some("result 0 is int, not a table"));
}

#[test]
fn successful_reassembly_is_quiet() {
    let (out, events) = capture(|| reassemble(vec![Value::Int(1)], None));
    assert!(!out.is_aggregated());
    assert!(at_level(&events, Level::WARN).is_empty());
}

#[test]
fn verbose_plan_reports_each_argument() {
    let args = CallArgs::new()
        .arg(vec![1, 2, 3])
        .arg("text")
        .kwarg("scale", 2);
    let (_, events) = capture(|| plan(args, None, &InputPolicy::none(), true));

    let infos = at_level(&events, Level::INFO);
    assert_eq!(infos.len(), 3);

    assert_eq!(infos[0].field("arg"), Some("0"));
    assert_eq!(infos[0].field("len"), Some("3"));
    assert_eq!(infos[0].message(), "argument is iterable");

    assert_eq!(infos[1].field("arg"), Some("1"));
    assert_eq!(infos[1].field("reason"), Some("kind_not_enabled:string"));
    assert_eq!(infos[1].message(), "argument skipped");

    assert_eq!(infos[2].field("arg"), Some("scale"));
    assert_eq!(infos[2].field("reason"), Some("not_a_collection"));
}

#[test]
fn quiet_plan_emits_nothing() {
    let args = CallArgs::new().arg(vec![1, 2, 3]);
    let (_, events) = capture(|| plan(args, None, &InputPolicy::none(), false));
    assert!(at_level(&events, Level::INFO).is_empty());
}

#[test]
fn declared_count_skips_argument_reports() {
    let args = CallArgs::new().arg(vec![1, 2, 3]).kwarg("scale", 2);
    let (planned, events) = capture(|| plan(args, Some(3), &InputPolicy::none(), true));
    assert_eq!(planned.n(), 3);
    assert!(at_level(&events, Level::INFO).is_empty());
}

#[test]
fn verbose_call_reports_arguments_and_summary() {
    let echo = TaskFn::arc("echo", |args: TaskArgs| Ok(args.get(0, "x")?.clone()));
    let par = Fanout::new(
        echo,
        FanoutConfig::default().with_workers(2).with_verbose(true),
    )
    .unwrap();

    let (out, events) = capture(|| par.call(CallArgs::new().arg(vec![1, 2, 3]).kwarg("tag", "a")));
    assert_eq!(out.unwrap().into_raw().map(|r| r.len()), Some(3));

    let infos = at_level(&events, Level::INFO);
    assert_eq!(infos.len(), 3);
    assert_eq!(infos[0].field("arg"), Some("0"));
    assert_eq!(infos[1].field("arg"), Some("tag"));

    let summary = infos[2];
    assert_eq!(summary.message(), "starting fan-out");
    assert_eq!(summary.field("task"), Some("echo"));
    assert_eq!(summary.field("iterations"), Some("3"));
    assert_eq!(summary.field("workers"), Some("2"));
}
