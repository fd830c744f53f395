use nbgradle_config::{ProjectSettingsProvider, SettingsStore, PROJECT_SETTINGS_FILE_NAME};
use std::sync::{Arc, Mutex};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Clone, Default)]
struct Targets(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for Targets {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0
            .lock()
            .unwrap()
            .push(event.metadata().target().to_string());
    }
}

fn events_with_filter(directives: &str, f: impl FnOnce()) -> Vec<String> {
    let targets = Targets::default();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(directives))
        .with(targets.clone());
    tracing::subscriber::with_default(subscriber, f);
    let out = targets.0.lock().unwrap().clone();
    out
}

#[test]
fn crate_directive_selects_config_events() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(PROJECT_SETTINGS_FILE_NAME), "[gradle\n").unwrap();
    let store = SettingsStore::default();

    let selected = events_with_filter("off,nbgradle.config=warn", || {
        store.gradle_settings(tmp.path());
    });
    assert_eq!(selected, vec!["nbgradle.config".to_string()]);

    let silenced = events_with_filter("warn,nbgradle.config=off", || {
        store.gradle_settings(tmp.path());
    });
    assert!(silenced.is_empty(), "{silenced:?}");
}
