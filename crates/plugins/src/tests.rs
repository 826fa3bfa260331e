use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::oneshot;

use ledgerwatch_domain::config::PluginEntry;
use ledgerwatch_domain::model::{
    Block, ErrorNotice, ErrorSubject, EventKind, MonitorEvent, Snapshot, Transaction, TxId,
};
use ledgerwatch_domain::source::{LedgerFacade, SourceResult};

use crate::builtin::{builtin_registry, EXAMPLE_PLUGIN_ID};
use crate::plugin::{Plugin, PluginDescriptor, PluginError, PluginResult};
use crate::router::{ManagedPlugin, PluginRouter, PluginState, RouterError};
use crate::schema::{ConfigSchema, FieldKind};

#[derive(Default, Clone)]
struct Behaviour {
    fail_start: bool,
    fail_stop: bool,
    fail_on: Option<EventKind>,
    panic_on: Option<EventKind>,
    schema: Option<ConfigSchema>,
}

/// Records every callback it receives and fails on demand.
#[derive(Default)]
struct RecordingPlugin {
    behaviour: Behaviour,
    calls: Mutex<Vec<String>>,
}

impl RecordingPlugin {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn handle(&self, kind: EventKind, subject: &str) -> PluginResult {
        if self.behaviour.panic_on == Some(kind) {
            panic!("plugin blew up on {kind}");
        }
        self.record(format!("{kind}:{subject}"));
        if self.behaviour.fail_on == Some(kind) {
            return Err(PluginError::runtime(format!("cannot handle {subject}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: "Recording Plugin",
            description: "test double",
            version: "0.0.0",
        }
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        self.behaviour.schema.clone()
    }

    async fn on_start(&self) -> PluginResult {
        self.record("start");
        if self.behaviour.fail_start {
            return Err(PluginError::runtime("pluginError"));
        }
        Ok(())
    }

    async fn on_stop(&self) -> PluginResult {
        self.record("stop");
        if self.behaviour.fail_stop {
            return Err(PluginError::runtime("pluginError"));
        }
        Ok(())
    }

    async fn on_pending_tx(&self, tx: &Transaction, _snapshot: &Snapshot) -> PluginResult {
        self.handle(EventKind::PendingTx, tx.id.as_str())
    }

    async fn on_dropped_tx(&self, tx: &Transaction, _snapshot: &Snapshot) -> PluginResult {
        self.handle(EventKind::DroppedTx, tx.id.as_str())
    }

    async fn on_confirmed_tx(&self, tx: &Transaction, _snapshot: &Snapshot) -> PluginResult {
        self.handle(EventKind::ConfirmedTx, tx.id.as_str())
    }

    async fn on_new_block(&self, block: &Block, _snapshot: &Snapshot) -> PluginResult {
        self.handle(EventKind::NewBlock, block.id().as_str())
    }
}

struct NullLedger;

#[async_trait]
impl LedgerFacade for NullLedger {
    async fn submit_transaction(&self, tx: &Transaction) -> SourceResult<TxId> {
        Ok(tx.id.clone())
    }

    async fn boxes_by_token_id(&self, _token_id: &str) -> SourceResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

fn managed(id: &str, plugin: &Arc<RecordingPlugin>, state: PluginState) -> ManagedPlugin {
    let plugin: Arc<dyn Plugin> = plugin.clone();
    ManagedPlugin::new(id, plugin, json!({})).with_state(state)
}

fn router(plugins: Vec<ManagedPlugin>) -> (PluginRouter, UnboundedReceiver<ErrorNotice>) {
    let (tx, rx) = unbounded_channel();
    (PluginRouter::from_managed(plugins, tx), rx)
}

fn notices(rx: &mut UnboundedReceiver<ErrorNotice>) -> Vec<ErrorNotice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}

fn pending(id: &str) -> MonitorEvent {
    MonitorEvent::PendingTx {
        tx: Transaction::new(id),
        snapshot: Snapshot::new(100, vec![Transaction::new(id)]),
    }
}

#[tokio::test]
async fn start_all_only_starts_stopped_plugins() {
    let running = RecordingPlugin::new(Behaviour::default());
    let errored = RecordingPlugin::new(Behaviour::default());
    let stopped = RecordingPlugin::new(Behaviour::default());
    let (mut router, mut rx) = router(vec![
        managed("running", &running, PluginState::Running),
        managed("stopped", &stopped, PluginState::Stopped),
        managed("errored", &errored, PluginState::Errored),
    ]);

    router.start_all().await;

    assert!(running.calls().is_empty());
    assert!(errored.calls().is_empty());
    assert_eq!(stopped.calls(), vec!["start"]);
    assert_eq!(router.state_of("stopped"), Some(PluginState::Running));
    assert_eq!(router.state_of("errored"), Some(PluginState::Errored));
    assert!(notices(&mut rx).is_empty());
}

#[tokio::test]
async fn stop_all_only_stops_running_plugins() {
    let running = RecordingPlugin::new(Behaviour::default());
    let errored = RecordingPlugin::new(Behaviour::default());
    let stopped = RecordingPlugin::new(Behaviour::default());
    let (mut router, _rx) = router(vec![
        managed("running", &running, PluginState::Running),
        managed("stopped", &stopped, PluginState::Stopped),
        managed("errored", &errored, PluginState::Errored),
    ]);

    router.stop_all().await;

    assert_eq!(running.calls(), vec!["stop"]);
    assert!(errored.calls().is_empty());
    assert!(stopped.calls().is_empty());
    assert_eq!(router.state_of("running"), Some(PluginState::Stopped));
}

#[tokio::test]
async fn failing_start_is_isolated_to_that_plugin() {
    let a = RecordingPlugin::new(Behaviour::default());
    let b = RecordingPlugin::new(Behaviour {
        fail_start: true,
        ..Behaviour::default()
    });
    let c = RecordingPlugin::new(Behaviour::default());
    let (mut router, mut rx) = router(vec![
        managed("a", &a, PluginState::Stopped),
        managed("b", &b, PluginState::Stopped),
        managed("c", &c, PluginState::Stopped),
    ]);

    router.start_all().await;

    assert_eq!(router.state_of("a"), Some(PluginState::Running));
    assert_eq!(router.state_of("b"), Some(PluginState::Errored));
    assert_eq!(router.state_of("c"), Some(PluginState::Running));
    assert_eq!(
        notices(&mut rx),
        vec![ErrorNotice {
            subject: ErrorSubject::Plugin,
            identity: "b".into(),
            cause: "pluginError".into(),
        }]
    );

    router.dispatch(&pending("tx1")).await;

    assert_eq!(a.calls(), vec!["start", "pending_tx:tx1"]);
    assert_eq!(b.calls(), vec!["start"]);
    assert_eq!(c.calls(), vec!["start", "pending_tx:tx1"]);
}

#[tokio::test]
async fn invalid_config_errors_plugin_before_on_start() {
    let strict = RecordingPlugin::new(Behaviour {
        schema: Some(ConfigSchema::new().required("someValue", FieldKind::Number)),
        ..Behaviour::default()
    });
    let (mut router, mut rx) = router(vec![managed("strict", &strict, PluginState::Stopped)]);

    router.start_all().await;

    assert!(strict.calls().is_empty());
    assert_eq!(router.state_of("strict"), Some(PluginState::Errored));
    let notices = notices(&mut rx);
    assert_eq!(notices.len(), 1);
    assert!(notices[0]
        .cause
        .starts_with("invalid plugin configuration: missing required field `someValue`"));
}

#[tokio::test]
async fn failing_callback_only_errors_that_plugin() {
    let healthy = RecordingPlugin::new(Behaviour::default());
    let flaky = RecordingPlugin::new(Behaviour {
        fail_on: Some(EventKind::PendingTx),
        ..Behaviour::default()
    });
    let (mut router, mut rx) = router(vec![
        managed("healthy", &healthy, PluginState::Running),
        managed("flaky", &flaky, PluginState::Running),
    ]);

    router.dispatch(&pending("tx1")).await;
    router.dispatch(&pending("tx2")).await;

    assert_eq!(healthy.calls(), vec!["pending_tx:tx1", "pending_tx:tx2"]);
    assert_eq!(flaky.calls(), vec!["pending_tx:tx1"]);
    assert_eq!(router.state_of("flaky"), Some(PluginState::Errored));
    assert_eq!(router.state_of("healthy"), Some(PluginState::Running));

    let notices = notices(&mut rx);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].identity, "flaky");
    assert_eq!(notices[0].cause, "cannot handle tx1");
}

#[tokio::test]
async fn panicking_callback_is_contained() {
    let healthy = RecordingPlugin::new(Behaviour::default());
    let panicky = RecordingPlugin::new(Behaviour {
        panic_on: Some(EventKind::NewBlock),
        ..Behaviour::default()
    });
    let (mut router, mut rx) = router(vec![
        managed("panicky", &panicky, PluginState::Running),
        managed("healthy", &healthy, PluginState::Running),
    ]);
    let block = MonitorEvent::NewBlock {
        block: Arc::new(Block::new("b1", 1, Vec::new())),
        snapshot: Snapshot::new(1, Vec::new()),
    };

    router.dispatch(&block).await;

    assert_eq!(healthy.calls(), vec!["new_block:b1"]);
    assert_eq!(router.state_of("panicky"), Some(PluginState::Errored));
    let notices = notices(&mut rx);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].cause, "plugin panicked: plugin blew up on new_block");
}

#[tokio::test]
async fn events_reach_the_matching_callback() {
    let plugin = RecordingPlugin::new(Behaviour::default());
    let (mut router, _rx) = router(vec![managed("p", &plugin, PluginState::Running)]);
    let snapshot = Snapshot::new(5, Vec::new());

    let events = vec![
        pending("t1"),
        MonitorEvent::NewBlock {
            block: Arc::new(Block::new("b5", 5, vec![Transaction::new("t1")])),
            snapshot: snapshot.clone(),
        },
        MonitorEvent::ConfirmedTx {
            tx: Transaction::new("t1"),
            snapshot: snapshot.clone(),
        },
        MonitorEvent::DroppedTx {
            tx: Transaction::new("t2"),
            snapshot,
        },
    ];
    for event in &events {
        router.dispatch(event).await;
    }

    assert_eq!(
        plugin.calls(),
        vec![
            "pending_tx:t1",
            "new_block:b5",
            "confirmed_tx:t1",
            "dropped_tx:t2"
        ]
    );
}

#[tokio::test]
async fn failing_stop_errors_plugin_and_reports_it() {
    let plugin = RecordingPlugin::new(Behaviour {
        fail_stop: true,
        ..Behaviour::default()
    });
    let (mut router, mut rx) = router(vec![managed("p", &plugin, PluginState::Running)]);

    router.stop_all().await;

    assert_eq!(router.state_of("p"), Some(PluginState::Errored));
    let notices = notices(&mut rx);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, ErrorSubject::Plugin);
}

#[tokio::test]
async fn run_drains_queued_events_before_shutting_down() {
    let plugin = RecordingPlugin::new(Behaviour::default());
    let (mut router, _rx) = router(vec![managed("p", &plugin, PluginState::Running)]);
    let (event_tx, mut event_rx) = unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    event_tx.send(pending("a")).unwrap();
    event_tx.send(pending("b")).unwrap();
    stop_tx.send(()).unwrap();

    router.run(&mut event_rx, stop_rx).await;

    assert_eq!(plugin.calls(), vec!["pending_tx:a", "pending_tx:b"]);
}

#[tokio::test]
async fn run_ends_when_the_monitor_hangs_up() {
    let plugin = RecordingPlugin::new(Behaviour::default());
    let (mut router, _rx) = router(vec![managed("p", &plugin, PluginState::Running)]);
    let (event_tx, mut event_rx) = unbounded_channel();
    let (_stop_tx, stop_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        router.run(&mut event_rx, stop_rx).await;
        router
    });
    event_tx.send(pending("a")).unwrap();
    drop(event_tx);

    let router = handle.await.expect("router task joins");
    assert_eq!(plugin.calls(), vec!["pending_tx:a"]);
    assert_eq!(router.state_of("p"), Some(PluginState::Running));
}

fn entry(id: &str, enabled: bool, config: Value) -> PluginEntry {
    PluginEntry {
        id: id.to_string(),
        enabled,
        config,
    }
}

#[test]
fn unknown_enabled_plugin_id_is_rejected() {
    let (tx, _rx) = unbounded_channel();
    let result = PluginRouter::new(
        &[entry("invalid", true, json!({}))],
        &builtin_registry(),
        Arc::new(NullLedger),
        tx,
    );
    assert_eq!(
        result.err(),
        Some(RouterError::UnknownPlugin("invalid".into()))
    );
}

#[test]
fn disabled_plugins_are_not_instantiated() {
    let (tx, _rx) = unbounded_channel();
    let router = PluginRouter::new(
        &[
            entry("invalid", false, json!({})),
            entry(EXAMPLE_PLUGIN_ID, true, json!({"someValue": 3})),
        ],
        &builtin_registry(),
        Arc::new(NullLedger),
        tx,
    )
    .expect("router builds");

    assert_eq!(router.plugins().len(), 1);
    assert_eq!(router.plugins()[0].id(), EXAMPLE_PLUGIN_ID);
    assert_eq!(
        router.plugins()[0].plugin().descriptor().name,
        "Example Plugin"
    );
    assert_eq!(router.state_of(EXAMPLE_PLUGIN_ID), Some(PluginState::Stopped));
}

#[tokio::test]
async fn example_plugin_validates_its_config() {
    let (tx, mut rx) = unbounded_channel();
    let mut router = PluginRouter::new(
        &[entry(EXAMPLE_PLUGIN_ID, true, json!({"someValue": "three"}))],
        &builtin_registry(),
        Arc::new(NullLedger),
        tx,
    )
    .expect("router builds");

    router.start_all().await;

    assert_eq!(router.state_of(EXAMPLE_PLUGIN_ID), Some(PluginState::Errored));
    assert_eq!(
        notices(&mut rx)[0].cause,
        "invalid plugin configuration: field `someValue` must be number, found string"
    );
}

#[tokio::test]
async fn example_plugin_runs_through_its_lifecycle() {
    let (tx, mut rx) = unbounded_channel();
    let mut router = PluginRouter::new(
        &[entry(EXAMPLE_PLUGIN_ID, true, json!({"someValue": 3}))],
        &builtin_registry(),
        Arc::new(NullLedger),
        tx,
    )
    .expect("router builds");

    router.start_all().await;
    router.dispatch(&pending("tx1")).await;
    router.stop_all().await;

    assert_eq!(router.state_of(EXAMPLE_PLUGIN_ID), Some(PluginState::Stopped));
    assert!(notices(&mut rx).is_empty());
}
