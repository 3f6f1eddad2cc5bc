//! Hook repository behaviour: back-fill, idempotence, listeners and
//! concurrent updates.

use std::sync::{Arc, Mutex};

use crypto_detector_core::engine::StoreId;
use crypto_detector_core::hooks::{
    Hook, HookAction, HookDetectionObserver, HookInvocation, HookOrigin, HookRepository,
    HookRepositoryListener, HookSpec, HookTrigger, RepositoryEvent,
};
use crypto_detector_core::language::memory::{MemoryProgram, NodeId};
use crypto_detector_core::model::{DetectionContext, KeyAction, KeyActionFactory};
use crypto_detector_core::rules::DetectionRule;
use pretty_assertions::assert_eq;

#[derive(Default)]
struct Recorder {
    sites: Mutex<Vec<NodeId>>,
}

impl Recorder {
    fn sites(&self) -> Vec<NodeId> {
        self.sites.lock().unwrap().clone()
    }
}

impl HookDetectionObserver<NodeId> for Recorder {
    fn on_hook_invoked(&self, invocation: &HookInvocation<NodeId>) {
        self.sites.lock().unwrap().push(invocation.site);
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<RepositoryEvent>>,
}

impl HookRepositoryListener<NodeId> for EventLog {
    fn on_event(&self, event: RepositoryEvent, _hook: &Hook<NodeId>) {
        self.events.lock().unwrap().push(event);
    }
}

fn generate_key_rule() -> Arc<DetectionRule> {
    DetectionRule::named("fernet")
        .for_object_types(["Fernet"])
        .for_constructor()
        .with_any_parameters()
        .build_for_context(DetectionContext::cipher())
        .in_bundle("test")
        .with_hook(HookSpec::new(
            HookTrigger::invocation("generate_key"),
            Arc::new(KeyActionFactory(KeyAction::Generation)),
        ))
        .without_dependent_rules()
        .unwrap()
}

fn hook(rule: &Arc<DetectionRule>, origin: u64, site: NodeId, root: bool) -> Hook<NodeId> {
    Hook::new(
        HookTrigger::invocation("generate_key"),
        HookAction::Emit {
            rule: Arc::clone(rule),
            hook: 0,
        },
        HookOrigin {
            store: StoreId::new(origin),
            level: 0,
            site,
        },
        root,
    )
}

struct Fixture {
    program: MemoryProgram,
    constructor: NodeId,
    generate: Vec<NodeId>,
}

fn fixture(generate_calls: usize) -> Fixture {
    let mut program = MemoryProgram::new("app.py");
    let constructor = program.construct("Fernet", &[]);
    let generate = (0..generate_calls)
        .map(|_| program.call("Fernet", "generate_key", &[]))
        .collect();
    program.call("Fernet", "encrypt", &[]);
    Fixture {
        program,
        constructor,
        generate,
    }
}

#[test]
fn test_root_hook_back_fills_visited_sites_once() {
    let f = fixture(2);
    let repository = HookRepository::new();
    let recorder = Arc::new(Recorder::default());
    let rule = generate_key_rule();

    for site in f.program.call_sites() {
        repository.update(&f.program, &site);
    }
    assert!(repository.subscribe(&f.program, hook(&rule, 1, f.constructor, true), recorder.clone()));
    assert_eq!(recorder.sites(), f.generate);

    // seeing the same sites again fires nothing new
    for site in f.program.call_sites() {
        assert_eq!(repository.update(&f.program, &site), 0);
    }
    assert_eq!(recorder.sites().len(), 2);
}

#[test]
fn test_lazy_hook_only_sees_later_sites() {
    let f = fixture(2);
    let repository = HookRepository::new();
    let recorder = Arc::new(Recorder::default());
    let rule = generate_key_rule();

    repository.update(&f.program, &f.generate[0]);
    repository.subscribe(&f.program, hook(&rule, 1, f.constructor, false), recorder.clone());
    assert!(recorder.sites().is_empty());

    assert_eq!(repository.update(&f.program, &f.generate[1]), 1);
    assert_eq!(recorder.sites(), vec![f.generate[1]]);
}

#[test]
fn test_same_interest_is_subscribed_once() {
    let f = fixture(1);
    let repository = HookRepository::new();
    let recorder = Arc::new(Recorder::default());
    let rule = generate_key_rule();

    assert!(repository.subscribe(&f.program, hook(&rule, 1, f.constructor, true), recorder.clone()));
    assert!(!repository.subscribe(&f.program, hook(&rule, 1, f.constructor, true), recorder.clone()));
    assert_eq!(repository.len(), 1);

    // a different origin store is a different interest
    assert!(repository.subscribe(&f.program, hook(&rule, 2, f.constructor, true), recorder.clone()));
    assert_eq!(repository.len(), 2);

    repository.update(&f.program, &f.generate[0]);
    assert_eq!(recorder.sites(), vec![f.generate[0], f.generate[0]]);
}

#[test]
fn test_unsubscribe_is_idempotent_and_notifies_listeners() {
    let f = fixture(1);
    let repository = HookRepository::new();
    let log = Arc::new(EventLog::default());
    repository.add_listener(log.clone());
    let recorder = Arc::new(Recorder::default());
    let rule = generate_key_rule();

    let subscribed = hook(&rule, 1, f.constructor, true);
    repository.subscribe(&f.program, subscribed.clone(), recorder.clone());
    assert!(repository.contains(&subscribed));
    assert!(repository.unsubscribe(&subscribed));
    assert!(!repository.unsubscribe(&subscribed));
    assert!(repository.is_empty());

    assert_eq!(repository.update(&f.program, &f.generate[0]), 0);
    assert!(recorder.sites().is_empty());
    assert_eq!(
        *log.events.lock().unwrap(),
        vec![RepositoryEvent::Added, RepositoryEvent::Removed]
    );
}

/// Subscribes a follow-up hook from inside its own notification.
struct Chaining {
    repository: Arc<HookRepository<NodeId>>,
    program: Arc<MemoryProgram>,
    follow_up: Mutex<Option<Hook<NodeId>>>,
    follow_up_recorder: Arc<Recorder>,
}

impl HookDetectionObserver<NodeId> for Chaining {
    fn on_hook_invoked(&self, _invocation: &HookInvocation<NodeId>) {
        let next = self.follow_up.lock().unwrap().take();
        if let Some(next) = next {
            self.repository.subscribe(
                self.program.as_ref(),
                next,
                self.follow_up_recorder.clone(),
            );
        }
    }
}

#[test]
fn test_subscribe_from_inside_a_notification() {
    let f = fixture(1);
    let program = Arc::new(f.program);
    let repository = Arc::new(HookRepository::new());
    let follow_up_recorder = Arc::new(Recorder::default());
    let rule = generate_key_rule();

    let chaining = Arc::new(Chaining {
        repository: Arc::clone(&repository),
        program: Arc::clone(&program),
        follow_up: Mutex::new(Some(hook(&rule, 2, f.constructor, true))),
        follow_up_recorder: follow_up_recorder.clone(),
    });

    repository.subscribe(program.as_ref(), hook(&rule, 1, f.constructor, true), chaining);
    repository.update(program.as_ref(), &f.generate[0]);

    // the follow-up hook back-fills the site that triggered its creation
    assert_eq!(repository.len(), 2);
    assert_eq!(follow_up_recorder.sites(), vec![f.generate[0]]);
}

#[test]
fn test_concurrent_updates_fire_each_site_once() {
    let f = fixture(64);
    let repository = HookRepository::new();
    let recorder = Arc::new(Recorder::default());
    let rule = generate_key_rule();
    let sites = f.program.call_sites();

    std::thread::scope(|scope| {
        let (first, second) = sites.split_at(sites.len() / 2);
        for half in [first, second] {
            let repository = &repository;
            let program = &f.program;
            scope.spawn(move || {
                for site in half {
                    repository.update(program, site);
                }
            });
        }
        let repository = &repository;
        let program = &f.program;
        let recorder = recorder.clone();
        let hook = hook(&rule, 1, f.constructor, true);
        scope.spawn(move || {
            repository.subscribe(program, hook, recorder);
        });
    });

    // a straggler update after everything settled must not re-fire
    for site in &sites {
        repository.update(&f.program, site);
    }

    let mut seen = recorder.sites();
    seen.sort();
    assert_eq!(seen, f.generate);
    assert_eq!(repository.visited_count(), sites.len());
}
