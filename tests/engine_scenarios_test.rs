//! Engine scenarios on the programmatic host
//!
//! Builds rules with the typestate builder, assembles small programs node
//! by node and checks the store trees a session produces.

use std::collections::BTreeSet;
use std::sync::Arc;

use crypto_detector_core::engine::{DetectionSession, DetectionStore};
use crypto_detector_core::hooks::{EnumConstant, HookSpec, HookTrigger};
use crypto_detector_core::language::memory::{MemoryProgram, NodeId};
use crypto_detector_core::language::Argument;
use crypto_detector_core::model::{
    AlgorithmFactory, AlgorithmParameterFactory, DetectionContext, KeyKind, Literal, ModeFactory,
    OperationModeFactory, ParameterKind, SizeFactory, SizeKind, SizeUnit, ValueKind,
};
use crypto_detector_core::rules::{DetectionRule, Slot};
use pretty_assertions::assert_eq;

const CIPHER: &str = "javax.crypto.Cipher";

fn run(program: &MemoryProgram, rules: Vec<Arc<DetectionRule>>) -> Vec<DetectionStore<NodeId>> {
    let session = DetectionSession::new(program, rules);
    for site in program.call_sites() {
        session.visit(&site);
    }
    session.finish()
}

fn kinds(store: &DetectionStore<NodeId>, slot: Slot) -> Vec<ValueKind> {
    store.values_for(slot).map(|v| v.kind().clone()).collect()
}

fn algorithm(name: &str) -> ValueKind {
    ValueKind::Algorithm(name.to_string())
}

fn key_size(bits: u64, unit: SizeUnit) -> ValueKind {
    ValueKind::Size {
        kind: SizeKind::Key,
        bits,
        unit,
    }
}

fn get_instance_rule(dependents: Vec<Arc<DetectionRule>>) -> Arc<DetectionRule> {
    DetectionRule::named("cipher.getInstance")
        .for_object_types([CIPHER])
        .for_methods(["getInstance"])
        .with_method_parameter("java.lang.String")
        .should_be_detected_as(AlgorithmFactory::new())
        .build_for_context(DetectionContext::cipher())
        .in_bundle("jca")
        .with_dependent_rules(dependents)
        .unwrap()
}

fn cipher_init_rule() -> Arc<DetectionRule> {
    DetectionRule::named("cipher.init")
        .for_object_types([CIPHER])
        .for_methods(["init"])
        .with_method_parameter("int")
        .should_be_detected_as(OperationModeFactory)
        .with_method_parameter("java.security.Key")
        .build_for_context(DetectionContext::cipher())
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap()
}

#[test]
fn test_cipher_with_dependent_init() {
    let mut program = MemoryProgram::new("Main.java");
    let aes = program.string("AES");
    let get_instance = program.call(CIPHER, "getInstance", &[aes]);
    let mode = program.int(2);
    let key = program.opaque(Some("java.security.Key"));
    let init = program.call(CIPHER, "init", &[mode, key]);
    program.add_usage(get_instance, init);

    let stores = run(&program, vec![get_instance_rule(vec![cipher_init_rule()])]);
    assert_eq!(stores.len(), 1);

    let store = &stores[0];
    assert_eq!(store.context(), &DetectionContext::cipher());
    assert_eq!(store.level(), 0);
    assert_eq!(kinds(store, Slot::Parameter(0)), vec![algorithm("AES")]);
    assert_eq!(store.values_for(Slot::Parameter(0)).next().unwrap().location(), &aes);

    assert_eq!(store.dependents().len(), 1);
    let dependent = &store.dependents()[0];
    assert_eq!(dependent.level(), 1);
    assert_eq!(dependent.site(), &init);
    assert_eq!(
        kinds(dependent, Slot::Parameter(0)),
        vec![ValueKind::OperationMode("2".into())]
    );
    assert!(dependent.values_for(Slot::Parameter(1)).next().is_none());
}

#[test]
fn test_dependent_rule_needs_a_usage() {
    let mut program = MemoryProgram::new("Main.java");
    let aes = program.string("AES");
    program.call(CIPHER, "getInstance", &[aes]);
    let mode = program.int(1);
    let key = program.opaque(Some("java.security.Key"));
    // an unrelated init, never linked to the getInstance result
    program.call(CIPHER, "init", &[mode, key]);

    let stores = run(&program, vec![get_instance_rule(vec![cipher_init_rule()])]);
    assert_eq!(stores.len(), 1);
    assert!(stores[0].dependents().is_empty());
}

#[test]
fn test_factories_apply_per_parameter() {
    let mut program = MemoryProgram::new("Main.java");
    let password = program.opaque(Some("char[]"));
    let salt = program.opaque(Some("byte[]"));
    let iterations = program.int(65536);
    let length = program.int(256);
    program.construct("javax.crypto.spec.PBEKeySpec", &[password, salt, iterations, length]);

    let key_only = DetectionRule::named("pbe.key-only")
        .for_object_types(["javax.crypto.spec.PBEKeySpec"])
        .for_constructor()
        .with_method_parameter("char[]")
        .with_method_parameter("byte[]")
        .with_method_parameter("int")
        .with_method_parameter("int")
        .should_be_detected_as(SizeFactory::key_size(SizeUnit::Bit))
        .build_for_context(DetectionContext::SecretKey(KeyKind::Pbe))
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![key_only]);
    assert_eq!(stores.len(), 1);
    let store = &stores[0];
    assert_eq!(store.values().len(), 1);
    assert_eq!(kinds(store, Slot::Parameter(3)), vec![key_size(256, SizeUnit::Bit)]);

    let with_iterations = DetectionRule::named("pbe.iterations")
        .for_object_types(["javax.crypto.spec.PBEKeySpec"])
        .for_constructor()
        .with_method_parameter("char[]")
        .with_method_parameter("byte[]")
        .with_method_parameter("int")
        .should_be_detected_as(AlgorithmParameterFactory(ParameterKind::Iterations))
        .with_method_parameter("int")
        .should_be_detected_as(SizeFactory::key_size(SizeUnit::Bit))
        .build_for_context(DetectionContext::SecretKey(KeyKind::Pbe))
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![with_iterations]);
    let store = &stores[0];
    assert_eq!(store.values().len(), 2);
    assert_eq!(
        kinds(store, Slot::Parameter(2)),
        vec![ValueKind::AlgorithmParameter {
            kind: ParameterKind::Iterations,
            text: "65536".into(),
        }]
    );
}

#[test]
fn test_exact_and_subtype_receivers() {
    let mut program = MemoryProgram::new("Main.java");
    program.declare_subtype("sun.security.rsa.RSAKeyPairGenerator", "java.security.KeyPairGenerator");
    program.call("sun.security.rsa.RSAKeyPairGenerator", "initialize", &[]);

    let rule = |exact: bool| {
        let builder = DetectionRule::named(if exact { "exact" } else { "subtype" });
        let builder = if exact {
            builder.for_object_exact_types(["java.security.KeyPairGenerator"])
        } else {
            builder.for_object_types(["java.security.KeyPairGenerator"])
        };
        builder
            .for_methods(["initialize"])
            .with_any_parameters()
            .build_for_context(DetectionContext::Key(KeyKind::None))
            .in_bundle("jca")
            .without_dependent_rules()
            .unwrap()
    };

    let stores = run(&program, vec![rule(true), rule(false)]);
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0].rule().name(), Some("subtype"));
}

#[test]
fn test_arity_and_parameter_types_gate_the_match() {
    let mut program = MemoryProgram::new("Main.java");
    let a = program.int(128);
    let b = program.int(256);
    let two_ints = program.call("javax.crypto.KeyGenerator", "init", &[a, b]);
    let text = program.string("128");
    let string_arg = program.call("javax.crypto.KeyGenerator", "init", &[text]);
    let c = program.int(192);
    let one_int = program.call("javax.crypto.KeyGenerator", "init", &[c]);

    let rule = DetectionRule::named("keygen.init")
        .for_object_types(["javax.crypto.KeyGenerator"])
        .for_methods(["init"])
        .with_method_parameter("int")
        .should_be_detected_as(SizeFactory::key_size(SizeUnit::Bit))
        .build_for_context(DetectionContext::SecretKey(KeyKind::Symmetric))
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![rule]);
    let sites: Vec<NodeId> = stores.iter().map(|s| *s.site()).collect();
    assert_eq!(sites, vec![one_int]);
    assert!(!sites.contains(&two_ints));
    assert!(!sites.contains(&string_arg));
}

#[test]
fn test_without_parameters_needs_an_empty_call() {
    let mut program = MemoryProgram::new("Main.java");
    let empty = program.call("javax.crypto.KeyGenerator", "generateKey", &[]);
    let arg = program.opaque(None);
    program.call("javax.crypto.KeyGenerator", "generateKey", &[arg]);

    let rule = DetectionRule::named("keygen.generate")
        .for_object_types(["javax.crypto.KeyGenerator"])
        .for_methods(["generateKey"])
        .without_parameters()
        .build_for_context(DetectionContext::SecretKey(KeyKind::None))
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![rule]);
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0].site(), &empty);
}

#[test]
fn test_keyword_arguments_bind_before_positional_ones() {
    let mut program = MemoryProgram::new("app.py");
    let gcm = program.string("GCM");
    let aes = program.string("AES");
    program.call_with(
        "Cipher",
        "new",
        vec![Argument::keyword("mode", gcm), Argument::positional(aes)],
    );

    let rule = DetectionRule::named("cipher.new")
        .for_object_types(["Cipher"])
        .for_methods(["new"])
        .with_keyword_parameter("algorithm", "*")
        .should_be_detected_as(AlgorithmFactory::new())
        .with_keyword_parameter("mode", "*")
        .should_be_detected_as(ModeFactory::new())
        .build_for_context(DetectionContext::cipher())
        .in_bundle("test")
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![rule]);
    assert_eq!(stores.len(), 1);
    assert_eq!(kinds(&stores[0], Slot::Parameter(0)), vec![algorithm("AES")]);
    assert_eq!(
        kinds(&stores[0], Slot::Parameter(1)),
        vec![ValueKind::Mode("GCM".into())]
    );
}

#[test]
fn test_every_candidate_definition_is_detected() {
    let mut program = MemoryProgram::new("Main.java");
    let aes = program.string("AES");
    let des = program.string("DES");
    let algo = program.reference(Some("java.lang.String"), &[aes, des]);
    program.call(CIPHER, "getInstance", &[algo]);

    let stores = run(&program, vec![get_instance_rule(Vec::new())]);
    let store = &stores[0];
    assert_eq!(kinds(store, Slot::Parameter(0)), vec![algorithm("AES"), algorithm("DES")]);
    let locations: Vec<NodeId> = store
        .values_for(Slot::Parameter(0))
        .map(|v| *v.location())
        .collect();
    assert_eq!(locations, vec![aes, des]);
}

#[test]
fn test_size_units() {
    let mut program = MemoryProgram::new("Main.java");
    let bytes = program.int(128);
    program.call("Bytes", "init", &[bytes]);
    let bits = program.int(128);
    program.call("Bits", "init", &[bits]);
    let prime = program.string("123456789");
    program.call("Prime", "init", &[prime]);

    let rule = |object: &str, ty: &str, unit: SizeUnit| {
        DetectionRule::named(object)
            .for_object_types([object])
            .for_methods(["init"])
            .with_method_parameter(ty)
            .should_be_detected_as(SizeFactory::key_size(unit))
            .build_for_context(DetectionContext::Key(KeyKind::None))
            .in_bundle("test")
            .without_dependent_rules()
            .unwrap()
    };

    let stores = run(
        &program,
        vec![
            rule("Bytes", "int", SizeUnit::Byte),
            rule("Bits", "int", SizeUnit::Bit),
            rule("Prime", "java.lang.String", SizeUnit::PrimeP),
        ],
    );
    let found: Vec<ValueKind> = stores
        .iter()
        .flat_map(|s| kinds(s, Slot::Parameter(0)))
        .collect();
    assert_eq!(
        found,
        vec![
            key_size(1024, SizeUnit::Byte),
            key_size(128, SizeUnit::Bit),
            key_size(27, SizeUnit::PrimeP),
        ]
    );
}

#[test]
fn test_reparent_under_match_level() {
    let mut program = MemoryProgram::new("Main.java");
    let bits = program.int(2048);
    let site = program.call("java.security.KeyPairGenerator", "initialize", &[bits]);

    let rule = DetectionRule::named("kpg.initialize")
        .for_object_types(["java.security.KeyPairGenerator"])
        .for_methods(["initialize"])
        .should_be_detected_as(AlgorithmFactory::fixed("RSA"))
        .with_method_parameter("int")
        .should_be_detected_as(SizeFactory::key_size(SizeUnit::Bit))
        .as_child_of_parameter_with_id(-1)
        .in_parameter_context(DetectionContext::Key(KeyKind::Rsa))
        .build_for_context(DetectionContext::Key(KeyKind::None))
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![rule]);
    let store = &stores[0];
    assert_eq!(kinds(store, Slot::Method), vec![algorithm("RSA")]);
    assert!(store.values_for(Slot::Parameter(0)).next().is_none());
    assert_eq!(store.values_for(Slot::Method).next().unwrap().location(), &site);

    let children = store.children_for(Slot::Method);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].context(), &DetectionContext::Key(KeyKind::Rsa));
    assert_eq!(children[0].level(), 1);
    assert_eq!(kinds(&children[0], Slot::Parameter(0)), vec![key_size(2048, SizeUnit::Bit)]);
}

#[test]
fn test_nested_parameter_rules() {
    let mut program = MemoryProgram::new("Main.java");
    program.declare_subtype(
        "javax.crypto.spec.GCMParameterSpec",
        "java.security.spec.AlgorithmParameterSpec",
    );
    let mode = program.int(1);
    let key = program.opaque(Some("java.security.Key"));
    let tag = program.int(128);
    let iv = program.opaque(Some("byte[]"));
    let spec = program.construct("javax.crypto.spec.GCMParameterSpec", &[tag, iv]);
    program.call(CIPHER, "init", &[mode, key, spec]);

    let gcm = DetectionRule::named("gcm.spec")
        .for_object_types(["javax.crypto.spec.GCMParameterSpec"])
        .for_constructor()
        .with_method_parameter("int")
        .should_be_detected_as(SizeFactory::tag_size(SizeUnit::Bit))
        .with_method_parameter("byte[]")
        .build_for_context(DetectionContext::AlgorithmParameter(Default::default()))
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();
    let init = DetectionRule::named("cipher.init.spec")
        .for_object_types([CIPHER])
        .for_methods(["init"])
        .with_method_parameter("int")
        .should_be_detected_as(OperationModeFactory)
        .with_method_parameter("java.security.Key")
        .with_method_parameter("java.security.spec.AlgorithmParameterSpec")
        .with_parameter_rules(vec![gcm])
        .build_for_context(DetectionContext::cipher())
        .in_bundle("jca")
        .without_dependent_rules()
        .unwrap();

    // only the entry rule yields top-level stores; the spec site is nested
    let stores = run(&program, vec![init]);
    assert_eq!(stores.len(), 1);
    let nested = stores[0].children_for(Slot::Parameter(2));
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].level(), 1);
    assert_eq!(nested[0].site(), &spec);
    assert_eq!(
        kinds(&nested[0], Slot::Parameter(0)),
        vec![ValueKind::Size {
            kind: SizeKind::Tag,
            bits: 128,
            unit: SizeUnit::Bit,
        }]
    );
    assert_eq!(stores[0].store_count(), 2);
}

fn call_encrypt(program: &mut MemoryProgram) -> NodeId {
    let aes = program.string("AES");
    program.call("app.Main", "encrypt", &[aes]);
    aes
}

/// `encrypt(algo)` passes its parameter to `Cipher.getInstance`; the only
/// literal is at the call of `encrypt`.
fn function_parameter_program(call_first: bool) -> (MemoryProgram, NodeId) {
    let mut program = MemoryProgram::new("Main.java");
    if call_first {
        let aes = call_encrypt(&mut program);
        declare_encrypt(&mut program);
        (program, aes)
    } else {
        declare_encrypt(&mut program);
        let aes = call_encrypt(&mut program);
        (program, aes)
    }
}

fn declare_encrypt(program: &mut MemoryProgram) {
    let param = program.parameter("app.Main", "encrypt", 0, Some("java.lang.String"));
    program.call(CIPHER, "getInstance", &[param]);
}

#[test]
fn test_function_parameter_resolved_at_call_site() {
    for call_first in [false, true] {
        let (program, aes) = function_parameter_program(call_first);
        let stores = run(&program, vec![get_instance_rule(Vec::new())]);

        assert_eq!(stores.len(), 1, "call_first = {call_first}");
        let values: Vec<_> = stores[0].values_for(Slot::Parameter(0)).collect();
        assert_eq!(values.len(), 1, "call_first = {call_first}");
        assert_eq!(values[0].kind(), &algorithm("AES"));
        assert_eq!(values[0].location(), &aes);
    }
}

#[test]
fn test_same_named_method_on_another_type_is_not_a_caller() {
    let (mut program, aes) = function_parameter_program(false);
    let des = program.string("DES");
    program.call("app.Other", "encrypt", &[des]);

    let stores = run(&program, vec![get_instance_rule(Vec::new())]);
    let values: Vec<_> = stores[0].values_for(Slot::Parameter(0)).collect();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].location(), &aes);
}

#[test]
fn test_revisiting_a_call_site_does_not_duplicate_hook_values() {
    let (program, _) = function_parameter_program(false);
    let session = DetectionSession::new(&program, vec![get_instance_rule(Vec::new())]);
    for site in program.call_sites() {
        session.visit(&site);
    }
    let caller = *program.call_sites().last().unwrap();
    session.visit(&caller);
    let stores = session.finish();
    let get_instance = stores
        .iter()
        .find(|s| s.rule().name() == Some("cipher.getInstance"))
        .unwrap();
    assert_eq!(get_instance.values_for(Slot::Parameter(0)).count(), 1);
}

#[test]
fn test_rule_hook_on_enum_constant() {
    let mut program = MemoryProgram::new("Main.java");
    let aes = program.string("AES");
    let get_instance = program.call(CIPHER, "getInstance", &[aes]);
    let mode = program.enum_constant(CIPHER, "ENCRYPT_MODE");
    let key = program.opaque(Some("java.security.Key"));
    program.call(CIPHER, "init", &[mode, key]);

    let rule = DetectionRule::named("cipher.getInstance.hooked")
        .for_object_types([CIPHER])
        .for_methods(["getInstance"])
        .with_method_parameter("java.lang.String")
        .should_be_detected_as(AlgorithmFactory::new())
        .build_for_context(DetectionContext::cipher())
        .in_bundle("jca")
        .with_hook(HookSpec::new(
            HookTrigger::EnumConstant(EnumConstant::new(Some("Cipher"), "ENCRYPT_MODE")),
            Arc::new(OperationModeFactory),
        ))
        .without_dependent_rules()
        .unwrap();

    let stores = run(&program, vec![rule]);
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0].site(), &get_instance);
    let modes: Vec<_> = stores[0].values_for(Slot::Method).collect();
    assert_eq!(modes.len(), 1);
    assert_eq!(modes[0].kind(), &ValueKind::OperationMode("ENCRYPT_MODE".into()));
    assert_eq!(modes[0].location(), &mode);
}

#[test]
fn test_max_depth_cuts_dependents() {
    let mut program = MemoryProgram::new("Main.java");
    let aes = program.string("AES");
    let get_instance = program.call(CIPHER, "getInstance", &[aes]);
    let mode = program.int(2);
    let key = program.opaque(Some("java.security.Key"));
    let init = program.call(CIPHER, "init", &[mode, key]);
    program.add_usage(get_instance, init);

    let session = DetectionSession::new(&program, vec![get_instance_rule(vec![cipher_init_rule()])])
        .with_max_depth(1);
    for site in program.call_sites() {
        session.visit(&site);
    }
    let stores = session.finish();
    assert_eq!(stores.len(), 1);
    assert!(stores[0].dependents().is_empty());
}

#[test]
fn test_concurrent_visits() {
    let mut program = MemoryProgram::new("Main.java");
    let names = ["AES", "DES", "DESede", "Blowfish", "RC4", "ChaCha20", "SM4", "Camellia"];
    for name in names {
        let literal = program.literal(Literal::Str(name.to_string()), "java.lang.String");
        program.call(CIPHER, "getInstance", &[literal]);
    }

    let session = DetectionSession::new(&program, vec![get_instance_rule(Vec::new())]);
    let sites = program.call_sites();
    std::thread::scope(|scope| {
        for chunk in sites.chunks(2) {
            let session = &session;
            scope.spawn(move || {
                for site in chunk {
                    session.visit(site);
                }
            });
        }
    });
    let stores = session.finish();

    assert_eq!(stores.len(), names.len());
    let found: BTreeSet<String> = stores
        .iter()
        .flat_map(|s| s.values_for(Slot::Parameter(0)).map(|v| v.to_string()))
        .collect();
    let expected: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
    assert_eq!(found, expected);
}
