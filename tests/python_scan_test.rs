//! Python scanner e2e tests
//!
//! Runs the bundled catalog over the fixtures in tests/fixtures/python/ and
//! checks the reported store trees.

mod fixtures;

use crypto_detector_core::discovery::{discover_files, DiscoveryOptions};
use crypto_detector_core::output::StoreReport;
use crypto_detector_core::scanner::{ScanResult, Scanner};
use crypto_detector_core::RuleCatalog;
use fixtures::{get_test_fixture_path, read_fixture};
use pretty_assertions::assert_eq;

fn scanner() -> Scanner {
    Scanner::new(RuleCatalog::bundled().unwrap().entry_rules())
}

fn scan_fixture(name: &str) -> ScanResult {
    let result = scanner().scan_source(name, &read_fixture("python", name));
    assert!(!result.has_errors(), "{name}: {:?}", result.errors);
    result
}

fn scan_inline(source: &str) -> ScanResult {
    scanner().scan_source("inline.py", source)
}

fn detection<'a>(result: &'a ScanResult, rule: &str) -> &'a StoreReport {
    result
        .detections
        .iter()
        .find(|d| d.rule == rule)
        .unwrap_or_else(|| panic!("no detection for {rule} in {}", result.file_path))
}

/// (kind, value) pairs of the store itself, in production order.
fn values(report: &StoreReport) -> Vec<(String, String)> {
    report
        .values
        .iter()
        .map(|v| (v.kind.clone(), v.value.clone()))
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn child<'a>(report: &'a StoreReport, slot: i32) -> &'a StoreReport {
    report
        .children
        .iter()
        .find(|c| c.parent_slot == Some(slot))
        .unwrap_or_else(|| panic!("{} has no child under slot {slot}", report.rule))
}

#[test]
fn test_cipher_construction_with_nested_algorithm_and_mode() {
    let result = scan_fixture("symmetric.py");
    assert_eq!(result.detection_count(), 1);

    let cipher = detection(&result, "cryptography.cipher");
    assert_eq!(cipher.context, "Cipher(BLOCK_CIPHER)");
    assert_eq!(cipher.location.as_ref().map(|l| l.line), Some(9));
    assert!(cipher.values.is_empty());

    let algorithm = child(cipher, 0);
    assert_eq!(algorithm.rule, "cryptography.algorithms.block");
    assert_eq!(algorithm.level, 1);
    assert_eq!(values(algorithm), pairs(&[("Algorithm", "AES"), ("KeySize", "256")]));

    let mode = child(cipher, 1);
    assert_eq!(mode.rule, "cryptography.modes.iv");
    assert_eq!(values(mode), pairs(&[("Mode", "CBC"), ("NonceSize", "128")]));

    assert_eq!(cipher.dependents.len(), 1);
    assert_eq!(cipher.dependents[0].rule, "cryptography.cipher.encryptor");
    assert_eq!(values(&cipher.dependents[0]), pairs(&[("CipherAction", "ENCRYPT")]));
    assert_eq!(cipher.store_count(), 4);
}

#[test]
fn test_key_derivation_functions() {
    let result = scan_fixture("kdf.py");
    assert_eq!(result.detection_count(), 2);

    let legacy = detection(&result, "hashlib.pbkdf2_hmac");
    assert_eq!(legacy.bundle, "python-stdlib");
    assert_eq!(
        values(legacy),
        pairs(&[
            ("Algorithm", "PBKDF2"),
            ("Algorithm", "sha256"),
            ("PasswordSize", "56"),
            ("SaltSize", "128"),
            ("AlgorithmParameter", "100000"),
        ])
    );
    let slots: Vec<i32> = legacy.values.iter().map(|v| v.slot).collect();
    assert_eq!(slots, vec![-1, 0, 1, 2, 3]);

    let kdf = detection(&result, "cryptography.pbkdf2");
    assert_eq!(kdf.context, "KeyDerivationFunction(algorithm=PBKDF2)");
    assert_eq!(
        values(kdf),
        pairs(&[
            ("Algorithm", "PBKDF2"),
            ("KeySize", "256"),
            ("SaltSize", "128"),
            ("AlgorithmParameter", "480000"),
        ])
    );
    let hash = child(kdf, 0);
    assert_eq!(hash.rule, "cryptography.hash_algorithm");
    assert_eq!(values(hash), pairs(&[("Algorithm", "SHA256")]));
}

#[test]
fn test_rsa_key_size_is_reparented_and_sign_is_a_dependent() {
    let result = scan_fixture("rsa_sign.py");
    assert_eq!(result.detection_count(), 1);

    let generate = detection(&result, "cryptography.rsa.generate");
    assert_eq!(generate.context, "PrivateKey(RSA)");
    assert_eq!(
        values(generate),
        pairs(&[("Algorithm", "RSA"), ("AlgorithmParameter", "65537")])
    );

    let key = child(generate, -1);
    assert_eq!(key.context, "Key(RSA)");
    assert_eq!(key.level, 1);
    assert_eq!(values(key), pairs(&[("KeySize", "2048")]));
    assert_eq!(key.values[0].unit.as_deref(), Some("BIT"));

    // the receiver of `sign` has no known type; wildcard rules still apply
    assert_eq!(generate.dependents.len(), 1);
    let sign = &generate.dependents[0];
    assert_eq!(sign.rule, "cryptography.rsa.sign");
    assert_eq!(values(sign), pairs(&[("SignatureAction", "SIGN")]));
    assert_eq!(values(child(sign, 1)), pairs(&[("Padding", "PKCS1v15")]));
    assert_eq!(values(child(sign, 2)), pairs(&[("Algorithm", "SHA256")]));
}

#[test]
fn test_function_parameter_is_resolved_at_the_call() {
    let result = scan_fixture("wrapper.py");
    assert_eq!(result.detection_count(), 1);

    let new = detection(&result, "hashlib.new.with_data");
    assert_eq!(values(new), pairs(&[("Algorithm", "sha512")]));
    let location = new.values[0].location.as_ref().unwrap();
    assert_eq!(location.line, 8);
}

#[test]
fn test_same_named_method_is_not_a_call_of_the_function() {
    let result = scan_inline(
        "import hashlib\n\ndef digest(name, data):\n    return hashlib.new(name, data)\n\ndigest('sha512', b'x')\nother.digest('md5', b'y')\n",
    );
    assert_eq!(result.detection_count(), 1);

    let new = detection(&result, "hashlib.new.with_data");
    assert_eq!(values(new), pairs(&[("Algorithm", "sha512")]));
    assert_eq!(new.values[0].location.as_ref().unwrap().line, 6);
}

#[test]
fn test_method_parameter_is_resolved_for_instances_of_its_class() {
    let result = scan_inline(
        "import hashlib\n\nclass Hasher:\n    def run(self, name, data):\n        return hashlib.new(name, data)\n\nclass Other:\n    def run(self, name, data):\n        pass\n\nHasher().run('sha256', b'x')\nOther().run('md5', b'y')\n",
    );
    assert_eq!(result.detection_count(), 1);

    let new = detection(&result, "hashlib.new.with_data");
    assert_eq!(values(new), pairs(&[("Algorithm", "sha256")]));
    assert_eq!(new.values[0].location.as_ref().unwrap().line, 11);
}

#[test]
fn test_rule_hook_fires_on_earlier_site() {
    let result = scan_fixture("fernet_token.py");
    assert_eq!(result.detection_count(), 1);

    let fernet = detection(&result, "cryptography.fernet");
    assert_eq!(
        values(fernet),
        pairs(&[("Algorithm", "FERNET"), ("KeyAction", "GENERATION")])
    );
    let generation = &fernet.values[1];
    assert_eq!(generation.location.as_ref().map(|l| l.line), Some(3));
}

#[test]
fn test_pycryptodome_bundle() {
    let result = scan_fixture("pycryptodome_gcm.py");
    assert_eq!(result.detection_count(), 1);

    let aes = detection(&result, "pycryptodome.aes.new");
    assert_eq!(aes.bundle, "pycryptodome");
    assert_eq!(
        values(aes),
        pairs(&[("Algorithm", "AES"), ("KeySize", "128"), ("Mode", "MODE_GCM")])
    );
}

#[test]
fn test_bundle_selection_limits_detections() {
    let catalog = RuleCatalog::bundled().unwrap();
    let stdlib_only = Scanner::new(catalog.entry_rules_in(&["python-stdlib".to_string()]));
    let result = stdlib_only.scan_source("kdf.py", &read_fixture("python", "kdf.py"));
    let rules: Vec<&str> = result.detections.iter().map(|d| d.rule.as_str()).collect();
    assert_eq!(rules, vec!["hashlib.pbkdf2_hmac"]);
}

#[test]
fn test_unrelated_calls_are_ignored() {
    let result = scan_inline("import json\n\njson.dumps({'sha256': 1})\nprint('AES')\n");
    assert!(result.detections.is_empty());
    assert!(!result.has_errors());
}

#[test]
fn test_unresolved_arguments_still_match() {
    let result = scan_inline("import hashlib\n\nhashlib.new(load_name())\n");
    let new = detection(&result, "hashlib.new");
    assert!(new.values.is_empty());
}

#[test]
fn test_syntax_errors_give_partial_results() {
    let result = scan_inline("import hashlib\n\nhashlib.sha1(b'x')\n\ndef broken(:\n    pass\n");
    assert!(!result.has_errors());
    assert_eq!(detection(&result, "hashlib.digest").values.len(), 1);
}

#[test]
fn test_project_directory_scan() {
    let root = get_test_fixture_path("python", Some("project"));
    let files = discover_files(&root, &DiscoveryOptions::default()).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|f| {
            f.strip_prefix(&root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    assert_eq!(names, vec!["app.py", "pkg/plain.py", "pkg/tokens.py"]);

    let results = scanner().scan_files(&files);
    let counts: Vec<usize> = results.iter().map(ScanResult::detection_count).collect();
    assert_eq!(counts, vec![1, 0, 1]);

    assert_eq!(values(detection(&results[0], "hashlib.digest")), pairs(&[("Algorithm", "md5")]));
    let token = detection(&results[2], "secrets.token");
    assert_eq!(token.context, "PRNG()");
    assert_eq!(values(token), pairs(&[("KeySize", "256")]));
}
