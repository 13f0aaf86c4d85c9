//! Unit tests for session configuration parsing.

use super::*;
use mockable::MockEnv;
use rstest::rstest;
use std::collections::HashMap;
use uuid::Uuid;

struct TempKeyFile {
    path: PathBuf,
}

impl TempKeyFile {
    fn new(len: usize) -> Self {
        let path = std::env::temp_dir().join(format!("tandem-session-key-{}", Uuid::new_v4()));
        std::fs::write(&path, vec![b'k'; len]).expect("write temporary key file");
        Self { path }
    }

    fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl Drop for TempKeyFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn mock_env(vars: &[(&str, &str)]) -> MockEnv {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    let mut env = MockEnv::new();
    env.expect_string()
        .times(0..)
        .returning(move |name| vars.get(name).cloned());
    env
}

fn release_env<'a>(key_path: &'a str, overrides: &[(&'a str, &'a str)]) -> MockEnv {
    let mut vars = vec![
        (KEY_FILE_ENV, key_path),
        (COOKIE_SECURE_ENV, "1"),
        (SAMESITE_ENV, "Strict"),
        (ALLOW_EPHEMERAL_ENV, "0"),
    ];
    for (name, value) in overrides {
        vars.retain(|(existing, _)| existing != name);
        vars.push((name, value));
    }
    mock_env(&vars)
}

fn expect_error(result: Result<SessionSettings, SessionConfigError>) -> SessionConfigError {
    match result {
        Ok(_) => panic!("expected session configuration to be rejected"),
        Err(error) => error,
    }
}

#[rstest]
fn release_accepts_complete_configuration() {
    let key = TempKeyFile::new(SESSION_KEY_MIN_LEN);
    let path = key.path_str();
    let settings = session_settings_from_env(&release_env(&path, &[]), BuildMode::Release)
        .expect("valid release settings");
    assert!(settings.cookie_secure);
    assert_eq!(settings.same_site, SameSite::Strict);
}

#[rstest]
#[case(COOKIE_SECURE_ENV)]
#[case(SAMESITE_ENV)]
#[case(ALLOW_EPHEMERAL_ENV)]
fn release_requires_every_toggle(#[case] missing: &'static str) {
    let key = TempKeyFile::new(SESSION_KEY_MIN_LEN);
    let path = key.path_str();
    let vars: Vec<(&str, &str)> = [
        (KEY_FILE_ENV, path.as_str()),
        (COOKIE_SECURE_ENV, "1"),
        (SAMESITE_ENV, "Strict"),
        (ALLOW_EPHEMERAL_ENV, "0"),
    ]
    .into_iter()
    .filter(|(name, _)| *name != missing)
    .collect();
    let err = expect_error(session_settings_from_env(
        &mock_env(&vars),
        BuildMode::Release,
    ));
    assert!(matches!(err, SessionConfigError::MissingEnv { name } if name == missing));
}

#[rstest]
#[case(COOKIE_SECURE_ENV, "maybe")]
#[case(SAMESITE_ENV, "sometimes")]
#[case(ALLOW_EPHEMERAL_ENV, "")]
fn release_rejects_invalid_values(#[case] name: &'static str, #[case] value: &'static str) {
    let key = TempKeyFile::new(SESSION_KEY_MIN_LEN);
    let path = key.path_str();
    let err = expect_error(session_settings_from_env(
        &release_env(&path, &[(name, value)]),
        BuildMode::Release,
    ));
    assert!(matches!(err, SessionConfigError::InvalidEnv { name: got, .. } if got == name));
}

#[rstest]
fn release_rejects_short_keys() {
    let key = TempKeyFile::new(SESSION_KEY_MIN_LEN - 1);
    let path = key.path_str();
    let err = expect_error(session_settings_from_env(
        &release_env(&path, &[]),
        BuildMode::Release,
    ));
    assert!(matches!(err, SessionConfigError::KeyTooShort { length, .. } if length == SESSION_KEY_MIN_LEN - 1));
}

#[rstest]
fn release_rejects_insecure_same_site_none() {
    let key = TempKeyFile::new(SESSION_KEY_MIN_LEN);
    let path = key.path_str();
    let err = expect_error(session_settings_from_env(
        &release_env(&path, &[(COOKIE_SECURE_ENV, "0"), (SAMESITE_ENV, "None")]),
        BuildMode::Release,
    ));
    assert!(matches!(err, SessionConfigError::InsecureSameSiteNone));
}

#[rstest]
fn release_rejects_ephemeral_keys() {
    let key = TempKeyFile::new(SESSION_KEY_MIN_LEN);
    let path = key.path_str();
    let err = expect_error(session_settings_from_env(
        &release_env(&path, &[(ALLOW_EPHEMERAL_ENV, "yes")]),
        BuildMode::Release,
    ));
    assert!(matches!(err, SessionConfigError::EphemeralNotAllowed));
}

#[rstest]
fn release_requires_a_readable_key_file() {
    let missing = std::env::temp_dir().join(format!("tandem-missing-{}", Uuid::new_v4()));
    let path = missing.to_string_lossy().into_owned();
    let err = expect_error(session_settings_from_env(
        &release_env(&path, &[]),
        BuildMode::Release,
    ));
    assert!(matches!(err, SessionConfigError::KeyRead { .. }));
}

#[rstest]
fn debug_falls_back_to_lax_secure_ephemeral() {
    let missing = std::env::temp_dir().join(format!("tandem-missing-{}", Uuid::new_v4()));
    let path = missing.to_string_lossy().into_owned();
    let env = mock_env(&[(KEY_FILE_ENV, path.as_str()), (SAMESITE_ENV, "bogus")]);
    let settings =
        session_settings_from_env(&env, BuildMode::Debug).expect("debug builds use defaults");
    assert!(settings.cookie_secure);
    assert_eq!(settings.same_site, SameSite::Lax);
}

#[rstest]
#[case("1", Some(true))]
#[case(" Yes ", Some(true))]
#[case("n", Some(false))]
#[case("FALSE", Some(false))]
#[case("2", None)]
fn booleans_are_parsed_leniently(#[case] raw: &str, #[case] expected: Option<bool>) {
    assert_eq!(parse_bool(raw), expected);
}

#[rstest]
fn fingerprint_is_stable_per_key() {
    let settings = |byte: u8| SessionSettings {
        key: Key::derive_from(&[byte; SESSION_KEY_MIN_LEN]),
        cookie_secure: true,
        same_site: SameSite::Strict,
    };
    assert_eq!(settings(1).key_fingerprint(), settings(1).key_fingerprint());
    assert_ne!(settings(1).key_fingerprint(), settings(2).key_fingerprint());
}
