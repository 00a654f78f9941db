use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use upfetch::{Attempts, Options};

const VARS: [&str; 4] = [
    "UPFETCH_BASE_URL",
    "UPFETCH_TIMEOUT_MS",
    "UPFETCH_RETRY_ATTEMPTS",
    "UPFETCH_RETRY_DELAY_MS",
];

// Process environment is shared by every test thread in this binary.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clean_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for name in VARS {
        std::env::remove_var(name);
    }
    guard
}

#[test]
fn from_env_reads_base_url_and_retry() {
    let _env = clean_env();
    std::env::set_var("UPFETCH_BASE_URL", " https://env.test ");
    std::env::set_var("UPFETCH_TIMEOUT_MS", "1500");
    std::env::set_var("UPFETCH_RETRY_ATTEMPTS", "4");

    let options = Options::from_env().expect("env config must load");

    assert_eq!(options.base_url.as_deref(), Some("https://env.test"));
    assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
    let retry = options.retry.expect("retry must be configured");
    assert!(matches!(retry.attempts, Attempts::Fixed(4)));
}

#[test]
fn from_env_without_retry_vars_leaves_retry_unset() {
    let _env = clean_env();
    std::env::set_var("UPFETCH_BASE_URL", "https://env.test");

    let options = Options::from_env().expect("env config must load");

    assert!(options.retry.is_none());
    assert!(options.timeout.is_none());
}

#[test]
fn missing_base_url_is_an_error() {
    let _env = clean_env();

    let err = Options::from_env().expect_err("base url is required");
    assert_eq!(err, "missing UPFETCH_BASE_URL environment variable");
}

#[test]
fn blank_base_url_is_an_error() {
    let _env = clean_env();
    std::env::set_var("UPFETCH_BASE_URL", "   ");

    let err = Options::from_env().expect_err("blank base url must fail");
    assert_eq!(err, "UPFETCH_BASE_URL is set but empty");
}

#[test]
fn non_numeric_timeout_is_an_error() {
    let _env = clean_env();
    std::env::set_var("UPFETCH_BASE_URL", "https://env.test");
    std::env::set_var("UPFETCH_TIMEOUT_MS", "soon");

    let err = Options::from_env().expect_err("timeout must be numeric");
    assert_eq!(
        err,
        "UPFETCH_TIMEOUT_MS must be a non-negative integer, got 'soon'"
    );
}
