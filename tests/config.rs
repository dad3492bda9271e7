//! Exercises the parts of configuration that only show up once `clap` actually reads the
//! process environment — the inline unit tests in `src/config.rs` build a `Cli` by hand and so
//! never touch the `env = "..."` attributes themselves.

use std::sync::Mutex;

use clap::Parser;
use rpcproxy::config::Cli;

// `std::env::set_var` mutates process-global state; serialize these tests so they can't race.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn port_env_var_overrides_default() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        std::env::set_var("RPCPROXY_PORT", "7777");
    }
    let cli = Cli::parse_from(["rpcproxy"]);
    unsafe {
        std::env::remove_var("RPCPROXY_PORT");
    }
    assert_eq!(cli.port, 7777);
}

#[test]
fn cli_flag_takes_precedence_over_env_var() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        std::env::set_var("RPCPROXY_PORT", "7777");
    }
    let cli = Cli::parse_from(["rpcproxy", "--port", "6000"]);
    unsafe {
        std::env::remove_var("RPCPROXY_PORT");
    }
    assert_eq!(cli.port, 6000);
}

#[test]
fn token_env_var_is_picked_up() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        std::env::set_var("RPCPROXY_TOKEN", "from-env");
    }
    let cli = Cli::parse_from(["rpcproxy"]);
    unsafe {
        std::env::remove_var("RPCPROXY_TOKEN");
    }
    assert_eq!(cli.token.as_deref(), Some("from-env"));
}

#[test]
fn defaults_with_no_env_or_flags() {
    let _guard = ENV_LOCK.lock().unwrap();
    let cli = Cli::parse_from(["rpcproxy"]);
    assert_eq!(cli.port, 9000);
    assert_eq!(cli.health_interval, 1800);
    assert_eq!(cli.targets, vec!["http://localhost:8545".to_string()]);
    assert!(cli.token.is_none());
    assert!(!cli.health_check);
}

#[test]
fn comma_separated_targets_split_into_a_vec() {
    let _guard = ENV_LOCK.lock().unwrap();
    let cli = Cli::parse_from(["rpcproxy", "--targets", "http://a.example,http://b.example"]);
    assert_eq!(cli.targets, vec!["http://a.example".to_string(), "http://b.example".to_string()]);
}
