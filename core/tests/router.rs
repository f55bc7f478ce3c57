//! End-to-end routing through the public API.
//!
//! Nothing here changes the working directory; see `cd.rs` for that.

use twinsh_core::{CommandRouter, Mode, RouterOptions, TIMEOUT_EXIT_CODE};

#[tokio::test]
async fn pwd_then_script_arithmetic() {
    let mut router = CommandRouter::with_rhai();
    assert_eq!(router.mode(), Mode::Shell);

    let pwd = router.execute("pwd").await;
    assert!(pwd.success());
    assert_eq!(pwd.exit_code(), 0);
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(pwd.output(), cwd.display().to_string());

    let switch = router.execute("js").await;
    assert!(switch.success());
    assert_eq!(router.mode(), Mode::Script);

    let answer = router.execute("21*2").await;
    assert!(answer.success());
    assert_eq!(answer.output(), "42");
}

#[cfg(unix)]
#[tokio::test]
async fn escape_marker_does_not_switch_mode() {
    let mut router = CommandRouter::with_rhai();

    let script = router.execute("&1+1").await;
    assert_eq!(script.output(), "2");
    assert_eq!(router.mode(), Mode::Shell);

    let shell = router.execute("echo hi").await;
    assert!(shell.success());
    assert_eq!(shell.output(), "hi\n");
}

#[tokio::test]
async fn mode_persists_across_ordinary_lines() {
    let mut router = CommandRouter::with_rhai();
    router.execute("script").await;
    for line in ["let x = 1;", "x + 1", "help", "history", "broken syntax (", "mode"] {
        router.execute(line).await;
        assert_eq!(router.mode(), Mode::Script, "after {line:?}");
    }
    assert_eq!(router.execute("mode").await.output(), "script");
}

#[tokio::test]
async fn script_state_survives_shell_detours() {
    let mut router = CommandRouter::with_rhai();
    router.execute("&let counter = 40;").await;
    router.execute("shell").await;
    router.execute("javascript").await;
    assert_eq!(router.execute("counter + 2").await.output(), "42");
}

#[tokio::test]
async fn print_output_is_part_of_result() {
    let mut router = CommandRouter::with_rhai();
    router.set_mode(Mode::Script);
    let result = router.execute(r#"print("side effect"); 5"#).await;
    assert_eq!(result.output(), "side effect\n5");
}

#[cfg(unix)]
#[tokio::test]
async fn aliases_expand_first_word_only() {
    let mut router = CommandRouter::with_rhai();
    assert!(router.execute("alias greet=echo hello").await.success());
    assert!(router.execute("alias hello=echo nested").await.success());

    let result = router.execute("greet world").await;
    assert_eq!(result.output(), "hello world\n");

    let listing = router.execute("alias").await;
    assert_eq!(listing.output(), "alias greet='echo hello'\nalias hello='echo nested'");

    assert!(router.execute("unalias greet").await.success());
    assert!(!router.execute("unalias greet").await.success());
}

#[cfg(unix)]
#[tokio::test]
async fn shell_exit_status_is_mirrored() {
    let mut router = CommandRouter::with_rhai();
    let result = router.execute("exit 7").await;
    // `exit` is a built-in, so it quits the console rather than the subprocess.
    assert!(result.success());
    assert!(router.should_quit());
    assert_eq!(router.exit_code(), 7);

    let mut router = CommandRouter::with_rhai();
    let result = router.execute("sh -c 'exit 5'").await;
    assert_eq!(result.exit_code(), 5);
    assert!(!result.success());
    assert_eq!(router.exit_code(), 5);
    assert!(!router.should_quit());
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_kills_subprocess() {
    let options = RouterOptions {
        timeout: Some(std::time::Duration::from_millis(200)),
        ..RouterOptions::default()
    };
    let mut router = CommandRouter::with_options(twinsh_core::RhaiEngine::new(), options);
    let result = router.execute("sleep 10").await;
    assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
    assert!(result.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn unknown_builtin_keeps_session_alive() {
    let mut router = CommandRouter::with_rhai();
    let result = router.execute(".nosuchthing").await;
    assert_eq!(result.exit_code(), 127);
    assert!(!router.should_quit());
    assert!(router.execute(".help").await.success());
}

#[tokio::test]
async fn quit_sets_flag_only() {
    let mut router = CommandRouter::with_rhai();
    assert!(router.execute("quit").await.success());
    assert!(router.should_quit());
    assert_eq!(router.exit_code(), 0);

    let mut router = CommandRouter::with_rhai();
    let bad = router.execute("exit nope").await;
    assert!(!bad.success());
    assert!(!router.should_quit());
}

#[tokio::test]
async fn clear_emits_control_sequence() {
    let mut router = CommandRouter::with_rhai();
    assert!(router.execute("clear").await.output().starts_with("\x1b["));
}

#[tokio::test]
async fn load_evaluates_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("setup.rhai");
    std::fs::write(&path, "fn triple(n) { n * 3 }\nlet base = 14;").unwrap();

    let mut router = CommandRouter::with_rhai();
    let loaded = router.execute(&format!("load {}", path.display())).await;
    assert!(loaded.success(), "{}", loaded.error());

    router.execute("js").await;
    assert_eq!(router.execute("triple(base)").await.output(), "42");
    assert_eq!(router.complete("trip"), vec!["triple("]);
}

#[tokio::test]
async fn load_missing_file_fails() {
    let mut router = CommandRouter::with_rhai();
    let result = router.execute("load /no/such/file.rhai").await;
    assert!(!result.success());
    assert!(result.error().contains("/no/such/file.rhai"));

    let usage = router.execute("load").await;
    assert_eq!(usage.exit_code(), 2);
}

#[tokio::test]
async fn extension_builtins_report_failures() {
    let mut router = CommandRouter::with_rhai();

    let missing = router.execute("dll /no/such/libthing.so").await;
    assert!(!missing.success());
    assert!(missing.error().contains("failed to load library"));

    let unload = router.execute("unload /no/such/libthing.so").await;
    assert!(!unload.success());
    assert!(unload.error().contains("not loaded"));

    let reload = router.execute("reload /no/such/libthing.so").await;
    assert!(!reload.success());

    assert_eq!(router.execute("dlls").await.output(), "no extensions loaded");
}

#[tokio::test]
async fn save_writes_session_file() {
    let dir = tempfile::tempdir().unwrap();
    let session = dir.path().join("session.conf");
    let options = RouterOptions {
        session_file: Some(session.clone()),
        ..RouterOptions::default()
    };
    let mut router = CommandRouter::with_options(twinsh_core::RhaiEngine::new(), options);
    router.execute("alias ll=ls -la").await;
    router.execute("js").await;
    let saved = router.execute("save").await;
    assert!(saved.success(), "{}", saved.error());

    let restored = twinsh_config::SessionFile::load(&session).unwrap();
    assert_eq!(restored.mode.as_deref(), Some("script"));
    assert_eq!(restored.aliases.get("ll").map(String::as_str), Some("ls -la"));

    let mut fresh = CommandRouter::with_rhai();
    fresh.apply_session(&restored);
    assert_eq!(fresh.mode(), Mode::Script);
}

#[tokio::test]
async fn history_builtin_lists_recent_lines() {
    let mut router = CommandRouter::with_rhai();
    router.execute("&1").await;
    router.execute("&2").await;
    let result = router.execute("history 2").await;
    assert_eq!(result.output(), "    2  &2\n    3  history 2");
}

#[tokio::test]
async fn results_serialize() {
    let mut router = CommandRouter::with_rhai();
    let result = router.execute("&6*7").await;
    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["output"], "42");
    assert_eq!(json["success"], true);
}
