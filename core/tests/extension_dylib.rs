//! Loads real shared libraries through the router.
//!
//! The `twinsh-ext-greet` cdylib is built on first use into a scratch target
//! directory, so these tests never depend on an earlier `cargo build`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use twinsh_core::{CommandRouter, ConsoleError, ExtensionError};

fn library_file() -> &'static str {
    if cfg!(target_os = "windows") {
        "twinsh_ext_greet.dll"
    } else if cfg!(target_os = "macos") {
        "libtwinsh_ext_greet.dylib"
    } else {
        "libtwinsh_ext_greet.so"
    }
}

fn build_greet_library() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir.parent().expect("core lives inside the workspace");
    let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("greet-extension");

    let status = Command::new(env!("CARGO"))
        .args(["build", "--quiet", "-p", "twinsh-ext-greet", "--target-dir"])
        .arg(&target_dir)
        .current_dir(workspace_root)
        .status()
        .expect("failed to run cargo");
    assert!(status.success(), "building twinsh-ext-greet failed: {status}");

    let library = target_dir.join("debug").join(library_file());
    assert!(library.exists(), "{} missing after build", library.display());
    library
}

fn greet_library() -> &'static Path {
    static LIBRARY: OnceLock<PathBuf> = OnceLock::new();
    LIBRARY.get_or_init(build_greet_library)
}

#[tokio::test]
async fn load_call_unload_load() {
    let lib = greet_library().to_path_buf();
    let mut router = CommandRouter::with_rhai();

    let loaded = router.execute(&format!("dll {}", lib.display())).await;
    assert!(loaded.success(), "{}", loaded.error());
    assert!(loaded.output().contains("greet"));
    assert_eq!(router.extensions().len(), 1);

    assert_eq!(router.execute("&add(2, 3)").await.output(), "5");
    assert_eq!(router.execute(r#"&shout("quiet")"#).await.output(), "QUIET");
    assert!(router.complete("gre").contains(&"greet(".to_string()));

    let twice = router.execute(&format!("dll {}", lib.display())).await;
    assert!(!twice.success());
    assert!(twice.error().contains("already loaded"));
    assert_eq!(router.extensions().len(), 1);

    let listed = router.execute("dlls").await;
    assert!(listed.output().contains("libtwinsh_ext_greet") || listed.output().contains("twinsh_ext_greet"));

    assert!(router.execute(&format!("unload {}", lib.display())).await.success());
    assert!(router.extensions().is_empty());

    let stale = router.execute("&add(1, 1)").await;
    assert!(!stale.success());
    assert!(stale.error().contains("unloaded"), "{}", stale.error());

    let again = router.execute(&format!("dll {}", lib.display())).await;
    assert!(again.success(), "{}", again.error());
    assert_eq!(router.execute("&add(1, 1)").await.output(), "2");
}

#[tokio::test]
async fn reload_replaces_module() {
    let lib = greet_library().to_path_buf();
    let mut router = CommandRouter::with_rhai();

    assert!(router.execute(&format!("reload {}", lib.display())).await.success());
    assert!(router.execute(&format!("reload {}", lib.display())).await.success());
    assert_eq!(router.extensions().len(), 1);
    assert_eq!(router.execute("&add(20, 22)").await.output(), "42");
}

#[tokio::test]
async fn native_errors_surface_as_script_errors() {
    let lib = greet_library().to_path_buf();
    let mut router = CommandRouter::with_rhai();
    router.load_extension(&lib).unwrap();

    let result = router.execute("&add(1, \"x\")").await;
    assert!(!result.success());
    assert!(!result.error().is_empty());
}

/// A shared library the test process already has mapped, none of which
/// export the extension entry symbol.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn mapped_system_library() -> PathBuf {
    let maps = std::fs::read_to_string("/proc/self/maps").unwrap();
    maps.lines()
        .filter_map(|line| line.split_whitespace().nth(5))
        .map(PathBuf::from)
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("libc.so") || name.starts_with("libc-"))
        })
        .expect("libc is mapped into every glibc process")
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[tokio::test]
async fn library_without_entry_symbol_is_rejected() {
    let lib = mapped_system_library();
    let mut router = CommandRouter::with_rhai();
    router.load_extension(&greet_library().to_path_buf()).unwrap();
    let before: Vec<PathBuf> = router.extensions().list_loaded().map(|m| m.path().to_path_buf()).collect();

    let err = router.load_extension(&lib).unwrap_err();
    assert!(
        matches!(err, ConsoleError::Extension(ExtensionError::MissingEntry { symbol: "RegisterFunctions", .. })),
        "{err}"
    );

    let after: Vec<PathBuf> = router.extensions().list_loaded().map(|m| m.path().to_path_buf()).collect();
    assert_eq!(before, after);

    let result = router.execute(&format!("dll {}", lib.display())).await;
    assert!(!result.success());
    assert!(result.error().contains("RegisterFunctions"), "{}", result.error());
}
