//! Process-environment helpers shared by integration tests.

use camino::Utf8PathBuf;
use std::env;
use std::ffi::{OsStr, OsString};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Scoped set of environment changes, reverted on drop.
///
/// Holding the guard serializes environment mutation across tests in the
/// same binary.
pub struct EnvVarGuard {
    saved: Vec<(OsString, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    /// Applies each change; `None` removes the variable.
    pub fn set_many(changes: &[(OsString, Option<OsString>)]) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let saved = changes
            .iter()
            .map(|(key, value)| {
                let previous = env::var_os(key);
                apply(key, value.as_ref());
                (key.clone(), previous)
            })
            .collect();
        Self { saved, _lock: lock }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            apply(&key, previous.as_ref());
        }
    }
}

fn apply(key: &OsStr, value: Option<&OsString>) {
    // SAFETY: ENV_LOCK is held by every caller.
    unsafe {
        match value {
            Some(new_value) => env::set_var(key, new_value),
            None => env::remove_var(key),
        }
    }
}

/// Finds the `pg_worker` helper built alongside the test binary.
///
/// Cargo sets `CARGO_BIN_EXE_pg_worker` when compiling integration tests;
/// the target directory and `PATH` are searched when it is absent.
pub fn locate_pg_worker_path() -> Option<Utf8PathBuf> {
    option_env!("CARGO_BIN_EXE_pg_worker")
        .map(Utf8PathBuf::from)
        .filter(|path| path.is_file())
        .or_else(worker_in_target_dir)
        .or_else(worker_on_path)
}

fn worker_in_target_dir() -> Option<Utf8PathBuf> {
    let exe = Utf8PathBuf::from_path_buf(env::current_exe().ok()?).ok()?;
    let candidate = exe.parent()?.parent()?.join("pg_worker");
    candidate.is_file().then_some(candidate)
}

fn worker_on_path() -> Option<Utf8PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .filter_map(|dir| Utf8PathBuf::from_path_buf(dir.join("pg_worker")).ok())
        .find(|candidate| candidate.is_file())
}
