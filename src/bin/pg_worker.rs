//! Runs embedded `PostgreSQL` lifecycle steps as an unprivileged user.
//!
//! Usage:
//!
//! ```text
//! pg_worker <setup|start|stop> <payload-path>
//! ```
//!
//! The payload is a JSON [`WorkerPayload`] holding cluster settings and the
//! environment the cluster expects. When started as root the worker switches
//! to `nobody` before touching the data directory, because `PostgreSQL`
//! refuses to run as the superuser account.

#[cfg(unix)]
use camino::{Utf8Path, Utf8PathBuf};
#[cfg(unix)]
use nix::unistd::{Uid, User, initgroups, setgid, setuid};
#[cfg(unix)]
use pg_embedded_setup_unpriv::ambient_dir_and_path;
#[cfg(unix)]
use pg_embedded_setup_unpriv::worker::{PlainSecret, WorkerPayload};
#[cfg(unix)]
use postgresql_embedded::{PostgreSQL, Status};
#[cfg(unix)]
use std::ffi::CString;
#[cfg(unix)]
use std::io::Read;
#[cfg(unix)]
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(unix)]
const UNPRIVILEGED_USER: &str = "nobody";

#[cfg(unix)]
#[derive(Debug, Error)]
enum WorkerError {
    #[error("usage: pg_worker <setup|start|stop> <payload-path> ({0})")]
    Usage(String),
    #[error("failed to read payload: {0}")]
    PayloadRead(#[source] BoxError),
    #[error("failed to parse payload: {0}")]
    PayloadParse(#[source] serde_json::Error),
    #[error("invalid cluster settings: {0}")]
    Settings(String),
    #[error("failed to switch to '{UNPRIVILEGED_USER}': {0}")]
    Privileges(String),
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("cluster {step} failed: {message}")]
    Cluster { step: &'static str, message: String },
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
enum Step {
    Setup,
    Start,
    Stop,
}

#[cfg(unix)]
impl Step {
    fn parse(value: &str) -> Result<Self, WorkerError> {
        match value {
            "setup" => Ok(Self::Setup),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(WorkerError::Usage(format!("unknown step '{other}'"))),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

#[cfg(unix)]
fn main() -> Result<(), BoxError> {
    let (step, payload_path) = parse_args(std::env::args())?;
    let payload = load_payload(&payload_path)?;
    drop_root_privileges()?;
    let settings = payload
        .settings
        .into_settings()
        .map_err(|err| WorkerError::Settings(err.to_string()))?;
    apply_environment(&payload.environment);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(WorkerError::Runtime)?;
    let mut postgres = PostgreSQL::new(settings);
    runtime.block_on(run_step(step, &mut postgres))?;

    if matches!(step, Step::Setup | Step::Start) {
        // The server outlives this process; dropping the handle would stop it.
        std::mem::forget(postgres);
    }
    Ok(())
}

#[cfg(unix)]
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(Step, Utf8PathBuf), WorkerError> {
    let _program = args.next();
    let step = args
        .next()
        .ok_or_else(|| WorkerError::Usage("missing step".to_owned()))
        .and_then(|value| Step::parse(&value))?;
    let payload_path = args
        .next()
        .map(Utf8PathBuf::from)
        .ok_or_else(|| WorkerError::Usage("missing payload path".to_owned()))?;
    if let Some(extra) = args.next() {
        return Err(WorkerError::Usage(format!("unexpected argument '{extra}'")));
    }
    Ok((step, payload_path))
}

#[cfg(unix)]
fn load_payload(path: &Utf8Path) -> Result<WorkerPayload, WorkerError> {
    let read = || -> Result<Vec<u8>, BoxError> {
        let (dir, relative) = ambient_dir_and_path(path)?;
        let mut file = dir.open(relative.as_std_path())?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    };
    let bytes = read().map_err(WorkerError::PayloadRead)?;
    serde_json::from_slice(&bytes).map_err(WorkerError::PayloadParse)
}

#[cfg(unix)]
fn drop_root_privileges() -> Result<(), WorkerError> {
    if !Uid::effective().is_root() {
        return Ok(());
    }
    let privileges = |err: nix::Error| WorkerError::Privileges(err.to_string());
    let user = User::from_name(UNPRIVILEGED_USER)
        .map_err(privileges)?
        .ok_or_else(|| WorkerError::Privileges("user does not exist".to_owned()))?;
    let user_name =
        CString::new(user.name.clone()).map_err(|err| WorkerError::Privileges(err.to_string()))?;
    initgroups(&user_name, user.gid).map_err(privileges)?;
    setgid(user.gid).map_err(privileges)?;
    setuid(user.uid).map_err(privileges)?;

    // SAFETY: the worker is single-threaded until the runtime is built.
    unsafe {
        std::env::set_var("HOME", &user.dir);
        std::env::set_var("USER", &user.name);
        std::env::set_var("LOGNAME", &user.name);
    }
    Ok(())
}

#[cfg(unix)]
fn apply_environment(environment: &[(String, Option<PlainSecret>)]) {
    for (key, value) in environment {
        // SAFETY: the worker is single-threaded until the runtime is built.
        unsafe {
            match value {
                Some(secret) => std::env::set_var(key, secret.expose()),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[cfg(unix)]
async fn run_step(step: Step, postgres: &mut PostgreSQL) -> Result<(), WorkerError> {
    let cluster_error = |err: postgresql_embedded::Error| WorkerError::Cluster {
        step: step.as_str(),
        message: err.to_string(),
    };
    match step {
        Step::Setup => postgres.setup().await.map_err(cluster_error)?,
        Step::Stop => return postgres.stop().await.map_err(cluster_error),
        Step::Start => {}
    }
    if !matches!(postgres.status(), Status::Started) {
        postgres.start().await.map_err(cluster_error)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn main() -> Result<(), BoxError> {
    Err("pg_worker requires a Unix host".into())
}
