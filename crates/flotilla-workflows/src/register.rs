//! Procedure registration: collaborator adapters and workflow wiring.
//!
//! Every external contract the workflows depend on is exposed as a
//! registered procedure (`fs.*`, `shell.exec`, `pnpm.*`, `git.*`), so both
//! aggregations and native handlers reach collaborators the same way: by
//! path, through the dispatcher.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use flotilla_core::EcosystemConfig;
use flotilla_flow::{handler, FlowError, FlowResult, ProcedureRegistry, RegisterOptions};
use flotilla_procs::{
    FileSystem, Git, GitCli, InstallRequest, LocalFileSystem, PackageManager, PnpmCli,
    QuotedSpecifierRewriter, Shell, ShellRequest, SourceRewriter, SystemShell,
};

/// The collaborator bundle injected into every workflow.
#[derive(Clone)]
pub struct ProcSet {
    pub fs: Arc<dyn FileSystem>,
    pub shell: Arc<dyn Shell>,
    pub pnpm: Arc<dyn PackageManager>,
    pub git: Arc<dyn Git>,
    pub rewriter: Arc<dyn SourceRewriter>,
}

impl ProcSet {
    /// Real backends for the local machine.
    pub fn local() -> Self {
        Self {
            fs: Arc::new(LocalFileSystem::new()),
            shell: Arc::new(SystemShell::new()),
            pnpm: Arc::new(PnpmCli::new()),
            git: Arc::new(GitCli::new()),
            rewriter: Arc::new(QuotedSpecifierRewriter::new()),
        }
    }
}

/// Deserialize a procedure input, reporting shape violations by path.
pub(crate) fn parse_input<T: DeserializeOwned>(path: &str, input: Value) -> FlowResult<T> {
    serde_json::from_value(input).map_err(|e| FlowError::InvalidStep {
        detail: format!("{path}: {e}"),
    })
}

pub(crate) fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Register everything: collaborator adapters, aggregation primitives, and
/// the native workflows. Call once at process start.
pub fn register_all(
    registry: &Arc<ProcedureRegistry>,
    procs: ProcSet,
    config: EcosystemConfig,
) -> FlowResult<()> {
    register_fs(registry, &procs)?;
    register_shell(registry, &procs)?;
    register_pnpm(registry, &procs)?;
    register_git(registry, &procs)?;
    crate::library::register(registry)?;
    crate::install::register(registry, &procs, &config)?;
    crate::refresh::register(registry, &procs, &config)?;
    crate::pull::register(registry, &procs, &config)?;
    crate::new::register(registry, &procs, &config)?;
    crate::audit::register(registry, &procs, &config)?;
    crate::rename::register(registry, &procs, &config)?;
    Ok(())
}

#[derive(Deserialize)]
struct PathInput {
    path: PathBuf,
}

#[derive(Deserialize)]
struct MkdirInput {
    path: PathBuf,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
struct RmInput {
    path: PathBuf,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct WriteInput {
    path: PathBuf,
    content: String,
}

#[derive(Deserialize)]
struct GlobInput {
    pattern: String,
    cwd: PathBuf,
    #[serde(default)]
    ignore: Vec<String>,
}

/// Extract the extension alternatives from a glob like `**/*.{ts,tsx}`.
fn glob_extensions(pattern: &str) -> Vec<String> {
    let Some(ext_part) = pattern.rsplit("*.").next() else {
        return Vec::new();
    };
    let ext_part = ext_part.trim_start_matches('{').trim_end_matches('}');
    ext_part
        .split(',')
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .collect()
}

fn register_fs(registry: &Arc<ProcedureRegistry>, procs: &ProcSet) -> FlowResult<()> {
    let opts = RegisterOptions::default;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.exists",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: PathInput = parse_input("fs.exists", input)?;
                Ok(json!({ "exists": fs.exists(&req.path).await }))
            }
        }),
        opts(),
    )?;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.read.json",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: PathInput = parse_input("fs.read.json", input)?;
                let data = fs
                    .read_json(&req.path)
                    .await
                    .map_err(|e| FlowError::failed("fs.read.json", e))?;
                Ok(json!({ "data": data }))
            }
        }),
        opts(),
    )?;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.write",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: WriteInput = parse_input("fs.write", input)?;
                fs.write(&req.path, &req.content)
                    .await
                    .map_err(|e| FlowError::failed("fs.write", e))?;
                Ok(json!({ "written": true }))
            }
        }),
        opts(),
    )?;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.mkdir",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: MkdirInput = parse_input("fs.mkdir", input)?;
                // Creation is always recursive; the flag is accepted for
                // contract compatibility.
                let _ = req.recursive;
                fs.mkdir_p(&req.path)
                    .await
                    .map_err(|e| FlowError::failed("fs.mkdir", e))?;
                Ok(json!({ "created": true }))
            }
        }),
        opts(),
    )?;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.rm",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: RmInput = parse_input("fs.rm", input)?;
                fs.remove(&req.path, req.recursive, req.force)
                    .await
                    .map_err(|e| FlowError::failed("fs.rm", e))?;
                Ok(json!({ "removed": true }))
            }
        }),
        opts(),
    )?;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.readdir",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: PathInput = parse_input("fs.readdir", input)?;
                let entries = fs
                    .read_dir(&req.path)
                    .await
                    .map_err(|e| FlowError::failed("fs.readdir", e))?;
                Ok(json!({ "entries": entries }))
            }
        }),
        opts(),
    )?;

    let fs = Arc::clone(&procs.fs);
    registry.register_handler(
        "fs.glob",
        handler(move |input, _| {
            let fs = Arc::clone(&fs);
            async move {
                let req: GlobInput = parse_input("fs.glob", input)?;
                let extensions = glob_extensions(&req.pattern);
                let files = fs
                    .find_source_files(&req.cwd, &extensions, &req.ignore)
                    .await
                    .map_err(|e| FlowError::failed("fs.glob", e))?;
                Ok(json!({ "files": files }))
            }
        }),
        opts(),
    )?;

    Ok(())
}

fn register_shell(registry: &Arc<ProcedureRegistry>, procs: &ProcSet) -> FlowResult<()> {
    let shell = Arc::clone(&procs.shell);
    registry.register_handler(
        "shell.exec",
        handler(move |input, _| {
            let shell = Arc::clone(&shell);
            async move {
                let req: ShellRequest = parse_input("shell.exec", input)?;
                let out = shell
                    .exec(req)
                    .await
                    .map_err(|e| FlowError::failed("shell.exec", e))?;
                Ok(to_value(out))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

#[derive(Deserialize)]
struct RunScriptInput {
    script: String,
    cwd: PathBuf,
}

fn register_pnpm(registry: &Arc<ProcedureRegistry>, procs: &ProcSet) -> FlowResult<()> {
    let pnpm = Arc::clone(&procs.pnpm);
    registry.register_handler(
        "pnpm.install",
        handler(move |input, _| {
            let pnpm = Arc::clone(&pnpm);
            async move {
                let req: InstallRequest = parse_input("pnpm.install", input)?;
                let out = pnpm
                    .install(req)
                    .await
                    .map_err(|e| FlowError::failed("pnpm.install", e))?;
                Ok(to_value(out))
            }
        }),
        RegisterOptions::default(),
    )?;

    let pnpm = Arc::clone(&procs.pnpm);
    registry.register_handler(
        "pnpm.run",
        handler(move |input, _| {
            let pnpm = Arc::clone(&pnpm);
            async move {
                let req: RunScriptInput = parse_input("pnpm.run", input)?;
                let out = pnpm
                    .run_script(&req.script, &req.cwd)
                    .await
                    .map_err(|e| FlowError::failed("pnpm.run", e))?;
                Ok(to_value(out))
            }
        }),
        RegisterOptions::default(),
    )?;

    Ok(())
}

#[derive(Deserialize)]
struct CwdInput {
    cwd: PathBuf,
}

#[derive(Deserialize)]
struct CommitInput {
    cwd: PathBuf,
    message: String,
}

#[derive(Deserialize)]
struct PullInput {
    cwd: PathBuf,
    #[serde(default)]
    remote: Option<String>,
    #[serde(default)]
    rebase: bool,
}

#[derive(Deserialize)]
struct CloneInput {
    url: String,
    dest: PathBuf,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Deserialize)]
struct CheckoutInput {
    cwd: PathBuf,
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Deserialize)]
struct RemoteInput {
    cwd: PathBuf,
    name: String,
}

fn register_git(registry: &Arc<ProcedureRegistry>, procs: &ProcSet) -> FlowResult<()> {
    let opts = RegisterOptions::default;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.status",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CwdInput = parse_input("git.status", input)?;
                let status = git
                    .status(&req.cwd)
                    .await
                    .map_err(|e| FlowError::failed("git.status", e))?;
                Ok(to_value(status))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.add",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CwdInput = parse_input("git.add", input)?;
                git.add_all(&req.cwd)
                    .await
                    .map_err(|e| FlowError::failed("git.add", e))?;
                Ok(json!({ "staged": true }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.commit",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CommitInput = parse_input("git.commit", input)?;
                let hash = git
                    .commit(&req.cwd, &req.message)
                    .await
                    .map_err(|e| FlowError::failed("git.commit", e))?;
                Ok(json!({ "hash": hash }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.push",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CwdInput = parse_input("git.push", input)?;
                git.push(&req.cwd)
                    .await
                    .map_err(|e| FlowError::failed("git.push", e))?;
                Ok(json!({ "pushed": true }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.pull",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: PullInput = parse_input("git.pull", input)?;
                let out = git
                    .pull(&req.cwd, req.remote.as_deref(), req.rebase)
                    .await
                    .map_err(|e| FlowError::failed("git.pull", e))?;
                Ok(json!({ "commits": out.commits, "fastForward": out.fast_forward }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.clone",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CloneInput = parse_input("git.clone", input)?;
                git.clone_repo(&req.url, &req.dest, req.branch.as_deref())
                    .await
                    .map_err(|e| FlowError::failed("git.clone", e))?;
                Ok(json!({ "cloned": true }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.checkout",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CheckoutInput = parse_input("git.checkout", input)?;
                git.checkout(&req.cwd, &req.reference)
                    .await
                    .map_err(|e| FlowError::failed("git.checkout", e))?;
                Ok(json!({ "checkedOut": true }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.branch",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CwdInput = parse_input("git.branch", input)?;
                let branches = git
                    .branches(&req.cwd)
                    .await
                    .map_err(|e| FlowError::failed("git.branch", e))?;
                let branches: Vec<Value> =
                    branches.into_iter().map(|name| json!({ "name": name })).collect();
                Ok(json!({ "branches": branches }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.remote",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: RemoteInput = parse_input("git.remote", input)?;
                let url = git
                    .remote_url(&req.cwd, &req.name)
                    .await
                    .map_err(|e| FlowError::failed("git.remote", e))?;
                Ok(json!({ "url": url }))
            }
        }),
        opts(),
    )?;

    let git = Arc::clone(&procs.git);
    registry.register_handler(
        "git.init",
        handler(move |input, _| {
            let git = Arc::clone(&git);
            async move {
                let req: CwdInput = parse_input("git.init", input)?;
                git.init(&req.cwd)
                    .await
                    .map_err(|e| FlowError::failed("git.init", e))?;
                Ok(json!({ "initialized": true }))
            }
        }),
        opts(),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_extensions() {
        assert_eq!(glob_extensions("**/*.ts"), vec!["ts"]);
        assert_eq!(glob_extensions("**/*.{ts,tsx}"), vec!["ts", "tsx"]);
        assert!(glob_extensions("**/*").is_empty());
    }

    #[tokio::test]
    async fn test_collaborator_adapters_round_trip() {
        use flotilla_flow::Interpreter;
        use flotilla_procs::fakes::{
            MemoryFileSystem, RecordingGit, RecordingPackageManager, ScriptedShell,
        };

        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/p/data.json", r#"{"n": 7}"#);
        let procs = ProcSet {
            fs: fs.clone(),
            shell: Arc::new(ScriptedShell::new()),
            pnpm: Arc::new(RecordingPackageManager::new()),
            git: Arc::new(RecordingGit::new()),
            rewriter: Arc::new(QuotedSpecifierRewriter::new()),
        };
        let registry = Arc::new(ProcedureRegistry::new());
        register_all(&registry, procs, EcosystemConfig::default()).unwrap();
        let interpreter = Interpreter::new(registry);

        let out = interpreter
            .call("fs.exists", json!({"path": "/p/data.json"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"exists": true}));

        let out = interpreter
            .call("fs.read.json", json!({"path": "/p/data.json"}))
            .await
            .unwrap();
        assert_eq!(out["data"]["n"], json!(7));

        let out = interpreter
            .call("pnpm.install", json!({"cwd": "/p"}))
            .await
            .unwrap();
        assert_eq!(out["success"], json!(true));

        let out = interpreter
            .call("git.commit", json!({"cwd": "/p", "message": "chore: x"}))
            .await
            .unwrap();
        assert!(out["hash"].is_string());
    }
}
