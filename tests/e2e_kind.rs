use std::error::Error;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Returns true if the given binary is accessible in PATH.
fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

const OPERATOR_NAMESPACE: &str = "network-status-e2e";
const CLUSTER_OPERATOR: &str = "network";
const RELEASE_VERSION: &str = "4.16.0-e2e";
const DAEMON_SET: &str = "e2e-node-agent";

// Run with: cargo test --test e2e_kind -- --ignored

/// Exercises a full status lifecycle against a Kind cluster:
///
/// 1. Start (or reuse) a Kind cluster and install the CRDs printed by `crdgen`.
/// 2. Run the operator binary against it.
/// 3. Apply a labelled DaemonSet and wait for Available with the version stamped.
/// 4. Break the DaemonSet image and wait for Progressing.
#[test]
#[ignore]
fn e2e_daemon_set_rollout_status() -> Result<(), Box<dyn Error>> {
    for tool in &["kind", "kubectl", "docker"] {
        if !tool_available(tool) {
            eprintln!("Skipping e2e test: `{tool}` not found in PATH.");
            return Ok(());
        }
    }

    let cluster_name =
        std::env::var("KIND_CLUSTER_NAME").unwrap_or_else(|_| "network-status-e2e".into());
    ensure_kind_cluster(&cluster_name)?;

    let crds = run_cmd(env!("CARGO_BIN_EXE_crdgen"), &[])?;
    kubectl_apply(&crds)?;
    kubectl_apply(&format!(
        "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {OPERATOR_NAMESPACE}\n"
    ))?;

    let operator = OperatorProcess::spawn()?;

    wait_for("cluster operator to exist", Duration::from_secs(60), || {
        Ok(run_cmd("kubectl", &["get", "clusteroperator", CLUSTER_OPERATOR]).is_ok())
    })?;

    kubectl_apply(&daemon_set_manifest("registry.k8s.io/pause:3.9"))?;

    wait_for("Available=True", Duration::from_secs(180), || {
        Ok(condition_status("Available")? == "True")
    })?;
    let version = run_cmd(
        "kubectl",
        &[
            "get",
            "clusteroperator",
            CLUSTER_OPERATOR,
            "-o",
            "jsonpath={.status.versions[?(@.name==\"operator\")].version}",
        ],
    )?;
    assert_eq!(version, RELEASE_VERSION);

    kubectl_apply(&daemon_set_manifest("registry.invalid/does-not-exist:latest"))?;

    wait_for("Progressing=True", Duration::from_secs(120), || {
        Ok(condition_status("Progressing")? == "True")
    })?;
    let message = condition_field("Progressing", "message")?;
    assert!(
        message.contains(DAEMON_SET),
        "unexpected Progressing message: {message}"
    );

    drop(operator);
    run_cmd_quiet(
        "kubectl",
        &["delete", "namespace", OPERATOR_NAMESPACE, "--wait=false"],
    )?;
    Ok(())
}

fn daemon_set_manifest(image: &str) -> String {
    format!(
        r#"apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: {DAEMON_SET}
  namespace: {OPERATOR_NAMESPACE}
  labels:
    networkoperator.openshift.io/generates-operator-status: ""
  annotations:
    release.openshift.io/version: "{RELEASE_VERSION}"
spec:
  selector:
    matchLabels:
      app: {DAEMON_SET}
  template:
    metadata:
      labels:
        app: {DAEMON_SET}
    spec:
      containers:
        - name: agent
          image: {image}
"#
    )
}

fn condition_field(type_: &str, field: &str) -> Result<String, Box<dyn Error>> {
    run_cmd(
        "kubectl",
        &[
            "get",
            "clusteroperator",
            CLUSTER_OPERATOR,
            "-o",
            &format!("jsonpath={{.status.conditions[?(@.type==\"{type_}\")].{field}}}"),
        ],
    )
}

fn condition_status(type_: &str) -> Result<String, Box<dyn Error>> {
    condition_field(type_, "status")
}

/// The operator binary running against the current kubeconfig; killed on drop
struct OperatorProcess(Child);

impl OperatorProcess {
    fn spawn() -> Result<Self, Box<dyn Error>> {
        let child = Command::new(env!("CARGO_BIN_EXE_network-status-operator"))
            .args([
                "run",
                "--operator-namespace",
                OPERATOR_NAMESPACE,
                "--release-version",
                RELEASE_VERSION,
                "--resync-seconds",
                "10",
                "--api-port",
                "18080",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(Self(child))
    }
}

impl Drop for OperatorProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn ensure_kind_cluster(name: &str) -> Result<(), Box<dyn Error>> {
    let clusters = run_cmd("kind", &["get", "clusters"])?;
    if clusters.lines().any(|line| line.trim() == name) {
        return Ok(());
    }
    run_cmd("kind", &["create", "cluster", "--name", name])?;
    Ok(())
}

fn kubectl_apply(manifest: &str) -> Result<(), Box<dyn Error>> {
    run_cmd_with_stdin("kubectl", &["apply", "-f", "-"], manifest)?;
    Ok(())
}

fn run_cmd(program: &str, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_cmd_quiet(program: &str, args: &[&str]) -> Result<(), Box<dyn Error>> {
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(())
}

fn run_cmd_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), Box<dyn Error>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin.write_all(input.as_bytes())?;
        stdin.flush()?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("command failed: {} {:?}\nstderr:\n{}", program, args, stderr).into());
    }
    Ok(())
}

fn wait_for<F>(label: &str, timeout: Duration, mut condition: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut() -> Result<bool, Box<dyn Error>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        if condition()? {
            return Ok(());
        }
        attempts += 1;
        if start.elapsed() > timeout {
            return Err(format!(
                "timeout while waiting for {} after {:?} (attempts={})",
                label, timeout, attempts
            )
            .into());
        }
        sleep(Duration::from_secs(3));
    }
}
