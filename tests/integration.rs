use std::fs;
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn cctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cctx");
    path
}

const USERS_PY: &str = "\
def load_user(user_id):
    \"\"\"Fetch a user record from the database.\"\"\"
    row = db.fetch_one(\"SELECT * FROM users WHERE id = ?\", user_id)
    return User.from_row(row)


def save_user(user):
    db.execute(\"UPDATE users SET name = ? WHERE id = ?\", user.name, user.id)
";

const BILLING_PY: &str = "\
class Invoice:
    def __init__(self, amount):
        self.amount = amount

    def total(self):
        return self.amount * 1.2
";

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Temp workspace with a config, a state dir, and a small project
/// containing two Python files and one Markdown file.
fn setup_test_env_with_port(port: u16) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let project_dir = root.join("project");
    fs::create_dir_all(project_dir.join("app")).unwrap();
    fs::write(project_dir.join("app/users.py"), USERS_PY).unwrap();
    fs::write(project_dir.join("billing.py"), BILLING_PY).unwrap();
    fs::write(
        project_dir.join("README.md"),
        "# Demo\n\nA project used by the integration tests.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[state]
dir = "{}/data"

[embedding]
provider = "hash"
model = "hash-64"
dims = 64

[indexing]
extensions = [".py"]

[cache]
enabled = true
ttl_secs = 600

[watcher]
enabled = false

[server]
bind = "127.0.0.1:{}"
"#,
        root.display(),
        port
    );

    let config_path = config_dir.join("cctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, project_dir)
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    setup_test_env_with_port(free_port())
}

fn run_cctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn index_project(config_path: &Path, project_dir: &Path) -> String {
    let (stdout, stderr, success) =
        run_cctx(config_path, &["index", project_dir.to_str().unwrap()]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    stdout
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_cctx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/cctx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_cctx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_cctx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_project() {
    let (tmp, config_path, project_dir) = setup_test_env();

    let stdout = index_project(&config_path, &project_dir);
    assert!(stdout.contains("indexed files: 2"), "{}", stdout);
    assert!(stdout.contains("skipped files: 0"));
    assert!(stdout.contains("failed files: 0"));
    assert!(stdout.contains("ok"));

    let states: Vec<_> = fs::read_dir(tmp.path().join("data"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("index_state_"))
        .collect();
    assert_eq!(states.len(), 1);
}

#[test]
fn test_index_incremental_skips_unchanged() {
    let (_tmp, config_path, project_dir) = setup_test_env();

    index_project(&config_path, &project_dir);
    let stdout = index_project(&config_path, &project_dir);
    assert!(stdout.contains("indexed files: 0"), "{}", stdout);
    assert!(stdout.contains("skipped files: 2"));
    assert!(stdout.contains("chunks: 0"));
}

#[test]
fn test_index_detects_modified_file() {
    let (_tmp, config_path, project_dir) = setup_test_env();

    index_project(&config_path, &project_dir);
    fs::write(
        project_dir.join("billing.py"),
        format!("{BILLING_PY}\n\ndef refund(invoice):\n    return -invoice.total()\n"),
    )
    .unwrap();

    let stdout = index_project(&config_path, &project_dir);
    assert!(stdout.contains("indexed files: 1"), "{}", stdout);
    assert!(stdout.contains("skipped files: 1"));
}

#[test]
fn test_index_force_reprocesses_everything() {
    let (_tmp, config_path, project_dir) = setup_test_env();

    index_project(&config_path, &project_dir);
    let (stdout, stderr, success) = run_cctx(
        &config_path,
        &["index", project_dir.to_str().unwrap(), "--force"],
    );
    assert!(success, "forced index failed: {}", stderr);
    assert!(stdout.contains("indexed files: 2"), "{}", stdout);
}

#[test]
fn test_index_custom_extensions() {
    let (_tmp, config_path, project_dir) = setup_test_env();

    let (stdout, stderr, success) = run_cctx(
        &config_path,
        &["index", project_dir.to_str().unwrap(), "--ext", ".md"],
    );
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("indexed files: 1"), "{}", stdout);
}

#[test]
fn test_index_invalid_path() {
    let (tmp, config_path, _) = setup_test_env();
    let missing = tmp.path().join("does-not-exist");

    let (_, stderr, success) = run_cctx(&config_path, &["index", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Invalid project path"), "{}", stderr);
}

#[test]
fn test_query_returns_context() {
    let (_tmp, config_path, project_dir) = setup_test_env();
    index_project(&config_path, &project_dir);

    let (stdout, stderr, success) = run_cctx(&config_path, &["query", "load user by id"]);
    assert!(success, "query failed: {}", stderr);
    assert!(stdout.contains("# Relevant Code Context"), "{}", stdout);
    assert!(stdout.contains("Query: load user by id"));
    assert!(stdout.contains("load_user"));
}

#[test]
fn test_query_deterministic() {
    let (_tmp, config_path, project_dir) = setup_test_env();
    index_project(&config_path, &project_dir);

    let (first, _, _) = run_cctx(&config_path, &["query", "invoice total"]);
    let (second, _, _) = run_cctx(&config_path, &["query", "invoice total"]);
    assert_eq!(first, second);
}

#[test]
fn test_query_without_projects_fails() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, stderr, success) = run_cctx(&config_path, &["query", "anything"]);
    assert!(!success);
    assert!(stderr.contains("No project indexed"), "{}", stderr);
}

#[test]
fn test_query_unknown_project_fails() {
    let (tmp, config_path, project_dir) = setup_test_env();
    index_project(&config_path, &project_dir);

    let other = tmp.path().join("config");
    let (_, stderr, success) = run_cctx(
        &config_path,
        &["query", "anything", "--project", other.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Project not indexed"), "{}", stderr);
}

#[test]
fn test_query_max_results_out_of_range() {
    let (_tmp, config_path, project_dir) = setup_test_env();
    index_project(&config_path, &project_dir);

    let (_, stderr, success) = run_cctx(&config_path, &["query", "x", "--max-results", "21"]);
    assert!(!success);
    assert!(stderr.contains("between 1 and 20"));
}

#[test]
fn test_projects_and_stats() {
    let (_tmp, config_path, project_dir) = setup_test_env();

    let (stdout, _, success) = run_cctx(&config_path, &["projects"]);
    assert!(success);
    assert!(stdout.contains("No projects indexed."));

    index_project(&config_path, &project_dir);

    let (stdout, _, success) = run_cctx(&config_path, &["projects"]);
    assert!(success);
    assert!(stdout.contains("project"));
    assert!(stdout.contains("files=2"), "{}", stdout);

    let (stdout, stderr, success) = run_cctx(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["indexed_files"], 2);
    assert_eq!(stats["embedding_model"], "hash-64");
    assert!(stats["total_chunks"].as_u64().unwrap() >= 2);
}

#[test]
fn test_clear_removes_project() {
    let (_tmp, config_path, project_dir) = setup_test_env();
    index_project(&config_path, &project_dir);

    let (stdout, stderr, success) = run_cctx(&config_path, &["clear"]);
    assert!(success, "clear failed: {}", stderr);
    assert!(stdout.contains("Cleared 1 projects."));

    let (stdout, _, _) = run_cctx(&config_path, &["projects"]);
    assert!(stdout.contains("No projects indexed."));

    // Fingerprints went with the state file, so everything is new again.
    let stdout = index_project(&config_path, &project_dir);
    assert!(stdout.contains("indexed files: 2"), "{}", stdout);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, _, success) = run_cctx(&tmp.path().join("nope.toml"), &["projects"]);
    assert!(!success);
}

// ============ HTTP server ============

struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_server(config_path: &Path) -> ServerGuard {
    let child = Command::new(cctx_binary())
        .arg("--config")
        .arg(config_path)
        .arg("serve")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cctx serve");
    let mut guard = ServerGuard(child);

    // Drain stderr so the server never blocks on a full pipe.
    if let Some(stderr) = guard.0.stderr.take() {
        std::thread::spawn(move || {
            for _ in BufReader::new(stderr).lines() {}
        });
    }
    guard
}

fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut ready: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if ready() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn test_server_index_and_query() {
    let port = free_port();
    let (_tmp, config_path, project_dir) = setup_test_env_with_port(port);
    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::blocking::Client::new();

    let _server = spawn_server(&config_path);
    assert!(
        wait_until(Duration::from_secs(20), || client
            .get(format!("{base}/health"))
            .send()
            .is_ok()),
        "server did not come up"
    );

    let health: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["indexed_projects"], 0);

    // Querying before any project exists is a client error.
    let resp = client
        .post(format!("{base}/query"))
        .json(&serde_json::json!({ "query": "load user" }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp: serde_json::Value = client
        .post(format!("{base}/index"))
        .json(&serde_json::json!({ "project_path": project_dir.to_str().unwrap() }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(resp["status"], "indexing_started");
    assert_eq!(resp["total_projects"], 1);

    assert!(
        wait_until(Duration::from_secs(20), || {
            client
                .get(format!("{base}/stats"))
                .send()
                .ok()
                .and_then(|r| r.json::<serde_json::Value>().ok())
                .is_some_and(|s| s["indexed_files"] == 2)
        }),
        "indexing did not finish"
    );

    let query: serde_json::Value = client
        .post(format!("{base}/query"))
        .json(&serde_json::json!({ "query": "load user by id", "max_results": 3 }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    let prompt = query["optimized_prompt"].as_str().unwrap();
    assert!(prompt.contains("# Relevant Code Context"));
    assert!(prompt.contains("load_user"));
    assert!(query["token_count"].as_u64().unwrap() > 0);
    assert_eq!(query["metadata"]["indexed_files"], 2);

    let resp = client
        .post(format!("{base}/query"))
        .json(&serde_json::json!({ "query": "x", "max_results": 0 }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client
        .post(format!("{base}/switch"))
        .json(&serde_json::json!({ "project_path": "/definitely/not/indexed" }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let projects: serde_json::Value = client
        .get(format!("{base}/projects"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(projects["total_projects"], 1);
    assert_eq!(projects["projects"][0]["is_current"], true);

    let resp = client.delete(format!("{base}/clear")).send().unwrap();
    assert!(resp.status().is_success());

    let health: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(health["indexed_projects"], 0);
}
