use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("engage/data.db")
    }

    fn write_config(&self, content: &str) {
        let dir = self.xdg_config.join("engage");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), content).expect("failed to write config");
    }

    fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).expect("failed to write fixture");
        path
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("engage"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute engage: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "engage {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn stdout_line<'a>(stdout: &'a str, prefix: &str) -> &'a str {
    stdout
        .lines()
        .find(|line| line.starts_with(prefix))
        .unwrap_or_else(|| panic!("no line starting with {prefix:?} in:\n{stdout}"))
}

const CAMPAIGNS: &str = r#"[
    {
        "id": 7,
        "status": "active",
        "type": "one-time",
        "targeting": {
            "visitorType": "first-time",
            "trigger": { "type": "time-on-page", "value": 30, "unit": "seconds" },
            "rules": {
                "matchType": "match-all",
                "conditions": [
                    { "field": "current-page-url", "operator": "contains", "value": "cart" }
                ]
            }
        }
    },
    {
        "id": 8,
        "status": "active",
        "targeting": {
            "visitorType": "returning",
            "trigger": { "type": "time-on-page", "value": 0, "unit": "seconds" }
        }
    }
]"#;

#[test]
fn status_reports_paths_and_creates_database() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("engage status"));
    assert!(stdout.contains("Schema:   v"));
    assert!(stdout.contains("Enabled:    false"));
    assert!(stdout.contains("Socket URL:   (not set)"));
    assert!(
        env.db_path().exists(),
        "database file should exist at {}",
        env.db_path().display()
    );
}

#[test]
fn identity_persists_across_runs() {
    let env = CliTestEnv::new();

    let first = run_bin(&env, &["identity"]);
    assert_success(&["identity"], &first);
    let first_stdout = String::from_utf8_lossy(&first.stdout).into_owned();

    let args = ["identity", "--email", "jane@example.com"];
    let second = run_bin(&env, &args);
    assert_success(&args, &second);
    let second_stdout = String::from_utf8_lossy(&second.stdout).into_owned();

    assert_eq!(
        stdout_line(&first_stdout, "Visitor ID:"),
        stdout_line(&second_stdout, "Visitor ID:")
    );
    assert_eq!(
        stdout_line(&first_stdout, "Session ID:"),
        stdout_line(&second_stdout, "Session ID:")
    );
    assert!(stdout_line(&first_stdout, "Email:").contains("(none)"));
    assert!(stdout_line(&second_stdout, "Email:").contains("jane@example.com"));

    let args = ["identity", "--new-session", "--format", "json"];
    let third = run_bin(&env, &args);
    assert_success(&args, &third);
    let json: serde_json::Value =
        serde_json::from_slice(&third.stdout).expect("identity json output");
    assert!(first_stdout.contains(json["visitor_id"].as_str().unwrap()));
    assert!(!first_stdout.contains(json["session_id"].as_str().unwrap()));
    assert_eq!(json["email"], "jane@example.com");
}

#[test]
fn evaluate_selects_first_matching_campaign() {
    let env = CliTestEnv::new();
    let campaigns = env.write_file("campaigns.json", CAMPAIGNS);
    let campaigns = campaigns.to_str().unwrap();

    let args = [
        "evaluate",
        campaigns,
        "--url",
        "https://shop.example.com/CART",
        "--time-on-page",
        "45",
    ];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[+] #7 matched"), "got:\n{stdout}");
    assert!(stdout.contains("[-] #8 visitor type mismatch"));
    assert!(stdout.contains("Selected campaign: #7"));

    let args = [
        "evaluate",
        campaigns,
        "--url",
        "https://shop.example.com/checkout",
        "--time-on-page",
        "10",
        "--format",
        "json",
    ];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(json["results"][0]["outcome"], "trigger not met");
    assert!(json["selected"].is_null());
}

#[test]
fn evaluate_applies_frequency_guard_for_visitor() {
    let env = CliTestEnv::new();
    let campaigns = env.write_file("campaigns.json", CAMPAIGNS);

    let args = [
        "evaluate",
        campaigns.to_str().unwrap(),
        "--url",
        "https://shop.example.com/cart",
        "--time-on-page",
        "45",
        "--visitor",
        "v-1",
        "--format",
        "json",
    ];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(json["results"][0]["allowed"], true);
    assert_eq!(json["selected"], 7);
}

#[test]
fn replay_dispatches_scoped_events() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[channel]
organization_id = "42"
chatbot_id = "bot-1"
"#,
    );
    let log = env.write_file(
        "events.jsonl",
        r#"{"event": "ticket:created", "payload": {"ticket": {"organization_id": 42, "subject": "Broken checkout"}}}
{"event": "ticket:created", "payload": {"ticket": {"organization_id": "7", "subject": "Other tenant"}}}
{"event": "visitor_update", "payload": {"type": "connected", "visitor": {"visitor_id": "v-1", "chatbot_id": "bot-1", "is_online": true, "createdAt": "2020-01-01T00:00:00Z"}}}
{"event": "whatsapp:message:received", "payload": {"message": {"organization_id": "42", "from_number": "+15550100"}}}
# comment lines are ignored
not json
"#,
    );

    let args = ["replay", log.to_str().unwrap()];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("New ticket created: Broken checkout"), "got:\n{stdout}");
    assert!(!stdout.contains("Other tenant"));
    assert!(stdout.contains("Returning visitor reconnected."));
    assert!(stdout.contains("New WhatsApp message received"));
    assert!(stdout.contains("From: +15550100"));
    assert!(stdout.contains("View -> /admin/chats/whatsapp"));
    assert!(!stdout.contains("(sound)"), "audio starts locked");

    assert!(stdout.contains("Skipped lines: 1"));
    assert!(stdout.contains("Delivered:    3"));
    assert!(stdout.contains("Out of scope: 1"));
    assert!(stdout.contains("New chats:   1"));
    assert!(stdout.contains("New tickets: 1"));
    assert!(stdout.contains("Traffic:     1"));
}

#[test]
fn replay_requires_viewer_identity() {
    let env = CliTestEnv::new();
    let log = env.write_file("events.jsonl", "");

    let output = run_bin(&env, &["replay", log.to_str().unwrap(), "--chatbot", "bot-1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("organization id not set"), "got:\n{stderr}");
}

#[test]
fn listen_requires_socket_url() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["listen", "--organization", "42", "--chatbot", "bot-1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("socket url not set"), "got:\n{stderr}");
}

#[test]
fn visit_requires_socket_url_and_chatbot() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["visit", "--chatbot", "bot-1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("socket url not set"), "got:\n{stderr}");

    let output = run_bin(&env, &["visit", "--url", "http://127.0.0.1:9"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("chatbot id not set"), "got:\n{stderr}");
}
