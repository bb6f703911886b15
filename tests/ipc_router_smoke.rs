use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_coursedeskd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn coursedeskd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("coursedesk-router-smoke");
    let bundle_out = workspace.join("smoke-backup.cdbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "title": "Smoke Course" }),
    );
    let course_id = created
        .get("result")
        .and_then(|v| v.get("courseId"))
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "4", "courses.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "5", "setup.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    let section = request(
        &mut stdin,
        &mut reader,
        "7",
        "curriculum.sections.add",
        json!({ "title": "Week 1" }),
    );
    let section_id = section
        .get("result")
        .and_then(|v| v.get("sectionId"))
        .and_then(|v| v.as_str())
        .expect("sectionId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "curriculum.modules.add",
        json!({
            "sectionId": section_id,
            "input": { "title": "Intro", "kind": "video" }
        }),
    );
    let _ = request(&mut stdin, &mut reader, "9", "curriculum.tree", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "curriculum.drag.start",
        json!({ "itemId": section_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "curriculum.drag.end",
        json!({ "overId": null }),
    );
    let _ = request(&mut stdin, &mut reader, "12", "curriculum.save", json!({}));
    let _ = request(&mut stdin, &mut reader, "13", "curriculum.close", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "courses.delete",
        json!({ "courseId": course_id }),
    );

    let unknown = request(&mut stdin, &mut reader, "17", "curriculum.tree", json!({}));
    // The session closed above; the daemon must say so, not crash.
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("no_builder")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
