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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value["result"].clone()
}

fn all_ids(tree: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for s in tree["sections"].as_array().unwrap() {
        out.push(s["id"].as_str().unwrap().to_string());
        for m in s["modules"].as_array().unwrap() {
            out.push(m["id"].as_str().unwrap().to_string());
        }
    }
    for m in tree["ungrouped"].as_array().unwrap() {
        out.push(m["id"].as_str().unwrap().to_string());
    }
    out
}

#[test]
fn save_swaps_placeholders_and_survives_reopen() {
    let workspace = temp_dir("coursedesk-save-roundtrip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "cc",
        "courses.create",
        json!({ "title": "Persisted" }),
    );
    let course_id = created["courseId"].as_str().expect("courseId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );

    let r = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "curriculum.sections.add",
        json!({ "title": "Week 1" }),
    );
    let placeholder_sid = r["sectionId"].as_str().expect("sectionId").to_string();
    assert!(
        placeholder_sid.starts_with("local-"),
        "unsaved ids are placeholders"
    );
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "mod1",
        "curriculum.modules.add",
        json!({ "sectionId": placeholder_sid, "input": { "title": "Intro", "kind": "video" } }),
    );
    let placeholder_mid = r["moduleId"].as_str().expect("moduleId").to_string();
    assert!(placeholder_mid.starts_with("local-"));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "mod2",
        "curriculum.modules.add",
        json!({ "input": { "title": "Bonus", "kind": "reading" } }),
    );

    let saved = request_ok(&mut stdin, &mut reader, "save1", "curriculum.save", json!({}));
    assert_eq!(saved["inserted"].as_u64(), Some(3));
    assert_eq!(saved["updated"].as_u64(), Some(0));
    let id_map = saved["idMap"].as_object().expect("idMap");
    assert_eq!(id_map.len(), 3);
    let persisted_sid = id_map[&placeholder_sid].as_str().expect("mapped section id");
    assert!(!persisted_sid.starts_with("local-"));

    // The returned tree carries only store-assigned ids, and the grouped
    // module now references the persisted section id.
    let tree = &saved["tree"];
    assert!(all_ids(tree).iter().all(|id| !id.starts_with("local-")));
    assert_eq!(tree["sections"][0]["id"].as_str(), Some(persisted_sid));
    assert_eq!(
        tree["sections"][0]["modules"][0]["sectionId"].as_str(),
        Some(persisted_sid)
    );

    // Saving again with no edits only updates.
    let saved = request_ok(&mut stdin, &mut reader, "save2", "curriculum.save", json!({}));
    assert_eq!(saved["inserted"].as_u64(), Some(0));
    assert_eq!(saved["updated"].as_u64(), Some(3));
    assert!(saved["idMap"].as_object().unwrap().is_empty());

    // Close, reopen: the store round-trips structure and order.
    let _ = request_ok(&mut stdin, &mut reader, "close", "curriculum.close", json!({}));
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "reopen",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    let tree = &reopened["tree"];
    assert_eq!(tree["sections"][0]["title"].as_str(), Some("Week 1"));
    assert_eq!(
        tree["sections"][0]["modules"][0]["title"].as_str(),
        Some("Intro")
    );
    assert_eq!(tree["ungrouped"][0]["title"].as_str(), Some("Bonus"));
    assert_eq!(
        tree["ungrouped"][0]["readingFormat"].as_str(),
        Some("rich_text")
    );
    assert_eq!(tree["sections"][0]["modules"][0]["moduleNumber"].as_i64(), Some(1));
    assert_eq!(tree["ungrouped"][0]["moduleNumber"].as_i64(), Some(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn edits_after_save_mix_updates_and_inserts() {
    let workspace = temp_dir("coursedesk-save-mixed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "cc",
        "courses.create",
        json!({ "title": "Mixed" }),
    );
    let course_id = created["courseId"].as_str().expect("courseId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "curriculum.sections.add",
        json!({ "title": "Week 1" }),
    );
    let sid = r["sectionId"].as_str().unwrap().to_string();
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "mod",
        "curriculum.modules.add",
        json!({ "sectionId": sid, "input": { "title": "Intro", "kind": "video" } }),
    );
    let mid = r["moduleId"].as_str().unwrap().to_string();
    let _ = request_ok(&mut stdin, &mut reader, "save1", "curriculum.save", json!({}));

    // One edit to a persisted module, one brand-new module.
    let saved_tree = request_ok(&mut stdin, &mut reader, "tree", "curriculum.tree", json!({}));
    let persisted_mid = saved_tree["tree"]["sections"][0]["modules"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(persisted_mid, mid, "save replaced the placeholder id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "edit",
        "curriculum.modules.update",
        json!({ "moduleId": persisted_mid, "patch": { "title": "Intro v2" } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "new",
        "curriculum.modules.add",
        json!({ "input": { "title": "Extra", "kind": "quiz" } }),
    );

    let saved = request_ok(&mut stdin, &mut reader, "save2", "curriculum.save", json!({}));
    assert_eq!(saved["inserted"].as_u64(), Some(1));
    assert_eq!(saved["updated"].as_u64(), Some(2));
    assert_eq!(saved["idMap"].as_object().unwrap().len(), 1);

    // Reopen from disk to confirm the update landed.
    let _ = request_ok(&mut stdin, &mut reader, "close", "curriculum.close", json!({}));
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "reopen",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        reopened["tree"]["sections"][0]["modules"][0]["title"].as_str(),
        Some("Intro v2")
    );
    assert_eq!(reopened["tree"]["ungrouped"][0]["title"].as_str(), Some("Extra"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
