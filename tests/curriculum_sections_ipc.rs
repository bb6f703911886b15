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

fn open_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "cc",
        "courses.create",
        json!({ "title": "Sections" }),
    );
    let course_id = created["courseId"].as_str().expect("courseId").to_string();
    let _ = request_ok(
        stdin,
        reader,
        "open",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    course_id
}

fn section_titles(tree: &Value) -> Vec<String> {
    tree["sections"]
        .as_array()
        .expect("sections array")
        .iter()
        .map(|s| s["title"].as_str().unwrap_or("").to_string())
        .collect()
}

#[test]
fn add_update_move_sections_keeps_positions_dense() {
    let workspace = temp_dir("coursedesk-sections");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_course(&mut stdin, &mut reader, &workspace);

    let r1 = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "curriculum.sections.add",
        json!({ "title": "Week 1" }),
    );
    let s1 = r1["sectionId"].as_str().expect("sectionId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "curriculum.sections.add",
        json!({ "title": "Week 2" }),
    );
    // Empty title corrected to the default, not rejected.
    let r3 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "curriculum.sections.add",
        json!({ "title": "   " }),
    );
    assert_eq!(
        section_titles(&r3["tree"]),
        vec!["Week 1", "Week 2", "New Section"]
    );
    let positions: Vec<i64> = r3["tree"]["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["position"].as_i64().unwrap())
        .collect();
    assert_eq!(positions, vec![0, 1, 2]);

    let r4 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "curriculum.sections.update",
        json!({ "sectionId": s1, "patch": { "title": "Intro Week", "description": "start here" } }),
    );
    assert_eq!(
        r4["tree"]["sections"][0]["title"].as_str(),
        Some("Intro Week")
    );
    assert_eq!(
        r4["tree"]["sections"][0]["description"].as_str(),
        Some("start here")
    );

    let r5 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "curriculum.sections.move",
        json!({ "fromIndex": 0, "toIndex": 2 }),
    );
    assert_eq!(
        section_titles(&r5["tree"]),
        vec!["Week 2", "New Section", "Intro Week"]
    );
    let positions: Vec<i64> = r5["tree"]["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["position"].as_i64().unwrap())
        .collect();
    assert_eq!(positions, vec![0, 1, 2]);

    // Stale-id update is a silent no-op, not an error.
    let r6 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "curriculum.sections.update",
        json!({ "sectionId": "ghost", "patch": { "title": "nope" } }),
    );
    assert_eq!(
        section_titles(&r6["tree"]),
        vec!["Week 2", "New Section", "Intro Week"]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn delete_section_reparents_modules_to_ungrouped() {
    let workspace = temp_dir("coursedesk-sections-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_course(&mut stdin, &mut reader, &workspace);

    // One loose module first, so orphan ordering is observable.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "curriculum.modules.add",
        json!({ "input": { "title": "Loose", "kind": "reading" } }),
    );
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "curriculum.sections.add",
        json!({ "title": "Doomed" }),
    );
    let doomed = r["sectionId"].as_str().expect("sectionId").to_string();
    for (i, title) in ["A", "B"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "curriculum.modules.add",
            json!({ "sectionId": doomed, "input": { "title": title, "kind": "video" } }),
        );
    }

    let r = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "curriculum.sections.delete",
        json!({ "sectionId": doomed }),
    );
    let tree = &r["tree"];
    assert!(tree["sections"].as_array().unwrap().is_empty());
    let ungrouped = tree["ungrouped"].as_array().expect("ungrouped");
    let titles: Vec<&str> = ungrouped
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    // Orphans append after the existing ungrouped members, in order.
    assert_eq!(titles, vec!["Loose", "A", "B"]);
    for (i, m) in ungrouped.iter().enumerate() {
        assert_eq!(m["position"].as_i64(), Some(i as i64));
        assert_eq!(m["sectionId"], Value::Null);
        assert_eq!(m["moduleNumber"].as_i64(), Some(i as i64 + 1));
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
