use std::fs;
use std::path::{Path, PathBuf};

use skinrelay::skin::codec::{geometry_identifier, sanitize_identifier, skin_from_files};
use skinrelay::skin::store::{GEOMETRY_FILE_NAME, SKIN_FILE_NAME};

#[derive(Default)]
struct AuditReport {
    artifacts: usize,
    mismatched: usize,
    errors: Vec<String>,
}

fn audit_artifact(base: &Path, dir: &Path, report: &mut AuditReport) {
    let png = match fs::read(dir.join(SKIN_FILE_NAME)) {
        Ok(bytes) => bytes,
        Err(err) => {
            report
                .errors
                .push(format!("{}: skin read failed: {}", dir.display(), err));
            return;
        }
    };
    let geometry = match fs::read(dir.join(GEOMETRY_FILE_NAME)) {
        Ok(bytes) => bytes,
        Err(err) => {
            report
                .errors
                .push(format!("{}: geometry read failed: {}", dir.display(), err));
            return;
        }
    };

    let skin = match skin_from_files(&png, &geometry, "audit".to_string()) {
        Ok(skin) => skin,
        Err(err) => {
            report
                .errors
                .push(format!("{}: {}", dir.display(), err));
            return;
        }
    };
    report.artifacts += 1;

    let Some(identifier) = geometry_identifier(&geometry) else {
        report.errors.push(format!(
            "{}: geometry names no model identifier",
            dir.display()
        ));
        return;
    };
    let expected = base.join(sanitize_identifier(&identifier));
    if expected != dir {
        println!(
            "skin_audit: {} stored under {} but names {}",
            identifier,
            dir.display(),
            expected.display()
        );
        report.mismatched += 1;
    }
    println!(
        "skin_audit: {} {}x{} ({} animation(s))",
        dir.display(),
        skin.width,
        skin.height,
        skin.animations.len()
    );
}

fn walk(base: &Path, report: &mut AuditReport) {
    let mut pending = vec![base.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                report
                    .errors
                    .push(format!("{}: read dir failed: {}", dir.display(), err));
                continue;
            }
        };
        if dir.join(SKIN_FILE_NAME).is_file() {
            audit_artifact(base, &dir, report);
            continue;
        }
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            }
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let root = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = root.join("skin");
    if !base.is_dir() {
        eprintln!("skin_audit: no skin store at {}", base.display());
        std::process::exit(1);
    }

    let mut report = AuditReport::default();
    walk(&base, &mut report);

    println!(
        "skin_audit: {} artifact(s), {} misplaced, {} error(s)",
        report.artifacts,
        report.mismatched,
        report.errors.len()
    );
    for error in &report.errors {
        eprintln!("skin_audit: {}", error);
    }
    if !report.errors.is_empty() {
        std::process::exit(1);
    }
}
