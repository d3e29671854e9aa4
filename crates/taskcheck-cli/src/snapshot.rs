//! Raw task snapshots for debugging field layouts.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use taskcheck_core::{Field, Task};

#[derive(Serialize)]
struct Snapshot<'a> {
    form_id: u64,
    task_id: u64,
    task_title: &'a str,
    fields: &'a [Field],
}

pub fn snapshot_file_name(form_id: u64, task_id: u64) -> String {
    format!("form-{}-task-{}.json", form_id, task_id)
}

/// Write `form-<form>-task-<task>.json` into `dir`, creating it if needed.
pub fn write_snapshot(dir: &Path, form_id: u64, task: &Task) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating snapshot directory {}", dir.display()))?;

    let path = dir.join(snapshot_file_name(form_id, task.id));
    let snapshot = Snapshot {
        form_id,
        task_id: task.id,
        task_title: &task.title,
        fields: &task.fields,
    };
    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
