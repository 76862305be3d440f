//! Roster-driven renaming of face crops.

use anyhow::{Context, Result};
use rostercrop_core::resolver::FACE_SUFFIX;
use rostercrop_core::{synthesize, IdentityRecord, IdentityResolver, MatchLayer, RosterIndex};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// One crop that resolved to a roster record.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedRename {
    pub source: PathBuf,
    pub file_name: String,
    pub target_name: String,
    pub layer: MatchLayer,
    pub employee: IdentityRecord,
}

#[derive(Debug, Default, Serialize)]
pub struct RenamePlan {
    pub matched: Vec<PlannedRename>,
    pub unmatched: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RenameReport {
    pub copied: usize,
    pub collisions: Vec<String>,
    pub failures: Vec<(String, io::Error)>,
}

/// A file in the cropped directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub name: String,
    pub size: u64,
}

/// Regular files in `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<ListedFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            files.push(ListedFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Resolve every `*_face.jpg` in `cropped_dir` against the roster.
pub fn plan_renames(cropped_dir: &Path, index: &RosterIndex) -> Result<RenamePlan> {
    let resolver = IdentityResolver::new(index);
    let mut plan = RenamePlan::default();

    for file in list_files(cropped_dir)? {
        if !file.name.ends_with(FACE_SUFFIX) {
            continue;
        }
        match resolver.resolve(&file.name) {
            Some(hit) => plan.matched.push(PlannedRename {
                source: cropped_dir.join(&file.name),
                target_name: synthesize(hit.record),
                layer: hit.layer,
                employee: hit.record.clone(),
                file_name: file.name,
            }),
            None => plan.unmatched.push(file.name),
        }
    }

    Ok(plan)
}

/// Copy matched crops into `rename_dir`, never overwriting existing files.
pub fn apply_renames(plan: &RenamePlan, rename_dir: &Path) -> Result<RenameReport> {
    std::fs::create_dir_all(rename_dir).with_context(|| format!("creating {}", rename_dir.display()))?;

    let mut report = RenameReport::default();
    for item in &plan.matched {
        let target = rename_dir.join(&item.target_name);
        match copy_new(&item.source, &target) {
            Ok(()) => {
                println!("✓ Copied: {}", item.file_name);
                println!("  → {}", item.target_name);
                println!("  Employee: {} ({})", item.employee.full_name, item.employee.department);
                println!();
                report.copied += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!(target = %target.display(), source = %item.file_name, "target already exists");
                println!("WARNING: Target file already exists: {}", item.target_name);
                report.collisions.push(item.file_name.clone());
            }
            Err(e) => {
                tracing::error!(source = %item.file_name, error = %e, "copy failed");
                println!("✗ Error copying {}: {e}", item.file_name);
                report.failures.push((item.file_name.clone(), e));
            }
        }
    }

    Ok(report)
}

/// Copy `source` to `target`, failing with `AlreadyExists` instead of
/// overwriting.
fn copy_new(source: &Path, target: &Path) -> io::Result<()> {
    let mut writer = OpenOptions::new().write(true).create_new(true).open(target)?;
    let copied = File::open(source).and_then(|mut reader| io::copy(&mut reader, &mut writer));
    if let Err(e) = copied {
        drop(writer);
        // The partial target is removed; the copy error is what gets reported.
        let _ = std::fs::remove_file(target);
        return Err(e);
    }
    Ok(())
}
