use crate::db::DB_FILE_NAME;
use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/campus.sqlite3";
pub const BUNDLE_FORMAT: &str = "campusd-workspace-v1";

#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub bundle_path: PathBuf,
    pub db_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Snapshot of the workspace database taken before a consolidation run.
pub fn backup_workspace(workspace: &Path, out_dir: &Path) -> anyhow::Result<BackupSummary> {
    let db_path = workspace.join(DB_FILE_NAME);
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.display()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.display()))?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let bundle_path = out_dir.join(format!("campus-backup-{}.zip", stamp));

    let out_file = File::create(&bundle_path)
        .with_context(|| format!("failed to create bundle {}", bundle_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "sourceWorkspace": workspace.to_string_lossy(),
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(bundle = %bundle_path.display(), sha256 = %db_sha256, "workspace backed up");
    Ok(BackupSummary {
        bundle_path,
        db_sha256,
    })
}

/// Replaces the workspace database with the bundle's copy after checking the
/// recorded digest.
pub fn restore_workspace(bundle: &Path, workspace: &Path) -> anyhow::Result<String> {
    let in_file = File::open(bundle)
        .with_context(|| format!("failed to open bundle {}", bundle.display()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing dbSha256"))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/campus.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        return Err(anyhow!(
            "database digest mismatch: manifest {}, bundle {}",
            expected,
            actual
        ));
    }

    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let dst = workspace.join(DB_FILE_NAME);
    let tmp_dst = workspace.join(format!("{}.restoring", DB_FILE_NAME));
    std::fs::write(&tmp_dst, &db_bytes)
        .with_context(|| format!("failed to write {}", tmp_dst.display()))?;
    std::fs::rename(&tmp_dst, &dst)
        .with_context(|| format!("failed to move restored database to {}", dst.display()))?;

    tracing::info!(bundle = %bundle.display(), workspace = %workspace.display(), "workspace restored");
    Ok(actual)
}
