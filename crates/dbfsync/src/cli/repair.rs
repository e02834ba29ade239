use anyhow::{Context, Result};
use dbfsync_dbf::repair_file;
use std::path::Path;

pub fn run(input: &Path, output: Option<&Path>) -> Result<()> {
    println!("🔧 Repairing {}...", input.display());
    let report = repair_file(input, output)
        .with_context(|| format!("Failed to repair {}", input.display()))?;
    println!("💾 Backup written to {}", report.backup.display());
    println!("✅ Repaired file written to {}", report.output.display());
    println!("📊 Records kept: {}", report.kept);
    if report.padded > 0 {
        println!("🩹 Padded short records: {}", report.padded);
    }
    println!("🗑️  Skipped deleted records: {}", report.deleted);
    Ok(())
}
