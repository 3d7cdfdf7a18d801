use std::{fs, path::Path};

use anyhow::Context;

use crate::{config::Destination, transfer::Transfer};

/// Move file into dir, falling back to copy and remove when a rename is not
/// possible (i.e., across file systems)
fn move_file(file: &Path, dir: &Path) -> anyhow::Result<String> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Error creating output directory {}", dir.display()))?;
    let name = file
        .file_name()
        .ok_or_else(|| anyhow!("Output path {} has no file name", file.display()))?;
    let dest = dir.join(name);
    if fs::rename(file, &dest).is_err() {
        fs::copy(file, &dest).with_context(|| {
            format!("Error copying {} to {}", file.display(), dest.display())
        })?;
        fs::remove_file(file)
            .with_context(|| format!("Could not remove {}", file.display()))?;
    }
    Ok(dest.display().to_string())
}

/// Hand the output file to its destination. Returns where the file ended up
pub fn publish(file: &Path, dest: &Destination, transfer: &dyn Transfer) -> anyhow::Result<String> {
    match dest {
        Destination::LocalDir(dir) => move_file(file, dir),
        Destination::S3(prefix) => {
            let name = file
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| anyhow!("Invalid output file name {}", file.display()))?;
            let target = prefix.join(name);
            transfer.upload(file, &target)?;
            Ok(target.to_string())
        }
    }
}
