//! Job-file store
//!
//! Files are passed between the staging and run stages through the store.
//! The store is content addressed: the handle of a file is the SHA-256 digest
//! of its contents, so writing the same content twice gives the same handle.
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

/// Opaque handle to a file held in a FileStore
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait FileStore: Sync {
    /// Register a local file with the store, returning its handle
    fn write_file(&self, path: &Path) -> anyhow::Result<FileId>;

    /// Materialize a stored file at dest
    fn read_file(&self, id: &FileId, dest: &Path) -> anyhow::Result<()>;
}

pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_owned();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Error creating file store directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn id_path(&self, id: &FileId) -> PathBuf {
        self.dir.join(&id.0)
    }
}

fn hash_file(path: &Path) -> anyhow::Result<FileId> {
    let mut rdr = fs::File::open(path)
        .with_context(|| format!("Could not open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut rdr, &mut hasher)
        .with_context(|| format!("Error reading from {}", path.display()))?;
    Ok(FileId(hex::encode(hasher.finalize())))
}

impl FileStore for LocalFileStore {
    fn write_file(&self, path: &Path) -> anyhow::Result<FileId> {
        let id = hash_file(path)?;
        let store_path = self.id_path(&id);
        if store_path.exists() {
            trace!("{} already held in file store as {}", path.display(), id);
        } else {
            // Copy to a temporary file first so a partial copy is never visible under the id
            let tmp = NamedTempFile::new_in(&self.dir).with_context(|| {
                format!("Could not create temporary file in {}", self.dir.display())
            })?;
            fs::copy(path, tmp.path()).with_context(|| {
                format!("Error copying {} to file store", path.display())
            })?;
            tmp.persist(&store_path).with_context(|| {
                format!("Error moving file to {}", store_path.display())
            })?;
            debug!("Stored {} as {}", path.display(), id);
        }
        Ok(id)
    }

    fn read_file(&self, id: &FileId, dest: &Path) -> anyhow::Result<()> {
        let src = self.id_path(id);
        if !src.is_file() {
            return Err(anyhow!("File {} not found in file store", id));
        }
        if dest.exists() {
            fs::remove_file(dest)
                .with_context(|| format!("Could not remove existing file {}", dest.display()))?;
        }
        // Stored files are never modified, so a hard link is safe when possible
        if fs::hard_link(&src, dest).is_err() {
            fs::copy(&src, dest).with_context(|| {
                format!("Error copying file {} from store to {}", id, dest.display())
            })?;
        }
        trace!("Read file {} into {}", id, dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_shares_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();

        let a = tmp.path().join("a.vcf");
        let b = tmp.path().join("b.vcf");
        let c = tmp.path().join("c.vcf");
        fs::write(&a, "##fileformat=VCFv4.2\n").unwrap();
        fs::write(&b, "##fileformat=VCFv4.2\n").unwrap();
        fs::write(&c, "##fileformat=VCFv4.1\n").unwrap();

        let ia = store.write_file(&a).unwrap();
        let ib = store.write_file(&b).unwrap();
        let ic = store.write_file(&c).unwrap();
        assert_eq!(ia, ib);
        assert_ne!(ia, ic);
        assert_eq!(ia.to_string().len(), 64);
    }

    #[test]
    fn read_back_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let src = tmp.path().join("ref.fa");
        fs::write(&src, ">chr1\nACGT\n").unwrap();
        let id = store.write_file(&src).unwrap();

        // Removing the source must not affect the stored copy
        fs::remove_file(&src).unwrap();

        let work = tmp.path().join("work");
        fs::create_dir(&work).unwrap();
        let dest = work.join("ref.fa");
        store.read_file(&id, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), ">chr1\nACGT\n");

        // Reading again over an existing file succeeds
        store.read_file(&id, &dest).unwrap();
    }

    #[test]
    fn unknown_id_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path()).unwrap();
        let id = FileId("0".repeat(64));
        assert!(store.read_file(&id, &tmp.path().join("x")).is_err());
    }
}
