//! Staging of input files
//!
//! Each input is handled by its own thread: the file is fetched into the
//! staging directory (unless it is already there) and then written to the
//! file store.  Staged files live in a subdirectory named from the SHA-256
//! of their source, so a file is only reused for the same source.  Results are sent back over a channel, and staging is complete
//! only once every thread has reported.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    thread,
};

use anyhow::Context;
use crossbeam_channel::bounded;
use sha2::{Digest, Sha256};

use crate::{
    filestore::{FileId, FileStore},
    inputs::{InputName, InputSet},
    location::Location,
    transfer::Transfer,
};

/// File store handles for all staged inputs
#[derive(Debug, Clone, Default)]
pub struct StagedFiles {
    ids: BTreeMap<InputName, FileId>,
}

impl StagedFiles {
    pub fn get(&self, name: InputName) -> Option<&FileId> {
        self.ids.get(&name)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".partial");
    PathBuf::from(s)
}

/// Staging path of input name fetched from src
pub fn staged_path(name: InputName, src: &Location, dir: &Path) -> PathBuf {
    let digest = Sha256::digest(src.to_string().as_bytes());
    dir.join(hex::encode(digest)).join(name.file_name())
}

/// Fetch one input into dir if not already present, then add it to the store
pub fn stage_file(
    name: InputName,
    src: &Location,
    dir: &Path,
    transfer: &dyn Transfer,
    store: &dyn FileStore,
) -> anyhow::Result<FileId> {
    let path = staged_path(name, src, dir);
    if path.is_file() {
        debug!("{} already present at {}; not downloading", name, path.display());
    } else {
        if src.is_remote() {
            info!("Downloading {} from {}", name, src);
        } else {
            info!("Copying {} from {}", name, src);
        }
        if let Some(d) = path.parent() {
            fs::create_dir_all(d)
                .with_context(|| format!("Error creating staging directory {}", d.display()))?;
        }
        let tmp = partial_path(&path);
        if tmp.exists() {
            fs::remove_file(&tmp).with_context(|| {
                format!("Could not remove incomplete download {}", tmp.display())
            })?;
        }
        transfer
            .fetch(src, &tmp)
            .with_context(|| format!("Failed to download {}", src))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Error moving {} to {}", tmp.display(), path.display()))?;
    }
    store
        .write_file(&path)
        .with_context(|| format!("Error adding {} to file store", path.display()))
}

/// Stage all inputs in parallel, one thread per file
pub fn stage_inputs(
    inputs: &InputSet,
    dir: &Path,
    transfer: &dyn Transfer,
    store: &dyn FileStore,
) -> anyhow::Result<StagedFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Error creating staging directory {}", dir.display()))?;

    let n = inputs.len();
    let (snd, rcv) = bounded(n);

    thread::scope(|sc| {
        for (name, src) in inputs.iter() {
            let snd = snd.clone();
            sc.spawn(move || {
                trace!("Staging task for {} starting", name);
                let res = stage_file(name, src, dir, transfer, store);
                // Receiver outlives the scope so this cannot fail
                let _ = snd.send((name, res));
            });
        }
    });
    drop(snd);

    // Barrier: collect exactly one result from each task
    let mut staged = StagedFiles::default();
    let mut first_err = None;
    for (name, res) in rcv.iter() {
        match res {
            Ok(id) => {
                debug!("Staged {} as {}", name, id);
                staged.ids.insert(name, id);
            }
            Err(e) => {
                error!("Staging of {} failed: {:#}", name, e);
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None if staged.len() != n => Err(anyhow!(
            "Only {} of {} inputs were staged",
            staged.len(),
            n
        )),
        None => Ok(staged),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{filestore::LocalFileStore, location::S3Path};
    use std::sync::Mutex;

    /// Transfer that serves contents from memory and records every request
    #[derive(Default)]
    pub struct FakeTransfer {
        pub missing: Vec<String>,
        pub fetched: Mutex<Vec<String>>,
        pub uploaded: Mutex<Vec<(PathBuf, String)>>,
    }

    impl FakeTransfer {
        pub fn failing(url: &str) -> Self {
            Self {
                missing: vec![url.to_owned()],
                ..Default::default()
            }
        }

        pub fn n_fetched(&self) -> usize {
            self.fetched.lock().unwrap().len()
        }
    }

    impl Transfer for FakeTransfer {
        fn fetch(&self, src: &Location, dest: &Path) -> anyhow::Result<()> {
            let url = src.to_string();
            if self.missing.contains(&url) {
                return Err(anyhow!("404 Not Found"));
            }
            fs::write(dest, format!("contents of {}\n", url))?;
            self.fetched.lock().unwrap().push(url);
            Ok(())
        }

        fn upload(&self, src: &Path, dest: &S3Path) -> anyhow::Result<()> {
            self.uploaded
                .lock()
                .unwrap()
                .push((src.to_owned(), dest.to_string()));
            Ok(())
        }
    }

    pub fn test_inputs() -> InputSet {
        let loc = |s: &str| s.parse::<Location>().unwrap();
        let mut set = InputSet::new(
            loc("s3://bucket/hg19.fa"),
            loc("s3://bucket/hg19.fa.fai"),
            loc("s3://bucket/sampleA.vcf"),
            loc("https://host/data/sampleB.vcf"),
        );
        set.set_reference_dict(loc("s3://bucket/hg19.dict"));
        set
    }

    #[test]
    fn stage_all_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let transfer = FakeTransfer::default();
        let dir = tmp.path().join("staging");

        let staged = stage_inputs(&test_inputs(), &dir, &transfer, &store).unwrap();
        assert_eq!(staged.len(), 5);
        assert_eq!(transfer.n_fetched(), 5);
        for (name, src) in test_inputs().iter() {
            assert!(staged.get(name).is_some());
            let path = staged_path(name, src, &dir);
            assert!(path.is_file());
            assert!(!partial_path(&path).exists());
        }
    }

    #[test]
    fn staging_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let dir = tmp.path().join("staging");

        let first = FakeTransfer::default();
        let s1 = stage_inputs(&test_inputs(), &dir, &first, &store).unwrap();

        let second = FakeTransfer::default();
        let s2 = stage_inputs(&test_inputs(), &dir, &second, &store).unwrap();
        assert_eq!(second.n_fetched(), 0);
        assert_eq!(
            s1.get(InputName::EvalVcf).unwrap(),
            s2.get(InputName::EvalVcf).unwrap()
        );
    }

    #[test]
    fn changed_source_is_fetched_again() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let dir = tmp.path().join("staging");
        stage_inputs(&test_inputs(), &dir, &FakeTransfer::default(), &store).unwrap();

        let loc = |s: &str| s.parse::<Location>().unwrap();
        let mut inputs = InputSet::new(
            loc("s3://bucket/hg19.fa"),
            loc("s3://bucket/hg19.fa.fai"),
            loc("s3://bucket/sampleC.vcf"),
            loc("https://host/data/sampleB.vcf"),
        );
        inputs.set_reference_dict(loc("s3://bucket/hg19.dict"));

        let second = FakeTransfer::default();
        let staged = stage_inputs(&inputs, &dir, &second, &store).unwrap();
        assert_eq!(
            *second.fetched.lock().unwrap(),
            vec!["s3://bucket/sampleC.vcf".to_owned()]
        );

        let out = tmp.path().join("eval.vcf");
        store
            .read_file(staged.get(InputName::EvalVcf).unwrap(), &out)
            .unwrap();
        assert_eq!(
            fs::read_to_string(out).unwrap(),
            "contents of s3://bucket/sampleC.vcf\n"
        );
    }

    #[test]
    fn failed_download_names_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let transfer = FakeTransfer::failing("https://host/data/sampleB.vcf");
        let dir = tmp.path().join("staging");

        let e = stage_inputs(&test_inputs(), &dir, &transfer, &store).unwrap_err();
        assert!(format!("{:#}", e).contains("https://host/data/sampleB.vcf"));
        let src: Location = "https://host/data/sampleB.vcf".parse().unwrap();
        assert!(!staged_path(InputName::CompVcf, &src, &dir).exists());
        // The other downloads still ran to completion
        assert_eq!(transfer.n_fetched(), 4);
    }

    #[test]
    fn leftover_partial_file_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let transfer = FakeTransfer::default();
        let dir = tmp.path().join("staging");
        let src: Location = "s3://bucket/sampleA.vcf".parse().unwrap();
        let path = staged_path(InputName::EvalVcf, &src, &dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(partial_path(&path), "trunc").unwrap();

        stage_file(InputName::EvalVcf, &src, &dir, &transfer, &store).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "contents of s3://bucket/sampleA.vcf\n"
        );
    }
}
