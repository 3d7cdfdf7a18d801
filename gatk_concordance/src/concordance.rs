use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::{
    config::Config,
    container::ContainerRunner,
    filestore::FileStore,
    inputs::{InputName, InputSet},
    stage::StagedFiles,
};

/// Name of the concordance report
pub fn output_name(eval_label: &str, comp_label: &str) -> String {
    format!("{}_vs_{}.concordance", eval_label, comp_label)
}

/// GATK arguments:
///
/// -T GenotypeConcordance -R ref.fa [-nct <threads>] --eval eval.vcf --comp comp.vcf -o <output>
pub fn gatk_args(threads: Option<usize>, output: &str) -> Vec<String> {
    let mut v: Vec<String> = vec![
        "-T".into(),
        "GenotypeConcordance".into(),
        "-R".into(),
        InputName::Reference.file_name().into(),
    ];
    if let Some(nt) = threads {
        v.push("-nct".into());
        v.push(nt.to_string());
    }
    v.extend([
        "--eval".to_owned(),
        InputName::EvalVcf.file_name().to_owned(),
        "--comp".to_owned(),
        InputName::CompVcf.file_name().to_owned(),
        "-o".to_owned(),
        output.to_owned(),
    ]);
    v
}

/// Copy all staged files into work_dir under their logical names
fn materialize_inputs(
    inputs: &InputSet,
    staged: &StagedFiles,
    store: &dyn FileStore,
    work_dir: &Path,
) -> anyhow::Result<()> {
    for (name, _) in inputs.iter() {
        let id = staged
            .get(name)
            .ok_or_else(|| anyhow!("Input {} was not staged", name))?;
        let dest = work_dir.join(name.file_name());
        store
            .read_file(id, &dest)
            .with_context(|| format!("Could not read {} from file store", name))?;
    }
    Ok(())
}

/// Run GATK GenotypeConcordance in work_dir.  Returns the path of the report
pub fn run_concordance(
    cfg: &Config,
    staged: &StagedFiles,
    store: &dyn FileStore,
    runner: &dyn ContainerRunner,
    work_dir: &Path,
) -> anyhow::Result<PathBuf> {
    materialize_inputs(cfg.inputs(), staged, store, work_dir)?;

    let output = cfg.output_name();
    let args = gatk_args(cfg.threads(), &output);
    info!("Running GenotypeConcordance in {}", work_dir.display());
    runner.run(cfg.image(), work_dir, &args)?;

    let path = work_dir.join(&output);
    if path.is_file() {
        Ok(path)
    } else {
        Err(anyhow!(
            "GATK completed but output file {} was not found in {}",
            output,
            work_dir.display()
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::Destination,
        filestore::LocalFileStore,
        stage::{stage_inputs, tests::*},
    };
    use std::{cell::RefCell, fs};

    /// Runner that records its calls and writes the -o file unless told to fail
    #[derive(Default)]
    pub struct FakeRunner {
        pub fail: bool,
        pub calls: RefCell<Vec<(String, Vec<String>)>>,
    }

    impl ContainerRunner for FakeRunner {
        fn run(&self, image: &str, work_dir: &Path, args: &[String]) -> anyhow::Result<()> {
            self.calls
                .borrow_mut()
                .push((image.to_owned(), args.to_vec()));
            if self.fail {
                return Err(anyhow!(
                    "Docker command failed: docker run {} (working directory {})",
                    image,
                    work_dir.display()
                ));
            }
            for name in ["ref.fa", "ref.fa.fai", "eval.vcf", "comp.vcf"] {
                assert!(work_dir.join(name).is_file(), "{} missing", name);
            }
            let o = args.iter().position(|a| a == "-o").unwrap();
            fs::write(work_dir.join(&args[o + 1]), "concordance table\n")?;
            Ok(())
        }
    }

    #[test]
    fn output_names() {
        assert_eq!(
            output_name("sampleA.vcf", "sampleB.vcf"),
            "sampleA.vcf_vs_sampleB.vcf.concordance"
        );
    }

    #[test]
    fn argument_template() {
        let v = gatk_args(Some(8), "a_vs_b.concordance");
        assert_eq!(
            v.join(" "),
            "-T GenotypeConcordance -R ref.fa -nct 8 --eval eval.vcf --comp comp.vcf -o a_vs_b.concordance"
        );
        let v = gatk_args(None, "x");
        assert!(!v.contains(&"-nct".to_string()));
        assert_eq!(v.len(), 10);
    }

    #[test]
    fn run_in_work_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().join("store")).unwrap();
        let staged = stage_inputs(
            &test_inputs(),
            &tmp.path().join("staging"),
            &FakeTransfer::default(),
            &store,
        )
        .unwrap();

        let mut cfg = Config::new(
            test_inputs(),
            "A".to_owned(),
            "B".to_owned(),
            Destination::LocalDir(tmp.path().join("out")),
        );
        cfg.set_threads(Some(2));
        let work = tmp.path().join("job");
        fs::create_dir(&work).unwrap();

        let runner = FakeRunner::default();
        let out = run_concordance(&cfg, &staged, &store, &runner, &work).unwrap();
        assert_eq!(out, work.join("A_vs_B.concordance"));
        assert!(work.join("ref.dict").is_file());

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "quay.io/ucsc_cgl/gatk");
        assert!(calls[0].1.windows(2).any(|w| w[0] == "-nct" && w[1] == "2"));
    }

    #[test]
    fn unstaged_input_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path()).unwrap();
        let cfg = Config::new(
            test_inputs(),
            "A".to_owned(),
            "B".to_owned(),
            Destination::LocalDir(tmp.path().to_owned()),
        );
        let runner = FakeRunner::default();
        let res = run_concordance(&cfg, &StagedFiles::default(), &store, &runner, tmp.path());
        assert!(res.is_err());
        assert!(runner.calls.borrow().is_empty());
    }
}
