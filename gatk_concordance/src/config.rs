use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{concordance::output_name, inputs::InputSet, location::S3Path};

pub const DEFAULT_IMAGE: &str = "quay.io/ucsc_cgl/gatk";

/// Where the concordance report ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    LocalDir(PathBuf),
    S3(S3Path),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalDir(p) => write!(f, "{}", p.display()),
            Self::S3(p) => write!(f, "{}", p),
        }
    }
}

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
/// inputs - source locations of the input files
/// eval_label, comp_label - labels used to name the output file
/// destination - local directory or S3 prefix for the output
/// threads - value passed to GATK with -nct (None to omit the option)
/// image - docker image with GATK
/// sudo - run docker with sudo
/// ssec_key - master key for S3 server side encryption with customer keys
/// work_dir - root directory for staging, file store and tool working directories
///
pub struct Config {
    inputs: InputSet,
    eval_label: String,
    comp_label: String,
    destination: Destination,
    threads: Option<usize>,
    image: String,
    sudo: bool,
    ssec_key: Option<Vec<u8>>,
    work_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(
        inputs: InputSet,
        eval_label: String,
        comp_label: String,
        destination: Destination,
    ) -> Self {
        Self {
            inputs,
            eval_label,
            comp_label,
            destination,
            threads: None,
            image: DEFAULT_IMAGE.to_owned(),
            sudo: false,
            ssec_key: None,
            work_dir: None,
        }
    }

    pub fn set_threads(&mut self, nt: Option<usize>) {
        self.threads = nt
    }

    pub fn set_image<S: Into<String>>(&mut self, image: S) {
        self.image = image.into()
    }

    pub fn set_sudo(&mut self) {
        self.sudo = true
    }

    pub fn set_ssec_key(&mut self, key: Vec<u8>) {
        self.ssec_key = Some(key)
    }

    pub fn set_work_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.work_dir = Some(dir.as_ref().to_owned())
    }

    pub fn inputs(&self) -> &InputSet {
        &self.inputs
    }

    pub fn eval_label(&self) -> &str {
        &self.eval_label
    }

    pub fn comp_label(&self) -> &str {
        &self.comp_label
    }

    pub fn output_name(&self) -> String {
        output_name(&self.eval_label, &self.comp_label)
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn sudo(&self) -> bool {
        self.sudo
    }

    pub fn ssec_key(&self) -> Option<&[u8]> {
        self.ssec_key.as_deref()
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }
}
