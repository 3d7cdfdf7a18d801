use std::{collections::BTreeMap, fmt};

use crate::location::Location;

/// Logical names of the input files.  The file name is also the name
/// the file is given in the tool working directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InputName {
    Reference,
    ReferenceIndex,
    ReferenceDict,
    EvalVcf,
    CompVcf,
}

impl InputName {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Reference => "ref.fa",
            Self::ReferenceIndex => "ref.fa.fai",
            Self::ReferenceDict => "ref.dict",
            Self::EvalVcf => "eval.vcf",
            Self::CompVcf => "comp.vcf",
        }
    }
}

impl fmt::Display for InputName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Source locations of the input files, keyed by logical name
#[derive(Debug, Clone)]
pub struct InputSet {
    files: BTreeMap<InputName, Location>,
}

impl InputSet {
    pub fn new(
        reference: Location,
        reference_index: Location,
        eval_vcf: Location,
        comp_vcf: Location,
    ) -> Self {
        let files = BTreeMap::from([
            (InputName::Reference, reference),
            (InputName::ReferenceIndex, reference_index),
            (InputName::EvalVcf, eval_vcf),
            (InputName::CompVcf, comp_vcf),
        ]);
        Self { files }
    }

    pub fn set_reference_dict(&mut self, dict: Location) {
        self.files.insert(InputName::ReferenceDict, dict);
    }

    pub fn get(&self, name: InputName) -> Option<&Location> {
        self.files.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InputName, &Location)> {
        self.files.iter().map(|(n, l)| (*n, l))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}
