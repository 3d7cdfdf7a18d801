use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    ArgGroup, ArgMatches, Command,
};

use anyhow::Context;

use utils::{add_log_args, get_threads, init_log};

use crate::{
    config::{Config, Destination, DEFAULT_IMAGE},
    inputs::{InputName, InputSet},
    location::{Location, S3Path},
};

/// Required length of the SSE-C master key
const SSEC_KEY_LEN: usize = 32;

fn url_arg(id: &'static str, short: char, help: &'static str) -> Arg {
    Arg::new(id)
        .short(short)
        .long(id)
        .value_parser(value_parser!(Location))
        .value_name("URL")
        .help(help)
}

/// Labels form part of the output file name so cannot contain a path separator
fn parse_label(s: &str) -> Result<String, String> {
    if s.contains('/') {
        Err(format!("label '{}' must not contain '/'", s))
    } else {
        Ok(s.to_owned())
    }
}

/// Set up definition of command options for clap
fn cli_model() -> Command {
    let cmd = Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!());
    add_log_args(cmd, "info")
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .help("Set number of GATK threads (-nct) [default: available cores]"),
        )
        .arg(
            Arg::new("no_nct")
                .long("no-nct")
                .action(ArgAction::SetTrue)
                .conflicts_with("threads")
                .help("Do not pass the -nct option to GATK"),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .value_parser(value_parser!(String))
                .value_name("IMAGE")
                .default_value(DEFAULT_IMAGE)
                .help("Docker image with GATK"),
        )
        .arg(
            Arg::new("sudo")
                .long("sudo")
                .action(ArgAction::SetTrue)
                .help("Run docker with sudo"),
        )
        .arg(
            Arg::new("ssec")
                .long("ssec")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Master key file for S3 server side encryption with customer keys"),
        )
        .arg(
            Arg::new("work_dir")
                .short('w')
                .long("work-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Set work directory for downloads and GATK [default: temporary directory]"),
        )
        .arg(url_arg("reference", 'r', "Reference genome URL").required(true))
        .arg(
            url_arg("reference_index", 'i', "Reference genome index (.fai) URL")
                .alias("reference-index")
                .required(true),
        )
        .arg(
            url_arg(
                "reference_dict",
                'd',
                "Reference genome sequence dictionary (.dict) URL",
            )
            .alias("reference-dict"),
        )
        .arg(
            url_arg("eval_vcf", '1', "VCF file URL to evaluate")
                .visible_short_alias('e')
                .alias("eval-vcf")
                .required(true),
        )
        .arg(
            Arg::new("eval_label")
                .short('y')
                .long("eval_label")
                .alias("eval-label")
                .value_parser(parse_label)
                .value_name("LABEL")
                .help("Label for VCF file to evaluate [default: file name]"),
        )
        .arg(
            url_arg("comp_vcf", '2', "VCF file URL to compare against")
                .visible_short_alias('c')
                .alias("comp-vcf")
                .required(true),
        )
        .arg(
            Arg::new("comp_label")
                .short('z')
                .long("comp_label")
                .alias("comp-label")
                .value_parser(parse_label)
                .value_name("LABEL")
                .help("Label for VCF file to compare against [default: file name]"),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output_dir")
                .alias("output-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Local output directory"),
        )
        .arg(
            Arg::new("s3_dir")
                .short('3')
                .long("s3_dir")
                .alias("s3-dir")
                .value_parser(value_parser!(String))
                .value_name("BUCKET/PREFIX")
                .help("S3 output directory, starting with bucket name"),
        )
        .group(
            ArgGroup::new("destination")
                .args(["output_dir", "s3_dir"])
                .required(true)
                .multiple(false),
        )
}

fn get_location(m: &ArgMatches, id: &str) -> anyhow::Result<Location> {
    m.get_one::<Location>(id)
        .cloned()
        .ok_or_else(|| anyhow!("Missing required option {}", id))
}

/// Explicit label if given, otherwise the file name from the URL
fn get_label(m: &ArgMatches, id: &str, loc: &Location) -> anyhow::Result<String> {
    match m.get_one::<String>(id) {
        Some(s) if !s.is_empty() => Ok(s.clone()),
        _ => loc
            .base_name()
            .map(|s| s.to_owned())
            .ok_or_else(|| anyhow!("Could not derive a label from {}; use --{}", loc, id)),
    }
}

fn read_ssec_key(p: &Path) -> anyhow::Result<Vec<u8>> {
    let key = fs::read(p).with_context(|| format!("Could not read key file {}", p.display()))?;
    if key.len() != SSEC_KEY_LEN {
        Err(anyhow!(
            "Key file {} must contain exactly {} bytes (found {})",
            p.display(),
            SSEC_KEY_LEN,
            key.len()
        ))
    } else {
        Ok(key)
    }
}

/// Build Config from parsed command line
fn config_from_matches(m: &ArgMatches) -> anyhow::Result<Config> {
    let eval_vcf = get_location(m, "eval_vcf")?;
    let comp_vcf = get_location(m, "comp_vcf")?;
    let eval_label = get_label(m, "eval_label", &eval_vcf)?;
    let comp_label = get_label(m, "comp_label", &comp_vcf)?;

    let mut inputs = InputSet::new(
        get_location(m, "reference")?,
        get_location(m, "reference_index")?,
        eval_vcf,
        comp_vcf,
    );
    if let Some(d) = m.get_one::<Location>("reference_dict") {
        inputs.set_reference_dict(d.clone())
    }

    // clap guarantees exactly one of these is present
    let destination = match (
        m.get_one::<PathBuf>("output_dir"),
        m.get_one::<String>("s3_dir"),
    ) {
        (Some(d), None) => Destination::LocalDir(d.to_owned()),
        (None, Some(s)) => Destination::S3(
            S3Path::from_dir_str(s).with_context(|| format!("Invalid S3 output directory {}", s))?,
        ),
        _ => return Err(anyhow!("Exactly one of --output_dir or --s3_dir must be given")),
    };

    let mut cfg = Config::new(inputs, eval_label, comp_label, destination);

    if !m.get_flag("no_nct") {
        cfg.set_threads(Some(get_threads(m, "threads")))
    }
    if let Some(s) = m.get_one::<String>("image") {
        cfg.set_image(s.as_str())
    }
    if m.get_flag("sudo") {
        cfg.set_sudo()
    }
    if let Some(p) = m.get_one::<PathBuf>("ssec") {
        cfg.set_ssec_key(read_ssec_key(p)?)
    }
    if let Some(p) = m.get_one::<PathBuf>("work_dir") {
        cfg.set_work_dir(p)
    }

    Ok(cfg)
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m)?;

    debug!("Processing command line options");
    let cfg = config_from_matches(&m)?;

    debug!(
        "Labels: eval {}, comp {}",
        cfg.eval_label(),
        cfg.comp_label()
    );
    if cfg.inputs().get(InputName::ReferenceDict).is_none() {
        warn!("No sequence dictionary given; GATK expects ref.dict next to the reference");
    }
    debug!(
        "Output {} will be written to {}",
        cfg.output_name(),
        cfg.destination()
    );
    Ok(cfg)
}
