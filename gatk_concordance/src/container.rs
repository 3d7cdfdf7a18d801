use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, ExitStatus},
};

use anyhow::Context;

/// Mount point of the working directory inside the container
pub const CONTAINER_DATA_DIR: &str = "/data";

/// Runs a tool packaged as a container image
pub trait ContainerRunner {
    /// Run image with args, with work_dir mounted as the container working directory.
    /// Returns an error on launch failure or a non-zero exit.
    fn run(&self, image: &str, work_dir: &Path, args: &[String]) -> anyhow::Result<()>;
}

pub struct DockerRunner {
    sudo: bool,
}

impl DockerRunner {
    pub fn new(sudo: bool) -> Self {
        Self { sudo }
    }

    /// Docker command line.  The bind mount needs an absolute host path, so a
    /// relative work_dir is resolved against the current directory
    pub fn command(
        &self,
        image: &str,
        work_dir: &Path,
        args: &[String],
    ) -> anyhow::Result<Command> {
        let work_dir = std::path::absolute(work_dir)
            .with_context(|| format!("Could not resolve work directory {}", work_dir.display()))?;
        let mut cmd = if self.sudo {
            let mut c = Command::new("sudo");
            c.arg("docker");
            c
        } else {
            Command::new("docker")
        };
        cmd.args(["run", "--rm", "--log-driver=none", "-v"])
            .arg(format!("{}:{}", work_dir.display(), CONTAINER_DATA_DIR))
            .args(["-w", CONTAINER_DATA_DIR])
            .arg(image)
            .args(args)
            .current_dir(&work_dir);
        Ok(cmd)
    }
}

/// Full command line for log and error messages
pub fn command_line(cmd: &Command) -> String {
    let mut v = vec![cmd.get_program()];
    v.extend(cmd.get_args());
    v.join(OsStr::new(" ")).to_string_lossy().into_owned()
}

fn check_status(status: ExitStatus, cmd_line: &str, work_dir: &Path) -> anyhow::Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "Docker command failed ({}): {} (working directory {})",
            status,
            cmd_line,
            work_dir.display()
        ))
    }
}

impl ContainerRunner for DockerRunner {
    fn run(&self, image: &str, work_dir: &Path, args: &[String]) -> anyhow::Result<()> {
        let mut cmd = self.command(image, work_dir, args)?;
        let cmd_line = command_line(&cmd);
        debug!("Running: {}", cmd_line);

        let res = cmd
            .status()
            .with_context(|| {
                format!(
                    "Could not launch docker: {} (working directory {})",
                    cmd_line,
                    work_dir.display()
                )
            })
            .and_then(|status| check_status(status, &cmd_line, work_dir));

        if let Err(e) = &res {
            error!("{:#}", e);
        }
        res
    }
}
