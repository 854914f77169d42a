//! Launch config and info file handling inside the work directory.
//!
//! The launch tool reads a YAML config and records provider state in an info
//! file. JSON is valid YAML, so the config is rendered with `serde_json`.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Serialize;

use crate::launch::LaunchSpec;

use super::LaunchCliError;

/// Suffix of info files written by the launch tool.
pub const INFO_FILE_SUFFIX: &str = ".info.json";

/// Suffix of launch config files.
pub const CONFIG_FILE_SUFFIX: &str = ".yaml";

const LAUNCH_CONFIG_VERSION: u8 = 1;
const ADMIN_LOCATION: &str = "0.0.0.0/0";

#[derive(Debug, Serialize)]
struct LaunchConfigFile<'a> {
    launch_config_version: u8,
    deployment_name: &'a str,
    template_url: &'a str,
    provider: &'a str,
    aws_region: &'a str,
    key_helper: bool,
    template_parameters: TemplateParameters<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TemplateParameters<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<&'a str>,
    admin_location: &'static str,
    public_slave_instance_count: u8,
    slave_instance_count: u8,
}

/// Renders the launch config for `spec`.
pub(super) fn render_config(spec: &LaunchSpec) -> Result<String, LaunchCliError> {
    let file = LaunchConfigFile {
        launch_config_version: LAUNCH_CONFIG_VERSION,
        deployment_name: &spec.deployment_name,
        template_url: &spec.template_url,
        provider: &spec.provider,
        aws_region: &spec.region,
        key_helper: spec.key_name.is_none(),
        template_parameters: TemplateParameters {
            key_name: spec.key_name.as_deref(),
            admin_location: ADMIN_LOCATION,
            public_slave_instance_count: 1,
            slave_instance_count: 1,
        },
    };
    serde_json::to_string_pretty(&file).map_err(|err| LaunchCliError::Io {
        path: Utf8PathBuf::from(format!("{}{CONFIG_FILE_SUFFIX}", spec.deployment_name)),
        message: err.to_string(),
    })
}

/// Path of the info file for `deployment` inside `work_dir`.
#[must_use]
pub fn info_path(work_dir: &Utf8Path, deployment: &str) -> Utf8PathBuf {
    work_dir.join(format!("{deployment}{INFO_FILE_SUFFIX}"))
}

/// Path of the config file for `deployment` inside `work_dir`.
#[must_use]
pub fn config_path(work_dir: &Utf8Path, deployment: &str) -> Utf8PathBuf {
    work_dir.join(format!("{deployment}{CONFIG_FILE_SUFFIX}"))
}

/// Deployment name encoded in an info file name, if `file_name` is one.
#[must_use]
pub fn deployment_from_info_file(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(INFO_FILE_SUFFIX)
        .filter(|name| !name.is_empty())
}

fn io_error(path: &Utf8Path, err: &io::Error) -> LaunchCliError {
    LaunchCliError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn open_work_dir(work_dir: &Utf8Path) -> Result<Dir, LaunchCliError> {
    Dir::create_ambient_dir_all(work_dir, ambient_authority())
        .map_err(|err| io_error(work_dir, &err))?;
    Dir::open_ambient_dir(work_dir, ambient_authority()).map_err(|err| io_error(work_dir, &err))
}

/// Writes the config file for `spec`, creating `work_dir` when needed.
pub(super) fn write_config(work_dir: &Utf8Path, spec: &LaunchSpec) -> Result<(), LaunchCliError> {
    let contents = render_config(spec)?;
    let dir = open_work_dir(work_dir)?;
    let file_name = format!("{}{CONFIG_FILE_SUFFIX}", spec.deployment_name);
    dir.write(&file_name, contents.as_bytes())
        .map_err(|err| io_error(&config_path(work_dir, &spec.deployment_name), &err))
}

/// Returns `true` when the launch tool has recorded state for `deployment`.
pub(super) fn info_exists(work_dir: &Utf8Path, deployment: &str) -> Result<bool, LaunchCliError> {
    match Dir::open_ambient_dir(work_dir, ambient_authority()) {
        Ok(dir) => dir
            .try_exists(format!("{deployment}{INFO_FILE_SUFFIX}"))
            .map_err(|err| io_error(&info_path(work_dir, deployment), &err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_error(work_dir, &err)),
    }
}

/// Removes the config and info files for `deployment`. Missing files are
/// not an error.
pub(super) fn remove_deployment_files(
    work_dir: &Utf8Path,
    deployment: &str,
) -> Result<(), LaunchCliError> {
    let dir = match Dir::open_ambient_dir(work_dir, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_error(work_dir, &err)),
    };

    for file_name in [
        format!("{deployment}{INFO_FILE_SUFFIX}"),
        format!("{deployment}{CONFIG_FILE_SUFFIX}"),
    ] {
        match dir.remove_file(&file_name) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(&work_dir.join(&file_name), &err)),
        }
    }
    Ok(())
}

/// Lists deployments with an info file directly inside `work_dir`.
///
/// # Errors
///
/// Returns [`LaunchCliError::Io`] when the directory exists but cannot be
/// read.
pub fn list_deployments(work_dir: &Utf8Path) -> Result<Vec<String>, LaunchCliError> {
    let dir = match Dir::open_ambient_dir(work_dir, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_error(work_dir, &err)),
    };

    let mut deployments = Vec::new();
    for entry in dir.entries().map_err(|err| io_error(work_dir, &err))? {
        let entry = entry.map_err(|err| io_error(work_dir, &err))?;
        let file_name = entry.file_name().map_err(|err| io_error(work_dir, &err))?;
        if let Some(deployment) = deployment_from_info_file(&file_name) {
            deployments.push(deployment.to_owned());
        }
    }
    deployments.sort();
    Ok(deployments)
}
